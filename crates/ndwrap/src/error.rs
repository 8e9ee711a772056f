//! Error types for ndwrap.
//!
//! Only recoverable conditions live here. Broken structural invariants of the
//! wrapper system (non-increasing levels, metadata writes through a wrapper, a
//! dead-wrapper fallback with nothing to unwrap) panic instead.

use crate::dispatch::DispatchKeySet;
use thiserror::Error;

/// Errors raised by the host tensor runtime.
#[derive(Debug, Error)]
pub enum TensorError {
    /// Shape mismatch between data length and expected size.
    #[error("shape mismatch: expected {expected} elements, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Two operands were expected to have the same shape.
    #[error("shape mismatch: {lhs:?} vs {rhs:?}")]
    IncompatibleShapes { lhs: Vec<usize>, rhs: Vec<usize> },

    /// Index out of bounds.
    #[error("index out of bounds: index {index} is out of range for dimension {dim_size}")]
    IndexOutOfBounds { index: usize, dim_size: usize },

    /// Wrong number of indices provided.
    #[error("wrong number of indices: expected {expected}, got {actual}")]
    WrongNumberOfIndices { expected: usize, actual: usize },

    /// Invalid permutation.
    #[error("invalid permutation {perm:?} for tensor with {ndim} dimensions")]
    InvalidPermutation { perm: Vec<usize>, ndim: usize },
}

/// Errors raised while routing an operator call through the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No schema registered under this name.
    #[error("unknown operator `{name}`")]
    UnknownOperator { name: String },

    /// A schema with the same name but a different arity already exists.
    #[error(
        "operator `{name}` is registered with {existing} arguments, cannot re-register with {requested}"
    )]
    SchemaConflict {
        name: String,
        existing: usize,
        requested: usize,
    },

    /// The stack holds fewer values than the operator takes.
    #[error("stack underflow: `{op}` takes {expected} arguments, stack holds {actual}")]
    StackUnderflow {
        op: String,
        expected: usize,
        actual: usize,
    },

    /// Neither an operator kernel nor a fallback handles any key in the set.
    #[error("no kernel for `{op}` under dispatch keys {keys:?}")]
    NoKernel { op: String, keys: DispatchKeySet },

    /// A kernel received an argument of the wrong kind.
    #[error("`{op}` expected {expected} at argument {index}, got {found}")]
    UnexpectedValue {
        op: String,
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    /// An in-place mutation through wrappers could not be carried out and the
    /// configured policy refuses to degrade.
    #[error("`{op}` mutated its inputs and the mutation could not be preserved: {reason}")]
    MutationNotPreserved { op: String, reason: &'static str },

    /// Error from the tensor runtime.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
