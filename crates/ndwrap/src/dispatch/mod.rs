//! Key-based operator dispatch.
//!
//! ```text
//! call_boxed(op, stack)
//!     → key set = ∪ key_set(tensor args) ∪ local include − local exclude
//!     → highest key with an op kernel or a fallback
//!         → Complete: done
//!         → Resubmit: recompute keys from the rewritten stack, go again
//! ```
//!
//! Kernels that only handle part of a call pass the rest down with
//! [`Dispatcher::redispatch_boxed`] and the keys ranked below their own.

mod dispatcher;
mod key;
mod stack;

pub use dispatcher::{
    BoxedKernel, Continuation, Dispatcher, KernelResult, LocalKeyGuard, OperatorHandle,
    OperatorSchema,
};
pub use key::{Device, DispatchKey, DispatchKeySet};
pub use stack::{IValue, Stack, foreach_tensor_inplace, pop_arguments};
