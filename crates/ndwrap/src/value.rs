//! Reference-counted value handle shared by plain tensors and wrappers.

use crate::batched::BatchedTensor;
use crate::dispatch::DispatchKeySet;
use crate::meta::{TensorMeta, VersionCounter};
use crate::scalar::Scalar;
use crate::tensor::Tensor;
use crate::wrapper::TensorWrapper;
use std::fmt;
use std::rc::Rc;

/// Interface shared by every kind of value implementation.
///
/// Metadata is readable on all kinds. Whether it is writable depends on the
/// kind: wrappers mirror their inner value and refuse direct writes.
pub trait TensorImpl {
    fn key_set(&self) -> DispatchKeySet;

    fn meta(&self) -> &TensorMeta;

    fn version_counter(&self) -> &VersionCounter;

    fn allows_metadata_change(&self) -> bool;

    /// Short name used in diagnostics.
    fn type_name(&self) -> &'static str;

    fn set_size(&mut self, dim: usize, new_size: usize);

    fn set_stride(&mut self, dim: usize, new_stride: usize);

    fn set_storage_offset(&mut self, storage_offset: usize);
}

/// The concrete implementation behind a [`Value`].
#[derive(Debug)]
pub enum ValueImpl<T: Scalar> {
    Tensor(Tensor<T>),
    Wrapper(TensorWrapper<T>),
    Batched(BatchedTensor<T>),
}

impl<T: Scalar> ValueImpl<T> {
    fn as_dyn(&self) -> &dyn TensorImpl {
        match self {
            ValueImpl::Tensor(t) => t,
            ValueImpl::Wrapper(w) => w,
            ValueImpl::Batched(b) => b,
        }
    }

    fn as_dyn_mut(&mut self) -> &mut dyn TensorImpl {
        match self {
            ValueImpl::Tensor(t) => t,
            ValueImpl::Wrapper(w) => w,
            ValueImpl::Batched(b) => b,
        }
    }
}

impl<T: Scalar> TensorImpl for ValueImpl<T> {
    fn key_set(&self) -> DispatchKeySet {
        self.as_dyn().key_set()
    }

    fn meta(&self) -> &TensorMeta {
        self.as_dyn().meta()
    }

    fn version_counter(&self) -> &VersionCounter {
        self.as_dyn().version_counter()
    }

    fn allows_metadata_change(&self) -> bool {
        self.as_dyn().allows_metadata_change()
    }

    fn type_name(&self) -> &'static str {
        self.as_dyn().type_name()
    }

    fn set_size(&mut self, dim: usize, new_size: usize) {
        self.as_dyn_mut().set_size(dim, new_size)
    }

    fn set_stride(&mut self, dim: usize, new_stride: usize) {
        self.as_dyn_mut().set_stride(dim, new_stride)
    }

    fn set_storage_offset(&mut self, storage_offset: usize) {
        self.as_dyn_mut().set_storage_offset(storage_offset)
    }
}

/// A handle to a tensor-like value.
///
/// Cloning is shallow: both handles refer to the same implementation, as with
/// a reference-counted tensor handle. The implementation is released when the
/// last handle drops.
pub struct Value<T: Scalar>(Rc<ValueImpl<T>>);

impl<T: Scalar> Clone for Value<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: Scalar> Value<T> {
    pub fn new(inner: ValueImpl<T>) -> Self {
        Self(Rc::new(inner))
    }

    pub fn as_impl(&self) -> &ValueImpl<T> {
        &self.0
    }

    /// Mutable access to the implementation, only if this is the sole handle.
    pub fn get_mut(&mut self) -> Option<&mut ValueImpl<T>> {
        Rc::get_mut(&mut self.0)
    }

    /// Whether both handles refer to the same implementation.
    pub fn is_same(&self, other: &Value<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn key_set(&self) -> DispatchKeySet {
        self.0.key_set()
    }

    pub fn meta(&self) -> &TensorMeta {
        self.0.meta()
    }

    pub fn sizes(&self) -> &[usize] {
        self.meta().sizes()
    }

    pub fn strides(&self) -> &[usize] {
        self.meta().strides()
    }

    pub fn storage_offset(&self) -> usize {
        self.meta().storage_offset()
    }

    pub fn numel(&self) -> usize {
        self.meta().numel()
    }

    pub fn ndim(&self) -> usize {
        self.meta().ndim()
    }

    pub fn is_contiguous(&self) -> bool {
        self.meta().is_contiguous()
    }

    pub fn version_counter(&self) -> &VersionCounter {
        self.0.version_counter()
    }

    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    /// The plain tensor, if this value is not a wrapper of any kind.
    pub fn as_tensor(&self) -> Option<&Tensor<T>> {
        match self.as_impl() {
            ValueImpl::Tensor(t) => Some(t),
            _ => None,
        }
    }
}

impl<T: Scalar> From<Tensor<T>> for Value<T> {
    fn from(tensor: Tensor<T>) -> Self {
        Value::new(ValueImpl::Tensor(tensor))
    }
}

impl<T: Scalar> From<TensorWrapper<T>> for Value<T> {
    fn from(wrapper: TensorWrapper<T>) -> Self {
        Value::new(ValueImpl::Wrapper(wrapper))
    }
}

impl<T: Scalar> From<BatchedTensor<T>> for Value<T> {
    fn from(batched: BatchedTensor<T>) -> Self {
        Value::new(ValueImpl::Batched(batched))
    }
}

impl<T: Scalar> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_impl(), f)
    }
}

/// Renders the nesting structure, e.g. `Wrapper[lvl=2, Tensor[2, 3]]`.
impl<T: Scalar> fmt::Display for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::wrapper::dump_tensor(f, self)
    }
}
