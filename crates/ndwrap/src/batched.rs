//! BatchedTensor - a value with one dimension reserved for a batching layer.
//!
//! Only the wrapper kind itself lives here: construction, accessors and its
//! place in diagnostic dumps. Batching rules belong to whoever drives the
//! batching layer.

use crate::dispatch::{DispatchKey, DispatchKeySet};
use crate::layers::Level;
use crate::meta::{TensorMeta, VersionCounter};
use crate::scalar::Scalar;
use crate::value::{TensorImpl, Value, ValueImpl};
use crate::wrapper::KEYS_TO_PROPAGATE_TO_WRAPPER;

/// `value` seen without its batch dimension `bdim`, at `level`.
#[derive(Debug)]
pub struct BatchedTensor<T: Scalar> {
    key_set: DispatchKeySet,
    value: Value<T>,
    bdim: usize,
    level: Level,
    meta: TensorMeta,
    version: VersionCounter,
}

impl<T: Scalar> BatchedTensor<T> {
    /// # Panics
    ///
    /// Panics if `bdim` is not a dimension of `value`.
    pub fn new(value: Value<T>, bdim: usize, level: Level) -> Self {
        assert!(
            bdim < value.ndim(),
            "batch dim {bdim} out of range for a {}-d value",
            value.ndim()
        );
        let sizes: Vec<usize> = skip_dim(value.sizes(), bdim);
        let strides: Vec<usize> = skip_dim(value.strides(), bdim);
        let meta = TensorMeta::new(&sizes, &strides, value.storage_offset());
        let key_set = (value.key_set() & KEYS_TO_PROPAGATE_TO_WRAPPER).add(DispatchKey::Batched);
        Self {
            key_set,
            value,
            bdim,
            level,
            meta,
            version: VersionCounter::new(),
        }
    }

    pub fn value(&self) -> &Value<T> {
        &self.value
    }

    pub fn bdim(&self) -> usize {
        self.bdim
    }

    pub fn level(&self) -> Level {
        self.level
    }
}

fn skip_dim(dims: &[usize], skip: usize) -> Vec<usize> {
    dims.iter()
        .enumerate()
        .filter(|&(i, _)| i != skip)
        .map(|(_, &d)| d)
        .collect()
}

impl<T: Scalar> TensorImpl for BatchedTensor<T> {
    fn key_set(&self) -> DispatchKeySet {
        self.key_set
    }

    fn meta(&self) -> &TensorMeta {
        &self.meta
    }

    fn version_counter(&self) -> &VersionCounter {
        &self.version
    }

    fn allows_metadata_change(&self) -> bool {
        false
    }

    fn type_name(&self) -> &'static str {
        "BatchedTensor"
    }

    fn set_size(&mut self, _dim: usize, _new_size: usize) {
        panic!("Can't set_size for BatchedTensor");
    }

    fn set_stride(&mut self, _dim: usize, _new_stride: usize) {
        panic!("Can't set_stride for BatchedTensor");
    }

    fn set_storage_offset(&mut self, _storage_offset: usize) {
        panic!("Can't set_storage_offset for BatchedTensor");
    }
}

pub fn make_batched<T: Scalar>(value: &Value<T>, bdim: usize, level: Level) -> Value<T> {
    BatchedTensor::new(value.clone(), bdim, level).into()
}

pub fn maybe_get_batched_impl<T: Scalar>(value: &Value<T>) -> Option<&BatchedTensor<T>> {
    if !value.key_set().has(DispatchKey::Batched) {
        return None;
    }
    match value.as_impl() {
        ValueImpl::Batched(batched) => Some(batched),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tensor;

    #[test]
    fn test_batch_dim_hidden_from_metadata() {
        let v: Value<f64> = Tensor::zeros(&[5, 2, 3]).into();
        let b = make_batched(&v, 0, 1);

        assert_eq!(b.sizes(), &[2, 3]);
        assert_eq!(b.strides(), &[5, 10]);
        assert_eq!(b.numel(), 6);
        assert!(!b.is_contiguous());

        let batched = maybe_get_batched_impl(&b).unwrap();
        assert_eq!(batched.bdim(), 0);
        assert_eq!(batched.level(), 1);
        assert!(batched.value().is_same(&v));
    }

    #[test]
    fn test_key_set() {
        let v: Value<f64> = Tensor::zeros(&[2, 3]).into();
        let b = make_batched(&v, 1, 1);
        assert!(b.key_set().has(DispatchKey::Batched));
        assert!(b.key_set().has(DispatchKey::Cpu));
        assert!(!b.key_set().has(DispatchKey::GradWrapper));
        assert!(maybe_get_batched_impl(&v).is_none());
    }

    #[test]
    #[should_panic(expected = "batch dim 2 out of range")]
    fn test_bdim_out_of_range() {
        let v: Value<f64> = Tensor::zeros(&[2, 3]).into();
        make_batched(&v, 2, 1);
    }
}
