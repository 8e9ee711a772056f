//! Plain strided tensor.
//!
//! A `Tensor` is a view: sizes, strides and an offset over a shared
//! [`Storage`]. Cloning a tensor aliases the same storage; use
//! [`Tensor::deep_clone`] for an independent copy.

use crate::dispatch::{Device, DispatchKeySet};
use crate::error::TensorError;
use crate::meta::{TensorMeta, VersionCounter};
use crate::scalar::Scalar;
use crate::storage::Storage;
use crate::strides::{cartesian_to_linear, linear_to_cartesian, numel};
use crate::value::TensorImpl;

#[derive(Debug, Clone)]
pub struct Tensor<T: Scalar> {
    storage: Storage<T>,
    meta: TensorMeta,
    device: Device,
    version: VersionCounter,
    allow_metadata_change: bool,
}

impl<T: Scalar> Tensor<T> {
    fn with_storage(storage: Storage<T>, meta: TensorMeta) -> Self {
        Self {
            storage,
            meta,
            device: Device::default(),
            version: VersionCounter::new(),
            allow_metadata_change: true,
        }
    }

    /// Create a new tensor with the given shape, zero-initialized.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndwrap::Tensor;
    ///
    /// let t: Tensor<f64> = Tensor::zeros(&[2, 3, 4]);
    /// assert_eq!(t.shape(), &[2, 3, 4]);
    /// assert_eq!(t.len(), 24);
    /// ```
    pub fn zeros(shape: &[usize]) -> Self {
        Self::with_storage(Storage::zeros(numel(shape)), TensorMeta::contiguous(shape))
    }

    /// Create a tensor filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        let t = Self::zeros(shape);
        t.storage.with_mut(|data| data.fill(T::one()));
        t
    }

    /// Create tensor from data and shape.
    ///
    /// Data is expected to be in column-major order.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if data length doesn't match shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndwrap::Tensor;
    ///
    /// let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
    /// assert_eq!(t.get(&[1, 0]), Some(2.0)); // Column-major: [1,0] is second element
    /// assert_eq!(t.get(&[0, 1]), Some(3.0));
    /// ```
    pub fn from_vec(data: Vec<T>, shape: &[usize]) -> Result<Self, TensorError> {
        let expected = numel(shape);
        if data.len() != expected {
            return Err(TensorError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self::with_storage(
            Storage::from_vec(data),
            TensorMeta::contiguous(shape),
        ))
    }

    /// Retag this tensor for another device.
    #[must_use]
    pub fn on_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.meta.sizes()
    }

    #[inline]
    pub fn strides(&self) -> &[usize] {
        self.meta.strides()
    }

    #[inline]
    pub fn storage_offset(&self) -> usize {
        self.meta.storage_offset()
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.meta.ndim()
    }

    /// Get total number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.meta.numel()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_contiguous(&self) -> bool {
        self.meta.is_contiguous()
    }

    #[inline]
    pub fn device(&self) -> Device {
        self.device
    }

    pub fn storage(&self) -> &Storage<T> {
        &self.storage
    }

    /// Backend and autograd keys of this tensor's device.
    pub fn key_set(&self) -> DispatchKeySet {
        DispatchKeySet::from_keys(&[self.device.backend_key(), self.device.autograd_key()])
    }

    /// Whether the two tensors view the same buffer.
    pub fn shares_storage_with(&self, other: &Self) -> bool {
        self.storage.shares_storage_with(&other.storage)
    }

    pub fn set_allow_tensor_metadata_change(&mut self, allow: bool) {
        self.allow_metadata_change = allow;
    }

    fn position(&self, indices: &[usize]) -> Result<usize, TensorError> {
        if indices.len() != self.ndim() {
            return Err(TensorError::WrongNumberOfIndices {
                expected: self.ndim(),
                actual: indices.len(),
            });
        }
        for (&idx, &dim) in indices.iter().zip(self.shape().iter()) {
            if idx >= dim {
                return Err(TensorError::IndexOutOfBounds {
                    index: idx,
                    dim_size: dim,
                });
            }
        }
        Ok(self.storage_offset() + cartesian_to_linear(indices, self.strides()))
    }

    /// Get element by cartesian indices.
    ///
    /// Returns `None` if indices are out of bounds or wrong number of indices.
    pub fn get(&self, indices: &[usize]) -> Option<T> {
        self.position(indices)
            .ok()
            .map(|pos| self.storage.read(pos))
    }

    /// Set element by cartesian indices. Counts as an in-place modification.
    ///
    /// # Errors
    ///
    /// Returns error if indices are out of bounds or wrong number of indices.
    pub fn set(&self, indices: &[usize], value: T) -> Result<(), TensorError> {
        let pos = self.position(indices)?;
        self.storage.write(pos, value);
        self.version.bump();
        Ok(())
    }

    /// Elements in logical column-major order, honoring strides and offset.
    pub fn to_vec(&self) -> Vec<T> {
        (0..self.len())
            .map(|linear| self.storage.read(self.linear_position(linear)))
            .collect()
    }

    fn linear_position(&self, linear: usize) -> usize {
        let indices = linear_to_cartesian(linear, self.shape());
        self.storage_offset() + cartesian_to_linear(&indices, self.strides())
    }

    /// Permute the dimensions of the tensor (zero-copy view).
    ///
    /// `perm[i]` gives the source dimension for the i-th dimension of the
    /// result.
    ///
    /// # Errors
    ///
    /// Returns error if `perm` is not a valid permutation of `0..ndim`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndwrap::Tensor;
    ///
    /// let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
    /// let t2 = t.permutedims(&[1, 0]).unwrap();
    /// assert_eq!(t2.shape(), &[3, 2]);
    /// assert_eq!(t.get(&[1, 0]), t2.get(&[0, 1]));
    /// assert!(!t2.is_contiguous());
    /// assert!(t.shares_storage_with(&t2));
    /// ```
    pub fn permutedims(&self, perm: &[usize]) -> Result<Self, TensorError> {
        let ndim = self.ndim();
        let mut seen = vec![false; ndim];
        let valid = perm.len() == ndim
            && perm.iter().all(|&p| {
                if p >= ndim || seen[p] {
                    return false;
                }
                seen[p] = true;
                true
            });
        if !valid {
            return Err(TensorError::InvalidPermutation {
                perm: perm.to_vec(),
                ndim,
            });
        }

        let sizes: Vec<usize> = perm.iter().map(|&p| self.shape()[p]).collect();
        let strides: Vec<usize> = perm.iter().map(|&p| self.strides()[p]).collect();
        Ok(Self {
            storage: self.storage.clone(),
            meta: TensorMeta::new(&sizes, &strides, self.storage_offset()),
            device: self.device,
            version: self.version.clone(),
            allow_metadata_change: self.allow_metadata_change,
        })
    }

    /// Copy `src` into this tensor's elements in place.
    ///
    /// # Errors
    ///
    /// Returns error if shapes don't match.
    pub fn copy_from(&self, src: &Tensor<T>) -> Result<(), TensorError> {
        if self.shape() != src.shape() {
            return Err(TensorError::IncompatibleShapes {
                lhs: self.shape().to_vec(),
                rhs: src.shape().to_vec(),
            });
        }
        // Read first: `src` may alias our storage.
        let values = src.to_vec();
        for (linear, value) in values.into_iter().enumerate() {
            self.storage.write(self.linear_position(linear), value);
        }
        self.version.bump();
        Ok(())
    }

    /// Contiguous copy with its own storage and version counter.
    pub fn deep_clone(&self) -> Self {
        Self::with_storage(
            Storage::from_vec(self.to_vec()),
            TensorMeta::contiguous(self.shape()),
        )
        .on_device(self.device)
    }
}

impl<T: Scalar> TensorImpl for Tensor<T> {
    fn key_set(&self) -> DispatchKeySet {
        Tensor::key_set(self)
    }

    fn meta(&self) -> &TensorMeta {
        &self.meta
    }

    fn version_counter(&self) -> &VersionCounter {
        &self.version
    }

    fn allows_metadata_change(&self) -> bool {
        self.allow_metadata_change
    }

    fn type_name(&self) -> &'static str {
        "Tensor"
    }

    fn set_size(&mut self, dim: usize, new_size: usize) {
        assert!(
            self.allow_metadata_change,
            "set_size is not allowed on this Tensor"
        );
        self.meta.set_size(dim, new_size);
    }

    fn set_stride(&mut self, dim: usize, new_stride: usize) {
        assert!(
            self.allow_metadata_change,
            "set_stride is not allowed on this Tensor"
        );
        self.meta.set_stride(dim, new_stride);
    }

    fn set_storage_offset(&mut self, storage_offset: usize) {
        assert!(
            self.allow_metadata_change,
            "set_storage_offset is not allowed on this Tensor"
        );
        self.meta.set_storage_offset(storage_offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchKey;
    use crate::scalar::c64;

    fn test_zeros_generic<T: Scalar>() {
        let t: Tensor<T> = Tensor::zeros(&[2, 3]);
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.ndim(), 2);
        assert_eq!(t.len(), 6);
        assert_eq!(t.strides(), &[1, 2]);
        assert!(t.to_vec().iter().all(|&x| x == T::zero()));
    }

    #[test]
    fn test_zeros_f64() {
        test_zeros_generic::<f64>();
    }

    #[test]
    fn test_zeros_c64() {
        test_zeros_generic::<c64>();
    }

    #[test]
    fn test_from_vec_shape_mismatch() {
        let result = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[2, 2]);
        assert!(matches!(
            result,
            Err(TensorError::ShapeMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_scalar_tensor() {
        let t = Tensor::from_vec(vec![7.0], &[]).unwrap();
        assert_eq!(t.ndim(), 0);
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(&[]), Some(7.0));
        assert_eq!(t.to_vec(), vec![7.0]);
    }

    #[test]
    fn test_set_bumps_version() {
        let t: Tensor<f64> = Tensor::zeros(&[2]);
        assert_eq!(t.version.current(), 0);
        t.set(&[1], 3.0).unwrap();
        assert_eq!(t.get(&[1]), Some(3.0));
        assert_eq!(t.version.current(), 1);
        assert!(t.set(&[2], 1.0).is_err());
        assert!(t.set(&[0, 0], 1.0).is_err());
    }

    #[test]
    fn test_permutedims_view() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        let v = t.permutedims(&[1, 0]).unwrap();
        assert_eq!(v.shape(), &[3, 2]);
        assert_eq!(v.strides(), &[2, 1]);
        assert!(!v.is_contiguous());
        assert_eq!(v.to_vec(), vec![1.0, 3.0, 5.0, 2.0, 4.0, 6.0]);

        v.set(&[2, 1], 60.0).unwrap();
        assert_eq!(t.get(&[1, 2]), Some(60.0));
    }

    #[test]
    fn test_permutedims_invalid() {
        let t: Tensor<f64> = Tensor::zeros(&[2, 3]);
        assert!(t.permutedims(&[0, 0]).is_err());
        assert!(t.permutedims(&[0]).is_err());
        assert!(t.permutedims(&[0, 2]).is_err());
    }

    #[test]
    fn test_copy_from_strided() {
        let src = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[3, 2]).unwrap();
        let base: Tensor<f64> = Tensor::zeros(&[2, 3]);
        let dst = base.permutedims(&[1, 0]).unwrap();

        dst.copy_from(&src).unwrap();
        assert_eq!(dst.to_vec(), src.to_vec());
        assert_eq!(base.to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_copy_from_shape_mismatch() {
        let src = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[3]).unwrap();
        let dst: Tensor<f64> = Tensor::zeros(&[2]);
        assert!(dst.copy_from(&src).is_err());
    }

    #[test]
    fn test_deep_clone_is_independent() {
        let t = Tensor::from_vec(vec![1.0, 2.0], &[2])
            .unwrap()
            .on_device(Device::Cuda);
        let c = t.deep_clone();
        c.set(&[0], 9.0).unwrap();
        assert_eq!(t.get(&[0]), Some(1.0));
        assert!(!t.shares_storage_with(&c));
        assert_eq!(c.device(), Device::Cuda);
    }

    #[test]
    fn test_key_set_follows_device() {
        let t: Tensor<f64> = Tensor::zeros(&[1]).on_device(Device::Xla);
        let keys = t.key_set();
        assert!(keys.has(DispatchKey::Xla));
        assert!(keys.has(DispatchKey::AutogradXla));
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_set_size_refreshes_meta() {
        let mut t: Tensor<f64> = Tensor::zeros(&[2, 3]);
        TensorImpl::set_size(&mut t, 1, 2);
        assert_eq!(t.len(), 4);
        TensorImpl::set_storage_offset(&mut t, 1);
        assert_eq!(t.storage_offset(), 1);
    }

    #[test]
    #[should_panic(expected = "set_stride is not allowed")]
    fn test_set_stride_locked() {
        let mut t: Tensor<f64> = Tensor::zeros(&[2, 3]);
        t.set_allow_tensor_metadata_change(false);
        TensorImpl::set_stride(&mut t, 0, 3);
    }
}
