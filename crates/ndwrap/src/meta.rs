//! Tensor layout metadata and version counters.

use crate::strides::{compute_strides, is_contiguous, numel};
use smallvec::SmallVec;
use std::cell::Cell;
use std::rc::Rc;

/// Inline capacity for sizes/strides; higher ranks spill to the heap.
type Dims = SmallVec<[usize; 5]>;

/// Sizes, strides and storage offset of a tensor, plus the element count and
/// contiguity flag derived from them.
///
/// The derived fields are never set directly: every mutation goes through a
/// setter that refreshes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorMeta {
    sizes: Dims,
    strides: Dims,
    storage_offset: usize,
    numel: usize,
    is_contiguous: bool,
}

impl TensorMeta {
    /// Build metadata from explicit layout.
    ///
    /// # Panics
    ///
    /// Panics if `sizes` and `strides` differ in length.
    pub fn new(sizes: &[usize], strides: &[usize], storage_offset: usize) -> Self {
        assert_eq!(
            sizes.len(),
            strides.len(),
            "sizes and strides must have the same rank"
        );
        let mut meta = Self {
            sizes: SmallVec::from_slice(sizes),
            strides: SmallVec::from_slice(strides),
            storage_offset,
            numel: 0,
            is_contiguous: false,
        };
        meta.refresh_numel();
        meta.refresh_contiguous();
        meta
    }

    /// Dense column-major layout for `shape` at offset 0.
    pub fn contiguous(shape: &[usize]) -> Self {
        Self::new(shape, &compute_strides(shape), 0)
    }

    #[inline]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    #[inline]
    pub fn storage_offset(&self) -> usize {
        self.storage_offset
    }

    #[inline]
    pub fn numel(&self) -> usize {
        self.numel
    }

    #[inline]
    pub fn is_contiguous(&self) -> bool {
        self.is_contiguous
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.sizes.len()
    }

    pub(crate) fn set_size(&mut self, dim: usize, size: usize) {
        self.sizes[dim] = size;
        self.refresh_numel();
        self.refresh_contiguous();
    }

    pub(crate) fn set_stride(&mut self, dim: usize, stride: usize) {
        self.strides[dim] = stride;
        self.refresh_contiguous();
    }

    pub(crate) fn set_storage_offset(&mut self, storage_offset: usize) {
        self.storage_offset = storage_offset;
    }

    fn refresh_numel(&mut self) {
        self.numel = numel(&self.sizes);
    }

    fn refresh_contiguous(&mut self) {
        self.is_contiguous = is_contiguous(&self.sizes, &self.strides);
    }
}

/// Shared counter of in-place modifications.
///
/// Cloning shares the counter; [`VersionCounter::new`] starts an
/// independent one.
#[derive(Debug, Clone, Default)]
pub struct VersionCounter(Rc<Cell<u64>>);

impl VersionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.get()
    }

    pub fn bump(&self) {
        self.0.set(self.0.get() + 1);
    }

    pub fn shares_with(&self, other: &VersionCounter) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
