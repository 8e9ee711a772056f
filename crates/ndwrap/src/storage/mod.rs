//! Storage types for tensor data.
//!
//! ```text
//! Storage<T>  (shared handle, Rc<RefCell<..>>)
//! └── Dense<T>  - contiguous element buffer
//! ```
//!
//! Several tensors may view one storage with different sizes, strides and
//! offsets. Writes through any view are visible to all of them.

mod dense;

use crate::scalar::Scalar;
use std::cell::RefCell;
use std::rc::Rc;

pub use dense::Dense;

/// Shared, interior-mutable handle to a dense buffer.
///
/// Uses `Rc` rather than `Arc`: values and their storages live on one thread
/// of control.
#[derive(Debug, Clone)]
pub struct Storage<T: Scalar> {
    inner: Rc<RefCell<Dense<T>>>,
}

impl<T: Scalar> Storage<T> {
    pub fn new(dense: Dense<T>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(dense)),
        }
    }

    pub fn zeros(len: usize) -> Self {
        Self::new(Dense::zeros(len))
    }

    pub fn from_vec(data: Vec<T>) -> Self {
        Self::new(Dense::from_vec(data))
    }

    /// Number of elements in the buffer.
    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the element at a raw buffer position.
    pub fn read(&self, pos: usize) -> T {
        self.inner.borrow().as_slice()[pos]
    }

    /// Write the element at a raw buffer position.
    pub fn write(&self, pos: usize, value: T) {
        self.inner.borrow_mut().as_mut_slice()[pos] = value;
    }

    /// Run `f` with the whole buffer borrowed mutably.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut [T]) -> R) -> R {
        f(self.inner.borrow_mut().as_mut_slice())
    }

    /// Whether both handles point to the same buffer.
    pub fn shares_storage_with(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
