//! Liveness flag shared by a layer and every wrapper created at it.

use std::cell::Cell;
use std::rc::Rc;

/// Whether a transformation layer is still active.
///
/// Starts alive and goes dead exactly once, when the owning layer exits;
/// it never comes back. Wrappers keep a clone so that they can notice the
/// exit after the fact.
///
/// The flag has a single writer (the layer stack frame that owns it) and is
/// `!Send`: layer stacks on different threads use different handles.
#[derive(Debug, Clone)]
pub struct LifeHandle(Rc<Cell<bool>>);

impl LifeHandle {
    /// A fresh, alive handle.
    pub fn new() -> Self {
        Self(Rc::new(Cell::new(true)))
    }

    /// A handle that was never alive, for wrappers constructed as dead.
    pub fn dead() -> Self {
        Self(Rc::new(Cell::new(false)))
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.0.get()
    }

    /// Mark the layer as exited. Idempotent.
    pub fn mark_dead(&self) {
        self.0.set(false);
    }

    pub fn shares_with(&self, other: &LifeHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for LifeHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_alive() {
        assert!(LifeHandle::new().is_alive());
        assert!(!LifeHandle::dead().is_alive());
    }

    #[test]
    fn test_mark_dead_is_visible_to_clones() {
        let handle = LifeHandle::new();
        let held = handle.clone();
        handle.mark_dead();
        assert!(!held.is_alive());
        assert!(held.shares_with(&handle));
    }

    #[test]
    fn test_mark_dead_twice() {
        let handle = LifeHandle::new();
        handle.mark_dead();
        handle.mark_dead();
        assert!(!handle.is_alive());
    }
}
