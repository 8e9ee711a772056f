//! Thread-local stack of active transformation layers.
//!
//! Each layer owns the [`LifeHandle`] given to every wrapper created at its
//! level. Popping a layer marks that handle dead. Levels are stack depths, so
//! a level number is reused by the next layer pushed after a pop; the new
//! layer gets a fresh handle.
//!
//! What a layer *does* (differentiate, batch, ...) is up to its caller. This
//! module only tracks levels and liveness.

use crate::wrapper::LifeHandle;
use std::cell::RefCell;

/// Nesting depth of a transformation layer. The outermost layer is 1.
pub type Level = i64;

/// One entry of the layer stack.
#[derive(Debug, Clone)]
pub struct DynamicLayer {
    level: Level,
    life_handle: LifeHandle,
}

impl DynamicLayer {
    pub fn level(&self) -> Level {
        self.level
    }

    pub fn life_handle(&self) -> &LifeHandle {
        &self.life_handle
    }
}

thread_local! {
    static DYNAMIC_LAYER_STACK: RefCell<Vec<DynamicLayer>> = const { RefCell::new(Vec::new()) };
}

/// Push a new layer and return its level.
pub fn push_dynamic_layer() -> Level {
    DYNAMIC_LAYER_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let level = stack.len() as Level + 1;
        stack.push(DynamicLayer {
            level,
            life_handle: LifeHandle::new(),
        });
        log::debug!("pushed dynamic layer {level}");
        level
    })
}

/// Pop the innermost layer and mark its handle dead.
pub fn pop_dynamic_layer() -> Option<DynamicLayer> {
    DYNAMIC_LAYER_STACK.with(|stack| {
        let layer = stack.borrow_mut().pop()?;
        layer.life_handle.mark_dead();
        log::debug!("popped dynamic layer {}", layer.level);
        Some(layer)
    })
}

/// The life handle of the active layer at `level`.
///
/// # Panics
///
/// Panics if no active layer has that level.
pub fn life_handle_for_level(level: Level) -> LifeHandle {
    DYNAMIC_LAYER_STACK.with(|stack| {
        let stack = stack.borrow();
        let layer = usize::try_from(level - 1)
            .ok()
            .and_then(|index| stack.get(index));
        match layer {
            Some(layer) => layer.life_handle.clone(),
            None => panic!(
                "level {level} is not on the dynamic layer stack (depth {})",
                stack.len()
            ),
        }
    })
}

/// Level of the innermost active layer.
pub fn current_level() -> Option<Level> {
    DYNAMIC_LAYER_STACK.with(|stack| stack.borrow().last().map(|layer| layer.level))
}

pub fn dynamic_layer_depth() -> usize {
    DYNAMIC_LAYER_STACK.with(|stack| stack.borrow().len())
}

/// Pop every layer on this thread, marking each dead.
pub fn clear_dynamic_layers() {
    while pop_dynamic_layer().is_some() {}
}

/// Pushes a layer on creation and pops it on drop.
///
/// # Example
///
/// ```
/// use ndwrap::layers::{DynamicLayerGuard, current_level};
///
/// let outer = DynamicLayerGuard::enter();
/// {
///     let inner = DynamicLayerGuard::enter();
///     assert_eq!(current_level(), Some(inner.level()));
/// }
/// assert_eq!(current_level(), Some(outer.level()));
/// ```
#[must_use = "the layer is popped as soon as the guard drops"]
#[derive(Debug)]
pub struct DynamicLayerGuard {
    level: Level,
}

impl DynamicLayerGuard {
    pub fn enter() -> Self {
        Self {
            level: push_dynamic_layer(),
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }
}

impl Drop for DynamicLayerGuard {
    fn drop(&mut self) {
        match pop_dynamic_layer() {
            Some(layer) if layer.level == self.level => {}
            popped => log::warn!(
                "layer guard for level {} popped {:?}",
                self.level,
                popped.map(|layer| layer.level)
            ),
        }
    }
}
