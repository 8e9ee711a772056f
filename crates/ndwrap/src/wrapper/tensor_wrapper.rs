//! TensorWrapper - a value tagged with the transformation level that created it.

use super::keys::{KEYS_TO_PROPAGATE_TO_WRAPPER, wrapper_key_set};
use super::life_handle::LifeHandle;
use crate::dispatch::{DispatchKey, DispatchKeySet};
use crate::layers::{Level, life_handle_for_level};
use crate::meta::{TensorMeta, VersionCounter};
use crate::scalar::Scalar;
use crate::value::{TensorImpl, Value, ValueImpl};

/// A stand-in for `value` created by the layer at `level`.
///
/// The wrapper mirrors the sizes, strides and offset of the wrapped value at
/// construction time and carries the layer's [`LifeHandle`]. While the layer
/// is active the wrapper reports its level; once the layer exits it reports
/// none and dispatch unwraps it on the next call that touches it.
///
/// The mirror is not refreshed afterwards. Resizing the wrapped value in
/// place desynchronizes it; writing the mirror directly panics.
#[derive(Debug)]
pub struct TensorWrapper<T: Scalar> {
    key_set: DispatchKeySet,
    value: Value<T>,
    level: Level,
    is_alive: LifeHandle,
    meta: TensorMeta,
    version: VersionCounter,
    allow_metadata_change: bool,
}

impl<T: Scalar> TensorWrapper<T> {
    /// Wrap `value` at `level`.
    ///
    /// # Panics
    ///
    /// Panics if `use_value_sizes_strides` is false, or if `value` is itself a
    /// wrapper whose reported level is not below `level`.
    pub fn new(
        key_set: DispatchKeySet,
        value: Value<T>,
        level: Level,
        is_alive: LifeHandle,
        use_value_sizes_strides: bool,
    ) -> Self {
        assert!(
            use_value_sizes_strides,
            "TensorWrapper must take its sizes and strides from the wrapped value"
        );
        if let Some(inner) = maybe_get_tensor_wrapper(&value) {
            // A dead inner wrapper reports no level and never blocks wrapping.
            assert!(
                inner.level() < Some(level),
                "cannot wrap a level {:?} wrapper at level {level}",
                inner.level()
            );
        }

        let meta = TensorMeta::new(value.sizes(), value.strides(), value.storage_offset());
        Self {
            key_set,
            value,
            level,
            is_alive,
            meta,
            version: VersionCounter::new(),
            allow_metadata_change: false,
        }
    }

    /// The wrapped value.
    pub fn value(&self) -> &Value<T> {
        &self.value
    }

    /// Creation level while the layer is active, `None` once it has exited.
    pub fn level(&self) -> Option<Level> {
        self.is_alive().then_some(self.level)
    }

    pub fn is_alive(&self) -> bool {
        self.is_alive.is_alive()
    }

    pub fn life_handle(&self) -> &LifeHandle {
        &self.is_alive
    }

    /// A new wrapper around the same value at the same level, sharing this
    /// wrapper's life handle.
    ///
    /// The value is shared, not copied. `version_counter` becomes the
    /// duplicate's counter: pass a clone of [`TensorImpl::version_counter`]
    /// to keep both wrappers on one counter, or [`VersionCounter::new`] for
    /// an independent one.
    pub fn shallow_copy_and_detach(
        &self,
        version_counter: VersionCounter,
        allow_metadata_change: bool,
    ) -> Value<T> {
        let mut dest = TensorWrapper::new(
            self.key_set,
            self.value.clone(),
            self.level,
            self.is_alive.clone(),
            true,
        );
        dest.version = version_counter;
        dest.allow_metadata_change = allow_metadata_change;
        dest.into()
    }

    /// Overwrite this wrapper from another implementation. Not supported.
    ///
    /// # Panics
    ///
    /// Always.
    pub fn shallow_copy_from(&mut self, _other: &Value<T>) {
        panic!("shallow_copy_from is not supported for TensorWrapper");
    }
}

impl<T: Scalar> TensorImpl for TensorWrapper<T> {
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
        self.allow_metadata_change
    }

    fn type_name(&self) -> &'static str {
        "TensorWrapper"
    }

    fn set_size(&mut self, _dim: usize, _new_size: usize) {
        panic!("Can't set_size for TensorWrapper");
    }

    fn set_stride(&mut self, _dim: usize, _new_stride: usize) {
        panic!("Can't set_stride for TensorWrapper");
    }

    fn set_storage_offset(&mut self, _storage_offset: usize) {
        panic!("Can't set_storage_offset for TensorWrapper");
    }
}

/// The wrapper behind `value`, if its key set marks it as one.
pub fn maybe_get_tensor_wrapper<T: Scalar>(value: &Value<T>) -> Option<&TensorWrapper<T>> {
    if !value.key_set().has(DispatchKey::GradWrapper) {
        return None;
    }
    match value.as_impl() {
        ValueImpl::Wrapper(wrapper) => Some(wrapper),
        _ => None,
    }
}

/// Wrap `value` at the active layer `level`.
///
/// # Panics
///
/// Panics if `level` is not on this thread's layer stack, or if `value` is
/// a live wrapper at `level` or above.
///
/// # Example
///
/// ```
/// use ndwrap::layers::DynamicLayerGuard;
/// use ndwrap::wrapper::{make_tensor_wrapper, maybe_get_tensor_wrapper};
/// use ndwrap::{Tensor, Value};
///
/// let value: Value<f64> = Tensor::zeros(&[2, 3]).into();
/// let wrapped = {
///     let layer = DynamicLayerGuard::enter();
///     let wrapped = make_tensor_wrapper(&value, layer.level());
///     assert_eq!(maybe_get_tensor_wrapper(&wrapped).unwrap().level(), Some(1));
///     wrapped
/// };
/// // The layer has exited; the wrapper outlives it but reports no level.
/// assert_eq!(maybe_get_tensor_wrapper(&wrapped).unwrap().level(), None);
/// assert_eq!(wrapped.sizes(), &[2, 3]);
/// ```
pub fn make_tensor_wrapper<T: Scalar>(value: &Value<T>, level: Level) -> Value<T> {
    let key_set = wrapper_key_set(value, KEYS_TO_PROPAGATE_TO_WRAPPER);
    let life_handle = life_handle_for_level(level);
    let result: Value<T> = TensorWrapper::new(key_set, value.clone(), level, life_handle, true).into();
    assert!(result.key_set().has(DispatchKey::GradWrapper));
    result
}

/// Wrap `value` at `level` with liveness chosen by the caller.
///
/// With `should_be_alive` the wrapper takes the life handle of the active
/// layer at `level`; otherwise it gets a handle that is already dead, and
/// `level` need not be active.
pub fn make_tensor_wrapper_handle<T: Scalar>(
    value: &Value<T>,
    level: Level,
    should_be_alive: bool,
) -> Value<T> {
    let key_set = wrapper_key_set(value, KEYS_TO_PROPAGATE_TO_WRAPPER);
    let life_handle = if should_be_alive {
        life_handle_for_level(level)
    } else {
        LifeHandle::dead()
    };
    TensorWrapper::new(key_set, value.clone(), level, life_handle, true).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tensor;
    use crate::layers::{clear_dynamic_layers, pop_dynamic_layer, push_dynamic_layer};

    fn plain(shape: &[usize]) -> Value<f64> {
        Tensor::zeros(shape).into()
    }

    fn wrapper(value: &Value<f64>) -> &TensorWrapper<f64> {
        maybe_get_tensor_wrapper(value).expect("not a TensorWrapper")
    }

    #[test]
    fn test_level_reported_while_alive() {
        clear_dynamic_layers();
        let level = push_dynamic_layer();
        let w = make_tensor_wrapper(&plain(&[2]), level);

        assert!(wrapper(&w).is_alive());
        assert_eq!(wrapper(&w).level(), Some(level));

        pop_dynamic_layer();
        assert!(!wrapper(&w).is_alive());
        assert_eq!(wrapper(&w).level(), None);

        // A new layer at the same level does not revive the old wrapper.
        let again = push_dynamic_layer();
        assert_eq!(again, level);
        assert_eq!(wrapper(&w).level(), None);
        clear_dynamic_layers();
    }

    #[test]
    fn test_value_is_not_copied() {
        clear_dynamic_layers();
        let level = push_dynamic_layer();
        let v = plain(&[2]);
        let w = make_tensor_wrapper(&v, level);
        assert!(wrapper(&w).value().is_same(&v));
        clear_dynamic_layers();
    }

    #[test]
    fn test_mirrors_strided_metadata() {
        clear_dynamic_layers();
        let level = push_dynamic_layer();
        let t = Tensor::<f64>::zeros(&[2, 3]).permutedims(&[1, 0]).unwrap();
        let v: Value<f64> = t.into();
        let w = make_tensor_wrapper(&v, level);

        assert_eq!(w.meta(), v.meta());
        assert!(!w.is_contiguous());
        assert_eq!(w.numel(), 6);
        assert_eq!(w.type_name(), "TensorWrapper");
        assert!(w.as_tensor().is_none());
        clear_dynamic_layers();
    }

    #[test]
    fn test_plain_value_is_not_a_wrapper() {
        assert!(maybe_get_tensor_wrapper(&plain(&[1])).is_none());
    }

    #[test]
    fn test_nested_levels_must_increase() {
        clear_dynamic_layers();
        let l1 = push_dynamic_layer();
        let l2 = push_dynamic_layer();
        let inner = make_tensor_wrapper(&plain(&[2]), l1);
        let outer = make_tensor_wrapper(&inner, l2);
        assert_eq!(wrapper(&outer).level(), Some(l2));
        clear_dynamic_layers();
    }

    #[test]
    #[should_panic(expected = "cannot wrap a level Some(2) wrapper at level 1")]
    fn test_nested_levels_reverse_order_panics() {
        clear_dynamic_layers();
        let l1 = push_dynamic_layer();
        let l2 = push_dynamic_layer();
        let inner = make_tensor_wrapper(&plain(&[2]), l2);
        make_tensor_wrapper(&inner, l1);
    }

    #[test]
    #[should_panic(expected = "cannot wrap a level Some(1) wrapper at level 1")]
    fn test_same_level_panics() {
        clear_dynamic_layers();
        let l1 = push_dynamic_layer();
        let inner = make_tensor_wrapper(&plain(&[2]), l1);
        make_tensor_wrapper(&inner, l1);
    }

    #[test]
    fn test_dead_inner_wrapper_can_be_rewrapped_at_reused_level() {
        clear_dynamic_layers();
        let level = push_dynamic_layer();
        let stale = make_tensor_wrapper(&plain(&[2]), level);
        pop_dynamic_layer();

        let reused = push_dynamic_layer();
        let w = make_tensor_wrapper(&stale, reused);
        assert_eq!(wrapper(&w).level(), Some(reused));
        clear_dynamic_layers();
    }

    #[test]
    #[should_panic(expected = "sizes and strides from the wrapped value")]
    fn test_requires_value_sizes_strides() {
        let v = plain(&[2]);
        TensorWrapper::new(v.key_set(), v, 1, LifeHandle::new(), false);
    }

    #[test]
    fn test_handle_constructed_dead() {
        clear_dynamic_layers();
        // No active layer is needed for a dead wrapper.
        let w = make_tensor_wrapper_handle(&plain(&[3]), 4, false);
        assert!(!wrapper(&w).is_alive());
        assert_eq!(wrapper(&w).level(), None);
        assert!(w.key_set().has(DispatchKey::GradWrapper));
    }

    #[test]
    fn test_handle_constructed_alive_shares_layer_handle() {
        clear_dynamic_layers();
        let level = push_dynamic_layer();
        let a = make_tensor_wrapper_handle(&plain(&[3]), level, true);
        let b = make_tensor_wrapper(&plain(&[3]), level);
        assert!(wrapper(&a).life_handle().shares_with(wrapper(&b).life_handle()));

        pop_dynamic_layer();
        assert!(!wrapper(&a).is_alive());
        assert!(!wrapper(&b).is_alive());
    }

    #[test]
    fn test_shallow_copy_shares_value_and_liveness() {
        clear_dynamic_layers();
        let level = push_dynamic_layer();
        let w = make_tensor_wrapper(&plain(&[2, 2]), level);
        let copy = wrapper(&w).shallow_copy_and_detach(VersionCounter::new(), true);

        assert!(!copy.is_same(&w));
        assert!(wrapper(&copy).value().is_same(wrapper(&w).value()));
        assert_eq!(wrapper(&copy).level(), Some(level));
        assert_eq!(copy.key_set(), w.key_set());
        assert_eq!(copy.meta(), w.meta());
        assert!(copy.as_impl().allows_metadata_change());

        pop_dynamic_layer();
        assert_eq!(wrapper(&copy).level(), None);
    }

    #[test]
    fn test_shallow_copy_of_dead_wrapper_stays_dead() {
        let w = make_tensor_wrapper_handle(&plain(&[2]), 1, false);
        let copy = wrapper(&w).shallow_copy_and_detach(VersionCounter::new(), false);
        assert!(!wrapper(&copy).is_alive());
    }

    #[test]
    fn test_shallow_copy_shared_version_counter() {
        let w = make_tensor_wrapper_handle(&plain(&[2]), 1, false);
        let counter = w.version_counter().clone();
        let copy = wrapper(&w).shallow_copy_and_detach(counter, false);

        w.version_counter().bump();
        assert_eq!(copy.version_counter().current(), 1);
        assert!(copy.version_counter().shares_with(w.version_counter()));
    }

    #[test]
    fn test_shallow_copy_independent_version_counter() {
        let w = make_tensor_wrapper_handle(&plain(&[2]), 1, false);
        let copy = wrapper(&w).shallow_copy_and_detach(VersionCounter::new(), false);

        w.version_counter().bump();
        assert_eq!(copy.version_counter().current(), 0);
        assert!(!copy.version_counter().shares_with(w.version_counter()));
    }

    #[test]
    #[should_panic(expected = "Can't set_size for TensorWrapper")]
    fn test_set_size_panics() {
        let mut w = make_tensor_wrapper_handle(&plain(&[2]), 1, false);
        w.get_mut().unwrap().set_size(0, 3);
    }

    #[test]
    #[should_panic(expected = "Can't set_stride for TensorWrapper")]
    fn test_set_stride_panics() {
        let mut w = make_tensor_wrapper_handle(&plain(&[2]), 1, false);
        w.get_mut().unwrap().set_stride(0, 3);
    }

    #[test]
    #[should_panic(expected = "Can't set_storage_offset for TensorWrapper")]
    fn test_set_storage_offset_panics() {
        let mut w = make_tensor_wrapper_handle(&plain(&[2]), 1, false);
        w.get_mut().unwrap().set_storage_offset(1);
    }

    #[test]
    #[should_panic(expected = "shallow_copy_from is not supported")]
    fn test_shallow_copy_from_panics() {
        let v = plain(&[2]);
        let mut w = TensorWrapper::new(v.key_set(), v.clone(), 1, LifeHandle::new(), true);
        w.shallow_copy_from(&v);
    }
}
