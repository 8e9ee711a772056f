//! Dispatch keys carried by a wrapper.

use crate::dispatch::{DispatchKey, DispatchKeySet};
use crate::scalar::Scalar;
use crate::value::Value;

/// Keys that may flow from a wrapped value onto its wrapper, so calls can
/// still be routed to the backend the value lives on.
pub const KEYS_TO_PROPAGATE_TO_WRAPPER: DispatchKeySet =
    DispatchKeySet::from_keys(&[DispatchKey::Cpu, DispatchKey::Cuda, DispatchKey::Xla]);

/// Autograd keys every wrapper carries.
pub const AUTOGRAD_BACKEND_KEYS: DispatchKeySet = DispatchKeySet::from_keys(&[
    DispatchKey::AutogradCpu,
    DispatchKey::AutogradCuda,
    DispatchKey::AutogradXla,
]);

/// The part of `value`'s key set allowed through `to_propagate`.
pub fn keys_to_propagate_to_wrapper<T: Scalar>(
    value: &Value<T>,
    to_propagate: DispatchKeySet,
) -> DispatchKeySet {
    value.key_set() & to_propagate
}

/// Full key set for a wrapper around `value`.
///
/// Pure in its inputs, so wrapping the same value always routes the same way.
pub fn wrapper_key_set<T: Scalar>(value: &Value<T>, to_propagate: DispatchKeySet) -> DispatchKeySet {
    (keys_to_propagate_to_wrapper(value, to_propagate) | AUTOGRAD_BACKEND_KEYS)
        .add(DispatchKey::GradWrapper)
}
