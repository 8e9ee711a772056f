//! One-line rendering of a value's wrapper nesting.

use super::tensor_wrapper::maybe_get_tensor_wrapper;
use crate::batched::maybe_get_batched_impl;
use crate::scalar::Scalar;
use crate::value::Value;
use std::fmt::{self, Write};

/// Write the nesting structure of `value` to `out`.
///
/// Wrappers render as `Wrapper[lvl=N, inner]`, or `Wrapper[dead, inner]`
/// once their layer has exited; batched values as
/// `Batched[lvl=N dim=D, inner]`; plain tensors as `Tensor[sizes]`.
pub fn dump_tensor<T: Scalar, W: Write + ?Sized>(out: &mut W, value: &Value<T>) -> fmt::Result {
    if let Some(wrapped) = maybe_get_tensor_wrapper(value) {
        match wrapped.level() {
            Some(level) => write!(out, "Wrapper[lvl={level}, ")?,
            None => out.write_str("Wrapper[dead, ")?,
        }
        dump_tensor(out, wrapped.value())?;
        return out.write_char(']');
    }
    if let Some(batched) = maybe_get_batched_impl(value) {
        write!(out, "Batched[lvl={} dim={}, ", batched.level(), batched.bdim())?;
        dump_tensor(out, batched.value())?;
        return out.write_char(']');
    }
    write!(out, "Tensor{:?}", value.sizes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tensor;
    use crate::batched::make_batched;
    use crate::layers::{clear_dynamic_layers, pop_dynamic_layer, push_dynamic_layer};
    use crate::wrapper::{make_tensor_wrapper, make_tensor_wrapper_handle};

    fn dump(value: &Value<f64>) -> String {
        let mut out = String::new();
        dump_tensor(&mut out, value).unwrap();
        out
    }

    #[test]
    fn test_plain_tensor() {
        let v: Value<f64> = Tensor::zeros(&[2, 3]).into();
        assert_eq!(dump(&v), "Tensor[2, 3]");

        let scalar: Value<f64> = Tensor::zeros(&[]).into();
        assert_eq!(dump(&scalar), "Tensor[]");
    }

    #[test]
    fn test_wrapper_alive_then_dead() {
        clear_dynamic_layers();
        let level = push_dynamic_layer();
        let v: Value<f64> = Tensor::zeros(&[4]).into();
        let w = make_tensor_wrapper(&v, level);
        assert_eq!(dump(&w), "Wrapper[lvl=1, Tensor[4]]");

        pop_dynamic_layer();
        assert_eq!(dump(&w), "Wrapper[dead, Tensor[4]]");
        assert_eq!(w.to_string(), dump(&w));
    }

    #[test]
    fn test_batched_inside_wrapper() {
        let v: Value<f64> = Tensor::zeros(&[5, 2]).into();
        let b = make_batched(&v, 0, 1);
        let w = make_tensor_wrapper_handle(&b, 2, false);
        assert_eq!(dump(&w), "Wrapper[dead, Batched[lvl=1 dim=0, Tensor[5, 2]]]");
    }
}
