//! Backend kernels for plain tensors.
//!
//! The same kernels are registered under every backend key. Devices are tags
//! only: a "Cuda" tensor lives in host memory like any other, and results
//! take the device of their first operand.
//!
//! | Operator | Arguments                   | Returns   |
//! |----------|-----------------------------|-----------|
//! | `copy_`  | `self`, `src`, `non_blocking` | `self`  |
//! | `add`    | `a`, `b`                    | `a + b`   |
//! | `mul`    | `a`, `b`                    | `a * b`   |
//! | `neg`    | `a`                         | `-a`      |
//! | `clone`  | `a`                         | deep copy |
//! | `sum`    | `a`                         | 0-dim     |

use crate::dispatch::{
    Continuation, Device, DispatchKeySet, Dispatcher, IValue, KernelResult, OperatorHandle,
    OperatorSchema, Stack, pop_arguments,
};
use crate::error::{DispatchError, TensorError};
use crate::scalar::Scalar;
use crate::tensor::Tensor;

pub const COPY_: &str = "copy_";
pub const ADD: &str = "add";
pub const MUL: &str = "mul";
pub const NEG: &str = "neg";
pub const CLONE: &str = "clone";
pub const SUM: &str = "sum";

/// `copy_(self, src, non_blocking) -> self`.
pub fn copy_schema() -> OperatorSchema {
    OperatorSchema::new(COPY_, 3, 1)
}

/// Register the schemas above and their kernels under `Cpu`, `Cuda` and
/// `Xla`.
///
/// # Errors
///
/// Returns `DispatchError::SchemaConflict` if one of the names is already
/// registered with another arity.
pub fn register_backend_kernels<T: Scalar>(
    dispatcher: &mut Dispatcher<T>,
) -> Result<(), DispatchError> {
    for schema in [
        copy_schema(),
        OperatorSchema::new(ADD, 2, 1),
        OperatorSchema::new(MUL, 2, 1),
        OperatorSchema::new(NEG, 1, 1),
        OperatorSchema::new(CLONE, 1, 1),
        OperatorSchema::new(SUM, 1, 1),
    ] {
        dispatcher.register_schema(schema)?;
    }

    for device in [Device::Cpu, Device::Cuda, Device::Xla] {
        let key = device.backend_key();
        dispatcher.register_kernel(COPY_, key, copy_kernel::<T>)?;
        dispatcher.register_kernel(ADD, key, add_kernel::<T>)?;
        dispatcher.register_kernel(MUL, key, mul_kernel::<T>)?;
        dispatcher.register_kernel(NEG, key, neg_kernel::<T>)?;
        dispatcher.register_kernel(CLONE, key, clone_kernel::<T>)?;
        dispatcher.register_kernel(SUM, key, sum_kernel::<T>)?;
    }
    log::debug!("registered backend kernels for {COPY_}, {ADD}, {MUL}, {NEG}, {CLONE}, {SUM}");
    Ok(())
}

/// Argument `index` as a plain tensor. Wrappers reaching a backend kernel
/// are an error.
fn plain_tensor<T: Scalar>(
    op: &OperatorHandle,
    args: &[IValue<T>],
    index: usize,
) -> Result<Tensor<T>, DispatchError> {
    let unexpected = |found| DispatchError::UnexpectedValue {
        op: op.name().to_string(),
        index,
        expected: "Tensor",
        found,
    };
    match args.get(index) {
        Some(IValue::Tensor(value)) => value
            .as_tensor()
            .cloned()
            .ok_or_else(|| unexpected(value.type_name())),
        other => Err(unexpected(other.map_or("nothing", IValue::kind))),
    }
}

fn push_tensor<T: Scalar>(stack: &mut Stack<T>, tensor: Tensor<T>) -> KernelResult {
    stack.push(IValue::Tensor(tensor.into()));
    Ok(Continuation::Complete)
}

fn copy_kernel<T: Scalar>(
    _dispatcher: &Dispatcher<T>,
    op: &OperatorHandle,
    _keys: DispatchKeySet,
    stack: &mut Stack<T>,
) -> KernelResult {
    let mut args = pop_arguments(stack, op.schema().num_arguments());
    let dest = plain_tensor(op, &args, 0)?;
    let src = plain_tensor(op, &args, 1)?;
    dest.copy_from(&src)?;
    // Return the caller's handle, not a new one around the same storage.
    stack.push(args.swap_remove(0));
    Ok(Continuation::Complete)
}

fn binary<T: Scalar>(
    op: &OperatorHandle,
    stack: &mut Stack<T>,
    f: impl Fn(T, T) -> T,
) -> KernelResult {
    let args = pop_arguments(stack, op.schema().num_arguments());
    let a = plain_tensor(op, &args, 0)?;
    let b = plain_tensor(op, &args, 1)?;
    if a.shape() != b.shape() {
        return Err(TensorError::IncompatibleShapes {
            lhs: a.shape().to_vec(),
            rhs: b.shape().to_vec(),
        }
        .into());
    }
    let data: Vec<T> = a
        .to_vec()
        .into_iter()
        .zip(b.to_vec())
        .map(|(x, y)| f(x, y))
        .collect();
    push_tensor(stack, Tensor::from_vec(data, a.shape())?.on_device(a.device()))
}

fn add_kernel<T: Scalar>(
    _dispatcher: &Dispatcher<T>,
    op: &OperatorHandle,
    _keys: DispatchKeySet,
    stack: &mut Stack<T>,
) -> KernelResult {
    binary(op, stack, |x, y| x + y)
}

fn mul_kernel<T: Scalar>(
    _dispatcher: &Dispatcher<T>,
    op: &OperatorHandle,
    _keys: DispatchKeySet,
    stack: &mut Stack<T>,
) -> KernelResult {
    binary(op, stack, |x, y| x * y)
}

fn neg_kernel<T: Scalar>(
    _dispatcher: &Dispatcher<T>,
    op: &OperatorHandle,
    _keys: DispatchKeySet,
    stack: &mut Stack<T>,
) -> KernelResult {
    let args = pop_arguments(stack, op.schema().num_arguments());
    let a = plain_tensor(op, &args, 0)?;
    let data: Vec<T> = a.to_vec().into_iter().map(|x| -x).collect();
    push_tensor(stack, Tensor::from_vec(data, a.shape())?.on_device(a.device()))
}

fn clone_kernel<T: Scalar>(
    _dispatcher: &Dispatcher<T>,
    op: &OperatorHandle,
    _keys: DispatchKeySet,
    stack: &mut Stack<T>,
) -> KernelResult {
    let args = pop_arguments(stack, op.schema().num_arguments());
    let a = plain_tensor(op, &args, 0)?;
    push_tensor(stack, a.deep_clone())
}

fn sum_kernel<T: Scalar>(
    _dispatcher: &Dispatcher<T>,
    op: &OperatorHandle,
    _keys: DispatchKeySet,
    stack: &mut Stack<T>,
) -> KernelResult {
    let args = pop_arguments(stack, op.schema().num_arguments());
    let a = plain_tensor(op, &args, 0)?;
    let total = a.to_vec().into_iter().fold(T::zero(), |acc, x| acc + x);
    push_tensor(stack, Tensor::from_vec(vec![total], &[])?.on_device(a.device()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use crate::dispatch::DispatchKey;
    use crate::scalar::c64;
    use approx::assert_relative_eq;

    fn dispatcher() -> Dispatcher<f64> {
        let mut d = Dispatcher::new();
        register_backend_kernels(&mut d).unwrap();
        d
    }

    fn tensor(data: Vec<f64>, shape: &[usize]) -> Value<f64> {
        Tensor::from_vec(data, shape).unwrap().into()
    }

    fn result(stack: &Stack<f64>) -> Tensor<f64> {
        assert_eq!(stack.len(), 1);
        stack[0].as_tensor().unwrap().as_tensor().unwrap().clone()
    }

    #[test]
    fn test_registers_every_backend() {
        let d = dispatcher();
        for key in [DispatchKey::Cpu, DispatchKey::Cuda, DispatchKey::Xla] {
            for op in [COPY_, ADD, MUL, NEG, CLONE, SUM] {
                assert!(d.has_kernel(op, key), "{op} under {key:?}");
            }
        }
        // Registering twice is harmless.
        let mut d = d;
        register_backend_kernels(&mut d).unwrap();
    }

    #[test]
    fn test_add_mul_neg() {
        let d = dispatcher();
        let a = tensor(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let b = tensor(vec![0.5, 0.5, 2.0, -1.0], &[2, 2]);

        let sum = result(&d.call(ADD, vec![a.clone().into(), b.clone().into()]).unwrap());
        assert_eq!(sum.shape(), &[2, 2]);
        assert_eq!(sum.to_vec(), vec![1.5, 2.5, 5.0, 3.0]);

        let prod = result(&d.call(MUL, vec![a.clone().into(), b.into()]).unwrap());
        assert_eq!(prod.to_vec(), vec![0.5, 1.0, 6.0, -4.0]);

        let neg = result(&d.call(NEG, vec![a.into()]).unwrap());
        assert_eq!(neg.to_vec(), vec![-1.0, -2.0, -3.0, -4.0]);
    }

    #[test]
    fn test_binary_honors_strides() {
        let d = dispatcher();
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        let transposed: Value<f64> = t.permutedims(&[1, 0]).unwrap().into();
        let ones: Value<f64> = Tensor::ones(&[3, 2]).into();

        let out = result(&d.call(ADD, vec![transposed.into(), ones.into()]).unwrap());
        assert!(out.is_contiguous());
        assert_eq!(out.to_vec(), vec![2.0, 4.0, 6.0, 3.0, 5.0, 7.0]);
    }

    #[test]
    fn test_shape_mismatch() {
        let d = dispatcher();
        let a = tensor(vec![1.0, 2.0], &[2]);
        let b = tensor(vec![1.0, 2.0, 3.0], &[3]);
        let err = d.call(ADD, vec![a.into(), b.into()]).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Tensor(TensorError::IncompatibleShapes { .. })
        ));
    }

    #[test]
    fn test_sum_is_zero_dim() {
        let d = dispatcher();
        let a = tensor(vec![0.1, 0.2, 0.3], &[3]);
        let out = result(&d.call(SUM, vec![a.into()]).unwrap());
        assert_eq!(out.ndim(), 0);
        assert_relative_eq!(out.get(&[]).unwrap(), 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_complex_sum() {
        let mut d: Dispatcher<c64> = Dispatcher::new();
        register_backend_kernels(&mut d).unwrap();
        let a: Value<c64> =
            Tensor::from_vec(vec![c64::new(1.0, 2.0), c64::new(3.0, -1.0)], &[2])
                .unwrap()
                .into();
        let out = d.call(SUM, vec![a.into()]).unwrap();
        let total = out[0].as_tensor().unwrap().as_tensor().unwrap().get(&[]).unwrap();
        assert_relative_eq!(total.re, 4.0);
        assert_relative_eq!(total.im, 1.0);
    }

    #[test]
    fn test_clone_is_deep() {
        let d = dispatcher();
        let a = tensor(vec![1.0, 2.0], &[2]);
        let copy = result(&d.call(CLONE, vec![a.clone().into()]).unwrap());
        assert!(!copy.shares_storage_with(a.as_tensor().unwrap()));
        assert_eq!(copy.to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_copy_writes_in_place_and_returns_self() {
        let d = dispatcher();
        let dest = tensor(vec![0.0, 0.0], &[2]);
        let src = tensor(vec![7.0, 8.0], &[2]);

        let out = d
            .call(COPY_, vec![dest.clone().into(), src.into(), IValue::Bool(false)])
            .unwrap();
        assert!(out[0].as_tensor().unwrap().is_same(&dest));
        assert_eq!(dest.as_tensor().unwrap().to_vec(), vec![7.0, 8.0]);
        assert_eq!(dest.version_counter().current(), 1);
    }

    #[test]
    fn test_output_follows_first_operand_device() {
        let d = dispatcher();
        let a: Value<f64> = Tensor::ones(&[2]).on_device(Device::Xla).into();
        let b: Value<f64> = Tensor::ones(&[2]).into();
        let out = result(&d.call(ADD, vec![a.into(), b.into()]).unwrap());
        assert_eq!(out.device(), Device::Xla);
    }

    #[test]
    fn test_non_tensor_argument() {
        let d = dispatcher();
        let a = tensor(vec![1.0], &[1]);
        let err = d.call(ADD, vec![a.into(), IValue::Int(3)]).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::UnexpectedValue {
                index: 1,
                found: "Int",
                ..
            }
        ));
    }
}
