//! Dispatch rules for values carrying the `GradWrapper` key.
//!
//! Live wrappers are the business of whichever layer created them. What is
//! left for the wrapper key itself:
//!
//! - every operator, once a dead wrapper is among its arguments: unwrap the
//!   dead ones and dispatch the call again;
//! - `copy_`, the one mutation a wrapper has to know about.

use super::tensor_wrapper::maybe_get_tensor_wrapper;
use crate::config::{MutationPolicy, WrapperConfig};
use crate::dispatch::{
    Continuation, DispatchKey, DispatchKeySet, Dispatcher, IValue, KernelResult, OperatorHandle,
    Stack, foreach_tensor_inplace, pop_arguments,
};
use crate::error::DispatchError;
use crate::ops::{COPY_, copy_schema};
use crate::scalar::Scalar;
use crate::value::Value;

/// Fallback for every operator under `GradWrapper`.
///
/// Replaces each dead wrapper among the arguments with its wrapped value, in
/// one pass, and asks the dispatcher to resubmit. Live wrappers and plain
/// values are left alone.
///
/// # Panics
///
/// Panics if no argument was a dead wrapper: live wrappers must have been
/// handled by a higher-priority kernel before reaching this one.
pub fn dead_tensor_wrapper_fallback<T: Scalar>(
    _dispatcher: &Dispatcher<T>,
    op: &OperatorHandle,
    _keys: DispatchKeySet,
    stack: &mut Stack<T>,
) -> KernelResult {
    let args_size = op.schema().num_arguments();
    let end = stack.len();
    let mut unwrapped_count = 0;

    foreach_tensor_inplace(stack, end - args_size, end, |value| {
        match maybe_get_tensor_wrapper(value) {
            Some(wrapped) if !wrapped.is_alive() => {
                unwrapped_count += 1;
                wrapped.value().clone()
            }
            _ => value.clone(),
        }
    });
    assert!(unwrapped_count > 0, "Should have at least one dead wrapper");
    log::trace!(
        "unwrapped {unwrapped_count} dead wrapper(s) for `{}`",
        op.name()
    );

    Ok(Continuation::Resubmit)
}

fn tensor_argument<T: Scalar>(
    op: &OperatorHandle,
    args: &[IValue<T>],
    index: usize,
) -> Result<Value<T>, DispatchError> {
    match args.get(index) {
        Some(IValue::Tensor(value)) => Ok(value.clone()),
        other => Err(DispatchError::UnexpectedValue {
            op: op.name().to_string(),
            index,
            expected: "Tensor",
            found: other.map_or("nothing", IValue::kind),
        }),
    }
}

/// `copy_(self, src, non_blocking)` under `GradWrapper`.
///
/// When both operands are wrappers reporting the same level, copies the
/// wrapped source into the wrapped destination through the dispatcher, bumps
/// the destination wrapper's version, and returns the destination. Otherwise
/// the mutation cannot be expressed on wrappers and `policy` decides: warn and
/// return the destination unchanged, or fail.
pub fn copy_wrapper_tensor_<T: Scalar>(
    dispatcher: &Dispatcher<T>,
    op: &OperatorHandle,
    _keys: DispatchKeySet,
    stack: &mut Stack<T>,
    policy: MutationPolicy,
) -> KernelResult {
    let args = pop_arguments(stack, op.schema().num_arguments());
    let dest = tensor_argument(op, &args, 0)?;
    let src = tensor_argument(op, &args, 1)?;
    let non_blocking = args.get(2).and_then(IValue::as_bool).unwrap_or(false);

    let reason = match (maybe_get_tensor_wrapper(&dest), maybe_get_tensor_wrapper(&src)) {
        (Some(dest_impl), Some(src_impl)) if dest_impl.level() == src_impl.level() => {
            let mut inner: Stack<T> = vec![
                dest_impl.value().clone().into(),
                src_impl.value().clone().into(),
                IValue::Bool(non_blocking),
            ];
            dispatcher.call_boxed(op, &mut inner)?;
            dest.version_counter().bump();
            stack.push(IValue::Tensor(dest.clone()));
            return Ok(Continuation::Complete);
        }
        (None, _) => "destination is not a TensorWrapper",
        (_, None) => "source is not a TensorWrapper",
        _ => "destination and source are at different levels",
    };

    match policy {
        MutationPolicy::Degrade => {
            log::warn!(
                "`{}` mutated its inputs but the mutation could not be preserved ({reason}); \
                 the destination is left unchanged",
                op.name()
            );
            stack.push(IValue::Tensor(dest));
            Ok(Continuation::Complete)
        }
        MutationPolicy::Fail => Err(DispatchError::MutationNotPreserved {
            op: op.name().to_string(),
            reason,
        }),
    }
}

/// Install the dead-wrapper fallback and the `copy_` kernel under
/// `GradWrapper`.
pub fn register_wrapper_kernels<T: Scalar>(
    dispatcher: &mut Dispatcher<T>,
    config: &WrapperConfig,
) -> Result<(), DispatchError> {
    dispatcher.register_fallback(DispatchKey::GradWrapper, dead_tensor_wrapper_fallback::<T>);

    dispatcher.register_schema(copy_schema())?;
    let policy = config.mutation_policy;
    dispatcher.register_kernel(COPY_, DispatchKey::GradWrapper, move |d, op, keys, stack| {
        copy_wrapper_tensor_(d, op, keys, stack, policy)
    })
}
