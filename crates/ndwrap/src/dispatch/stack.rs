//! Boxed argument stack.

use crate::scalar::Scalar;
use crate::value::Value;

/// A boxed argument or return value.
#[derive(Debug, Clone)]
pub enum IValue<T: Scalar> {
    None,
    Bool(bool),
    Int(i64),
    Double(f64),
    Tensor(Value<T>),
    TensorList(Vec<Value<T>>),
}

impl<T: Scalar> IValue<T> {
    pub fn as_tensor(&self) -> Option<&Value<T>> {
        match self {
            IValue::Tensor(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_tensor(self) -> Option<Value<T>> {
        match self {
            IValue::Tensor(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            IValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Kind name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            IValue::None => "None",
            IValue::Bool(_) => "Bool",
            IValue::Int(_) => "Int",
            IValue::Double(_) => "Double",
            IValue::Tensor(_) => "Tensor",
            IValue::TensorList(_) => "TensorList",
        }
    }
}

impl<T: Scalar> From<Value<T>> for IValue<T> {
    fn from(value: Value<T>) -> Self {
        IValue::Tensor(value)
    }
}

/// Operator arguments are pushed in order; kernels pop them and push their
/// returns.
pub type Stack<T> = Vec<IValue<T>>;

/// Replace every tensor in `stack[begin..end]`, including the elements of
/// tensor lists, with `f(tensor)`.
pub fn foreach_tensor_inplace<T, F>(stack: &mut Stack<T>, begin: usize, end: usize, mut f: F)
where
    T: Scalar,
    F: FnMut(&Value<T>) -> Value<T>,
{
    for ivalue in &mut stack[begin..end] {
        match ivalue {
            IValue::Tensor(value) => *value = f(value),
            IValue::TensorList(values) => {
                for value in values.iter_mut() {
                    *value = f(value);
                }
            }
            _ => {}
        }
    }
}

/// Pop the last `n` entries, returned in push order.
///
/// # Panics
///
/// Panics if the stack holds fewer than `n` entries.
pub fn pop_arguments<T: Scalar>(stack: &mut Stack<T>, n: usize) -> Vec<IValue<T>> {
    let start = stack.len() - n;
    stack.split_off(start)
}
