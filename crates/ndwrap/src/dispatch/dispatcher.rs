//! Operator registry and key-based kernel selection.

use super::key::{DispatchKey, DispatchKeySet};
use super::stack::{IValue, Stack};
use crate::error::DispatchError;
use crate::scalar::Scalar;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Name and arity of an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorSchema {
    name: String,
    num_arguments: usize,
    num_returns: usize,
}

impl OperatorSchema {
    pub fn new(name: impl Into<String>, num_arguments: usize, num_returns: usize) -> Self {
        Self {
            name: name.into(),
            num_arguments,
            num_returns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_arguments(&self) -> usize {
        self.num_arguments
    }

    pub fn num_returns(&self) -> usize {
        self.num_returns
    }
}

/// Cheap handle to a registered operator.
#[derive(Debug, Clone)]
pub struct OperatorHandle {
    schema: Rc<OperatorSchema>,
}

impl OperatorHandle {
    pub fn schema(&self) -> &OperatorSchema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }
}

/// What the dispatcher should do after a kernel returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// The kernel consumed the arguments and pushed the returns.
    Complete,
    /// The kernel rewrote the arguments in place; dispatch them again from
    /// the top with a freshly computed key set.
    Resubmit,
}

/// A boxed kernel.
///
/// Receives the dispatcher, the operator, the keys ranked below the one that
/// selected it (for [`Dispatcher::redispatch_boxed`]), and the stack.
pub type BoxedKernel<T> = Rc<
    dyn Fn(&Dispatcher<T>, &OperatorHandle, DispatchKeySet, &mut Stack<T>) -> KernelResult,
>;

pub type KernelResult = Result<Continuation, DispatchError>;

struct OperatorEntry<T: Scalar> {
    handle: OperatorHandle,
    kernels: HashMap<DispatchKey, BoxedKernel<T>>,
}

/// Routes operator calls to kernels by the dispatch keys of their arguments.
///
/// For each key of the argument key set, highest priority first, an
/// operator-specific kernel wins over a fallback registered for the same key.
/// Keys with neither are skipped.
pub struct Dispatcher<T: Scalar> {
    operators: HashMap<String, OperatorEntry<T>>,
    fallbacks: HashMap<DispatchKey, BoxedKernel<T>>,
    local_include: Cell<DispatchKeySet>,
    local_exclude: Cell<DispatchKeySet>,
}

impl<T: Scalar> Default for Dispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> Dispatcher<T> {
    pub fn new() -> Self {
        Self {
            operators: HashMap::new(),
            fallbacks: HashMap::new(),
            local_include: Cell::new(DispatchKeySet::EMPTY),
            local_exclude: Cell::new(DispatchKeySet::EMPTY),
        }
    }

    /// Register an operator schema.
    ///
    /// Registering the same name twice with the same arity returns the
    /// existing handle.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::SchemaConflict` if the name exists with a
    /// different number of arguments or returns.
    pub fn register_schema(&mut self, schema: OperatorSchema) -> Result<OperatorHandle, DispatchError> {
        if let Some(entry) = self.operators.get(schema.name()) {
            let existing = entry.handle.schema();
            if existing.num_arguments() != schema.num_arguments()
                || existing.num_returns() != schema.num_returns()
            {
                return Err(DispatchError::SchemaConflict {
                    name: schema.name().to_string(),
                    existing: existing.num_arguments(),
                    requested: schema.num_arguments(),
                });
            }
            return Ok(entry.handle.clone());
        }

        let handle = OperatorHandle {
            schema: Rc::new(schema),
        };
        self.operators.insert(
            handle.name().to_string(),
            OperatorEntry {
                handle: handle.clone(),
                kernels: HashMap::new(),
            },
        );
        Ok(handle)
    }

    pub fn find_schema(&self, name: &str) -> Option<OperatorHandle> {
        self.operators.get(name).map(|entry| entry.handle.clone())
    }

    /// Register a kernel for one operator under one key, replacing any
    /// previous kernel there.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::UnknownOperator` if no schema is registered.
    pub fn register_kernel<F>(&mut self, op: &str, key: DispatchKey, kernel: F) -> Result<(), DispatchError>
    where
        F: Fn(&Dispatcher<T>, &OperatorHandle, DispatchKeySet, &mut Stack<T>) -> KernelResult
            + 'static,
    {
        let entry = self
            .operators
            .get_mut(op)
            .ok_or_else(|| DispatchError::UnknownOperator {
                name: op.to_string(),
            })?;
        if entry.kernels.insert(key, Rc::new(kernel)).is_some() {
            log::debug!("replaced kernel for `{op}` under {key:?}");
        }
        Ok(())
    }

    /// Register a kernel for every operator under one key.
    pub fn register_fallback<F>(&mut self, key: DispatchKey, kernel: F)
    where
        F: Fn(&Dispatcher<T>, &OperatorHandle, DispatchKeySet, &mut Stack<T>) -> KernelResult
            + 'static,
    {
        if self.fallbacks.insert(key, Rc::new(kernel)).is_some() {
            log::debug!("replaced fallback under {key:?}");
        }
    }

    pub fn has_kernel(&self, op: &str, key: DispatchKey) -> bool {
        self.operators
            .get(op)
            .is_some_and(|entry| entry.kernels.contains_key(&key))
    }

    pub fn has_fallback(&self, key: DispatchKey) -> bool {
        self.fallbacks.contains_key(&key)
    }

    /// Union of the key sets of all tensor arguments, adjusted by the local
    /// include and exclude sets.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::StackUnderflow` if the stack holds fewer
    /// entries than the operator takes.
    pub fn compute_dispatch_key_set(
        &self,
        op: &OperatorHandle,
        stack: &Stack<T>,
    ) -> Result<DispatchKeySet, DispatchError> {
        let num_arguments = op.schema().num_arguments();
        if stack.len() < num_arguments {
            return Err(DispatchError::StackUnderflow {
                op: op.name().to_string(),
                expected: num_arguments,
                actual: stack.len(),
            });
        }

        let mut keys = DispatchKeySet::EMPTY;
        for ivalue in &stack[stack.len() - num_arguments..] {
            match ivalue {
                IValue::Tensor(value) => keys = keys | value.key_set(),
                IValue::TensorList(values) => {
                    for value in values {
                        keys = keys | value.key_set();
                    }
                }
                _ => {}
            }
        }
        Ok((keys | self.local_include.get()).difference(self.local_exclude.get()))
    }

    /// Call an operator with its arguments on top of `stack`.
    ///
    /// Kernels that answer [`Continuation::Resubmit`] send the rewritten
    /// arguments back through a fresh dispatch. This loops here instead of
    /// recursing, so unwrapping many dead layers does not grow the call stack.
    pub fn call_boxed(&self, op: &OperatorHandle, stack: &mut Stack<T>) -> Result<(), DispatchError> {
        loop {
            let keys = self.compute_dispatch_key_set(op, stack)?;
            match self.redispatch_boxed(op, keys, stack)? {
                Continuation::Complete => return Ok(()),
                Continuation::Resubmit => log::trace!("resubmitting `{}`", op.name()),
            }
        }
    }

    /// Dispatch over an explicit key set, typically the keys below the
    /// calling kernel's own.
    pub fn redispatch_boxed(
        &self,
        op: &OperatorHandle,
        keys: DispatchKeySet,
        stack: &mut Stack<T>,
    ) -> KernelResult {
        let entry = self
            .operators
            .get(op.name())
            .ok_or_else(|| DispatchError::UnknownOperator {
                name: op.name().to_string(),
            })?;

        for key in keys.iter() {
            if let Some(kernel) = entry.kernels.get(&key).or_else(|| self.fallbacks.get(&key)) {
                return kernel(self, op, keys.below(key), stack);
            }
        }

        Err(DispatchError::NoKernel {
            op: op.name().to_string(),
            keys,
        })
    }

    /// Call an operator by name and return the stack afterwards.
    ///
    /// # Example
    ///
    /// ```
    /// use ndwrap::dispatch::{Dispatcher, IValue};
    /// use ndwrap::ops::register_backend_kernels;
    /// use ndwrap::{Tensor, Value};
    ///
    /// let mut dispatcher: Dispatcher<f64> = Dispatcher::new();
    /// register_backend_kernels(&mut dispatcher).unwrap();
    ///
    /// let a: Value<f64> = Tensor::ones(&[2]).into();
    /// let out = dispatcher.call("add", vec![a.clone().into(), a.into()]).unwrap();
    /// let sum = out[0].as_tensor().unwrap().as_tensor().unwrap();
    /// assert_eq!(sum.to_vec(), vec![2.0, 2.0]);
    /// ```
    pub fn call(&self, name: &str, args: Vec<IValue<T>>) -> Result<Stack<T>, DispatchError> {
        let op = self
            .find_schema(name)
            .ok_or_else(|| DispatchError::UnknownOperator {
                name: name.to_string(),
            })?;
        let mut stack = args;
        self.call_boxed(&op, &mut stack)?;
        Ok(stack)
    }

    /// Add `key` to every dispatch until the guard drops.
    pub fn include_key(&self, key: DispatchKey) -> LocalKeyGuard<'_> {
        LocalKeyGuard::set(&self.local_include, self.local_include.get().add(key))
    }

    /// Remove `key` from every dispatch until the guard drops.
    pub fn exclude_key(&self, key: DispatchKey) -> LocalKeyGuard<'_> {
        LocalKeyGuard::set(&self.local_exclude, self.local_exclude.get().add(key))
    }
}

impl<T: Scalar> fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut operators: Vec<&str> = self.operators.keys().map(String::as_str).collect();
        operators.sort_unstable();
        let fallbacks: DispatchKeySet = self.fallbacks.keys().copied().collect();
        f.debug_struct("Dispatcher")
            .field("operators", &operators)
            .field("fallbacks", &fallbacks)
            .field("local_include", &self.local_include.get())
            .field("local_exclude", &self.local_exclude.get())
            .finish()
    }
}

/// Restores a local key set when dropped.
#[must_use = "the key set is restored as soon as the guard drops"]
pub struct LocalKeyGuard<'a> {
    cell: &'a Cell<DispatchKeySet>,
    previous: DispatchKeySet,
}

impl<'a> LocalKeyGuard<'a> {
    fn set(cell: &'a Cell<DispatchKeySet>, keys: DispatchKeySet) -> Self {
        let previous = cell.replace(keys);
        Self { cell, previous }
    }
}

impl Drop for LocalKeyGuard<'_> {
    fn drop(&mut self) {
        self.cell.set(self.previous);
    }
}
