//! C API for ndwrap
//!
//! Exposes `f64` values, the layer stack and wrapper construction to C,
//! Julia, Python and other languages.
//!
//! All extern "C" functions are inherently unsafe as they work with raw pointers
//! from foreign code. Panics never cross the boundary: they are caught and
//! reported as `NDW_INVARIANT_VIOLATION`.
//!
//! Values and layers are thread-affine. A value must be used and released on
//! the thread that created it.

#![allow(clippy::not_unsafe_ptr_arg_deref)]

use libc::{c_char, c_double, c_int, c_long, size_t};
use ndwrap::layers::{Level, pop_dynamic_layer, push_dynamic_layer};
use ndwrap::wrapper::{make_tensor_wrapper, maybe_get_tensor_wrapper};
use ndwrap::{Tensor, Value};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;

// Status codes
pub type StatusCode = c_int;

pub const NDW_SUCCESS: StatusCode = 0;
pub const NDW_INVALID_ARGUMENT: StatusCode = -1;
pub const NDW_SHAPE_MISMATCH: StatusCode = -2;
pub const NDW_INVARIANT_VIOLATION: StatusCode = -3;

/// Opaque handle to a `Value<f64>`: a plain tensor or a wrapper.
#[repr(C)]
pub struct ndw_value_f64 {
    _private: *mut std::ffi::c_void,
}

impl ndw_value_f64 {
    fn from_value(value: Value<f64>) -> Self {
        let boxed = Box::new(value);
        Self {
            _private: Box::into_raw(boxed) as *mut std::ffi::c_void,
        }
    }

    fn inner(&self) -> &Value<f64> {
        unsafe { &*(self._private as *const Value<f64>) }
    }

    fn into_raw(value: Value<f64>) -> *mut ndw_value_f64 {
        Box::into_raw(Box::new(Self::from_value(value)))
    }
}

impl Drop for ndw_value_f64 {
    fn drop(&mut self) {
        if !self._private.is_null() {
            unsafe {
                let _ = Box::from_raw(self._private as *mut Value<f64>);
            }
        }
    }
}

unsafe fn shape_slice<'a>(shape: *const size_t, ndim: size_t) -> &'a [usize] {
    if ndim == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(shape, ndim) }
    }
}

/// Store the outcome of a value-returning call in `status`.
fn finish(
    result: std::thread::Result<(*mut ndw_value_f64, StatusCode)>,
    status: *mut StatusCode,
) -> *mut ndw_value_f64 {
    let (ptr, code) = result.unwrap_or((ptr::null_mut(), NDW_INVARIANT_VIOLATION));
    unsafe {
        *status = code;
    }
    ptr
}

// ============================================================================
// Tensor creation
// ============================================================================

/// Create a plain tensor filled with zeros.
///
/// # Arguments
/// * `shape` - Pointer to array of dimensions
/// * `ndim` - Number of dimensions
/// * `status` - Pointer to receive status code
///
/// # Returns
/// Pointer to new value, or null on error
#[unsafe(no_mangle)]
pub extern "C" fn ndw_tensor_f64_zeros(
    shape: *const size_t,
    ndim: size_t,
    status: *mut StatusCode,
) -> *mut ndw_value_f64 {
    if status.is_null() {
        return ptr::null_mut();
    }

    if shape.is_null() && ndim > 0 {
        unsafe {
            *status = NDW_INVALID_ARGUMENT;
        }
        return ptr::null_mut();
    }

    let result = catch_unwind(|| {
        let shape = unsafe { shape_slice(shape, ndim) };
        let value: Value<f64> = Tensor::zeros(shape).into();
        (ndw_value_f64::into_raw(value), NDW_SUCCESS)
    });
    finish(result, status)
}

/// Create a plain tensor from column-major data.
///
/// # Returns
/// Pointer to new value, or null with `NDW_SHAPE_MISMATCH` if `len` does not
/// match the shape
#[unsafe(no_mangle)]
pub extern "C" fn ndw_tensor_f64_from_data(
    data: *const c_double,
    len: size_t,
    shape: *const size_t,
    ndim: size_t,
    status: *mut StatusCode,
) -> *mut ndw_value_f64 {
    if status.is_null() {
        return ptr::null_mut();
    }

    if data.is_null() || (shape.is_null() && ndim > 0) {
        unsafe {
            *status = NDW_INVALID_ARGUMENT;
        }
        return ptr::null_mut();
    }

    let result = catch_unwind(|| {
        let data = unsafe { std::slice::from_raw_parts(data, len) };
        let shape = unsafe { shape_slice(shape, ndim) };

        match Tensor::<f64>::from_vec(data.to_vec(), shape) {
            Ok(tensor) => (ndw_value_f64::into_raw(tensor.into()), NDW_SUCCESS),
            Err(_) => (ptr::null_mut(), NDW_SHAPE_MISMATCH),
        }
    });
    finish(result, status)
}

/// Release a value handle. Other handles to the same value stay valid.
#[unsafe(no_mangle)]
pub extern "C" fn ndw_value_f64_release(value: *mut ndw_value_f64) {
    if !value.is_null() {
        unsafe {
            let _ = Box::from_raw(value);
        }
    }
}

// ============================================================================
// Layers and wrappers
// ============================================================================

/// Enter a new transformation layer on the calling thread.
///
/// # Returns
/// The level of the new layer
#[unsafe(no_mangle)]
pub extern "C" fn ndw_layer_push() -> c_long {
    push_dynamic_layer() as c_long
}

/// Exit the innermost layer. Wrappers created at its level become dead.
///
/// # Returns
/// `NDW_INVALID_ARGUMENT` if no layer is active
#[unsafe(no_mangle)]
pub extern "C" fn ndw_layer_pop() -> StatusCode {
    match pop_dynamic_layer() {
        Some(_) => NDW_SUCCESS,
        None => NDW_INVALID_ARGUMENT,
    }
}

/// Wrap `value` at the active layer `level`.
///
/// # Returns
/// New wrapper, or null with `NDW_INVARIANT_VIOLATION` if `level` is not
/// active or `value` is a live wrapper at `level` or above
#[unsafe(no_mangle)]
pub extern "C" fn ndw_wrap_f64(
    value: *const ndw_value_f64,
    level: c_long,
    status: *mut StatusCode,
) -> *mut ndw_value_f64 {
    if status.is_null() {
        return ptr::null_mut();
    }

    if value.is_null() {
        unsafe {
            *status = NDW_INVALID_ARGUMENT;
        }
        return ptr::null_mut();
    }

    let result = catch_unwind(AssertUnwindSafe(|| {
        let inner = unsafe { (*value).inner() };
        let wrapped = make_tensor_wrapper(inner, level as Level);
        (ndw_value_f64::into_raw(wrapped), NDW_SUCCESS)
    }));
    finish(result, status)
}

// ============================================================================
// Queries
// ============================================================================

/// 1 if `value` is a wrapper whose layer is still active, 0 otherwise.
#[unsafe(no_mangle)]
pub extern "C" fn ndw_value_f64_is_alive(value: *const ndw_value_f64) -> c_int {
    if value.is_null() {
        return 0;
    }

    let result = catch_unwind(AssertUnwindSafe(|| unsafe {
        maybe_get_tensor_wrapper((*value).inner()).is_some_and(|w| w.is_alive())
    }));

    c_int::from(result.unwrap_or(false))
}

/// Level of a live wrapper.
///
/// # Returns
/// `NDW_INVALID_ARGUMENT` if `value` is not a wrapper or its layer has
/// exited; `out` is left untouched then
#[unsafe(no_mangle)]
pub extern "C" fn ndw_value_f64_level(
    value: *const ndw_value_f64,
    out: *mut c_long,
) -> StatusCode {
    if value.is_null() || out.is_null() {
        return NDW_INVALID_ARGUMENT;
    }

    let result = catch_unwind(AssertUnwindSafe(|| unsafe {
        match maybe_get_tensor_wrapper((*value).inner()).and_then(|w| w.level()) {
            Some(level) => {
                *out = level as c_long;
                NDW_SUCCESS
            }
            None => NDW_INVALID_ARGUMENT,
        }
    }));

    result.unwrap_or(NDW_INVARIANT_VIOLATION)
}

/// Get the number of dimensions.
#[unsafe(no_mangle)]
pub extern "C" fn ndw_value_f64_ndim(value: *const ndw_value_f64) -> size_t {
    if value.is_null() {
        return 0;
    }

    let result = catch_unwind(AssertUnwindSafe(|| unsafe { (*value).inner().ndim() }));

    result.unwrap_or(0)
}

/// Get the shape.
///
/// # Arguments
/// * `value` - Value pointer
/// * `out` - Output array for shape (must have space for ndim elements)
#[unsafe(no_mangle)]
pub extern "C" fn ndw_value_f64_shape(
    value: *const ndw_value_f64,
    out: *mut size_t,
) -> StatusCode {
    if value.is_null() || out.is_null() {
        return NDW_INVALID_ARGUMENT;
    }

    let result = catch_unwind(AssertUnwindSafe(|| unsafe {
        for (i, &dim) in (*value).inner().sizes().iter().enumerate() {
            *out.add(i) = dim;
        }
        NDW_SUCCESS
    }));

    result.unwrap_or(NDW_INVARIANT_VIOLATION)
}

/// Render the wrapper nesting, e.g. `Wrapper[lvl=1, Tensor[2, 3]]`.
///
/// # Arguments
/// * `value` - Value pointer
/// * `buf` - Output buffer, NUL-terminated and truncated to `cap - 1` bytes
/// * `cap` - Capacity of `buf` in bytes; 0 only queries the length
/// * `len` - Receives the full length of the rendering, without the NUL
#[unsafe(no_mangle)]
pub extern "C" fn ndw_value_f64_dump(
    value: *const ndw_value_f64,
    buf: *mut c_char,
    cap: size_t,
    len: *mut size_t,
) -> StatusCode {
    if value.is_null() || len.is_null() || (buf.is_null() && cap > 0) {
        return NDW_INVALID_ARGUMENT;
    }

    let result = catch_unwind(AssertUnwindSafe(|| unsafe {
        let rendered = (*value).inner().to_string();
        *len = rendered.len();
        if cap > 0 {
            let n = rendered.len().min(cap - 1);
            ptr::copy_nonoverlapping(rendered.as_ptr(), buf.cast::<u8>(), n);
            *buf.add(n) = 0;
        }
        NDW_SUCCESS
    }));

    result.unwrap_or(NDW_INVARIANT_VIOLATION)
}
