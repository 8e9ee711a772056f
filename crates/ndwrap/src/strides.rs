//! Stride computation utilities.
//!
//! Uses column-major (Fortran) order throughout, matching faer.

/// Compute column-major strides from shape.
///
/// For shape [d0, d1, d2, ...], returns strides [1, d0, d0*d1, ...].
///
/// # Examples
///
/// ```
/// use ndwrap::strides::compute_strides;
///
/// assert_eq!(compute_strides(&[3, 4, 5]), vec![1, 3, 12]);
/// assert_eq!(compute_strides(&[2, 3]), vec![1, 2]);
/// assert_eq!(compute_strides(&[]), vec![]);
/// ```
pub fn compute_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = Vec::with_capacity(shape.len());
    let mut stride = 1;

    for &dim in shape.iter() {
        strides.push(stride);
        stride *= dim;
    }

    strides
}

/// Number of elements described by a shape. The empty shape is a scalar.
#[inline]
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Whether `strides` lay out `shape` densely in column-major order.
///
/// Size-1 dimensions may carry any stride. Tensors with no elements are
/// trivially contiguous.
pub fn is_contiguous(shape: &[usize], strides: &[usize]) -> bool {
    if numel(shape) == 0 {
        return true;
    }

    let mut expected = 1;
    for (&dim, &stride) in shape.iter().zip(strides.iter()) {
        if dim == 1 {
            continue;
        }
        if stride != expected {
            return false;
        }
        expected *= dim;
    }
    true
}

/// Convert cartesian indices to linear index using the given strides.
#[inline]
pub fn cartesian_to_linear(indices: &[usize], strides: &[usize]) -> usize {
    indices
        .iter()
        .zip(strides.iter())
        .map(|(&idx, &stride)| idx * stride)
        .sum()
}

/// Convert linear index to cartesian indices using column-major order.
pub fn linear_to_cartesian(mut linear: usize, shape: &[usize]) -> Vec<usize> {
    let mut indices = Vec::with_capacity(shape.len());

    for &dim in shape.iter() {
        indices.push(linear % dim);
        linear /= dim;
    }

    indices
}
