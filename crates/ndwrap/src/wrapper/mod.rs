//! TensorWrapper and its dispatch support.
//!
//! A transformation layer wraps the values it sees in [`TensorWrapper`]s
//! tagged with its level. Everything here is level-agnostic: building
//! wrappers, deciding which dispatch keys they carry, unwrapping them once
//! their layer has exited, and rendering them for diagnostics.
//!
//! ```text
//! Wrapper[lvl=2, Wrapper[lvl=1, Tensor[3]]]
//!        │ layer 2 exits
//!        ▼
//! Wrapper[dead, Wrapper[lvl=1, Tensor[3]]]
//!        │ next dispatch: GradWrapper fallback unwraps, resubmits
//!        ▼
//! Wrapper[lvl=1, Tensor[3]]
//! ```

mod dump;
mod fallback;
mod keys;
mod life_handle;
mod tensor_wrapper;

pub use dump::dump_tensor;
pub use fallback::{copy_wrapper_tensor_, dead_tensor_wrapper_fallback, register_wrapper_kernels};
pub use keys::{
    AUTOGRAD_BACKEND_KEYS, KEYS_TO_PROPAGATE_TO_WRAPPER, keys_to_propagate_to_wrapper,
    wrapper_key_set,
};
pub use life_handle::LifeHandle;
pub use tensor_wrapper::{
    TensorWrapper, make_tensor_wrapper, make_tensor_wrapper_handle, maybe_get_tensor_wrapper,
};
