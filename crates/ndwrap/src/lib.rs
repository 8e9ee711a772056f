//! ndwrap - level-tagged tensor wrappers over a dispatch-key tensor runtime
//!
//! Function transformations (gradients, batching, ...) nest: each active
//! transformation is a *layer* with an integer level, and each layer wraps the
//! values it touches in a [`TensorWrapper`](wrapper::TensorWrapper) tagged
//! with that level. Wrappers outlive their layer; once the layer exits they
//! report no level and are transparently unwrapped the next time an operator
//! sees them.
//!
//! # Architecture
//!
//! ```text
//! layers      thread-local stack of (level, LifeHandle)
//!     ↓
//! wrapper     TensorWrapper, key propagation, dead-wrapper fallback, copy_
//!     ↓
//! dispatch    Dispatcher: key set → kernel or fallback → Complete/Resubmit
//!     ↓
//! ops         backend kernels under Cpu / Cuda / Xla
//!     ↓
//! tensor      strided Tensor over shared Storage
//! ```
//!
//! # Example
//!
//! ```
//! use ndwrap::dispatch::Dispatcher;
//! use ndwrap::layers::DynamicLayerGuard;
//! use ndwrap::ops::register_backend_kernels;
//! use ndwrap::wrapper::{make_tensor_wrapper, register_wrapper_kernels};
//! use ndwrap::{Tensor, Value, WrapperConfig};
//!
//! let mut dispatcher: Dispatcher<f64> = Dispatcher::new();
//! register_backend_kernels(&mut dispatcher).unwrap();
//! register_wrapper_kernels(&mut dispatcher, &WrapperConfig::default()).unwrap();
//!
//! let x: Value<f64> = Tensor::from_vec(vec![1.0, 2.0], &[2]).unwrap().into();
//! let wrapped = {
//!     let layer = DynamicLayerGuard::enter();
//!     make_tensor_wrapper(&x, layer.level())
//! };
//! assert_eq!(wrapped.to_string(), "Wrapper[dead, Tensor[2]]");
//!
//! // The dead wrapper is unwrapped on the way to the CPU kernel.
//! let out = dispatcher.call("neg", vec![wrapped.into()]).unwrap();
//! let neg = out[0].as_tensor().unwrap().as_tensor().unwrap();
//! assert_eq!(neg.to_vec(), vec![-1.0, -2.0]);
//! ```

pub mod batched;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod layers;
pub mod meta;
pub mod ops;
pub mod scalar;
pub mod storage;
pub mod strides;
pub mod tensor;
pub mod value;
pub mod wrapper;

pub use config::{MutationPolicy, WrapperConfig};
pub use dispatch::{Device, DispatchKey, DispatchKeySet};
pub use error::{DispatchError, TensorError};
pub use scalar::{Scalar, c64};
pub use tensor::Tensor;
pub use value::{TensorImpl, Value, ValueImpl};
