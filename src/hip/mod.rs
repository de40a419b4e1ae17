//! HIP runtime primitives: device handle, stream, timing events, owned
//! device memory.
//!
//! The runtime library is loaded dynamically (see [`runtime`]); everything
//! here compiles and links on machines without a ROCm driver.

pub mod device;
pub mod memory;
pub mod runtime;
pub mod stream;

pub use device::{Device, DeviceProperties};
pub use memory::{DeviceBuffer, Function, Module};
pub use runtime::is_hip_available;
pub use stream::{Event, LaunchConfig, Stream, StreamFlags};
