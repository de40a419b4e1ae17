//! hipbench: microbenchmark harness for AMD GPU kernels.
//!
//! Measures per-launch latency and throughput under reproducible
//! conditions (caches flushed, clocks pinned, device warm) and resolves
//! the identity of a physical GPU across the HIP runtime and the SMI
//! management libraries so deterministic performance levels can be held
//! for the duration of a run.
//!
//! All vendor libraries are loaded dynamically; the crate compiles and
//! links on machines without a ROCm stack.
//!
//! # Quick start
//!
//! ```ignore
//! use hipbench::{Device, Executor, DEFAULT_ITERATIONS, DEFAULT_WARMUPS};
//!
//! let device = Device::default_device()?;
//! let mut executor = Executor::new(device)?;
//! let mut buffer = executor.device().alloc::<u8>(64 << 20)?;
//! let stats = executor.bench(
//!     hipbench::workloads::fill(&mut buffer),
//!     DEFAULT_WARMUPS,
//!     DEFAULT_ITERATIONS,
//! )?;
//! println!("average launch: {:?}", stats.average);
//! ```

pub mod error;
pub mod executor;
pub mod family;
pub mod governor;
pub mod hip;
pub mod identity;
pub mod pci;
pub mod report;
pub mod stats;
pub mod telemetry;
pub mod workloads;

pub use error::{Error, Result};
pub use executor::{Executor, DEFAULT_ITERATIONS, DEFAULT_WARMUPS};
pub use family::{classify, Family, FamilySet, BUILT_FAMILY, TARGET_GFX};
pub use governor::{Governor, PINNED_LEVEL};
pub use hip::{
    is_hip_available, Device, DeviceBuffer, DeviceProperties, Event, Function, LaunchConfig,
    Module, Stream, StreamFlags,
};
pub use pci::PciAddress;
pub use report::{BenchReport, Size, Throughput};
pub use stats::{Sample, Stats};
pub use telemetry::{PerfLevel, Telemetry};
