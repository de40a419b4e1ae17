//! Command stream, timing events, and kernel launch.
//!
//! All three wrap raw runtime handles with exclusive ownership and
//! exactly-once release. Operations submitted to one stream execute in
//! submission order on the device, asynchronously with respect to the
//! calling thread; the runtime reports launch and memory errors lazily, so
//! an error from operation N may only be observed at the next synchronize.

use std::ffi::{c_uint, c_void};
use std::time::Duration;

use crate::error::Result;
use crate::hip::memory::{DeviceBuffer, Function};
use crate::hip::runtime::{
    check, hip_lib, HipEvent, HipStream, HIP_MEMCPY_DEVICE_TO_DEVICE, HIP_STREAM_DEFAULT,
    HIP_STREAM_NON_BLOCKING,
};

/// Stream creation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamFlags {
    #[default]
    Default,
    /// Does not implicitly synchronize with the null stream.
    NonBlocking,
}

impl StreamFlags {
    fn bits(self) -> c_uint {
        match self {
            Self::Default => HIP_STREAM_DEFAULT,
            Self::NonBlocking => HIP_STREAM_NON_BLOCKING,
        }
    }
}

/// Kernel launch geometry.
#[derive(Debug, Clone, Copy)]
pub struct LaunchConfig {
    pub grid: (u32, u32, u32),
    pub block: (u32, u32, u32),
    pub shared_mem_bytes: u32,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            grid: (1, 1, 1),
            block: (1, 1, 1),
            shared_mem_bytes: 0,
        }
    }
}

/// An ordered asynchronous operation queue bound to one device.
///
/// Move-only; the underlying handle is destroyed exactly once when the
/// stream is dropped.
pub struct Stream {
    handle: HipStream,
}

impl Stream {
    /// Called through [`Device::create_stream`](crate::Device::create_stream),
    /// which makes the owning device active first.
    pub(crate) fn create(flags: StreamFlags) -> Result<Stream> {
        let lib = hip_lib()?;
        let mut handle: HipStream = std::ptr::null_mut();
        check(
            unsafe { (lib.hip_stream_create_with_flags)(&mut handle, flags.bits()) },
            "hipStreamCreateWithFlags",
        )?;
        Ok(Stream { handle })
    }

    /// Enqueues a fill of `dst` with `value`.
    pub fn memset_async<T>(&self, dst: &mut DeviceBuffer<T>, value: u8) -> Result<()> {
        let lib = hip_lib()?;
        check(
            unsafe {
                (lib.hip_memset_async)(dst.as_mut_ptr(), value as i32, dst.byte_len(), self.handle)
            },
            "hipMemsetAsync",
        )
    }

    /// Enqueues a device-to-device copy of `src` into `dst`.
    ///
    /// # Panics
    ///
    /// Panics if the buffers differ in length.
    pub fn memcpy_d2d_async<T>(
        &self,
        dst: &mut DeviceBuffer<T>,
        src: &DeviceBuffer<T>,
    ) -> Result<()> {
        assert_eq!(dst.len(), src.len(), "copy between differently sized buffers");
        let lib = hip_lib()?;
        check(
            unsafe {
                (lib.hip_memcpy_async)(
                    dst.as_mut_ptr(),
                    src.as_ptr(),
                    src.byte_len(),
                    HIP_MEMCPY_DEVICE_TO_DEVICE,
                    self.handle,
                )
            },
            "hipMemcpyAsync",
        )
    }

    /// Records `event` at the current point in this stream's order.
    pub fn record(&self, event: &Event) -> Result<()> {
        let lib = hip_lib()?;
        check(
            unsafe { (lib.hip_event_record)(event.handle, self.handle) },
            "hipEventRecord",
        )
    }

    /// Enqueues a kernel launch, then checks for an immediate launch error.
    ///
    /// # Safety
    ///
    /// `args` must match the kernel's parameter list: one pointer per
    /// parameter, each pointing at a live value of the parameter's exact
    /// type, valid until the launch completes.
    pub unsafe fn launch(
        &self,
        function: &Function<'_>,
        config: LaunchConfig,
        args: &mut [*mut c_void],
    ) -> Result<()> {
        let lib = hip_lib()?;
        check(
            (lib.hip_module_launch_kernel)(
                function.raw(),
                config.grid.0,
                config.grid.1,
                config.grid.2,
                config.block.0,
                config.block.1,
                config.block.2,
                config.shared_mem_bytes,
                self.handle,
                args.as_mut_ptr(),
                std::ptr::null_mut(),
            ),
            "hipModuleLaunchKernel",
        )?;
        check((lib.hip_get_last_error)(), "hipGetLastError")
    }

    /// Blocks until all previously submitted operations complete.
    ///
    /// The only operation on the stream that surfaces deferred
    /// asynchronous errors.
    pub fn synchronize(&self) -> Result<()> {
        let lib = hip_lib()?;
        check(
            unsafe { (lib.hip_stream_synchronize)(self.handle) },
            "hipStreamSynchronize",
        )
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if self.handle.is_null() {
            return;
        }
        if let Ok(lib) = hip_lib() {
            unsafe {
                let _ = (lib.hip_stream_destroy)(self.handle);
            }
        }
    }
}

/// A marker recorded at a specific point in a stream's instruction order.
///
/// Pairs of events yield an elapsed GPU-side duration. Move-only; created
/// and destroyed exactly once.
pub struct Event {
    handle: HipEvent,
}

impl Event {
    pub fn new() -> Result<Event> {
        let lib = hip_lib()?;
        let mut handle: HipEvent = std::ptr::null_mut();
        check(unsafe { (lib.hip_event_create)(&mut handle) }, "hipEventCreate")?;
        Ok(Event { handle })
    }

    /// GPU time between two recorded events.
    ///
    /// Valid only once the recording stream has reached or passed the
    /// `stop` record point; synchronize first. The runtime resolves the
    /// pair with sub-microsecond granularity and reports milliseconds.
    pub fn elapsed(start: &Event, stop: &Event) -> Result<Duration> {
        let lib = hip_lib()?;
        let mut millis = 0f32;
        check(
            unsafe { (lib.hip_event_elapsed_time)(&mut millis, start.handle, stop.handle) },
            "hipEventElapsedTime",
        )?;
        Ok(Duration::from_secs_f64(millis as f64 / 1e3))
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        if self.handle.is_null() {
            return;
        }
        if let Ok(lib) = hip_lib() {
            unsafe {
                let _ = (lib.hip_event_destroy)(self.handle);
            }
        }
    }
}
