//! Memory-subsystem workloads for the demo binary.
//!
//! Workloads are opaque callables from the executor's point of view: each
//! returns a closure that enqueues asynchronous work on the stream it is
//! handed and never synchronizes. Kernel-based probes plug in the same way
//! through [`Module`](crate::Module) and
//! [`Stream::launch`](crate::Stream::launch).

use crate::error::Result;
use crate::hip::{DeviceBuffer, Stream};

/// Byte pattern distinct from the flush fill, so a fill trial never
/// degenerates into rewriting identical lines.
const FILL_PATTERN: u8 = 0xa5;

/// Streams `buffer.byte_len()` bytes of stores through the memory
/// hierarchy.
pub fn fill(buffer: &mut DeviceBuffer<u8>) -> impl FnMut(&Stream) -> Result<()> + '_ {
    move |stream| stream.memset_async(buffer, FILL_PATTERN)
}

/// Streams a device-to-device copy: each launch reads `src` once and
/// writes `dst` once.
pub fn copy<'a>(
    dst: &'a mut DeviceBuffer<u8>,
    src: &'a DeviceBuffer<u8>,
) -> impl FnMut(&Stream) -> Result<()> + 'a {
    move |stream| stream.memcpy_d2d_async(dst, src)
}
