//! AMD SMI dynamic loading.
//!
//! Preferred management backend. Loads `libamd_smi.so` and flattens the
//! socket → processor hierarchy into one ordered device list; addresses
//! are reported as a packed BDF bitfield and unpacked into the structured
//! form for comparison.

use std::ffi::{c_char, c_int, c_uint, c_void, CStr};
use std::ptr;
use std::sync::OnceLock;

use libloading::Library;

use crate::error::{Error, Result};
use crate::pci::PciAddress;
use crate::telemetry::PerfLevel;

pub const BACKEND_NAME: &str = "amd-smi";

// AMD SMI type definitions
pub type AmdsmiStatus = c_int;
pub type AmdsmiSocketHandle = *mut c_void;
pub type AmdsmiProcessorHandle = *mut c_void;

pub const AMDSMI_STATUS_SUCCESS: AmdsmiStatus = 0;

/// `AMDSMI_INIT_AMD_GPUS`
const AMDSMI_INIT_AMD_GPUS: u64 = 1 << 1;

// amdsmi_bdf_t bitfield layout (64-bit):
// function:3 | device:5 | bus:8 | domain:48
fn unpack_bdf(bdf: u64) -> PciAddress {
    PciAddress {
        function: (bdf & 0x7) as u8,
        device: ((bdf >> 3) & 0x1f) as u8,
        bus: ((bdf >> 8) & 0xff) as u8,
        domain: ((bdf >> 16) & 0xffff) as u16,
    }
}

// Function pointer types
type AmdsmiInitFn = unsafe extern "C" fn(u64) -> AmdsmiStatus;
type AmdsmiShutDownFn = unsafe extern "C" fn() -> AmdsmiStatus;
type AmdsmiGetSocketHandlesFn =
    unsafe extern "C" fn(*mut u32, *mut AmdsmiSocketHandle) -> AmdsmiStatus;
type AmdsmiGetProcessorHandlesFn =
    unsafe extern "C" fn(AmdsmiSocketHandle, *mut u32, *mut AmdsmiProcessorHandle) -> AmdsmiStatus;
type AmdsmiGetGpuDeviceBdfFn = unsafe extern "C" fn(AmdsmiProcessorHandle, *mut u64) -> AmdsmiStatus;
type AmdsmiGetGpuPerfLevelFn =
    unsafe extern "C" fn(AmdsmiProcessorHandle, *mut c_uint) -> AmdsmiStatus;
type AmdsmiSetGpuPerfLevelFn = unsafe extern "C" fn(AmdsmiProcessorHandle, c_uint) -> AmdsmiStatus;
type AmdsmiStatusCodeToStringFn =
    unsafe extern "C" fn(AmdsmiStatus, *mut *const c_char) -> AmdsmiStatus;

/// AMD SMI library function table.
pub struct AmdSmiLib {
    #[allow(dead_code)]
    lib: Library,

    pub amdsmi_init: AmdsmiInitFn,
    pub amdsmi_shut_down: AmdsmiShutDownFn,
    pub amdsmi_get_socket_handles: AmdsmiGetSocketHandlesFn,
    pub amdsmi_get_processor_handles: AmdsmiGetProcessorHandlesFn,
    pub amdsmi_get_gpu_device_bdf: AmdsmiGetGpuDeviceBdfFn,
    pub amdsmi_get_gpu_perf_level: AmdsmiGetGpuPerfLevelFn,
    pub amdsmi_set_gpu_perf_level: AmdsmiSetGpuPerfLevelFn,
    pub amdsmi_status_code_to_string: AmdsmiStatusCodeToStringFn,
}

// Safety: function pointers from a library that lives for the whole
// process; immutable after initialization.
unsafe impl Send for AmdSmiLib {}
unsafe impl Sync for AmdSmiLib {}

macro_rules! load_symbol {
    ($lib:expr, $ty:ty, $name:literal) => {{
        let symbol = unsafe { $lib.get::<$ty>(concat!($name, "\0").as_bytes()) }
            .map_err(|e| format!("{}: {e}", $name))?;
        let func: $ty = *symbol;
        drop(symbol);
        func
    }};
}

impl AmdSmiLib {
    fn load() -> std::result::Result<Self, String> {
        let lib_names = [
            "libamd_smi.so",
            "libamd_smi.so.24",
            "/opt/rocm/lib/libamd_smi.so",
            "/opt/rocm/lib64/libamd_smi.so",
        ];

        let lib = lib_names
            .iter()
            .find_map(|name| unsafe { Library::new(name).ok() })
            .ok_or_else(|| "failed to load AMD SMI library (libamd_smi.so)".to_string())?;

        Ok(Self {
            amdsmi_init: load_symbol!(lib, AmdsmiInitFn, "amdsmi_init"),
            amdsmi_shut_down: load_symbol!(lib, AmdsmiShutDownFn, "amdsmi_shut_down"),
            amdsmi_get_socket_handles: load_symbol!(
                lib,
                AmdsmiGetSocketHandlesFn,
                "amdsmi_get_socket_handles"
            ),
            amdsmi_get_processor_handles: load_symbol!(
                lib,
                AmdsmiGetProcessorHandlesFn,
                "amdsmi_get_processor_handles"
            ),
            amdsmi_get_gpu_device_bdf: load_symbol!(
                lib,
                AmdsmiGetGpuDeviceBdfFn,
                "amdsmi_get_gpu_device_bdf"
            ),
            amdsmi_get_gpu_perf_level: load_symbol!(
                lib,
                AmdsmiGetGpuPerfLevelFn,
                "amdsmi_get_gpu_perf_level"
            ),
            amdsmi_set_gpu_perf_level: load_symbol!(
                lib,
                AmdsmiSetGpuPerfLevelFn,
                "amdsmi_set_gpu_perf_level"
            ),
            amdsmi_status_code_to_string: load_symbol!(
                lib,
                AmdsmiStatusCodeToStringFn,
                "amdsmi_status_code_to_string"
            ),
            lib,
        })
    }
}

static AMDSMI_LIB: OnceLock<std::result::Result<AmdSmiLib, String>> = OnceLock::new();

fn amdsmi_lib() -> Result<&'static AmdSmiLib> {
    AMDSMI_LIB
        .get_or_init(AmdSmiLib::load)
        .as_ref()
        .map_err(|reason| Error::Load {
            library: "libamd_smi.so",
            reason: reason.clone(),
        })
}

fn status_string(status: AmdsmiStatus) -> String {
    if let Ok(lib) = amdsmi_lib() {
        let mut ptr: *const c_char = ptr::null();
        let rc = unsafe { (lib.amdsmi_status_code_to_string)(status, &mut ptr) };
        if rc == AMDSMI_STATUS_SUCCESS && !ptr.is_null() {
            return unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        }
    }
    "unknown status".to_string()
}

fn check(status: AmdsmiStatus, context: &str) -> Result<()> {
    if status == AMDSMI_STATUS_SUCCESS {
        Ok(())
    } else {
        Err(Error::Telemetry {
            backend: BACKEND_NAME,
            code: status,
            msg: format!("{context}: {}", status_string(status)),
        })
    }
}

/// Live AMD SMI session with a flattened device list.
pub struct AmdSmi {
    processors: Vec<AmdsmiProcessorHandle>,
}

impl AmdSmi {
    /// Initializes the library for GPU processors and enumerates them.
    pub(crate) fn init() -> Result<AmdSmi> {
        let lib = amdsmi_lib()?;
        check(
            unsafe { (lib.amdsmi_init)(AMDSMI_INIT_AMD_GPUS) },
            "amdsmi_init",
        )?;

        match Self::enumerate(lib) {
            Ok(processors) => Ok(AmdSmi { processors }),
            Err(e) => {
                // Failed half-open; shutdown must still be paired with init.
                unsafe {
                    let _ = (lib.amdsmi_shut_down)();
                }
                Err(e)
            }
        }
    }

    fn enumerate(lib: &AmdSmiLib) -> Result<Vec<AmdsmiProcessorHandle>> {
        let mut socket_count = 0u32;
        check(
            unsafe { (lib.amdsmi_get_socket_handles)(&mut socket_count, ptr::null_mut()) },
            "amdsmi_get_socket_handles",
        )?;
        let mut sockets: Vec<AmdsmiSocketHandle> =
            vec![ptr::null_mut(); socket_count as usize];
        check(
            unsafe { (lib.amdsmi_get_socket_handles)(&mut socket_count, sockets.as_mut_ptr()) },
            "amdsmi_get_socket_handles",
        )?;

        let mut processors = Vec::new();
        for socket in sockets {
            let mut count = 0u32;
            check(
                unsafe { (lib.amdsmi_get_processor_handles)(socket, &mut count, ptr::null_mut()) },
                "amdsmi_get_processor_handles",
            )?;
            let offset = processors.len();
            processors.resize(offset + count as usize, ptr::null_mut());
            check(
                unsafe {
                    (lib.amdsmi_get_processor_handles)(
                        socket,
                        &mut count,
                        processors[offset..].as_mut_ptr(),
                    )
                },
                "amdsmi_get_processor_handles",
            )?;
        }
        Ok(processors)
    }

    pub(crate) fn shutdown(&self) -> Result<()> {
        let lib = amdsmi_lib()?;
        check(unsafe { (lib.amdsmi_shut_down)() }, "amdsmi_shut_down")
    }

    pub(crate) fn device_count(&self) -> usize {
        self.processors.len()
    }

    /// Structured bus address of the device at `index`.
    pub(crate) fn bus_address(&self, index: usize) -> Result<PciAddress> {
        let lib = amdsmi_lib()?;
        let mut bdf = 0u64;
        check(
            unsafe { (lib.amdsmi_get_gpu_device_bdf)(self.processors[index], &mut bdf) },
            "amdsmi_get_gpu_device_bdf",
        )?;
        Ok(unpack_bdf(bdf))
    }

    pub(crate) fn perf_level(&self, index: usize) -> Result<PerfLevel> {
        let lib = amdsmi_lib()?;
        let mut raw = 0u32;
        check(
            unsafe { (lib.amdsmi_get_gpu_perf_level)(self.processors[index], &mut raw) },
            "amdsmi_get_gpu_perf_level",
        )?;
        Ok(PerfLevel::from_raw(raw))
    }

    pub(crate) fn set_perf_level(&self, index: usize, level: PerfLevel) -> Result<()> {
        let lib = amdsmi_lib()?;
        check(
            unsafe { (lib.amdsmi_set_gpu_perf_level)(self.processors[index], level as u32) },
            "amdsmi_set_gpu_perf_level",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bdf_unpacking() {
        // function 1, device 0x1f, bus 0xc4, domain 0x0002
        let bdf: u64 = 1 | (0x1f << 3) | (0xc4 << 8) | (0x0002 << 16);
        assert_eq!(unpack_bdf(bdf), PciAddress::new(2, 0xc4, 0x1f, 1));
    }

    #[test]
    fn bdf_unpacking_zero() {
        assert_eq!(unpack_bdf(0), PciAddress::new(0, 0, 0, 0));
    }
}
