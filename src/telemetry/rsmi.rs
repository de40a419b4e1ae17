//! ROCm SMI dynamic loading.
//!
//! Fallback management backend for stacks that ship `librocm_smi64.so`
//! without the newer AMD SMI library. Devices are plain indices and
//! addresses are reported in the packed integer form.

use std::ffi::{c_char, c_int, c_uint, CStr};
use std::ptr;
use std::sync::OnceLock;

use libloading::Library;

use crate::error::{Error, Result};
use crate::telemetry::PerfLevel;

pub const BACKEND_NAME: &str = "rocm-smi";

pub type RsmiStatus = c_int;

pub const RSMI_STATUS_SUCCESS: RsmiStatus = 0;

// Function pointer types
type RsmiInitFn = unsafe extern "C" fn(u64) -> RsmiStatus;
type RsmiShutDownFn = unsafe extern "C" fn() -> RsmiStatus;
type RsmiNumMonitorDevicesFn = unsafe extern "C" fn(*mut u32) -> RsmiStatus;
type RsmiDevPciIdGetFn = unsafe extern "C" fn(u32, *mut u64) -> RsmiStatus;
type RsmiDevPerfLevelGetFn = unsafe extern "C" fn(u32, *mut c_uint) -> RsmiStatus;
type RsmiDevPerfLevelSetFn = unsafe extern "C" fn(i32, c_uint) -> RsmiStatus;
type RsmiStatusStringFn = unsafe extern "C" fn(RsmiStatus, *mut *const c_char) -> RsmiStatus;

/// ROCm SMI library function table.
pub struct RsmiLib {
    #[allow(dead_code)]
    lib: Library,

    pub rsmi_init: RsmiInitFn,
    pub rsmi_shut_down: RsmiShutDownFn,
    pub rsmi_num_monitor_devices: RsmiNumMonitorDevicesFn,
    pub rsmi_dev_pci_id_get: RsmiDevPciIdGetFn,
    pub rsmi_dev_perf_level_get: RsmiDevPerfLevelGetFn,
    pub rsmi_dev_perf_level_set: RsmiDevPerfLevelSetFn,
    pub rsmi_status_string: RsmiStatusStringFn,
}

// Safety: function pointers from a library that lives for the whole
// process; immutable after initialization.
unsafe impl Send for RsmiLib {}
unsafe impl Sync for RsmiLib {}

macro_rules! load_symbol {
    ($lib:expr, $ty:ty, $name:literal) => {{
        let symbol = unsafe { $lib.get::<$ty>(concat!($name, "\0").as_bytes()) }
            .map_err(|e| format!("{}: {e}", $name))?;
        let func: $ty = *symbol;
        drop(symbol);
        func
    }};
}

impl RsmiLib {
    fn load() -> std::result::Result<Self, String> {
        let lib_names = [
            "librocm_smi64.so",
            "librocm_smi64.so.7",
            "librocm_smi64.so.6",
            "/opt/rocm/lib/librocm_smi64.so",
            "/opt/rocm/lib64/librocm_smi64.so",
        ];

        let lib = lib_names
            .iter()
            .find_map(|name| unsafe { Library::new(name).ok() })
            .ok_or_else(|| "failed to load ROCm SMI library (librocm_smi64.so)".to_string())?;

        Ok(Self {
            rsmi_init: load_symbol!(lib, RsmiInitFn, "rsmi_init"),
            rsmi_shut_down: load_symbol!(lib, RsmiShutDownFn, "rsmi_shut_down"),
            rsmi_num_monitor_devices: load_symbol!(
                lib,
                RsmiNumMonitorDevicesFn,
                "rsmi_num_monitor_devices"
            ),
            rsmi_dev_pci_id_get: load_symbol!(lib, RsmiDevPciIdGetFn, "rsmi_dev_pci_id_get"),
            rsmi_dev_perf_level_get: load_symbol!(
                lib,
                RsmiDevPerfLevelGetFn,
                "rsmi_dev_perf_level_get"
            ),
            rsmi_dev_perf_level_set: load_symbol!(
                lib,
                RsmiDevPerfLevelSetFn,
                "rsmi_dev_perf_level_set"
            ),
            rsmi_status_string: load_symbol!(lib, RsmiStatusStringFn, "rsmi_status_string"),
            lib,
        })
    }
}

static RSMI_LIB: OnceLock<std::result::Result<RsmiLib, String>> = OnceLock::new();

fn rsmi_lib() -> Result<&'static RsmiLib> {
    RSMI_LIB
        .get_or_init(RsmiLib::load)
        .as_ref()
        .map_err(|reason| Error::Load {
            library: "librocm_smi64.so",
            reason: reason.clone(),
        })
}

fn status_string(status: RsmiStatus) -> String {
    if let Ok(lib) = rsmi_lib() {
        let mut ptr: *const c_char = ptr::null();
        let rc = unsafe { (lib.rsmi_status_string)(status, &mut ptr) };
        if rc == RSMI_STATUS_SUCCESS && !ptr.is_null() {
            return unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        }
    }
    "unknown status".to_string()
}

fn check(status: RsmiStatus, context: &str) -> Result<()> {
    if status == RSMI_STATUS_SUCCESS {
        Ok(())
    } else {
        Err(Error::Telemetry {
            backend: BACKEND_NAME,
            code: status,
            msg: format!("{context}: {}", status_string(status)),
        })
    }
}

/// Live ROCm SMI session.
pub struct Rsmi {
    device_count: u32,
}

impl Rsmi {
    pub(crate) fn init() -> Result<Rsmi> {
        let lib = rsmi_lib()?;
        check(unsafe { (lib.rsmi_init)(0) }, "rsmi_init")?;

        let mut device_count = 0u32;
        match check(
            unsafe { (lib.rsmi_num_monitor_devices)(&mut device_count) },
            "rsmi_num_monitor_devices",
        ) {
            Ok(()) => Ok(Rsmi { device_count }),
            Err(e) => {
                // Failed half-open; shutdown must still be paired with init.
                unsafe {
                    let _ = (lib.rsmi_shut_down)();
                }
                Err(e)
            }
        }
    }

    pub(crate) fn shutdown(&self) -> Result<()> {
        let lib = rsmi_lib()?;
        check(unsafe { (lib.rsmi_shut_down)() }, "rsmi_shut_down")
    }

    pub(crate) fn device_count(&self) -> usize {
        self.device_count as usize
    }

    /// Packed PCI id of the device at `index`.
    pub(crate) fn pci_id(&self, index: usize) -> Result<u32> {
        let lib = rsmi_lib()?;
        let mut id = 0u64;
        check(
            unsafe { (lib.rsmi_dev_pci_id_get)(index as u32, &mut id) },
            "rsmi_dev_pci_id_get",
        )?;
        Ok(id as u32)
    }

    pub(crate) fn perf_level(&self, index: usize) -> Result<PerfLevel> {
        let lib = rsmi_lib()?;
        let mut raw = 0u32;
        check(
            unsafe { (lib.rsmi_dev_perf_level_get)(index as u32, &mut raw) },
            "rsmi_dev_perf_level_get",
        )?;
        Ok(PerfLevel::from_raw(raw))
    }

    pub(crate) fn set_perf_level(&self, index: usize, level: PerfLevel) -> Result<()> {
        let lib = rsmi_lib()?;
        check(
            unsafe { (lib.rsmi_dev_perf_level_set)(index as i32, level as u32) },
            "rsmi_dev_perf_level_set",
        )
    }
}
