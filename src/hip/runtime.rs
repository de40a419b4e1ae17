//! HIP runtime dynamic loading.
//!
//! Loads `libamdhip64.so` at runtime and exposes the entry points the
//! harness needs as a function-pointer table. On machines without a ROCm
//! driver the crate still compiles; runtime operations fail with a load
//! error instead.
//!
//! Note on `hipGetDeviceProperties`: resolving the unversioned symbol name
//! from the shared object yields the legacy (pre-R0600) compatibility entry
//! point, so [`HipDeviceProp`] mirrors the HIP 5 struct layout up through
//! `gcnArchName` and absorbs everything after it in a reserved tail.

use std::ffi::{c_char, c_int, c_uint, c_void, CStr};
use std::sync::OnceLock;

use libloading::Library;

use crate::error::{Error, Result};

// HIP type definitions
pub type HipError = c_int;
pub type HipStream = *mut c_void;
pub type HipEvent = *mut c_void;
pub type HipModule = *mut c_void;
pub type HipFunction = *mut c_void;
pub type HipDeviceptr = *mut c_void;

pub const HIP_SUCCESS: HipError = 0;

/// `hipMemcpyDeviceToDevice`
pub const HIP_MEMCPY_DEVICE_TO_DEVICE: c_int = 3;

/// `hipStreamDefault`
pub const HIP_STREAM_DEFAULT: c_uint = 0x0;
/// `hipStreamNonBlocking`
pub const HIP_STREAM_NON_BLOCKING: c_uint = 0x1;

/// Legacy-ABI `hipDeviceProp_t`.
///
/// Field order matches the HIP 5 header up through `gcnArchName`; the
/// runtime writes later fields into `reserved`, which is sized well past
/// any shipped revision of the struct.
#[repr(C)]
pub struct HipDeviceProp {
    pub name: [c_char; 256],
    pub total_global_mem: usize,
    pub shared_mem_per_block: usize,
    pub regs_per_block: c_int,
    pub warp_size: c_int,
    pub max_threads_per_block: c_int,
    pub max_threads_dim: [c_int; 3],
    pub max_grid_size: [c_int; 3],
    pub clock_rate: c_int,
    pub memory_clock_rate: c_int,
    pub memory_bus_width: c_int,
    pub total_const_mem: usize,
    pub major: c_int,
    pub minor: c_int,
    pub multi_processor_count: c_int,
    pub l2_cache_size: c_int,
    pub max_threads_per_multiprocessor: c_int,
    pub compute_mode: c_int,
    pub clock_instruction_rate: c_int,
    pub arch: c_uint,
    pub concurrent_kernels: c_int,
    pub pci_domain_id: c_int,
    pub pci_bus_id: c_int,
    pub pci_device_id: c_int,
    pub max_shared_memory_per_multi_processor: usize,
    pub is_multi_gpu_board: c_int,
    pub can_map_host_memory: c_int,
    pub gcn_arch: c_int,
    pub gcn_arch_name: [c_char; 256],
    pub reserved: [u8; 1024],
}

// Function pointer types
type HipGetDeviceCountFn = unsafe extern "C" fn(*mut c_int) -> HipError;
type HipGetDevicePropertiesFn = unsafe extern "C" fn(*mut HipDeviceProp, c_int) -> HipError;
type HipDeviceGetPciBusIdFn = unsafe extern "C" fn(*mut c_char, c_int, c_int) -> HipError;
type HipSetDeviceFn = unsafe extern "C" fn(c_int) -> HipError;
type HipDeviceSynchronizeFn = unsafe extern "C" fn() -> HipError;

type HipMallocFn = unsafe extern "C" fn(*mut HipDeviceptr, usize) -> HipError;
type HipFreeFn = unsafe extern "C" fn(HipDeviceptr) -> HipError;
type HipMemsetAsyncFn = unsafe extern "C" fn(HipDeviceptr, c_int, usize, HipStream) -> HipError;
type HipMemcpyAsyncFn =
    unsafe extern "C" fn(HipDeviceptr, *const c_void, usize, c_int, HipStream) -> HipError;

type HipStreamCreateWithFlagsFn = unsafe extern "C" fn(*mut HipStream, c_uint) -> HipError;
type HipStreamDestroyFn = unsafe extern "C" fn(HipStream) -> HipError;
type HipStreamSynchronizeFn = unsafe extern "C" fn(HipStream) -> HipError;

type HipEventCreateFn = unsafe extern "C" fn(*mut HipEvent) -> HipError;
type HipEventDestroyFn = unsafe extern "C" fn(HipEvent) -> HipError;
type HipEventRecordFn = unsafe extern "C" fn(HipEvent, HipStream) -> HipError;
type HipEventElapsedTimeFn = unsafe extern "C" fn(*mut f32, HipEvent, HipEvent) -> HipError;

type HipModuleLoadDataFn = unsafe extern "C" fn(*mut HipModule, *const c_void) -> HipError;
type HipModuleGetFunctionFn =
    unsafe extern "C" fn(*mut HipFunction, HipModule, *const c_char) -> HipError;
type HipModuleUnloadFn = unsafe extern "C" fn(HipModule) -> HipError;
type HipModuleLaunchKernelFn = unsafe extern "C" fn(
    HipFunction,
    c_uint,
    c_uint,
    c_uint,
    c_uint,
    c_uint,
    c_uint,
    c_uint,
    HipStream,
    *mut *mut c_void,
    *mut *mut c_void,
) -> HipError;

type HipGetLastErrorFn = unsafe extern "C" fn() -> HipError;
type HipGetErrorStringFn = unsafe extern "C" fn(HipError) -> *const c_char;

/// HIP library function table.
pub struct HipLib {
    #[allow(dead_code)]
    lib: Library,

    // Device management
    pub hip_get_device_count: HipGetDeviceCountFn,
    pub hip_get_device_properties: HipGetDevicePropertiesFn,
    pub hip_device_get_pci_bus_id: HipDeviceGetPciBusIdFn,
    pub hip_set_device: HipSetDeviceFn,
    pub hip_device_synchronize: HipDeviceSynchronizeFn,

    // Memory management
    pub hip_malloc: HipMallocFn,
    pub hip_free: HipFreeFn,
    pub hip_memset_async: HipMemsetAsyncFn,
    pub hip_memcpy_async: HipMemcpyAsyncFn,

    // Stream management
    pub hip_stream_create_with_flags: HipStreamCreateWithFlagsFn,
    pub hip_stream_destroy: HipStreamDestroyFn,
    pub hip_stream_synchronize: HipStreamSynchronizeFn,

    // Event management
    pub hip_event_create: HipEventCreateFn,
    pub hip_event_destroy: HipEventDestroyFn,
    pub hip_event_record: HipEventRecordFn,
    pub hip_event_elapsed_time: HipEventElapsedTimeFn,

    // Module and kernel launch
    pub hip_module_load_data: HipModuleLoadDataFn,
    pub hip_module_get_function: HipModuleGetFunctionFn,
    pub hip_module_unload: HipModuleUnloadFn,
    pub hip_module_launch_kernel: HipModuleLaunchKernelFn,

    // Error handling
    pub hip_get_last_error: HipGetLastErrorFn,
    pub hip_get_error_string: HipGetErrorStringFn,
}

// Safety: HipLib contains function pointers from a loaded library.
// The library is loaded once and lives for the entire program lifetime.
// Function pointers are thread-safe as they're immutable after initialization.
unsafe impl Send for HipLib {}
unsafe impl Sync for HipLib {}

macro_rules! load_symbol {
    ($lib:expr, $ty:ty, $name:literal) => {{
        let symbol = unsafe { $lib.get::<$ty>(concat!($name, "\0").as_bytes()) }
            .map_err(|e| format!("{}: {e}", $name))?;
        let func: $ty = *symbol;
        drop(symbol);
        func
    }};
}

impl HipLib {
    /// Try to load the HIP library.
    fn load() -> std::result::Result<Self, String> {
        // Try common library paths for ROCm
        let lib_names = [
            "libamdhip64.so",
            "libamdhip64.so.6",
            "libamdhip64.so.5",
            "/opt/rocm/lib/libamdhip64.so",
            "/opt/rocm/lib64/libamdhip64.so",
        ];

        let lib = lib_names
            .iter()
            .find_map(|name| unsafe { Library::new(name).ok() })
            .ok_or_else(|| "failed to load HIP library (libamdhip64.so)".to_string())?;

        Ok(Self {
            hip_get_device_count: load_symbol!(lib, HipGetDeviceCountFn, "hipGetDeviceCount"),
            hip_get_device_properties: load_symbol!(
                lib,
                HipGetDevicePropertiesFn,
                "hipGetDeviceProperties"
            ),
            hip_device_get_pci_bus_id: load_symbol!(
                lib,
                HipDeviceGetPciBusIdFn,
                "hipDeviceGetPCIBusId"
            ),
            hip_set_device: load_symbol!(lib, HipSetDeviceFn, "hipSetDevice"),
            hip_device_synchronize: load_symbol!(
                lib,
                HipDeviceSynchronizeFn,
                "hipDeviceSynchronize"
            ),
            hip_malloc: load_symbol!(lib, HipMallocFn, "hipMalloc"),
            hip_free: load_symbol!(lib, HipFreeFn, "hipFree"),
            hip_memset_async: load_symbol!(lib, HipMemsetAsyncFn, "hipMemsetAsync"),
            hip_memcpy_async: load_symbol!(lib, HipMemcpyAsyncFn, "hipMemcpyAsync"),
            hip_stream_create_with_flags: load_symbol!(
                lib,
                HipStreamCreateWithFlagsFn,
                "hipStreamCreateWithFlags"
            ),
            hip_stream_destroy: load_symbol!(lib, HipStreamDestroyFn, "hipStreamDestroy"),
            hip_stream_synchronize: load_symbol!(
                lib,
                HipStreamSynchronizeFn,
                "hipStreamSynchronize"
            ),
            hip_event_create: load_symbol!(lib, HipEventCreateFn, "hipEventCreate"),
            hip_event_destroy: load_symbol!(lib, HipEventDestroyFn, "hipEventDestroy"),
            hip_event_record: load_symbol!(lib, HipEventRecordFn, "hipEventRecord"),
            hip_event_elapsed_time: load_symbol!(
                lib,
                HipEventElapsedTimeFn,
                "hipEventElapsedTime"
            ),
            hip_module_load_data: load_symbol!(lib, HipModuleLoadDataFn, "hipModuleLoadData"),
            hip_module_get_function: load_symbol!(
                lib,
                HipModuleGetFunctionFn,
                "hipModuleGetFunction"
            ),
            hip_module_unload: load_symbol!(lib, HipModuleUnloadFn, "hipModuleUnload"),
            hip_module_launch_kernel: load_symbol!(
                lib,
                HipModuleLaunchKernelFn,
                "hipModuleLaunchKernel"
            ),
            hip_get_last_error: load_symbol!(lib, HipGetLastErrorFn, "hipGetLastError"),
            hip_get_error_string: load_symbol!(lib, HipGetErrorStringFn, "hipGetErrorString"),
            lib,
        })
    }
}

/// Global HIP library instance.
static HIP_LIB: OnceLock<std::result::Result<HipLib, String>> = OnceLock::new();

/// Get the global HIP library instance.
pub fn hip_lib() -> Result<&'static HipLib> {
    HIP_LIB
        .get_or_init(HipLib::load)
        .as_ref()
        .map_err(|reason| Error::Load {
            library: "libamdhip64.so",
            reason: reason.clone(),
        })
}

/// Check if the HIP runtime is available on this system.
pub fn is_hip_available() -> bool {
    hip_lib().is_ok()
}

/// Get error string from a HIP error code.
pub fn error_string(error: HipError) -> String {
    if let Ok(lib) = hip_lib() {
        unsafe {
            let ptr = (lib.hip_get_error_string)(error);
            if ptr.is_null() {
                "unknown error".to_string()
            } else {
                CStr::from_ptr(ptr).to_string_lossy().into_owned()
            }
        }
    } else {
        format!("HIP error code {error}")
    }
}

/// Map a HIP status to `Ok` or a contextualized runtime error.
pub(crate) fn check(status: HipError, context: &str) -> Result<()> {
    if status == HIP_SUCCESS {
        Ok(())
    } else {
        Err(Error::Runtime {
            code: status,
            msg: format!("{context}: {}", error_string(status)),
        })
    }
}

/// Read a NUL-terminated C string out of a fixed-size field.
pub(crate) fn fixed_cstr_to_string(field: &[c_char]) -> String {
    let bytes: Vec<u8> = field
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}
