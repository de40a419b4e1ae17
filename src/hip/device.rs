//! Device handle and cached properties.

use std::ffi::c_char;
use std::mem::MaybeUninit;

use crate::error::Result;
use crate::family::{classify, FamilySet};
use crate::hip::memory::DeviceBuffer;
use crate::hip::runtime::{check, fixed_cstr_to_string, hip_lib};
use crate::hip::stream::{Stream, StreamFlags};
use crate::pci::PciAddress;

/// Largest on-device cache on any supported part: 256 MiB of Infinity
/// Cache on MI300X. HIP exposes no query for cache levels past L2, so the
/// flush buffer is sized to this ceiling.
const LARGEST_CACHE_FALLBACK: usize = 256 * 1024 * 1024;

/// Properties the harness reads repeatedly, captured once at construction.
#[derive(Debug, Clone)]
pub struct DeviceProperties {
    /// Marketing name, e.g. "AMD Instinct MI300X".
    pub name: String,
    /// Architecture codename, e.g. "gfx942" (may carry feature suffixes).
    pub gcn_arch_name: String,
    pub pci_address: PciAddress,
    /// Total device memory in bytes.
    pub total_memory: usize,
    /// Wavefront width in lanes.
    pub warp_size: u32,
    pub compute_units: u32,
    /// L2 cache size in bytes.
    pub l2_cache_size: usize,
    /// Peak engine clock in kHz.
    pub clock_rate_khz: u32,
}

/// One physical accelerator, identified to the HIP runtime by its ordinal.
pub struct Device {
    ordinal: i32,
    // Fetching the properties is relatively slow, so cache them here.
    properties: DeviceProperties,
}

impl Device {
    /// Number of devices visible to the HIP runtime.
    pub fn count() -> Result<i32> {
        let lib = hip_lib()?;
        let mut count = 0;
        check(
            unsafe { (lib.hip_get_device_count)(&mut count) },
            "hipGetDeviceCount",
        )?;
        Ok(count)
    }

    /// Opens the device at `ordinal` and caches its properties.
    pub fn new(ordinal: i32) -> Result<Device> {
        let lib = hip_lib()?;

        let mut prop = MaybeUninit::zeroed();
        check(
            unsafe { (lib.hip_get_device_properties)(prop.as_mut_ptr(), ordinal) },
            "hipGetDeviceProperties",
        )?;
        let prop = unsafe { prop.assume_init() };

        let mut pci_string = [0 as c_char; 64];
        check(
            unsafe {
                (lib.hip_device_get_pci_bus_id)(
                    pci_string.as_mut_ptr(),
                    pci_string.len() as i32 - 1,
                    ordinal,
                )
            },
            "hipDeviceGetPCIBusId",
        )?;
        let pci_address = fixed_cstr_to_string(&pci_string).parse()?;

        let properties = DeviceProperties {
            name: fixed_cstr_to_string(&prop.name),
            gcn_arch_name: fixed_cstr_to_string(&prop.gcn_arch_name),
            pci_address,
            total_memory: prop.total_global_mem,
            warp_size: prop.warp_size as u32,
            compute_units: prop.multi_processor_count as u32,
            l2_cache_size: prop.l2_cache_size as usize,
            clock_rate_khz: prop.clock_rate as u32,
        };

        Ok(Device {
            ordinal,
            properties,
        })
    }

    /// Device 0.
    pub fn default_device() -> Result<Device> {
        Device::new(0)
    }

    pub fn ordinal(&self) -> i32 {
        self.ordinal
    }

    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Generation of this device's reported codename.
    pub fn family(&self) -> FamilySet {
        classify(&self.properties.gcn_arch_name)
    }

    /// Routes subsequent runtime calls on this thread to this device.
    pub fn make_active(&self) -> Result<()> {
        let lib = hip_lib()?;
        check(unsafe { (lib.hip_set_device)(self.ordinal) }, "hipSetDevice")
    }

    /// Blocks until all outstanding work on this device completes.
    ///
    /// Also the point where errors from earlier asynchronous operations
    /// surface.
    pub fn sync(&self) -> Result<()> {
        self.make_active()?;
        let lib = hip_lib()?;
        check(
            unsafe { (lib.hip_device_synchronize)() },
            "hipDeviceSynchronize",
        )
    }

    /// Allocates `len` elements of device memory.
    pub fn alloc<T>(&self, len: usize) -> Result<DeviceBuffer<T>> {
        self.make_active()?;
        DeviceBuffer::alloc(len)
    }

    pub fn create_stream(&self, flags: StreamFlags) -> Result<Stream> {
        self.make_active()?;
        Stream::create(flags)
    }

    /// Size of the largest cache level, for sizing the flush buffer.
    pub fn largest_cache_size(&self) -> usize {
        self.properties.l2_cache_size.max(LARGEST_CACHE_FALLBACK)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("ordinal", &self.ordinal)
            .field("name", &self.properties.name)
            .field("pci_address", &self.properties.pci_address)
            .finish()
    }
}
