//! Owned device memory and kernel modules.

use std::ffi::{c_void, CString};
use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::hip::runtime::{check, hip_lib, HipFunction, HipModule};

/// Exclusively owned device memory of a fixed element count.
///
/// Move-only. The raw pointer is null if and only if the buffer has been
/// moved from; release happens exactly once, and a release failure is
/// swallowed rather than propagated out of drop.
pub struct DeviceBuffer<T> {
    ptr: *mut c_void,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T> DeviceBuffer<T> {
    /// Called through [`Device::alloc`](crate::Device::alloc), which makes
    /// the owning device active first.
    pub(crate) fn alloc(len: usize) -> Result<DeviceBuffer<T>> {
        let lib = hip_lib()?;
        let mut ptr: *mut c_void = std::ptr::null_mut();
        check(
            unsafe { (lib.hip_malloc)(&mut ptr, len * std::mem::size_of::<T>()) },
            "hipMalloc",
        )?;
        Ok(DeviceBuffer {
            ptr,
            len,
            _marker: PhantomData,
        })
    }

    pub fn as_ptr(&self) -> *const c_void {
        self.ptr
    }

    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        self.ptr
    }

    /// Element count.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size in bytes.
    pub fn byte_len(&self) -> usize {
        self.len * std::mem::size_of::<T>()
    }
}

impl<T> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        if let Ok(lib) = hip_lib() {
            unsafe {
                let _ = (lib.hip_free)(self.ptr);
            }
        }
    }
}

/// A loaded code object holding caller-supplied kernels.
///
/// Workloads that launch custom kernels load their compiled image here and
/// look entry points up by name.
pub struct Module {
    handle: HipModule,
}

impl Module {
    /// Loads a compiled code object image from memory.
    pub fn load_data(image: &[u8]) -> Result<Module> {
        let lib = hip_lib()?;
        let mut handle: HipModule = std::ptr::null_mut();
        check(
            unsafe { (lib.hip_module_load_data)(&mut handle, image.as_ptr().cast()) },
            "hipModuleLoadData",
        )?;
        Ok(Module { handle })
    }

    /// Looks up a kernel entry point by name.
    pub fn function(&self, name: &str) -> Result<Function<'_>> {
        let lib = hip_lib()?;
        let c_name = CString::new(name).map_err(|_| Error::Runtime {
            code: -1,
            msg: format!("kernel name '{name}' contains an interior NUL"),
        })?;
        let mut handle: HipFunction = std::ptr::null_mut();
        check(
            unsafe { (lib.hip_module_get_function)(&mut handle, self.handle, c_name.as_ptr()) },
            "hipModuleGetFunction",
        )?;
        Ok(Function {
            handle,
            _module: PhantomData,
        })
    }
}

impl Drop for Module {
    fn drop(&mut self) {
        if self.handle.is_null() {
            return;
        }
        if let Ok(lib) = hip_lib() {
            unsafe {
                let _ = (lib.hip_module_unload)(self.handle);
            }
        }
    }
}

/// A kernel entry point, valid while its module stays loaded.
pub struct Function<'m> {
    handle: HipFunction,
    _module: PhantomData<&'m Module>,
}

impl Function<'_> {
    pub(crate) fn raw(&self) -> HipFunction {
        self.handle
    }
}
