//! Shared memory region access
//!
//! The link never creates its segment. [`RegionProvider::open_region`] opens
//! an existing named object and maps it; dropping the returned region unmaps
//! it and closes the OS handle.

use crate::{Result, SharedMemoryError};
use std::ptr::NonNull;
use tracing::debug;

/// A mapped block of memory that is released on drop
pub trait MappedRegion {
    /// Start of the mapping
    fn as_mut_ptr(&mut self) -> *mut u8;

    /// Mapped length in bytes
    fn size(&self) -> usize;
}

/// Opens named regions created by another process
pub trait RegionProvider {
    type Region: MappedRegion;

    /// Open `name` read/write and map its first `size` bytes.
    ///
    /// Fails if the object does not exist; it is never created.
    fn open_region(&self, name: &str, size: usize) -> Result<Self::Region>;
}

/// Region provider backed by the operating system's named shared memory
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRegions;

impl RegionProvider for SystemRegions {
    type Region = SharedMemoryRegion;

    fn open_region(&self, name: &str, size: usize) -> Result<SharedMemoryRegion> {
        SharedMemoryRegion::open(name, size)
    }
}

/// Shared memory region handle
#[derive(Debug)]
pub struct SharedMemoryRegion {
    /// Region name/identifier
    name: String,
    /// Mapped size in bytes
    size: usize,
    /// Memory pointer
    ptr: NonNull<u8>,
    /// Platform-specific handle
    platform_handle: PlatformHandle,
}

/// Platform-specific handle types
#[derive(Debug)]
enum PlatformHandle {
    #[cfg(unix)]
    Unix {
        #[allow(dead_code)]
        fd: std::os::fd::OwnedFd,
    },
    #[cfg(windows)]
    Windows { handle: winapi::um::winnt::HANDLE },
}

impl SharedMemoryRegion {
    /// Open an existing shared memory region and map `size` bytes of it
    pub fn open(name: impl Into<String>, size: usize) -> Result<Self> {
        let name = name.into();
        validate_region_name(&name)?;

        let (ptr, platform_handle) = open_platform_region(&name, size)?;
        debug!("Mapped {} bytes of shared memory region {}", size, name);

        Ok(Self {
            name,
            size,
            ptr,
            platform_handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get raw pointer to the memory
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }
}

impl MappedRegion for SharedMemoryRegion {
    fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.size
    }
}

impl Drop for SharedMemoryRegion {
    fn drop(&mut self) {
        cleanup_platform_region(self.ptr, self.size, &self.platform_handle);
        debug!("Released shared memory region {}", self.name);
    }
}

// Safety: the mapping is exclusively owned by this handle; moving it to
// another thread moves that ownership with it.
unsafe impl Send for SharedMemoryRegion {}

// Platform-specific implementations

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use nix::fcntl::OFlag;
    use nix::sys::mman::{mmap, munmap, shm_open, MapFlags, ProtFlags};
    use nix::sys::stat::{fstat, Mode};
    use std::ffi::CString;
    use std::num::NonZeroUsize;
    use std::os::fd::AsRawFd;

    pub(super) fn open_platform_region(name: &str, size: usize) -> Result<(NonNull<u8>, PlatformHandle)> {
        let c_name = CString::new(name)
            .map_err(|_| SharedMemoryError::InvalidName(name.to_string()))?;

        // Open only; the voice client owns creation
        let fd = shm_open(c_name.as_c_str(), OFlag::O_RDWR, Mode::S_IRUSR | Mode::S_IWUSR)
            .map_err(|e| SharedMemoryError::from_platform_error(e as i32, format!("shm_open {}", name)))?;

        let stat = fstat(fd.as_raw_fd())
            .map_err(|e| SharedMemoryError::from_platform_error(e as i32, "fstat failed"))?;

        let actual = usize::try_from(stat.st_size).unwrap_or(0);
        if actual < size {
            return Err(SharedMemoryError::RegionTooSmall { size: actual, required: size });
        }

        let length = NonZeroUsize::new(size)
            .ok_or_else(|| SharedMemoryError::MappingFailed("zero-length mapping".to_string()))?;

        let ptr = unsafe {
            mmap(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                Some(&fd),
                0,
            )
        }
        .map_err(|e| SharedMemoryError::MappingFailed(format!("mmap failed: {}", e)))?;

        let non_null_ptr = NonNull::new(ptr as *mut u8)
            .ok_or_else(|| SharedMemoryError::MappingFailed("mmap returned null".to_string()))?;

        Ok((non_null_ptr, PlatformHandle::Unix { fd }))
    }

    pub(super) fn cleanup_platform_region(ptr: NonNull<u8>, size: usize, _handle: &PlatformHandle) {
        // The fd closes when the handle drops
        let _ = unsafe { munmap(ptr.as_ptr() as *mut std::ffi::c_void, size) };
    }
}

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use winapi::um::handleapi::CloseHandle;
    use winapi::um::memoryapi::{MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, FILE_MAP_ALL_ACCESS};

    pub(super) fn open_platform_region(name: &str, size: usize) -> Result<(NonNull<u8>, PlatformHandle)> {
        let wide_name: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();

        let handle = unsafe { OpenFileMappingW(FILE_MAP_ALL_ACCESS, 0, wide_name.as_ptr()) };
        if handle.is_null() {
            let err = std::io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(code) => SharedMemoryError::from_platform_error(code, format!("OpenFileMappingW {}", name)),
                None => SharedMemoryError::RegionNotFound(name.to_string()),
            });
        }

        let ptr = unsafe { MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, size) };
        if ptr.is_null() {
            let err = std::io::Error::last_os_error();
            unsafe { CloseHandle(handle) };
            return Err(SharedMemoryError::MappingFailed(format!("MapViewOfFile failed: {}", err)));
        }

        let non_null_ptr = NonNull::new(ptr as *mut u8)
            .ok_or_else(|| SharedMemoryError::MappingFailed("MapViewOfFile returned null".to_string()))?;

        Ok((non_null_ptr, PlatformHandle::Windows { handle }))
    }

    pub(super) fn cleanup_platform_region(ptr: NonNull<u8>, _size: usize, handle: &PlatformHandle) {
        let PlatformHandle::Windows { handle } = handle;
        unsafe {
            UnmapViewOfFile(ptr.as_ptr() as _);
            CloseHandle(*handle);
        }
    }
}

#[cfg(not(any(unix, windows)))]
mod fallback_impl {
    use super::*;

    pub(super) fn open_platform_region(_name: &str, _size: usize) -> Result<(NonNull<u8>, PlatformHandle)> {
        Err(SharedMemoryError::Unsupported)
    }

    pub(super) fn cleanup_platform_region(_ptr: NonNull<u8>, _size: usize, handle: &PlatformHandle) {
        match *handle {}
    }
}

#[cfg(unix)]
use unix_impl::*;
#[cfg(windows)]
use windows_impl::*;
#[cfg(not(any(unix, windows)))]
use fallback_impl::*;

/// Validate region name
fn validate_region_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 255 {
        return Err(SharedMemoryError::InvalidName(format!(
            "length must be 1..=255 bytes, got {}",
            name.len()
        )));
    }

    if name.contains('\0') {
        return Err(SharedMemoryError::InvalidName("contains null byte".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_validation() {
        assert!(matches!(
            SharedMemoryRegion::open("", 4096),
            Err(SharedMemoryError::InvalidName(_))
        ));
        assert!(matches!(
            SharedMemoryRegion::open("test\0name", 4096),
            Err(SharedMemoryError::InvalidName(_))
        ));
        assert!(matches!(
            SharedMemoryRegion::open("x".repeat(300), 4096),
            Err(SharedMemoryError::InvalidName(_))
        ));
    }

    #[cfg(any(unix, windows))]
    #[test]
    fn test_missing_region_is_not_found() {
        #[cfg(unix)]
        let name = format!("/plink-missing-{}", std::process::id());
        #[cfg(windows)]
        let name = format!("plink-missing-{}", std::process::id());

        let err = SystemRegions.open_region(&name, 4096).unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {}", err);
    }
}
