//! Shared memory specific error types

use thiserror::Error;

/// Shared memory error types
#[derive(Error, Debug)]
pub enum SharedMemoryError {
    /// Platform-specific error
    #[error("Platform error: {0}")]
    Platform(String),

    /// Region not found
    #[error("Shared memory region not found: {0}")]
    RegionNotFound(String),

    /// Invalid region name
    #[error("Invalid region name: {0}")]
    InvalidName(String),

    /// Region is smaller than the layout it must hold
    #[error("Shared memory region too small: {size} bytes, need {required}")]
    RegionTooSmall { size: usize, required: usize },

    /// Mapped address cannot hold the layout
    #[error("Mapped region at {address:#x} is not aligned to {align}")]
    Misaligned { address: usize, align: usize },

    /// Memory mapping failed
    #[error("Memory mapping failed: {0}")]
    MappingFailed(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Named shared memory is not available on this target
    #[error("Shared memory is not supported on this platform")]
    Unsupported,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias
pub type Result<T> = std::result::Result<T, SharedMemoryError>;

impl SharedMemoryError {
    /// Whether the error only means nobody has created the segment yet
    pub fn is_not_found(&self) -> bool {
        match self {
            SharedMemoryError::RegionNotFound(_) => true,
            SharedMemoryError::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Convert platform-specific error codes to SharedMemoryError
    pub fn from_platform_error(error: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        match std::io::Error::from_raw_os_error(error).kind() {
            std::io::ErrorKind::NotFound => SharedMemoryError::RegionNotFound(message),
            std::io::ErrorKind::PermissionDenied => SharedMemoryError::PermissionDenied(message),
            _ => SharedMemoryError::Platform(format!("Error {}: {}", error, message)),
        }
    }
}
