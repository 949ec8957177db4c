//! Platform-specific naming for the link segment

/// Base name the voice client uses for its segment
pub const LINK_SEGMENT_BASENAME: &str = "MumbleLink";

/// Platform-specific utilities
pub struct PlatformUtils;

impl PlatformUtils {
    /// Name of the link segment for the current user.
    ///
    /// POSIX clients create one segment per user, `/MumbleLink.<uid>`.
    /// Windows uses a single session-wide file mapping.
    pub fn link_segment_name() -> String {
        #[cfg(unix)]
        {
            format!("/{}.{}", LINK_SEGMENT_BASENAME, Self::current_user_id())
        }
        #[cfg(not(unix))]
        {
            LINK_SEGMENT_BASENAME.to_string()
        }
    }

    /// Real user id of this process
    #[cfg(unix)]
    pub fn current_user_id() -> u32 {
        unsafe { libc::getuid() }
    }

    /// Check if named shared memory is available on this target
    pub fn is_shared_memory_supported() -> bool {
        cfg!(any(unix, windows))
    }
}
