//! MumbleLink shared memory layout
//!
//! The segment is created and sized by the voice client; this side only
//! opens it. Every field below, its order and its size are part of that
//! client's ABI. Reordering or resizing any of them silently breaks the
//! reader, so the totals and offsets are checked at compile time.
//!
//! `wchar_t` differs per platform: 2 bytes (UTF-16) on Windows and 4 bytes
//! (UTF-32) everywhere else. [`WChar`] follows it.
//!
//! ```text
//! offset  field             type
//! 0       ui_version        u32
//! 4       ui_tick           u32
//! 8       avatar_position   [f32; 3]
//! 20      avatar_front      [f32; 3]
//! 32      avatar_top        [f32; 3]
//! 44      name              [wchar; 256]
//! ..      camera_position   [f32; 3]
//! ..      camera_front      [f32; 3]
//! ..      camera_top        [f32; 3]
//! ..      identity          [wchar; 256]
//! ..      context_len       u32
//! ..      context           [u8; 256]
//! ..      description       [wchar; 2048]
//! ```

use std::fmt;
use std::mem::{align_of, offset_of, size_of};

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        /// Platform `wchar_t`
        pub type WChar = u16;
    } else {
        /// Platform `wchar_t`
        pub type WChar = u32;
    }
}

/// Version stamp written once a compatible writer is present
pub const LINK_PROTOCOL_VERSION: u32 = 2;

/// Capacity of `name`, in code units
pub const NAME_CAPACITY: usize = 256;
/// Capacity of `identity`, in code units (terminator included)
pub const IDENTITY_CAPACITY: usize = 256;
/// Capacity of `context`, in bytes
pub const CONTEXT_CAPACITY: usize = 256;
/// Capacity of `description`, in code units
pub const DESCRIPTION_CAPACITY: usize = 2048;

/// The shared record read by the voice client
#[repr(C)]
pub struct LinkedMem {
    /// Protocol version; 2 once a writer has performed the handshake
    pub ui_version: u32,
    /// Heartbeat, bumped on every update
    pub ui_tick: u32,
    /// Avatar position in meters (right, up, front)
    pub avatar_position: [f32; 3],
    /// Unit vector out of the avatar's eyes
    pub avatar_front: [f32; 3],
    /// Unit vector out of the top of the avatar's head
    pub avatar_top: [f32; 3],
    /// Application name, NUL terminated
    pub name: [WChar; NAME_CAPACITY],
    /// Camera position in meters
    pub camera_position: [f32; 3],
    /// Camera forward vector
    pub camera_front: [f32; 3],
    /// Camera up vector
    pub camera_top: [f32; 3],
    /// Free-form per-user identity, NUL terminated
    pub identity: [WChar; IDENTITY_CAPACITY],
    /// Number of valid bytes in `context`
    pub context_len: u32,
    /// Opaque scoping token; only peers with equal context are positioned
    pub context: [u8; CONTEXT_CAPACITY],
    /// Application description, NUL terminated
    pub description: [WChar; DESCRIPTION_CAPACITY],
}

/// Size of the record in bytes
pub const LINKED_MEM_SIZE: usize = size_of::<LinkedMem>();

#[cfg(windows)]
const EXPECTED_SIZE: usize = 5460;
#[cfg(not(windows))]
const EXPECTED_SIZE: usize = 10580;

const _: () = {
    assert!(LINKED_MEM_SIZE == EXPECTED_SIZE);
    assert!(align_of::<LinkedMem>() == 4);

    let w = size_of::<WChar>();
    assert!(offset_of!(LinkedMem, ui_tick) == 4);
    assert!(offset_of!(LinkedMem, avatar_position) == 8);
    assert!(offset_of!(LinkedMem, avatar_front) == 20);
    assert!(offset_of!(LinkedMem, avatar_top) == 32);
    assert!(offset_of!(LinkedMem, name) == 44);
    assert!(offset_of!(LinkedMem, camera_position) == 44 + NAME_CAPACITY * w);
    assert!(offset_of!(LinkedMem, identity) == 80 + NAME_CAPACITY * w);
    assert!(offset_of!(LinkedMem, context_len) == 80 + (NAME_CAPACITY + IDENTITY_CAPACITY) * w);
    assert!(offset_of!(LinkedMem, context) == 84 + (NAME_CAPACITY + IDENTITY_CAPACITY) * w);
    assert!(
        offset_of!(LinkedMem, description)
            == 84 + CONTEXT_CAPACITY + (NAME_CAPACITY + IDENTITY_CAPACITY) * w
    );
};

impl LinkedMem {
    /// A record with every field cleared, as a fresh segment looks
    pub fn zeroed() -> Self {
        Self {
            ui_version: 0,
            ui_tick: 0,
            avatar_position: [0.0; 3],
            avatar_front: [0.0; 3],
            avatar_top: [0.0; 3],
            name: [0; NAME_CAPACITY],
            camera_position: [0.0; 3],
            camera_front: [0.0; 3],
            camera_top: [0.0; 3],
            identity: [0; IDENTITY_CAPACITY],
            context_len: 0,
            context: [0; CONTEXT_CAPACITY],
            description: [0; DESCRIPTION_CAPACITY],
        }
    }

    pub fn name_str(&self) -> String {
        read_wide_str(&self.name)
    }

    pub fn identity_str(&self) -> String {
        read_wide_str(&self.identity)
    }

    pub fn description_str(&self) -> String {
        read_wide_str(&self.description)
    }

    /// Valid part of the context buffer
    pub fn context_bytes(&self) -> &[u8] {
        let len = (self.context_len as usize).min(CONTEXT_CAPACITY);
        &self.context[..len]
    }
}

impl Default for LinkedMem {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Debug for LinkedMem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedMem")
            .field("ui_version", &self.ui_version)
            .field("ui_tick", &self.ui_tick)
            .field("avatar_position", &self.avatar_position)
            .field("avatar_front", &self.avatar_front)
            .field("avatar_top", &self.avatar_top)
            .field("name", &self.name_str())
            .field("camera_position", &self.camera_position)
            .field("camera_front", &self.camera_front)
            .field("camera_top", &self.camera_top)
            .field("identity", &self.identity_str())
            .field("context_len", &self.context_len)
            .field("description", &self.description_str())
            .finish()
    }
}

/// Write `s` as a NUL terminated wide string, truncating to fit.
///
/// At most `dst.len() - 1` code units are written so the terminator always
/// fits. A character whose encoding does not fit is dropped whole. The rest
/// of `dst` is cleared. Returns the number of code units written.
pub fn write_wide_str(dst: &mut [WChar], s: &str) -> usize {
    let Some(limit) = dst.len().checked_sub(1) else {
        return 0;
    };

    let mut written = 0;
    for c in s.chars() {
        let mut buf = [0; 2];
        let units = encode_wide_char(c, &mut buf);
        if written + units.len() > limit {
            break;
        }
        dst[written..written + units.len()].copy_from_slice(units);
        written += units.len();
    }

    dst[written..].fill(0);
    written
}

/// Read a NUL terminated wide string, replacing invalid units
pub fn read_wide_str(src: &[WChar]) -> String {
    let end = src.iter().position(|&u| u == 0).unwrap_or(src.len());
    decode_wide(&src[..end])
}

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        fn encode_wide_char(c: char, buf: &mut [WChar; 2]) -> &[WChar] {
            c.encode_utf16(buf)
        }

        fn decode_wide(units: &[WChar]) -> String {
            String::from_utf16_lossy(units)
        }
    } else {
        fn encode_wide_char(c: char, buf: &mut [WChar; 2]) -> &[WChar] {
            buf[0] = c as WChar;
            &buf[..1]
        }

        fn decode_wide(units: &[WChar]) -> String {
            units
                .iter()
                .map(|&u| char::from_u32(u).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
    }
}
