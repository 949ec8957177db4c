//! Positional Link
//!
//! Publishes the local player's position and orientation to a running Mumble
//! client through its MumbleLink shared memory segment, so the voice client
//! can render positional audio.
//!
//! ```no_run
//! use positional_link::prelude::*;
//!
//! let mut link = PositionalLink::new();
//! if link.attach() {
//!     link.set_context("server:32887");
//!     link.set_identity("deuce");
//! }
//!
//! // Once per frame; a no-op when the voice client is not running
//! let player = ListenerPose::default();
//! link.update(Some(&player));
//! ```

pub use positional_link_core as link_core;
pub use positional_link_shared_memory as shared_memory;

/// Re-export common types
pub mod prelude {
    pub use positional_link_core::{LinkConfig, Listener, ListenerPose, Vec3};
    pub use positional_link_shared_memory::{
        LinkedMem, PositionalLink, RegionProvider, SystemRegions,
    };
}
