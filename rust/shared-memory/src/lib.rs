//! Positional Link - Shared Memory Module
//!
//! Attaches to the voice client's MumbleLink segment and publishes the local
//! listener into it.

pub mod platform;
pub mod region;
pub mod layout;
pub mod error;
pub mod adapter;

pub use region::*;
pub use layout::*;
pub use error::*;
pub use adapter::*;

/// Re-export platform-specific implementations
pub use platform::*;
