//! Positional Link - Core Module
//!
//! Listener abstractions, vector math and the coordinate conversion shared
//! by every positional link backend.

pub mod vector;
pub mod listener;
pub mod config;
pub mod error;

pub use vector::*;
pub use listener::*;
pub use config::*;
pub use error::*;

/// Re-export common types
pub mod prelude {
    pub use crate::{
        config::LinkConfig,
        error::{CoreError, Result},
        listener::{Listener, ListenerPose},
        vector::Vec3,
    };
}

/// Current version of the positional link crates
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Host world units per meter used when nothing else is configured
pub const DEFAULT_METRES_PER_UNIT: f32 = 0.63;
