//! Listener capability and conversion into link space
//!
//! Host world space is right-handed with Z pointing up and is measured in
//! host units. The link consumer expects a left-handed, Y-up frame in meters:
//!
//! - component 0: right
//! - component 1: up
//! - component 2: front
//!
//! Converting a host vector therefore swaps its second and third components.
//! Positions are scaled to meters first; direction vectors are only swapped.

use crate::Vec3;

/// Anything that can report where the local listener is and where it faces
pub trait Listener {
    /// Position in host world units
    fn position(&self) -> Vec3;

    /// Unit vector pointing out of the listener's eyes
    fn front(&self) -> Vec3;

    /// Unit vector pointing out of the top of the listener's head
    fn up(&self) -> Vec3;
}

impl<T: Listener + ?Sized> Listener for &T {
    fn position(&self) -> Vec3 {
        (**self).position()
    }

    fn front(&self) -> Vec3 {
        (**self).front()
    }

    fn up(&self) -> Vec3 {
        (**self).up()
    }
}

impl<T: Listener + ?Sized> Listener for Box<T> {
    fn position(&self) -> Vec3 {
        (**self).position()
    }

    fn front(&self) -> Vec3 {
        (**self).front()
    }

    fn up(&self) -> Vec3 {
        (**self).up()
    }
}

/// A fixed listener pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerPose {
    pub position: Vec3,
    pub front: Vec3,
    pub up: Vec3,
}

impl ListenerPose {
    pub fn new(position: Vec3, front: Vec3, up: Vec3) -> Self {
        Self { position, front, up }
    }
}

impl Default for ListenerPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            front: Vec3::new(0.0, 1.0, 0.0),
            up: Vec3::new(0.0, 0.0, 1.0),
        }
    }
}

impl Listener for ListenerPose {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn front(&self) -> Vec3 {
        self.front
    }

    fn up(&self) -> Vec3 {
        self.up
    }
}

/// Remap a host direction vector into link axes.
#[inline]
pub fn to_link_axes(v: Vec3) -> [f32; 3] {
    [v.x, v.z, v.y]
}

/// Scale a host position to meters, then remap it into link axes.
#[inline]
pub fn to_link_position(v: Vec3, metres_per_unit: f32) -> [f32; 3] {
    to_link_axes(v * metres_per_unit)
}
