//! Positional link adapter
//!
//! Writes the local listener into the MumbleLink segment once per frame.
//! Attaching is a one-shot probe; when it fails every other call is a
//! silent no-op and the host keeps running without positional audio.

use crate::{
    layout::{write_wide_str, LinkedMem, CONTEXT_CAPACITY, LINKED_MEM_SIZE, LINK_PROTOCOL_VERSION},
    MappedRegion, PlatformUtils, RegionProvider, Result, SharedMemoryError, SystemRegions,
};
use positional_link_core::{to_link_axes, to_link_position, LinkConfig, Listener};
use std::mem::align_of;
use tracing::{debug, info, instrument, trace, warn};

/// Adapter between a host listener and the voice client's link segment
pub struct PositionalLink<P: RegionProvider = SystemRegions> {
    /// Opens the segment
    provider: P,
    /// Mapped segment; `None` while not attached
    region: Option<P::Region>,
    /// Meters per host world unit
    metres_per_unit: f32,
    segment_name: String,
    application_name: String,
    application_description: String,
}

impl PositionalLink<SystemRegions> {
    /// Create an unattached link with the default scale and names
    pub fn new() -> Self {
        Self::with_config(LinkConfig::default())
    }

    /// Create an unattached link from configuration
    pub fn with_config(config: LinkConfig) -> Self {
        Self::with_provider(config, SystemRegions)
    }
}

impl Default for PositionalLink<SystemRegions> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: RegionProvider> PositionalLink<P> {
    /// Create an unattached link that opens its segment through `provider`
    pub fn with_provider(config: LinkConfig, provider: P) -> Self {
        let segment_name = config
            .segment_name
            .unwrap_or_else(PlatformUtils::link_segment_name);

        Self {
            provider,
            region: None,
            metres_per_unit: config.metres_per_unit,
            segment_name,
            application_name: config.application_name,
            application_description: config.application_description,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.region.is_some()
    }

    /// Meters per host world unit
    pub fn scale(&self) -> f32 {
        self.metres_per_unit
    }

    pub fn segment_name(&self) -> &str {
        &self.segment_name
    }

    /// Attach to the voice client's segment.
    ///
    /// Returns `false` when the segment does not exist or cannot be mapped;
    /// nothing is retained in that case.
    ///
    /// # Panics
    ///
    /// Panics if the link is already attached.
    #[instrument(skip(self), fields(segment = %self.segment_name))]
    pub fn attach(&mut self) -> bool {
        assert!(self.region.is_none(), "positional link is already attached");

        match self.open_segment() {
            Ok(region) => {
                info!("Attached to link segment {}", self.segment_name);
                self.region = Some(region);
                true
            }
            Err(e) if e.is_not_found() => {
                debug!("Link segment {} is not available: {}", self.segment_name, e);
                false
            }
            Err(e) => {
                warn!("Failed to attach to link segment {}: {}", self.segment_name, e);
                false
            }
        }
    }

    /// Open and check the segment; a rejected region is dropped, which releases it
    fn open_segment(&self) -> Result<P::Region> {
        let mut region = self.provider.open_region(&self.segment_name, LINKED_MEM_SIZE)?;

        if region.size() < LINKED_MEM_SIZE {
            return Err(SharedMemoryError::RegionTooSmall {
                size: region.size(),
                required: LINKED_MEM_SIZE,
            });
        }

        let address = region.as_mut_ptr() as usize;
        if address == 0 || address % align_of::<LinkedMem>() != 0 {
            return Err(SharedMemoryError::Misaligned {
                address,
                align: align_of::<LinkedMem>(),
            });
        }

        Ok(region)
    }

    /// Set the context token; peers are only positioned against equal contexts.
    ///
    /// At most 256 bytes are stored, longer input is truncated.
    pub fn set_context(&mut self, context: impl AsRef<[u8]>) {
        let Some(region) = self.region.as_mut() else {
            return;
        };
        let mem = linked_mem(region);

        let context = context.as_ref();
        let len = context.len().min(CONTEXT_CAPACITY);
        mem.context[..len].copy_from_slice(&context[..len]);
        mem.context_len = len as u32;

        debug!("Link context set ({} bytes)", len);
    }

    /// Set the identity string, truncated to the segment's 256 code units
    pub fn set_identity(&mut self, identity: &str) {
        let Some(region) = self.region.as_mut() else {
            return;
        };
        let mem = linked_mem(region);

        let written = write_wide_str(&mut mem.identity, identity);
        debug!("Link identity set ({} code units)", written);
    }

    /// Publish the listener for this frame.
    ///
    /// Does nothing when not attached or when there is no listener.
    pub fn update<L: Listener + ?Sized>(&mut self, listener: Option<&L>) {
        let (Some(region), Some(listener)) = (self.region.as_mut(), listener) else {
            return;
        };
        let mem = linked_mem(region);

        if mem.ui_version != LINK_PROTOCOL_VERSION {
            write_wide_str(&mut mem.name, &self.application_name);
            write_wide_str(&mut mem.description, &self.application_description);
            mem.ui_version = LINK_PROTOCOL_VERSION;
            debug!("Link handshake written as {}", self.application_name);
        }
        mem.ui_tick = mem.ui_tick.wrapping_add(1);

        let position = to_link_position(listener.position(), self.metres_per_unit);
        let front = to_link_axes(listener.front());
        let top = to_link_axes(listener.up());

        mem.avatar_position = position;
        mem.avatar_front = front;
        mem.avatar_top = top;

        // No separate camera entity; it follows the avatar
        mem.camera_position = position;
        mem.camera_front = front;
        mem.camera_top = top;

        trace!(tick = mem.ui_tick, ?position, ?front, ?top, "Link updated");
    }

    /// Unmap the segment and close its handle. Safe to call when not attached.
    pub fn release(&mut self) {
        if self.region.take().is_some() {
            debug!("Detached from link segment {}", self.segment_name);
        }
    }
}

impl<P: RegionProvider> Drop for PositionalLink<P> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<P: RegionProvider> std::fmt::Debug for PositionalLink<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionalLink")
            .field("segment_name", &self.segment_name)
            .field("attached", &self.is_attached())
            .field("metres_per_unit", &self.metres_per_unit)
            .finish()
    }
}

/// View an attached region as the link record
fn linked_mem<R: MappedRegion>(region: &mut R) -> &mut LinkedMem {
    // Safety: attach verified the mapping is at least LINKED_MEM_SIZE bytes
    // and aligned for LinkedMem, and it stays mapped while `region` lives.
    // Every bit pattern is a valid LinkedMem.
    unsafe { &mut *(region.as_mut_ptr() as *mut LinkedMem) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use positional_link_core::{ListenerPose, Vec3};
    use std::cell::Cell;
    use std::ptr::NonNull;
    use std::rc::Rc;

    /// Heap stand-in for the segment the voice client would create
    struct TestSegment {
        ptr: NonNull<LinkedMem>,
    }

    impl TestSegment {
        fn new() -> Self {
            let boxed = Box::new(LinkedMem::zeroed());
            Self {
                ptr: NonNull::from(Box::leak(boxed)),
            }
        }

        fn mem(&self) -> &LinkedMem {
            unsafe { self.ptr.as_ref() }
        }

        fn modify(&self, f: impl FnOnce(&mut LinkedMem)) {
            f(unsafe { &mut *self.ptr.as_ptr() })
        }
    }

    impl Drop for TestSegment {
        fn drop(&mut self) {
            drop(unsafe { Box::from_raw(self.ptr.as_ptr()) });
        }
    }

    struct HeapRegion {
        ptr: NonNull<u8>,
        size: usize,
        released: Rc<Cell<usize>>,
    }

    impl MappedRegion for HeapRegion {
        fn as_mut_ptr(&mut self) -> *mut u8 {
            self.ptr.as_ptr()
        }

        fn size(&self) -> usize {
            self.size
        }
    }

    impl Drop for HeapRegion {
        fn drop(&mut self) {
            self.released.set(self.released.get() + 1);
        }
    }

    struct HeapProvider {
        segment: Option<NonNull<LinkedMem>>,
        reported_size: usize,
        opened: Rc<Cell<usize>>,
        released: Rc<Cell<usize>>,
    }

    impl HeapProvider {
        fn new(segment: Option<&TestSegment>) -> Self {
            Self {
                segment: segment.map(|s| s.ptr),
                reported_size: LINKED_MEM_SIZE,
                opened: Rc::new(Cell::new(0)),
                released: Rc::new(Cell::new(0)),
            }
        }
    }

    impl RegionProvider for HeapProvider {
        type Region = HeapRegion;

        fn open_region(&self, name: &str, _size: usize) -> Result<HeapRegion> {
            let ptr = self
                .segment
                .ok_or_else(|| SharedMemoryError::RegionNotFound(name.to_string()))?;
            self.opened.set(self.opened.get() + 1);

            Ok(HeapRegion {
                ptr: ptr.cast(),
                size: self.reported_size,
                released: Rc::clone(&self.released),
            })
        }
    }

    fn test_config() -> LinkConfig {
        LinkConfig {
            segment_name: Some("test-link".to_string()),
            ..LinkConfig::default()
        }
    }

    fn attached(segment: &TestSegment) -> PositionalLink<HeapProvider> {
        let mut link = PositionalLink::with_provider(test_config(), HeapProvider::new(Some(segment)));
        assert!(link.attach());
        link
    }

    fn pose(position: Vec3, front: Vec3, up: Vec3) -> ListenerPose {
        ListenerPose::new(position, front, up)
    }

    #[test]
    fn test_link_creation() {
        let link = PositionalLink::new();
        assert!(!link.is_attached());
        assert_eq!(link.scale(), 0.63);
        assert_eq!(link.segment_name(), PlatformUtils::link_segment_name());
    }

    #[test]
    fn test_attach_without_segment_is_inert() {
        let mut link = PositionalLink::with_provider(test_config(), HeapProvider::new(None));
        assert!(!link.attach());
        assert!(!link.is_attached());

        link.set_context(b"server");
        link.set_identity("player");
        link.update(Some(&ListenerPose::default()));
        link.release();
        assert!(!link.is_attached());
    }

    #[test]
    fn test_system_attach_without_segment() {
        let config = LinkConfig {
            segment_name: Some(format!("/plink-absent-{}", std::process::id())),
            ..LinkConfig::default()
        };
        let mut link = PositionalLink::with_config(config);
        assert!(!link.attach());
        assert!(!link.is_attached());
        link.update(Some(&ListenerPose::default()));
    }

    #[test]
    fn test_writes_before_attach_do_not_touch_memory() {
        let segment = TestSegment::new();
        let mut link = PositionalLink::with_provider(test_config(), HeapProvider::new(Some(&segment)));

        link.set_context(b"server");
        link.set_identity("player");
        link.update(Some(&ListenerPose::default()));

        let mem = segment.mem();
        assert_eq!(mem.ui_version, 0);
        assert_eq!(mem.ui_tick, 0);
        assert_eq!(mem.context_len, 0);
        assert!(mem.identity_str().is_empty());
    }

    #[test]
    fn test_undersized_region_is_released() {
        let segment = TestSegment::new();
        let mut provider = HeapProvider::new(Some(&segment));
        provider.reported_size = LINKED_MEM_SIZE - 1;
        let opened = Rc::clone(&provider.opened);
        let released = Rc::clone(&provider.released);

        let mut link = PositionalLink::with_provider(test_config(), provider);
        assert!(!link.attach());
        assert!(!link.is_attached());
        assert_eq!(opened.get(), 1);
        assert_eq!(released.get(), 1);

        link.update(Some(&ListenerPose::default()));
        assert_eq!(segment.mem().ui_tick, 0);
    }

    #[test]
    fn test_release_and_drop() {
        let segment = TestSegment::new();
        let provider = HeapProvider::new(Some(&segment));
        let released = Rc::clone(&provider.released);

        let mut link = PositionalLink::with_provider(test_config(), provider);
        assert!(link.attach());

        link.release();
        assert!(!link.is_attached());
        assert_eq!(released.get(), 1);

        // Second release is a no-op
        link.release();
        assert_eq!(released.get(), 1);

        // Re-attach after release, then drop releases again
        assert!(link.attach());
        drop(link);
        assert_eq!(released.get(), 2);
    }

    #[test]
    fn test_drop_never_attached() {
        let link = PositionalLink::with_provider(test_config(), HeapProvider::new(None));
        drop(link);
    }

    #[test]
    #[should_panic(expected = "already attached")]
    fn test_double_attach_panics() {
        let segment = TestSegment::new();
        let mut link = attached(&segment);
        link.attach();
    }

    #[test]
    fn test_update_without_listener_is_noop() {
        let segment = TestSegment::new();
        let mut link = attached(&segment);

        link.update::<ListenerPose>(None);
        assert_eq!(segment.mem().ui_tick, 0);
        assert_eq!(segment.mem().ui_version, 0);
    }

    #[test]
    fn test_handshake_and_tick() {
        let segment = TestSegment::new();
        let mut link = attached(&segment);
        let listener = ListenerPose::default();

        link.update(Some(&listener));
        assert_eq!(segment.mem().ui_version, LINK_PROTOCOL_VERSION);
        assert_eq!(segment.mem().ui_tick, 1);
        assert_eq!(segment.mem().name_str(), "OpenSpades");
        assert_eq!(segment.mem().description_str(), "OpenSpades Link plugin.");

        for expected in 2..=5 {
            link.update(Some(&listener));
            assert_eq!(segment.mem().ui_tick, expected);
        }
    }

    #[test]
    fn test_handshake_happens_once() {
        let segment = TestSegment::new();
        let mut link = attached(&segment);
        let listener = ListenerPose::default();

        link.update(Some(&listener));
        segment.modify(|mem| mem.name = [0; crate::layout::NAME_CAPACITY]);

        link.update(Some(&listener));
        assert_eq!(segment.mem().ui_version, LINK_PROTOCOL_VERSION);
        assert!(segment.mem().name_str().is_empty());
    }

    #[test]
    fn test_handshake_repeats_after_external_reset() {
        let segment = TestSegment::new();
        let mut link = attached(&segment);
        let listener = ListenerPose::default();

        link.update(Some(&listener));
        segment.modify(|mem| {
            mem.ui_version = 0;
            mem.name = [0; crate::layout::NAME_CAPACITY];
        });

        link.update(Some(&listener));
        assert_eq!(segment.mem().ui_version, LINK_PROTOCOL_VERSION);
        assert_eq!(segment.mem().name_str(), "OpenSpades");
    }

    #[test]
    fn test_tick_wraps() {
        let segment = TestSegment::new();
        let mut link = attached(&segment);
        segment.modify(|mem| mem.ui_tick = u32::MAX);

        link.update(Some(&ListenerPose::default()));
        assert_eq!(segment.mem().ui_tick, 0);
    }

    #[test]
    fn test_vectors_are_remapped() {
        let segment = TestSegment::new();
        let mut link = attached(&segment);

        let listener = pose(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(0.6, 0.8, 0.0),
            Vec3::new(0.0, -0.6, 0.8),
        );
        link.update(Some(&listener));

        let mem = segment.mem();
        let scale = 0.63;
        assert_eq!(mem.avatar_position, [1.0 * scale, 3.0 * scale, 2.0 * scale]);
        assert_eq!(mem.avatar_front, [0.6, 0.0, 0.8]);
        assert_eq!(mem.avatar_top, [0.0, 0.8, -0.6]);

        assert_eq!(mem.camera_position, mem.avatar_position);
        assert_eq!(mem.camera_front, mem.avatar_front);
        assert_eq!(mem.camera_top, mem.avatar_top);
    }

    #[test]
    fn test_position_scaled_orientation_not() {
        let segment = TestSegment::new();
        let mut link = attached(&segment);

        let listener = pose(
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 10.0),
        );
        link.update(Some(&listener));

        let mem = segment.mem();
        assert!((mem.avatar_position[0] - 6.3).abs() < 1e-5);
        assert_eq!(mem.avatar_front, [10.0, 0.0, 0.0]);
        assert_eq!(mem.avatar_top, [0.0, 10.0, 0.0]);
    }

    #[test]
    fn test_configured_scale() {
        let segment = TestSegment::new();
        let config = LinkConfig {
            metres_per_unit: 2.0,
            ..test_config()
        };
        let mut link = PositionalLink::with_provider(config, HeapProvider::new(Some(&segment)));
        assert!(link.attach());
        assert_eq!(link.scale(), 2.0);

        link.update(Some(&pose(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO, Vec3::ZERO)));
        assert_eq!(segment.mem().avatar_position, [2.0, 6.0, 4.0]);
    }

    #[test]
    fn test_dyn_listener() {
        let segment = TestSegment::new();
        let mut link = attached(&segment);

        let listener: Box<dyn Listener> = Box::new(ListenerPose::default());
        link.update(Some(listener.as_ref()));
        assert_eq!(segment.mem().ui_tick, 1);
    }

    #[test]
    fn test_context_truncation() {
        let segment = TestSegment::new();
        let mut link = attached(&segment);

        let long: Vec<u8> = (0..300).map(|i| (i % 251) as u8).collect();
        link.set_context(&long);
        assert_eq!(segment.mem().context_len, 256);
        assert_eq!(segment.mem().context_bytes(), &long[..256]);

        link.set_context(b"0123456789");
        assert_eq!(segment.mem().context_len, 10);
        assert_eq!(segment.mem().context_bytes(), b"0123456789");
    }

    #[test]
    fn test_identity_truncation() {
        let segment = TestSegment::new();
        let mut link = attached(&segment);

        link.set_identity("player-one");
        assert_eq!(segment.mem().identity_str(), "player-one");

        let long = "x".repeat(1000);
        link.set_identity(&long);
        let mem = segment.mem();
        assert_eq!(mem.identity_str().len(), 255);
        assert_eq!(mem.identity[255], 0);

        // Shorter identity clears the tail of the previous one
        link.set_identity("p2");
        assert_eq!(segment.mem().identity_str(), "p2");
    }
}
