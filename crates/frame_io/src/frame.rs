use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::geom::BBox;
use crate::meta::FrameMeta;
use crate::pool::Lease;
use crate::roi::Roi;
use crate::surface::HwSurface;

/// How a frame buffer holds its hardware payload: directly acquired at
/// ingestion, or leased from a bounded output pool (crop buffers).
enum SurfaceHold {
    Direct(HwSurface),
    Pooled(Lease<HwSurface>),
}

impl SurfaceHold {
    fn surface(&self) -> &HwSurface {
        match self {
            SurfaceHold::Direct(s) => s,
            SurfaceHold::Pooled(lease) => lease,
        }
    }
}

/// One `(stage, timestamp)` entry in a buffer's trace log.
#[derive(Clone, Debug)]
pub struct TracePoint {
    pub stage: String,
    pub at: Instant,
}

/// Handle under which frames travel through queues: clone-on-share, one
/// writer at a time by convention (a stage must not touch a buffer after
/// forwarding it).
pub type SharedFrame = Arc<Mutex<FrameBuffer>>;

/// A hardware-backed image payload plus everything the pipeline knows about
/// it: the detection tree, the scaling bbox, the typed metadata list and the
/// ordered timestamp trace.
pub struct FrameBuffer {
    surface: SurfaceHold,
    roi: Roi,
    scaling: BBox,
    meta: Vec<FrameMeta>,
    trace: Vec<TracePoint>,
}

impl FrameBuffer {
    /// Wrap a freshly acquired hardware buffer as a full frame
    /// (identity scaling bbox).
    pub fn new(surface: HwSurface) -> Self {
        Self {
            surface: SurfaceHold::Direct(surface),
            roi: Roi::full_frame(),
            scaling: BBox::FULL,
            meta: Vec::new(),
            trace: Vec::new(),
        }
    }

    /// Wrap a surface leased from an output pool (crop secondaries). The
    /// lease returns to the pool when the last frame handle drops.
    pub fn from_lease(lease: Lease<HwSurface>) -> Self {
        Self {
            surface: SurfaceHold::Pooled(lease),
            roi: Roi::full_frame(),
            scaling: BBox::FULL,
            meta: Vec::new(),
            trace: Vec::new(),
        }
    }

    pub fn into_shared(self) -> SharedFrame {
        Arc::new(Mutex::new(self))
    }

    pub fn surface(&self) -> &HwSurface {
        self.surface.surface()
    }

    pub fn roi(&self) -> &Roi {
        &self.roi
    }

    pub fn roi_mut(&mut self) -> &mut Roi {
        &mut self.roi
    }

    /// The rectangle, in an ancestor frame's coordinate space, that this
    /// buffer's own coordinate system maps to.
    pub fn scaling(&self) -> BBox {
        self.scaling
    }

    pub fn set_scaling(&mut self, bbox: BBox) {
        self.scaling = bbox;
    }

    // ── metadata ──

    pub fn push_meta(&mut self, entry: FrameMeta) {
        self.meta.push(entry);
    }

    pub fn meta(&self) -> &[FrameMeta] {
        &self.meta
    }

    /// Read the `ExpectedCrops` tag without consuming it.
    pub fn expected_crops(&self) -> Option<usize> {
        self.meta.iter().find_map(|m| match m {
            FrameMeta::ExpectedCrops { count } => Some(*count),
            _ => None,
        })
    }

    /// Remove and return the first `ExpectedCrops` tag, if any.
    pub fn take_expected_crops(&mut self) -> Option<usize> {
        let idx = self
            .meta
            .iter()
            .position(|m| matches!(m, FrameMeta::ExpectedCrops { .. }))?;
        match self.meta.remove(idx) {
            FrameMeta::ExpectedCrops { count } => Some(count),
            _ => None,
        }
    }

    // ── trace ──

    /// Append a `(stage, now)` entry; every stage that forwards the buffer
    /// stamps it exactly once.
    pub fn stamp(&mut self, stage: &str) {
        self.trace.push(TracePoint {
            stage: stage.to_string(),
            at: Instant::now(),
        });
    }

    /// Delta between the two most recent trace entries: the time the buffer
    /// spent queued plus processed at the latest stage.
    pub fn last_hop(&self) -> Option<Duration> {
        let n = self.trace.len();
        if n < 2 {
            return None;
        }
        Some(self.trace[n - 1].at.duration_since(self.trace[n - 2].at))
    }

    pub fn trace(&self) -> &[TracePoint] {
        &self.trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{AllocError, HwAllocator};
    use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

    #[derive(Default)]
    struct TallyAlloc {
        next: AtomicU64,
        live: AtomicI64,
    }

    impl HwAllocator for TallyAlloc {
        fn allocate(&self) -> Result<u64, AllocError> {
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(self.next.fetch_add(1, Ordering::SeqCst))
        }

        fn retain(&self, _id: u64) {
            self.live.fetch_add(1, Ordering::SeqCst);
        }

        fn release(&self, _id: u64) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn frame_over(alloc: &Arc<TallyAlloc>) -> FrameBuffer {
        let dynalloc: Arc<dyn HwAllocator> = alloc.clone();
        FrameBuffer::new(HwSurface::acquire(&dynalloc).unwrap())
    }

    #[test]
    fn dropping_the_last_handle_releases_the_payload() {
        let alloc = Arc::new(TallyAlloc::default());
        let shared = frame_over(&alloc).into_shared();
        let twin = shared.clone();
        drop(shared);
        assert_eq!(alloc.live.load(Ordering::SeqCst), 1);
        drop(twin);
        assert_eq!(alloc.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn expected_crops_tag_roundtrip() {
        let alloc = Arc::new(TallyAlloc::default());
        let mut frame = frame_over(&alloc);
        assert_eq!(frame.take_expected_crops(), None);

        frame.push_meta(FrameMeta::ExpectedCrops { count: 4 });
        assert_eq!(frame.expected_crops(), Some(4));
        assert_eq!(frame.take_expected_crops(), Some(4));
        assert_eq!(frame.take_expected_crops(), None);
        assert!(frame.meta().is_empty());
    }

    #[test]
    fn last_hop_needs_two_stamps() {
        let alloc = Arc::new(TallyAlloc::default());
        let mut frame = frame_over(&alloc);
        assert!(frame.last_hop().is_none());
        frame.stamp("capture");
        assert!(frame.last_hop().is_none());
        frame.stamp("crop");
        assert!(frame.last_hop().is_some());
        assert_eq!(frame.trace()[1].stage, "crop");
    }
}
