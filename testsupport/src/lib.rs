//! Synthetic frames and in-process fake collaborators for tests and the
//! demo runner. No hardware is touched: the allocator hands out ids and
//! counts live references, the backend echoes zeroed tensors from its own
//! thread.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use backend::{BackendError, Completion, CropResize, InferenceBackend, JobHandle, OperationError};
use frame_io::{
    AllocError, BBox, Detection, FrameBuffer, HwAllocator, HwSurface, Lease, ResourcePool,
    SharedFrame, TensorBuf,
};

/// Allocator over imaginary hardware: sequential ids, live-reference tally.
/// `live()` reaching zero after a test proves no handle leaked.
#[derive(Default)]
pub struct SyntheticAllocator {
    next: AtomicU64,
    live: AtomicI64,
}

impl SyntheticAllocator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn live(&self) -> i64 {
        self.live.load(Ordering::SeqCst)
    }
}

impl HwAllocator for SyntheticAllocator {
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

pub fn make_frame(alloc: &Arc<SyntheticAllocator>) -> SharedFrame {
    let dynalloc: Arc<dyn HwAllocator> = alloc.clone();
    FrameBuffer::new(HwSurface::acquire(&dynalloc).expect("synthetic acquire"))
        .into_shared()
}

pub fn make_frame_with_detections(
    alloc: &Arc<SyntheticAllocator>,
    dets: &[Detection],
) -> SharedFrame {
    let frame = make_frame(alloc);
    {
        let mut guard = frame.lock().unwrap();
        for d in dets {
            guard.roi_mut().push_detection(d.clone());
        }
    }
    frame
}

pub fn make_detection(bbox: BBox, confidence: f32, class_id: i32) -> Detection {
    Detection::new(bbox, confidence, class_id)
}

/// Pool of `slots` synthetic surfaces, as a crop stage would own.
pub fn make_surface_pool(
    alloc: &Arc<SyntheticAllocator>,
    slots: usize,
) -> ResourcePool<HwSurface> {
    let dynalloc: Arc<dyn HwAllocator> = alloc.clone();
    let surfaces = (0..slots)
        .map(|_| HwSurface::acquire(&dynalloc).expect("synthetic acquire"))
        .collect();
    ResourcePool::new(surfaces)
}

/// Pool of zeroed output tensors, as a dispatcher would own.
pub fn make_tensor_pool(slots: usize, shape: Vec<usize>) -> ResourcePool<TensorBuf> {
    ResourcePool::new((0..slots).map(|_| TensorBuf::zeroed(shape.clone())).collect())
}

/// Crop/resize fake: validates the rect/dest pairing and does nothing else.
#[derive(Default)]
pub struct PassthroughResize {
    calls: AtomicUsize,
}

impl PassthroughResize {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CropResize for PassthroughResize {
    fn resize_crop(
        &self,
        _src: &FrameBuffer,
        rects: &[BBox],
        dests: &[&HwSurface],
    ) -> Result<(), OperationError> {
        if rects.len() != dests.len() {
            return Err(OperationError(format!(
                "rect/dest mismatch: {} vs {}",
                rects.len(),
                dests.len()
            )));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Inference fake: every submission spawns a thread that sleeps for the
/// configured latency, then runs the completion with the leases untouched.
/// Completions land on non-engine threads, like a real backend's.
pub struct EchoBackend {
    names: Vec<String>,
    latency: Duration,
    submitted: AtomicUsize,
}

impl EchoBackend {
    pub fn new(output_names: &[&str]) -> Arc<Self> {
        Self::with_latency(output_names, Duration::ZERO)
    }

    pub fn with_latency(output_names: &[&str], latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            names: output_names.iter().map(|s| s.to_string()).collect(),
            latency,
            submitted: AtomicUsize::new(0),
        })
    }

    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

struct EchoJob {
    thread: Option<std::thread::JoinHandle<()>>,
}

impl JobHandle for EchoJob {
    fn wait(&mut self, timeout: Duration) -> Result<(), BackendError> {
        // join() has no deadline; poll completion instead.
        let deadline = Instant::now() + timeout;
        while let Some(handle) = &self.thread {
            if handle.is_finished() {
                let _ = self.thread.take().map(std::thread::JoinHandle::join);
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BackendError::Timeout(timeout));
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }
}

impl InferenceBackend for EchoBackend {
    fn output_names(&self) -> &[String] {
        &self.names
    }

    fn wait_ready(&self, _timeout: Duration) -> Result<(), BackendError> {
        Ok(())
    }

    fn submit(
        &self,
        _input: SharedFrame,
        outputs: Vec<Lease<TensorBuf>>,
        on_complete: Completion,
    ) -> Result<Box<dyn JobHandle>, BackendError> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency;
        let thread = std::thread::spawn(move || {
            if !latency.is_zero() {
                std::thread::sleep(latency);
            }
            on_complete(outputs);
        });
        Ok(Box::new(EchoJob {
            thread: Some(thread),
        }))
    }
}

/// Backend whose readiness gate never opens. For fatal-timeout paths.
#[derive(Default)]
pub struct NeverReadyBackend {
    names: Vec<String>,
}

impl NeverReadyBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl InferenceBackend for NeverReadyBackend {
    fn output_names(&self) -> &[String] {
        &self.names
    }

    fn wait_ready(&self, timeout: Duration) -> Result<(), BackendError> {
        std::thread::sleep(timeout);
        Err(BackendError::Timeout(timeout))
    }

    fn submit(
        &self,
        _input: SharedFrame,
        _outputs: Vec<Lease<TensorBuf>>,
        _on_complete: Completion,
    ) -> Result<Box<dyn JobHandle>, BackendError> {
        Err(BackendError::Failed("backend never became ready".into()))
    }
}

/// Thread-safe terminal capture for pipeline outputs.
#[derive(Clone, Default)]
pub struct FrameSink {
    frames: Arc<Mutex<Vec<SharedFrame>>>,
}

impl FrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, frame: SharedFrame) {
        self.frames.lock().unwrap().push(frame);
    }

    pub fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn frames(&self) -> Vec<SharedFrame> {
        self.frames.lock().unwrap().clone()
    }
}

/// Poll `pred` every few milliseconds until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if pred() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(3));
    }
}
