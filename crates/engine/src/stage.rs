use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use frame_io::SharedFrame;
use tracing::{debug, error, warn};

use crate::error::{EngineError, Result};
use crate::queue::{FrameQueue, OverflowPolicy};

/// Stage lifecycle implemented by the unit of work running on the stage
/// thread.
///
/// `init` runs on the caller's thread inside `Stage::start`; a failure
/// aborts the start and the loop never runs. `process` runs once per frame
/// popped from the primary inlet; an error is logged and the frame dropped
/// (a `Timeout` error is fatal and ends the loop). `deinit` always runs when
/// the loop exits.
pub trait Worker: Send {
    fn init(&mut self, _ctx: &Arc<StageShared>) -> Result<()> {
        Ok(())
    }

    fn process(&mut self, frame: SharedFrame, ctx: &Arc<StageShared>) -> Result<()>;

    fn deinit(&mut self, _ctx: &Arc<StageShared>) {}
}

/// `Idle → Running → Stopping → Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageState {
    Idle,
    Running,
    Stopping,
}

/// Delivery edge to one subscriber: the producer pushes into the inlet the
/// subscriber created for it at wiring time.
struct Outlet {
    subscriber: String,
    inlet: Arc<FrameQueue>,
}

/// Per-stage hop statistics, updated each time the stage forwards a frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct HopStats {
    pub frames_forwarded: u64,
    pub frames_failed: u64,
    pub total_ns: u64,
    pub min_ns: u64,
    pub max_ns: u64,
}

impl HopStats {
    fn record(&mut self, hop_ns: u64) {
        self.frames_forwarded += 1;
        self.total_ns += hop_ns;
        if self.frames_forwarded == 1 {
            self.min_ns = hop_ns;
            self.max_ns = hop_ns;
        } else {
            self.min_ns = self.min_ns.min(hop_ns);
            self.max_ns = self.max_ns.max(hop_ns);
        }
    }

    pub fn average_ms(&self) -> f64 {
        if self.frames_forwarded == 0 {
            return 0.0;
        }
        (self.total_ns as f64 / self.frames_forwarded as f64) / 1_000_000.0
    }
}

/// State shared between a stage's control side, its loop thread, and any
/// backend completion threads forwarding on its behalf.
pub struct StageShared {
    name: String,
    inlets: Mutex<Vec<Arc<FrameQueue>>>,
    subscribers: Mutex<Vec<Outlet>>,
    eos: AtomicBool,
    last_hop_ns: AtomicU64,
    stats: Mutex<HopStats>,
}

impl StageShared {
    fn new(name: String) -> Arc<Self> {
        Arc::new(Self {
            name,
            inlets: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            eos: AtomicBool::new(false),
            last_hop_ns: AtomicU64::new(0),
            stats: Mutex::new(HopStats::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_eos(&self) -> bool {
        self.eos.load(Ordering::SeqCst)
    }

    /// Inlet by position; index 0 is the primary stream by convention.
    pub fn inlet(&self, index: usize) -> Option<Arc<FrameQueue>> {
        self.inlets.lock().unwrap().get(index).cloned()
    }

    pub fn inlet_count(&self) -> usize {
        self.inlets.lock().unwrap().len()
    }

    /// Create a new named inlet. Subscribing a stage to a producer adds an
    /// inlet named after the producer; this is the only graph mutation the
    /// engine supports, and only before the pipeline starts.
    pub fn add_inlet(
        &self,
        name: impl Into<String>,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> Arc<FrameQueue> {
        let queue = FrameQueue::new(name, capacity, policy);
        self.inlets.lock().unwrap().push(Arc::clone(&queue));
        queue
    }

    /// Enqueue on the inlet whose name matches `from`. An unmatched name is
    /// a wiring defect, not a runtime fault: the frame is silently dropped.
    pub fn push(&self, frame: SharedFrame, from: &str) {
        let inlet = {
            let inlets = self.inlets.lock().unwrap();
            inlets.iter().find(|q| q.name() == from).cloned()
        };
        match inlet {
            Some(queue) => queue.push(frame),
            None => {
                debug!(stage = %self.name, from, "push to unknown inlet dropped");
            }
        }
    }

    fn subscribe(&self, subscriber: String, inlet: Arc<FrameQueue>) {
        self.subscribers
            .lock()
            .unwrap()
            .push(Outlet { subscriber, inlet });
    }

    /// Stamp the frame's trace with this stage's name and fold the last-hop
    /// latency into the stage stats. Called exactly once per forward.
    fn stamp(&self, frame: &SharedFrame) {
        let mut guard = frame.lock().unwrap();
        guard.stamp(&self.name);
        if let Some(hop) = guard.last_hop() {
            let ns = hop.as_nanos() as u64;
            self.last_hop_ns.store(ns, Ordering::Relaxed);
            self.stats.lock().unwrap().record(ns);
        }
    }

    /// Broadcast to every subscriber, tagging the push with this stage's
    /// name. The frame must not be mutated by the caller afterwards.
    pub fn send_to_subscribers(&self, frame: &SharedFrame) {
        self.stamp(frame);
        let outlets: Vec<Arc<FrameQueue>> = {
            let subs = self.subscribers.lock().unwrap();
            subs.iter().map(|o| Arc::clone(&o.inlet)).collect()
        };
        for inlet in outlets {
            inlet.push(Arc::clone(frame));
        }
    }

    /// Deliver to one named subscriber only. Used by fan-out stages whose
    /// primary and secondary buffers route to different downstream stages.
    pub fn send_to(&self, subscriber: &str, frame: &SharedFrame) {
        self.stamp(frame);
        let inlet = {
            let subs = self.subscribers.lock().unwrap();
            subs.iter()
                .find(|o| o.subscriber == subscriber)
                .map(|o| Arc::clone(&o.inlet))
        };
        match inlet {
            Some(queue) => queue.push(Arc::clone(frame)),
            None => {
                debug!(stage = %self.name, subscriber, "send to unknown subscriber dropped");
            }
        }
    }

    pub fn record_failure(&self) {
        self.stats.lock().unwrap().frames_failed += 1;
    }

    /// Most recent last-hop latency observed at this stage, in nanoseconds.
    pub fn last_hop_ns(&self) -> u64 {
        self.last_hop_ns.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> HopStats {
        *self.stats.lock().unwrap()
    }

    fn flush_inlets(&self) {
        for queue in self.inlets.lock().unwrap().iter() {
            queue.flush();
        }
    }

    fn reset_inlets(&self) {
        for queue in self.inlets.lock().unwrap().iter() {
            queue.reset();
        }
    }
}

/// A connected stage: named inbound queues, a subscriber list, one worker
/// and one loop thread while running.
pub struct Stage {
    shared: Arc<StageShared>,
    worker: Option<Box<dyn Worker>>,
    thread: Option<JoinHandle<Box<dyn Worker>>>,
    state: StageState,
}

impl Stage {
    pub fn new(name: impl Into<String>, worker: Box<dyn Worker>) -> Self {
        Self {
            shared: StageShared::new(name.into()),
            worker: Some(worker),
            thread: None,
            state: StageState::Idle,
        }
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn shared(&self) -> &Arc<StageShared> {
        &self.shared
    }

    /// Convenience for external producers (ingestion) and tests.
    pub fn push(&self, frame: SharedFrame, from: &str) {
        self.shared.push(frame, from);
    }

    pub fn add_inlet(
        &self,
        name: impl Into<String>,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> Arc<FrameQueue> {
        self.shared.add_inlet(name, capacity, policy)
    }

    /// Wire `self → subscriber`: creates an inlet on the subscriber named
    /// after this stage and registers the edge for fan-out delivery.
    pub fn subscribe(&self, subscriber: &Stage, capacity: usize, policy: OverflowPolicy) {
        let inlet = subscriber
            .shared
            .add_inlet(self.name().to_string(), capacity, policy);
        self.shared
            .subscribe(subscriber.name().to_string(), inlet);
    }

    /// Run `init`, clear end-of-stream, and spawn the loop thread.
    ///
    /// An `init` failure aborts the start: the loop never runs and the
    /// stage stays `Idle`.
    pub fn start(&mut self) -> Result<()> {
        if self.state != StageState::Idle {
            return Err(EngineError::Configuration(format!(
                "stage {} already running",
                self.name()
            )));
        }
        if self.shared.inlet_count() == 0 {
            return Err(EngineError::Configuration(format!(
                "stage {} has no inlets",
                self.name()
            )));
        }
        let mut worker = self.worker.take().ok_or_else(|| {
            EngineError::Configuration(format!("stage {} has no worker", self.name()))
        })?;

        self.shared.eos.store(false, Ordering::SeqCst);
        self.shared.reset_inlets();

        if let Err(err) = worker.init(&self.shared) {
            self.worker = Some(worker);
            return Err(err);
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(shared.name().to_string())
            .spawn(move || {
                run_loop(&shared, worker.as_mut());
                worker
            })
            .map_err(|e| EngineError::Configuration(format!("spawn failed: {e}")))?;

        self.thread = Some(handle);
        self.state = StageState::Running;
        Ok(())
    }

    /// Set end-of-stream, flush every inlet, and join the loop thread.
    /// Blocks until the thread has observed end-of-stream and returned.
    /// Subscribers persist across stop; only queues drain.
    pub fn stop(&mut self) {
        if self.state != StageState::Running {
            return;
        }
        self.state = StageState::Stopping;
        self.shared.eos.store(true, Ordering::SeqCst);
        self.shared.flush_inlets();

        if let Some(handle) = self.thread.take() {
            match handle.join() {
                Ok(worker) => self.worker = Some(worker),
                Err(_) => error!(stage = %self.name(), "stage thread panicked"),
            }
        }
        self.state = StageState::Idle;
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(shared: &Arc<StageShared>, worker: &mut dyn Worker) {
    let Some(primary) = shared.inlet(0) else {
        // start() refuses inlet-less stages; nothing to pop here.
        return;
    };

    while !shared.is_eos() {
        match primary.pop() {
            Some(frame) => {
                if let Err(err) = worker.process(frame, shared) {
                    shared.record_failure();
                    if matches!(err, EngineError::Timeout(_)) {
                        error!(stage = %shared.name(), error = %err, "fatal stage error");
                        break;
                    }
                    warn!(stage = %shared.name(), error = %err, "process failed, frame dropped");
                }
            }
            None => {
                if shared.is_eos() {
                    break;
                }
                // Inlet drained without our stop(): treat as shutdown too,
                // otherwise the loop would spin on the sentinel.
                debug!(stage = %shared.name(), "primary inlet drained externally");
                break;
            }
        }
    }

    worker.deinit(shared);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::OverflowPolicy;
    use std::time::{Duration, Instant};

    /// Worker that forwards every frame unchanged.
    struct Forward;

    impl Worker for Forward {
        fn process(&mut self, frame: SharedFrame, ctx: &Arc<StageShared>) -> Result<()> {
            ctx.send_to_subscribers(&frame);
            Ok(())
        }
    }

    #[test]
    fn start_requires_an_inlet() {
        let mut stage = Stage::new("s", Box::new(Forward));
        assert!(matches!(
            stage.start(),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn stop_unblocks_a_stage_waiting_in_pop() {
        let mut stage = Stage::new("s", Box::new(Forward));
        stage.add_inlet("in", 4, OverflowPolicy::Blocking);
        stage.start().unwrap();
        assert_eq!(stage.state(), StageState::Running);

        // The loop thread is now blocked in pop() on an empty inlet.
        let t0 = Instant::now();
        stage.stop();
        assert!(t0.elapsed() < Duration::from_secs(1), "stop() stalled");
        assert_eq!(stage.state(), StageState::Idle);
    }

    #[test]
    fn stage_restarts_after_stop() {
        let mut stage = Stage::new("s", Box::new(Forward));
        stage.add_inlet("in", 4, OverflowPolicy::Blocking);
        stage.start().unwrap();
        stage.stop();
        stage.start().unwrap();
        assert_eq!(stage.state(), StageState::Running);
        stage.stop();
    }

    struct FailingInit;

    impl Worker for FailingInit {
        fn init(&mut self, _ctx: &Arc<StageShared>) -> Result<()> {
            Err(EngineError::Configuration("bad".into()))
        }
        fn process(&mut self, _frame: SharedFrame, _ctx: &Arc<StageShared>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn init_failure_aborts_start() {
        let mut stage = Stage::new("s", Box::new(FailingInit));
        stage.add_inlet("in", 4, OverflowPolicy::Blocking);
        assert!(stage.start().is_err());
        assert_eq!(stage.state(), StageState::Idle);
        // The worker is retained, so a corrected configuration could retry.
        assert!(stage.start().is_err());
    }
}
