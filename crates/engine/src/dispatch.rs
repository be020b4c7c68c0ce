use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use backend::{InferenceBackend, JobHandle};
use frame_io::{FrameMeta, ResourcePool, SharedFrame, TensorBuf};
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::stage::{StageShared, Worker};

#[derive(Clone, Copy, Debug)]
pub struct DispatchConfig {
    pub batch_size: usize,
    /// Bound on the pre-submit "backend ready" wait. Expiry is fatal.
    pub ready_timeout: Duration,
    /// Bound on the deinit wait for the last in-flight job.
    pub deinit_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            ready_timeout: Duration::from_millis(500),
            deinit_timeout: Duration::from_secs(2),
        }
    }
}

/// Windows inputs up to `batch_size`, then drains the window as a run of
/// asynchronous backend jobs.
///
/// Each job's completion fires on a backend thread: it attaches the leased
/// output tensors to the input buffer as metadata and forwards the buffer
/// downstream. Completions may land out of submission order; only the
/// aggregator re-establishes ordering. The worker keeps just the last job
/// handle so `deinit` has something to wait on before teardown.
pub struct BatchDispatchWorker {
    config: DispatchConfig,
    backend: Arc<dyn InferenceBackend>,
    outputs: ResourcePool<TensorBuf>,
    window: VecDeque<SharedFrame>,
    last_job: Option<Box<dyn JobHandle>>,
}

impl BatchDispatchWorker {
    pub fn new(
        config: DispatchConfig,
        backend: Arc<dyn InferenceBackend>,
        outputs: ResourcePool<TensorBuf>,
    ) -> Self {
        Self {
            config,
            backend,
            outputs,
            window: VecDeque::with_capacity(config.batch_size),
            last_job: None,
        }
    }

    fn submit_one(&mut self, input: SharedFrame, ctx: &Arc<StageShared>) -> Result<()> {
        let names = self.backend.output_names().to_vec();

        let mut leases = Vec::with_capacity(names.len());
        for _ in 0..names.len() {
            match self.outputs.acquire() {
                Some(lease) => leases.push(lease),
                None => return Err(EngineError::BufferAllocation),
            }
        }

        self.backend.wait_ready(self.config.ready_timeout)?;

        let shared = Arc::clone(ctx);
        let frame = Arc::clone(&input);
        let job = self.backend.submit(
            input,
            leases,
            Box::new(move |filled| {
                {
                    let mut guard = frame.lock().unwrap();
                    for (lease, name) in filled.into_iter().zip(names) {
                        guard.push_meta(FrameMeta::Tensor {
                            buffer: lease,
                            name,
                        });
                    }
                }
                shared.send_to_subscribers(&frame);
            }),
        )?;
        self.last_job = Some(job);
        Ok(())
    }
}

impl Worker for BatchDispatchWorker {
    fn init(&mut self, _ctx: &Arc<StageShared>) -> Result<()> {
        if self.config.batch_size == 0 {
            return Err(EngineError::Configuration(
                "dispatch batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn process(&mut self, frame: SharedFrame, ctx: &Arc<StageShared>) -> Result<()> {
        self.window.push_back(frame);
        if self.window.len() < self.config.batch_size {
            return Ok(());
        }
        while let Some(input) = self.window.pop_front() {
            match self.submit_one(input, ctx) {
                Ok(()) => {}
                // Pool exhaustion skips this input only; the rest of the
                // window still goes out.
                Err(EngineError::BufferAllocation) => {
                    ctx.record_failure();
                    warn!(stage = %ctx.name(), "output pool exhausted, input skipped");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn deinit(&mut self, ctx: &Arc<StageShared>) {
        if let Some(mut job) = self.last_job.take() {
            if let Err(err) = job.wait(self.config.deinit_timeout) {
                warn!(stage = %ctx.name(), error = %err, "last job did not settle before teardown");
            }
        }
        self.window.clear();
    }
}
