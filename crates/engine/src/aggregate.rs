use std::sync::Arc;

use frame_io::{Detection, SharedFrame};
use postprocess::{classwise_nms, flatten, is_border_artifact};
use tracing::{debug, warn};

use crate::error::Result;
use crate::stage::{StageShared, Worker};

/// How the aggregator obtains the secondaries a primary expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireMode {
    /// Pop from the secondary inlet until all expected buffers arrive.
    Blocking,
    /// Only aggregate when every expected buffer is already queued;
    /// otherwise forward the primary unmerged. Bounds latency under
    /// backpressure at the cost of that frame's crop results.
    NonBlocking,
}

#[derive(Clone, Copy, Debug)]
pub struct AggregateConfig {
    pub mode: AcquireMode,
    /// Enables border-seam pruning before flattening and NMS after merging.
    pub multi_scale: bool,
    pub border_threshold: f32,
    pub iou_threshold: f32,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            mode: AcquireMode::Blocking,
            multi_scale: false,
            border_threshold: 0.1,
            iou_threshold: 0.45,
        }
    }
}

/// Fan-in worker: pairs each tagged primary from inlet 0 with the exact
/// number of secondaries it expects from inlet 1, merges their detections
/// into the primary's coordinate space, and forwards the merged buffer.
pub struct AggregateWorker {
    config: AggregateConfig,
}

impl AggregateWorker {
    pub fn new(config: AggregateConfig) -> Self {
        Self { config }
    }
}

impl Worker for AggregateWorker {
    fn process(&mut self, frame: SharedFrame, ctx: &Arc<StageShared>) -> Result<()> {
        let expected = frame.lock().unwrap().take_expected_crops();
        let Some(count) = expected.filter(|&k| k > 0) else {
            ctx.send_to_subscribers(&frame);
            return Ok(());
        };

        let Some(secondary_inlet) = ctx.inlet(1) else {
            warn!(stage = %ctx.name(), "tagged primary but no secondary inlet, forwarding as-is");
            ctx.send_to_subscribers(&frame);
            return Ok(());
        };

        if self.config.mode == AcquireMode::NonBlocking && secondary_inlet.len() < count {
            debug!(
                stage = %ctx.name(),
                expected = count,
                queued = secondary_inlet.len(),
                "secondaries not ready, forwarding primary unmerged"
            );
            ctx.send_to_subscribers(&frame);
            return Ok(());
        }

        let mut merged: Vec<Detection> = Vec::new();
        for _ in 0..count {
            let Some(secondary) = secondary_inlet.pop() else {
                // Sentinel mid-acquisition means the pipeline is shutting
                // down; drop the partial set and let the loop exit.
                debug!(stage = %ctx.name(), "secondary inlet drained mid-acquisition");
                return Ok(());
            };
            let mut guard = secondary.lock().unwrap();
            let space = guard.scaling();
            for det in guard.roi_mut().take_detections() {
                if self.config.multi_scale
                    && is_border_artifact(&det.bbox, &space, self.config.border_threshold)
                {
                    continue;
                }
                let mut det = det;
                det.bbox = flatten(&det.bbox, &space);
                merged.push(det);
            }
        }

        {
            let mut guard = frame.lock().unwrap();
            for det in merged {
                guard.roi_mut().push_detection(det);
            }
            if self.config.multi_scale {
                let all = guard.roi_mut().take_detections();
                let kept = classwise_nms(all, self.config.iou_threshold);
                for det in kept {
                    guard.roi_mut().push_detection(det);
                }
            }
        }

        ctx.send_to_subscribers(&frame);
        Ok(())
    }
}
