use std::sync::Arc;

use backend::CropResize;
use frame_io::{BBox, Detection, FrameBuffer, FrameMeta, HwSurface, ResourcePool, SharedFrame};
use postprocess::to_local;
use tracing::warn;

use crate::error::Result;
use crate::stage::{StageShared, Worker};

/// One requested secondary buffer: the region to cut from the source frame,
/// plus the detection that prompted it, if any.
#[derive(Clone, Debug)]
pub struct CropRequest {
    pub rect: BBox,
    pub seed: Option<Detection>,
}

/// Decides which regions of an incoming frame become secondary buffers.
pub trait CropPolicy: Send {
    fn plan(&self, frame: &FrameBuffer) -> Vec<CropRequest>;
}

/// Fixed `rows x cols` tiling of the full frame. Used for multi-scale
/// passes where a detector re-runs on magnified tiles.
#[derive(Clone, Copy, Debug)]
pub struct TileGrid {
    pub rows: usize,
    pub cols: usize,
}

impl CropPolicy for TileGrid {
    fn plan(&self, _frame: &FrameBuffer) -> Vec<CropRequest> {
        let mut requests = Vec::with_capacity(self.rows * self.cols);
        let w = 1.0 / self.cols as f32;
        let h = 1.0 / self.rows as f32;
        for row in 0..self.rows {
            for col in 0..self.cols {
                requests.push(CropRequest {
                    rect: BBox::new(col as f32 * w, row as f32 * h, w, h),
                    seed: None,
                });
            }
        }
        requests
    }
}

/// One crop per detection already attached to the frame, filtered by
/// confidence and, optionally, by class. Drives secondary models that run
/// on primary-detector hits.
#[derive(Clone, Debug, Default)]
pub struct DetectionCrops {
    pub min_confidence: f32,
    pub classes: Option<Vec<i32>>,
}

impl CropPolicy for DetectionCrops {
    fn plan(&self, frame: &FrameBuffer) -> Vec<CropRequest> {
        frame
            .roi()
            .detections()
            .filter(|d| d.confidence >= self.min_confidence)
            .filter(|d| match &self.classes {
                Some(ids) => ids.contains(&d.class_id),
                None => true,
            })
            .map(|d| CropRequest {
                rect: d.bbox,
                seed: Some(d.clone()),
            })
            .collect()
    }
}

/// Fan-out worker: plans crops, fills pooled surfaces through the resize
/// collaborator, and routes primary and secondary buffers to distinct
/// subscribers.
///
/// Pool exhaustion is not an error. The worker emits as many secondaries as
/// it could lease surfaces for and tags the primary with that actual count,
/// so the aggregator's expectation always matches what was sent.
pub struct CropWorker {
    policy: Box<dyn CropPolicy>,
    pool: ResourcePool<HwSurface>,
    resizer: Arc<dyn CropResize>,
    primary_out: String,
    secondary_out: String,
}

impl CropWorker {
    pub fn new(
        policy: Box<dyn CropPolicy>,
        pool: ResourcePool<HwSurface>,
        resizer: Arc<dyn CropResize>,
        primary_out: impl Into<String>,
        secondary_out: impl Into<String>,
    ) -> Self {
        Self {
            policy,
            pool,
            resizer,
            primary_out: primary_out.into(),
            secondary_out: secondary_out.into(),
        }
    }
}

impl Worker for CropWorker {
    fn process(&mut self, frame: SharedFrame, ctx: &Arc<StageShared>) -> Result<()> {
        let secondaries = {
            let mut guard = frame.lock().unwrap();

            let mut requests = self.policy.plan(&guard);

            // Lease destination surfaces up front; a short pool trims the
            // plan rather than failing the frame.
            let mut leases = Vec::with_capacity(requests.len());
            for _ in 0..requests.len() {
                match self.pool.acquire() {
                    Some(lease) => leases.push(lease),
                    None => break,
                }
            }
            if leases.len() < requests.len() {
                warn!(
                    stage = %ctx.name(),
                    planned = requests.len(),
                    emitted = leases.len(),
                    "surface pool exhausted, emitting fewer crops"
                );
                requests.truncate(leases.len());
            }

            if !requests.is_empty() {
                let rects: Vec<BBox> = requests.iter().map(|r| r.rect).collect();
                let dests: Vec<&HwSurface> = leases.iter().map(|l| &**l).collect();
                self.resizer.resize_crop(&guard, &rects, &dests)?;
            }

            let mut secondaries = Vec::with_capacity(requests.len());
            for (request, lease) in requests.into_iter().zip(leases) {
                let mut crop = FrameBuffer::from_lease(lease);
                crop.set_scaling(request.rect);
                if let Some(seed) = request.seed {
                    // The seed covered the whole crop in source coordinates;
                    // re-express it relative to the new buffer.
                    let local = to_local(&seed.bbox, &request.rect);
                    let mut det = seed;
                    det.bbox = local;
                    crop.roi_mut().push_detection(det);
                }
                secondaries.push(crop.into_shared());
            }

            // No crops means no tag; the aggregator passes untagged
            // primaries straight through.
            if !secondaries.is_empty() {
                guard.push_meta(FrameMeta::ExpectedCrops {
                    count: secondaries.len(),
                });
            }
            secondaries
        };

        for crop in &secondaries {
            ctx.send_to(&self.secondary_out, crop);
        }
        ctx.send_to(&self.primary_out, &frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_io::BBox;

    #[test]
    fn tile_grid_covers_the_frame() {
        let grid = TileGrid { rows: 2, cols: 2 };
        let frame = frame_for_test();
        let plan = grid.plan(&frame);
        assert_eq!(plan.len(), 4);
        assert_eq!(plan[0].rect, BBox::new(0.0, 0.0, 0.5, 0.5));
        assert_eq!(plan[3].rect, BBox::new(0.5, 0.5, 0.5, 0.5));
        let area: f32 = plan.iter().map(|r| r.rect.area()).sum();
        assert!((area - 1.0).abs() < 1e-6);
    }

    #[test]
    fn detection_crops_filter_by_confidence_and_class() {
        let mut frame = frame_for_test();
        frame
            .roi_mut()
            .push_detection(Detection::new(BBox::new(0.1, 0.1, 0.2, 0.2), 0.9, 1));
        frame
            .roi_mut()
            .push_detection(Detection::new(BBox::new(0.5, 0.5, 0.2, 0.2), 0.3, 1));
        frame
            .roi_mut()
            .push_detection(Detection::new(BBox::new(0.3, 0.3, 0.2, 0.2), 0.8, 2));

        let policy = DetectionCrops {
            min_confidence: 0.5,
            classes: Some(vec![1]),
        };
        let plan = policy.plan(&frame);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].rect, BBox::new(0.1, 0.1, 0.2, 0.2));
        assert!(plan[0].seed.is_some());
    }

    fn frame_for_test() -> FrameBuffer {
        use frame_io::{AllocError, HwAllocator, HwSurface};
        use std::sync::Arc;

        struct Bump;
        impl HwAllocator for Bump {
            fn allocate(&self) -> std::result::Result<u64, AllocError> {
                Ok(1)
            }
            fn retain(&self, _id: u64) {}
            fn release(&self, _id: u64) {}
        }
        let alloc: Arc<dyn HwAllocator> = Arc::new(Bump);
        FrameBuffer::new(HwSurface::acquire(&alloc).unwrap())
    }
}
