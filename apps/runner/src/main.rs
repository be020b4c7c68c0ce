//! Demo pipeline runner.
//!
//! Wires crop fan-out → batched dispatch → fan-in aggregation over synthetic
//! frames and fake collaborators, runs a bounded number of frames, prints
//! per-stage latency and shuts down cleanly. Stage parameters come from a
//! TOML file (defaults apply when the file or a section is absent).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use config::AppConfig;
use engine::aggregate::AggregateWorker;
use engine::crop::CropWorker;
use engine::dispatch::BatchDispatchWorker;
use engine::{Pipeline, Stage, StageShared, Worker};
use frame_io::{BBox, SharedFrame};
use testsupport::{
    make_detection, make_frame_with_detections, make_surface_pool, make_tensor_pool,
    EchoBackend, FrameSink, PassthroughResize, SyntheticAllocator,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config_loader;

/// Terminal stage: records merged frames for the run report.
struct SinkWorker {
    sink: FrameSink,
}

impl Worker for SinkWorker {
    fn process(&mut self, frame: SharedFrame, _ctx: &Arc<StageShared>) -> engine::Result<()> {
        self.sink.record(frame);
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = match std::env::args().nth(1) {
        Some(path) => AppConfig::from_file(&path).with_context(|| format!("loading {path}"))?,
        None => AppConfig::default(),
    };

    let policy = config_loader::queue_policy(&cfg)?;
    let capacity = cfg.queues.capacity;
    let crop_cfg = cfg.crop.clone().unwrap_or(config::CropCfg {
        crop_type: "grid".into(),
        rows: 2,
        cols: 2,
        min_confidence: 0.0,
        classes: None,
        pool: 16,
    });
    let agg_cfg = cfg.aggregate.clone().unwrap_or_default();
    let dispatch_cfg = cfg.dispatch.clone().unwrap_or_default();

    let alloc = SyntheticAllocator::new();
    let resizer = PassthroughResize::new();
    let backend = EchoBackend::with_latency(&["scores"], Duration::from_millis(2));
    let sink = FrameSink::new();

    let mut pipeline = Pipeline::new();

    let crop_stage = Stage::new(
        "crop",
        Box::new(CropWorker::new(
            config_loader::crop_policy(&crop_cfg)?,
            make_surface_pool(&alloc, crop_cfg.pool),
            resizer,
            "aggregate",
            "dispatch",
        )),
    );
    crop_stage.add_inlet("in", capacity, policy);
    let crop = pipeline.add_stage(crop_stage)?;

    let dispatch = pipeline.add_stage(Stage::new(
        "dispatch",
        Box::new(BatchDispatchWorker::new(
            config_loader::dispatch_config(&dispatch_cfg),
            backend.clone(),
            make_tensor_pool(dispatch_cfg.pool, vec![1, 4]),
        )),
    ))?;

    let aggregate = pipeline.add_stage(Stage::new(
        "aggregate",
        Box::new(AggregateWorker::new(config_loader::aggregate_config(
            &agg_cfg,
        )?)),
    ))?;

    let sink_stage = pipeline.add_stage(Stage::new(
        "sink",
        Box::new(SinkWorker { sink: sink.clone() }),
    ))?;

    // Aggregate inlet order matters: the primary stream (from crop) must be
    // inlet 0, the secondary stream (via dispatch) inlet 1.
    pipeline.link(crop, aggregate, capacity, policy)?;
    pipeline.link(crop, dispatch, capacity, policy)?;
    pipeline.link(dispatch, aggregate, capacity, policy)?;
    pipeline.link(aggregate, sink_stage, capacity, policy)?;

    pipeline.start()?;

    let frames = cfg.pipeline.frames;
    info!(frames, "pushing synthetic frames");
    for i in 0..frames {
        let det = make_detection(BBox::new(0.3, 0.3, 0.2, 0.2), 0.9, 1);
        let frame = make_frame_with_detections(&alloc, &[det]);
        pipeline
            .stage(crop)
            .expect("crop stage registered")
            .push(frame, "in");
        if i % 4 == 3 {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    let all_arrived = testsupport::wait_until(Duration::from_secs(10), || sink.count() >= frames);
    if !all_arrived {
        info!(
            received = sink.count(),
            expected = frames,
            "timed out waiting for merged frames"
        );
    }

    pipeline.print_latency();
    pipeline.stop();

    info!(
        merged = sink.count(),
        submitted = backend.submitted(),
        "run complete"
    );
    Ok(())
}
