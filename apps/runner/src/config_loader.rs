//! Maps the TOML document onto engine types.

use anyhow::{bail, Result};
use config::{AggregateCfg, AppConfig, CropCfg, DispatchCfg};
use engine::aggregate::{AcquireMode, AggregateConfig};
use engine::crop::{CropPolicy, DetectionCrops, TileGrid};
use engine::dispatch::DispatchConfig;
use engine::OverflowPolicy;
use std::time::Duration;

pub fn queue_policy(cfg: &AppConfig) -> Result<OverflowPolicy> {
    match cfg.queues.policy.as_str() {
        "blocking" => Ok(OverflowPolicy::Blocking),
        "leaky" => Ok(OverflowPolicy::Leaky),
        other => bail!("unknown queue policy {other:?}"),
    }
}

pub fn crop_policy(cfg: &CropCfg) -> Result<Box<dyn CropPolicy>> {
    match cfg.crop_type.as_str() {
        "grid" => Ok(Box::new(TileGrid {
            rows: cfg.rows,
            cols: cfg.cols,
        })),
        "detections" => Ok(Box::new(DetectionCrops {
            min_confidence: cfg.min_confidence,
            classes: cfg.classes.clone(),
        })),
        other => bail!("unknown crop type {other:?}"),
    }
}

pub fn aggregate_config(cfg: &AggregateCfg) -> Result<AggregateConfig> {
    let mode = match cfg.acquire.as_str() {
        "blocking" => AcquireMode::Blocking,
        "nonblocking" => AcquireMode::NonBlocking,
        other => bail!("unknown aggregate acquire mode {other:?}"),
    };
    Ok(AggregateConfig {
        mode,
        multi_scale: cfg.multi_scale,
        border_threshold: cfg.border_threshold,
        iou_threshold: cfg.iou_threshold,
    })
}

pub fn dispatch_config(cfg: &DispatchCfg) -> DispatchConfig {
    DispatchConfig {
        batch_size: cfg.batch_size,
        ready_timeout: Duration::from_millis(cfg.ready_timeout_ms),
        deinit_timeout: Duration::from_millis(cfg.deinit_timeout_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_policy_strings() {
        let cfg: AppConfig = toml_cfg("[queues]\npolicy = \"bursty\"");
        assert!(queue_policy(&cfg).is_err());
    }

    #[test]
    fn maps_grid_crops() {
        let cfg: AppConfig = toml_cfg("[crop]\ntype = \"grid\"\nrows = 2\ncols = 4");
        let policy = crop_policy(cfg.crop.as_ref().unwrap()).unwrap();
        // 2x4 grid plans eight tiles over any frame.
        let alloc = testsupport::SyntheticAllocator::new();
        let frame = testsupport::make_frame(&alloc);
        assert_eq!(policy.plan(&frame.lock().unwrap()).len(), 8);
    }

    fn toml_cfg(doc: &str) -> AppConfig {
        toml::from_str(doc).unwrap()
    }
}
