use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineCfg,
    #[serde(default)]
    pub queues: QueuesCfg,
    pub crop: Option<CropCfg>,
    pub aggregate: Option<AggregateCfg>,
    pub dispatch: Option<DispatchCfg>,
}

impl AppConfig {
    pub fn from_file(p: &str) -> Result<Self> {
        let content = std::fs::read_to_string(p)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineCfg {
    /// Number of synthetic frames the runner pushes before stopping.
    #[serde(default = "default_frames")]
    pub frames: usize,
}

impl Default for PipelineCfg {
    fn default() -> Self {
        Self {
            frames: default_frames(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueuesCfg {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// "blocking" | "leaky"
    #[serde(default = "default_policy")]
    pub policy: String,
}

impl Default for QueuesCfg {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            policy: default_policy(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CropCfg {
    /// "grid" | "detections"
    #[serde(rename = "type")]
    pub crop_type: String,
    #[serde(default = "default_grid_dim")]
    pub rows: usize,
    #[serde(default = "default_grid_dim")]
    pub cols: usize,
    #[serde(default)]
    pub min_confidence: f32,
    pub classes: Option<Vec<i32>>,
    /// Output surface pool size; bounds crops in flight.
    #[serde(default = "default_pool")]
    pub pool: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregateCfg {
    /// "blocking" | "nonblocking"
    #[serde(default = "default_acquire")]
    pub acquire: String,
    #[serde(default)]
    pub multi_scale: bool,
    #[serde(default = "default_border_threshold")]
    pub border_threshold: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
}

impl Default for AggregateCfg {
    fn default() -> Self {
        Self {
            acquire: default_acquire(),
            multi_scale: false,
            border_threshold: default_border_threshold(),
            iou_threshold: default_iou_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchCfg {
    #[serde(default = "default_batch")]
    pub batch_size: usize,
    #[serde(default = "default_ready_ms")]
    pub ready_timeout_ms: u64,
    #[serde(default = "default_deinit_ms")]
    pub deinit_timeout_ms: u64,
    /// Output tensor pool size; one lease per backend output per job.
    #[serde(default = "default_pool")]
    pub pool: usize,
}

impl Default for DispatchCfg {
    fn default() -> Self {
        Self {
            batch_size: default_batch(),
            ready_timeout_ms: default_ready_ms(),
            deinit_timeout_ms: default_deinit_ms(),
            pool: default_pool(),
        }
    }
}

fn default_frames() -> usize {
    16
}

fn default_capacity() -> usize {
    8
}

fn default_policy() -> String {
    "blocking".to_string()
}

fn default_grid_dim() -> usize {
    2
}

fn default_pool() -> usize {
    16
}

fn default_acquire() -> String {
    "blocking".to_string()
}

fn default_border_threshold() -> f32 {
    0.1
}

fn default_iou_threshold() -> f32 {
    0.45
}

fn default_batch() -> usize {
    4
}

fn default_ready_ms() -> u64 {
    500
}

fn default_deinit_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.pipeline.frames, 16);
        assert_eq!(cfg.queues.capacity, 8);
        assert_eq!(cfg.queues.policy, "blocking");
        assert!(cfg.crop.is_none());
        assert!(cfg.dispatch.is_none());
    }

    #[test]
    fn parses_a_full_document() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [pipeline]
            frames = 32

            [queues]
            capacity = 4
            policy = "leaky"

            [crop]
            type = "grid"
            rows = 3
            cols = 3
            pool = 9

            [aggregate]
            acquire = "nonblocking"
            multi_scale = true
            iou_threshold = 0.5

            [dispatch]
            batch_size = 2
            ready_timeout_ms = 100
            "#,
        )
        .unwrap();

        assert_eq!(cfg.pipeline.frames, 32);
        assert_eq!(cfg.queues.policy, "leaky");
        let crop = cfg.crop.unwrap();
        assert_eq!(crop.crop_type, "grid");
        assert_eq!((crop.rows, crop.cols, crop.pool), (3, 3, 9));
        let agg = cfg.aggregate.unwrap();
        assert!(agg.multi_scale);
        assert!((agg.iou_threshold - 0.5).abs() < f32::EPSILON);
        assert!((agg.border_threshold - 0.1).abs() < f32::EPSILON);
        let dispatch = cfg.dispatch.unwrap();
        assert_eq!(dispatch.batch_size, 2);
        assert_eq!(dispatch.deinit_timeout_ms, 2000);
    }
}
