//! Narrow interfaces to the pipeline's external collaborators.
//!
//! The engine treats the inference backend and the DSP crop/resize path as
//! opaque: it binds inputs to pre-acquired outputs, hands over a completion
//! callback, and never interprets pixel or tensor data. Real implementations
//! wrap vendor SDKs; tests and the demo runner use the in-process fakes in
//! `testsupport`.

use std::time::Duration;

use frame_io::{BBox, FrameBuffer, HwSurface, Lease, SharedFrame, TensorBuf};
use thiserror::Error;

/// Inference submission/readiness failure.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend failure: {0}")]
    Failed(String),
    #[error("backend not ready within {0:?}")]
    Timeout(Duration),
}

/// Crop/resize hardware call failure.
#[derive(Debug, Error)]
#[error("crop/resize failed: {0}")]
pub struct OperationError(pub String);

/// Invoked on a backend-owned thread when an asynchronous job finishes.
/// Receives back the output buffers that were bound at submission.
pub type Completion = Box<dyn FnOnce(Vec<Lease<TensorBuf>>) + Send + 'static>;

/// Joinable handle to one submitted job. Only the most recent handle is
/// retained by a dispatcher, solely so teardown can wait on it.
pub trait JobHandle: Send {
    fn wait(&mut self, timeout: Duration) -> Result<(), BackendError>;
}

/// Asynchronous inference backend.
///
/// Jobs complete out-of-band on backend threads; completion order is
/// whatever the backend guarantees, not necessarily submission order.
pub trait InferenceBackend: Send + Sync {
    /// Names of the backend's outputs; one pool resource is bound per name.
    fn output_names(&self) -> &[String];

    /// Block until the backend can accept a submission, bounded by
    /// `timeout`.
    fn wait_ready(&self, timeout: Duration) -> Result<(), BackendError>;

    /// Submit one job binding `input` and `outputs`; `on_complete` fires on
    /// a backend thread once the outputs are populated.
    fn submit(
        &self,
        input: SharedFrame,
        outputs: Vec<Lease<TensorBuf>>,
        on_complete: Completion,
    ) -> Result<Box<dyn JobHandle>, BackendError>;
}

/// DSP crop/resize collaborator: populates the pre-acquired destination
/// surfaces in place, one per rectangle, from the source frame.
pub trait CropResize: Send + Sync {
    fn resize_crop(
        &self,
        src: &FrameBuffer,
        rects: &[BBox],
        dests: &[&HwSurface],
    ) -> Result<(), OperationError>;
}
