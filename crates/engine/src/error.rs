use thiserror::Error;

/// Engine-wide error kinds.
///
/// There is no user-visible failure surface inside the engine itself:
/// `init()` failures abort `start()`, mid-loop `process()` failures are
/// logged and the frame dropped (frames are transient, never retried), and
/// teardown-time failures are reported without blocking teardown. Callers
/// observe stage results through `Pipeline::start` and `Stage::start`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad wiring or parameters, detected at `init()`.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// An output resource pool was exhausted.
    #[error("output buffer pool exhausted")]
    BufferAllocation,
    /// Inference submission or readiness failure.
    #[error("backend error: {0}")]
    Backend(String),
    /// Crop/resize hardware call failure.
    #[error("operation failed: {0}")]
    Operation(String),
    /// A bounded wait elapsed. Fatal to the stage when it happens mid-loop.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<backend::BackendError> for EngineError {
    fn from(err: backend::BackendError) -> Self {
        match err {
            backend::BackendError::Timeout(_) => EngineError::Timeout("backend ready"),
            backend::BackendError::Failed(msg) => EngineError::Backend(msg),
        }
    }
}

impl From<backend::OperationError> for EngineError {
    fn from(err: backend::OperationError) -> Self {
        EngineError::Operation(err.0)
    }
}
