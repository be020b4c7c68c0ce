//! Concurrent stage-pipeline engine.
//!
//! A pipeline is a fixed directed graph of stages, one OS thread per stage,
//! connected by bounded frame queues. Frames are reference-counted
//! [`frame_io::SharedFrame`] handles carrying a detection tree, typed
//! metadata and a timestamp trace. Backpressure is real: a full blocking
//! queue suspends its producer and nothing else. Shutdown is cooperative:
//! stopping a stage flushes its inlets, which wakes every blocked queue
//! operation with an end-of-stream sentinel.
//!
//! Built-in workers cover the three structural patterns the engine exists
//! for: crop fan-out ([`crop::CropWorker`]), fan-in reassembly with
//! flatten/NMS ([`aggregate::AggregateWorker`]) and windowed asynchronous
//! backend dispatch ([`dispatch::BatchDispatchWorker`]).

pub mod aggregate;
pub mod crop;
pub mod dispatch;
mod error;
pub mod pipeline;
pub mod queue;
pub mod stage;

pub use error::{EngineError, Result};
pub use pipeline::{Pipeline, StageId};
pub use queue::{FrameQueue, OverflowPolicy};
pub use stage::{Stage, StageShared, StageState, Worker};
