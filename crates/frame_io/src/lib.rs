//! Shared frame-buffer data model for the stage pipeline.
//!
//! Everything a frame carries between stages lives here: the normalized
//! geometry ([`BBox`]), the detection tree ([`Roi`]), the typed metadata list
//! ([`FrameMeta`]), the hardware surface handle ([`HwSurface`]) and the
//! [`FrameBuffer`] that ties them together. Buffers travel through queues as
//! [`SharedFrame`] handles; the underlying hardware payload is reference
//! counted through the owning [`HwAllocator`].

mod frame;
mod geom;
mod meta;
mod pool;
mod roi;
mod surface;

pub use frame::{FrameBuffer, SharedFrame, TracePoint};
pub use geom::BBox;
pub use meta::{FrameMeta, TensorBuf};
pub use pool::{Lease, ResourcePool};
pub use roi::{Detection, Roi, RoiObject, TensorRef};
pub use surface::{AllocError, HwAllocator, HwSurface};
