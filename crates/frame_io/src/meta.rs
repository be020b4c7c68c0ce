use crate::pool::Lease;

/// Pooled backend output buffer: flat element storage plus tensor shape.
#[derive(Debug)]
pub struct TensorBuf {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

impl TensorBuf {
    pub fn zeroed(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            data: vec![0.0; len],
            shape,
        }
    }
}

/// Typed metadata entry attached to a frame buffer.
///
/// The list is ordered and append-only from the producer's point of view;
/// consumers remove entries by kind (the aggregator strips `ExpectedCrops`,
/// downstream consumers may detach tensors). Open for extension.
#[derive(Debug)]
#[non_exhaustive]
pub enum FrameMeta {
    /// Tag set by a crop fan-out stage: how many secondary buffers the
    /// matching aggregator must collect for this primary buffer.
    ExpectedCrops { count: usize },
    /// Backend output bound to this frame by a dispatcher completion.
    Tensor { buffer: Lease<TensorBuf>, name: String },
}
