use crate::geom::BBox;

/// One detected object, coordinates relative to the owning buffer's
/// scaling bbox.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f32,
    pub class_id: i32,
    pub label: Option<String>,
}

impl Detection {
    pub fn new(bbox: BBox, confidence: f32, class_id: i32) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
            label: None,
        }
    }
}

/// Reference to a backend tensor attached inside the detection tree.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorRef {
    pub name: String,
    pub shape: Vec<usize>,
}

/// Child of a region: the tree is polymorphic over detections, tensor
/// references and nested sub-regions.
#[derive(Clone, Debug, PartialEq)]
pub enum RoiObject {
    Detection(Detection),
    Tensor(TensorRef),
    Region(Roi),
}

/// Detection tree: a root bounding box owning an ordered list of children.
#[derive(Clone, Debug, PartialEq)]
pub struct Roi {
    pub bbox: BBox,
    objects: Vec<RoiObject>,
}

impl Roi {
    pub fn new(bbox: BBox) -> Self {
        Self {
            bbox,
            objects: Vec::new(),
        }
    }

    /// Root region covering the whole buffer.
    pub fn full_frame() -> Self {
        Self::new(BBox::FULL)
    }

    pub fn push(&mut self, object: RoiObject) {
        self.objects.push(object);
    }

    pub fn push_detection(&mut self, det: Detection) {
        self.objects.push(RoiObject::Detection(det));
    }

    pub fn objects(&self) -> &[RoiObject] {
        &self.objects
    }

    /// Direct detection children, in order.
    pub fn detections(&self) -> impl Iterator<Item = &Detection> {
        self.objects.iter().filter_map(|o| match o {
            RoiObject::Detection(d) => Some(d),
            _ => None,
        })
    }

    /// Remove and return every direct detection child, leaving tensors and
    /// sub-regions in place. Used when re-parenting detections across
    /// buffers and when rebuilding the set after NMS.
    pub fn take_detections(&mut self) -> Vec<Detection> {
        let mut taken = Vec::new();
        self.objects.retain_mut(|o| match o {
            RoiObject::Detection(d) => {
                taken.push(std::mem::replace(
                    d,
                    Detection::new(BBox::new(0.0, 0.0, 0.0, 0.0), 0.0, 0),
                ));
                false
            }
            _ => true,
        });
        taken
    }
}
