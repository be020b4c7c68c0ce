/// Axis-aligned rectangle in normalized [0,1] coordinates.
///
/// A detection's bbox is always expressed relative to its own buffer's
/// scaling bbox, never to an ancestor's, until explicitly flattened.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    pub xmin: f32,
    pub ymin: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    /// Identity rectangle: a full frame's own coordinate space.
    pub const FULL: BBox = BBox {
        xmin: 0.0,
        ymin: 0.0,
        width: 1.0,
        height: 1.0,
    };

    pub fn new(xmin: f32, ymin: f32, width: f32, height: f32) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
        }
    }

    pub fn xmax(&self) -> f32 {
        self.xmin + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.ymin + self.height
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Area of the overlap between two boxes, zero when disjoint.
    pub fn intersection(&self, other: &BBox) -> f32 {
        let ix = self.xmax().min(other.xmax()) - self.xmin.max(other.xmin);
        let iy = self.ymax().min(other.ymax()) - self.ymin.max(other.ymin);
        if ix <= 0.0 || iy <= 0.0 {
            return 0.0;
        }
        ix * iy
    }

    /// Intersection over union. Zero-area boxes never reach a positive IoU,
    /// so they are only ever suppressed by containment, not by area.
    pub fn iou(&self, other: &BBox) -> f32 {
        let inter = self.intersection(other);
        if inter <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = BBox::new(0.1, 0.1, 0.4, 0.4);
        assert!((b.iou(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BBox::new(0.0, 0.0, 0.2, 0.2);
        let b = BBox::new(0.5, 0.5, 0.2, 0.2);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn zero_area_box_yields_zero_iou() {
        let a = BBox::new(0.2, 0.2, 0.0, 0.3);
        let b = BBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn known_overlap() {
        // The NMS tests lean on this pair; their IoU is ~0.68.
        let a = BBox::new(0.0, 0.0, 0.5, 0.5);
        let b = BBox::new(0.05, 0.05, 0.5, 0.5);
        let iou = a.iou(&b);
        assert!((iou - 0.6806).abs() < 1e-3, "iou = {iou}");
    }
}
