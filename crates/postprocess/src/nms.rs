// nms.rs - class-aware greedy non-max suppression

use frame_io::Detection;

/// Confidence-ordered greedy NMS, not cross-class.
///
/// Sorts by confidence descending; a detection is dropped when an earlier
/// survivor of the same class overlaps it with IoU at or above `threshold`.
/// O(n²) over the merged set, which stays small (tens of detections per
/// frame). Idempotent: a second pass with the same threshold removes
/// nothing.
pub fn classwise_nms(mut dets: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::with_capacity(dets.len());
    for det in dets {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) >= threshold);
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}
