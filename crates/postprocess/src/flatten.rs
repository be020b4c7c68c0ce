// flatten.rs - coordinate transforms between a crop's space and its parent's

use frame_io::BBox;

/// Flatten a child-space rectangle into the parent's coordinate space using
/// the child's scaling bbox.
///
/// `new.xmin = space.xmin + old.xmin * space.width`, symmetric for the other
/// three fields. Applied once per hop, never composed.
pub fn flatten(child: &BBox, space: &BBox) -> BBox {
    BBox {
        xmin: space.xmin + child.xmin * space.width,
        ymin: space.ymin + child.ymin * space.height,
        width: child.width * space.width,
        height: child.height * space.height,
    }
}

/// Inverse of [`flatten`]: re-express a parent-space rectangle in the local
/// coordinates of a buffer whose scaling bbox is `space`. Used when a crop
/// carries its originating detection along as a sub-ROI.
pub fn to_local(parent: &BBox, space: &BBox) -> BBox {
    let w = if space.width > 0.0 { space.width } else { 1.0 };
    let h = if space.height > 0.0 { space.height } else { 1.0 };
    BBox {
        xmin: (parent.xmin - space.xmin) / w,
        ymin: (parent.ymin - space.ymin) / h,
        width: parent.width / w,
        height: parent.height / h,
    }
}

/// True when a detection inside a tile hugs a seam that is internal to the
/// full frame: the detection would be cut by the tile edge, and an adjacent
/// tile will see the whole object. Edges of the tile that coincide with the
/// true frame boundary are kept.
pub fn is_border_artifact(bbox: &BBox, tile: &BBox, threshold: f32) -> bool {
    const EDGE_EPS: f32 = 1e-6;
    if tile.xmin.abs() > EDGE_EPS && bbox.xmin < threshold {
        return true;
    }
    if tile.ymin.abs() > EDGE_EPS && bbox.ymin < threshold {
        return true;
    }
    if (tile.xmax() - 1.0).abs() > EDGE_EPS && bbox.xmax() > 1.0 - threshold {
        return true;
    }
    if (tile.ymax() - 1.0).abs() > EDGE_EPS && bbox.ymax() > 1.0 - threshold {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_concrete_case() {
        let space = BBox::new(0.25, 0.25, 0.5, 0.5);
        let child = BBox::new(0.2, 0.2, 0.4, 0.4);
        let out = flatten(&child, &space);
        assert!((out.xmin - 0.35).abs() < 1e-6);
        assert!((out.ymin - 0.35).abs() < 1e-6);
        assert!((out.width - 0.2).abs() < 1e-6);
        assert!((out.height - 0.2).abs() < 1e-6);
    }

    #[test]
    fn flatten_identity_space_is_noop() {
        let child = BBox::new(0.3, 0.1, 0.2, 0.5);
        assert_eq!(flatten(&child, &BBox::FULL), child);
    }

    #[test]
    fn to_local_inverts_flatten() {
        let space = BBox::new(0.5, 0.0, 0.5, 0.5);
        let child = BBox::new(0.2, 0.4, 0.3, 0.3);
        let round = to_local(&flatten(&child, &space), &space);
        assert!((round.xmin - child.xmin).abs() < 1e-6);
        assert!((round.width - child.width).abs() < 1e-6);
    }

    #[test]
    fn internal_seam_detection_is_pruned() {
        // Tile not on the frame's left/top edge; a detection at xmin=0.05
        // sits on the internal seam and must go.
        let tile = BBox::new(0.5, 0.0, 0.5, 0.5);
        let det = BBox::new(0.05, 0.4, 0.2, 0.2);
        assert!(is_border_artifact(&det, &tile, 0.1));
    }

    #[test]
    fn true_frame_edge_is_kept() {
        // Same detection in a tile whose left edge IS the frame edge.
        let tile = BBox::new(0.0, 0.0, 0.5, 0.5);
        let det = BBox::new(0.05, 0.4, 0.2, 0.2);
        assert!(!is_border_artifact(&det, &tile, 0.1));
    }

    #[test]
    fn centered_detection_survives_any_tile() {
        let tile = BBox::new(0.5, 0.5, 0.5, 0.5);
        let det = BBox::new(0.4, 0.4, 0.2, 0.2);
        assert!(!is_border_artifact(&det, &tile, 0.1));
    }
}
