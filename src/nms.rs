//! Non-Maximum Suppression (NMS) に関するモジュール

use std::cmp::Ordering;

use crate::detection_result::DetectionData;

/// 2つのBBoxのIoU (Intersection over Union) を計算します
pub fn iou(a: &DetectionData, b: &DetectionData) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    if x1 >= x2 || y1 >= y2 {
        return 0.0;
    }
    let inter = (x2 - x1) * (y2 - y1);
    let union = a.area() + b.area() - inter;
    if union <= 0.0 {
        return 0.0;
    }
    inter / union
}

fn by_confidence_desc(a: &DetectionData, b: &DetectionData) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
}

/// 重なっているBBoxの中でコンフィデンスが最大のものだけを残します
///
/// # Args
/// * `bb` - 同じクラスのBBox
/// * `nms_threshold` - このIoUを超えて重なっているBBoxは削除されます
pub fn nms(bb: &[DetectionData], nms_threshold: f32) -> Vec<DetectionData> {
    let mut sorted_bb = bb.to_vec();
    sorted_bb.sort_by(by_confidence_desc);

    let mut kept: Vec<DetectionData> = Vec::with_capacity(sorted_bb.len());
    for candidate in sorted_bb {
        if kept.iter().all(|k| iou(k, &candidate) <= nms_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

/// 閾値処理とクラス別のNMSを行います
///
/// # Args
/// * `bb` - 生の検出結果
/// * `cls_num` - クラス数 (これ以上のクラスIDは捨てられます)
/// * `obj_threshold` - コンフィデンスの閾値
/// * `nms_threshold` - NMSの閾値
/// * `max_det` - 残す検出結果の最大数
///
/// # Return
/// * コンフィデンスの降順に並んだ検出結果
pub fn nms_process(
    bb: &[DetectionData],
    cls_num: usize,
    obj_threshold: f32,
    nms_threshold: f32,
    max_det: usize,
) -> Vec<DetectionData> {
    // クラス別に分割
    let mut cls: Vec<Vec<DetectionData>> = vec![vec![]; cls_num];
    for &detection in bb {
        if detection.confidence > obj_threshold && detection.confidence <= 1.0 {
            if let Some(group) = cls.get_mut(detection.class as usize) {
                group.push(detection);
            }
        }
    }

    let mut new_box: Vec<DetectionData> = cls
        .into_iter()
        .flat_map(|d| nms(&d, nms_threshold))
        .collect();
    new_box.sort_by(by_confidence_desc);
    new_box.truncate(max_det);
    new_box
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x1: f32, y1: f32, x2: f32, y2: f32, conf: f32, class: u16) -> DetectionData {
        DetectionData {
            class,
            x1,
            y1,
            x2,
            y2,
            confidence: conf,
        }
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = bbox(0., 0., 10., 10., 0.9, 0);
        let b = bbox(20., 20., 30., 30., 0.9, 0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = bbox(0., 0., 10., 10., 0.9, 0);
        let b = bbox(5., 0., 15., 10., 0.9, 0);
        // 50 / 150
        assert!((iou(&a, &b) - 1. / 3.).abs() < 1e-6);
    }

    #[test]
    fn overlapping_boxes_collapse_to_most_confident() {
        let boxes = [
            bbox(0., 0., 10., 10., 0.6, 0),
            bbox(1., 1., 11., 11., 0.9, 0),
            bbox(50., 50., 60., 60., 0.7, 0),
        ];
        let kept = nms_process(&boxes, 1, 0.25, 0.5, 300);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.7);
    }

    #[test]
    fn suppression_is_per_class() {
        let boxes = [
            bbox(0., 0., 10., 10., 0.6, 0),
            bbox(0., 0., 10., 10., 0.9, 1),
        ];
        assert_eq!(nms_process(&boxes, 2, 0.25, 0.5, 300).len(), 2);
    }

    #[test]
    fn threshold_unknown_class_and_max_det() {
        let boxes = [
            bbox(0., 0., 10., 10., 0.2, 0),
            bbox(20., 0., 30., 10., 0.8, 0),
            bbox(40., 0., 50., 10., 0.7, 0),
            bbox(60., 0., 70., 10., 0.9, 3),
        ];
        let kept = nms_process(&boxes, 1, 0.25, 0.5, 1);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.8);
    }
}
