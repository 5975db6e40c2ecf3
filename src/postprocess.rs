//! YOLO (You Only Look Once) 物体検出モデルの出力を後処理するためのモジュール
//!
//! YOLOv8以降の検出ヘッドは `[1, 4 + クラス数, アンカー数]` のテンソルを出力します。
//! 各アンカーは (cx, cy, w, h) とクラスごとのスコアを持ち、物体確率は持ちません。

use anyhow::{bail, Result};

use crate::detection_result::DetectionData;
use crate::nms::nms_process;

/// 座標 (cx, cy, w, h) のチャネル数
const BOX_CH: usize = 4;

/// 出力テンソルの並び
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// `[1, 4 + nc, N]`
    ChannelsFirst { anchors: usize },
    /// `[1, N, 4 + nc]`
    AnchorsFirst { anchors: usize },
}

/// 出力テンソルの形状から並びを判定します
fn detect_layout(shape: &[usize], cls_num: usize) -> Result<Layout> {
    let ch = BOX_CH + cls_num;
    let dims: Vec<usize> = match shape {
        [1, a, b] => vec![*a, *b],
        [a, b] => vec![*a, *b],
        _ => bail!("unexpected YOLO output shape {:?}", shape),
    };
    match (dims[0], dims[1]) {
        (c, n) if c == ch => Ok(Layout::ChannelsFirst { anchors: n }),
        (n, c) if c == ch => Ok(Layout::AnchorsFirst { anchors: n }),
        _ => bail!(
            "YOLO output shape {:?} does not match {} classes (expected {} channels)",
            shape,
            cls_num,
            ch
        ),
    }
}

/// 最大のスコアを持つクラスIDとスコアを取得します
///
/// # Args
/// * `score` - チャネル番号からスコアを取り出す関数
/// * `cls_num` - クラスの数
fn get_cls_id(score: impl Fn(usize) -> f32, cls_num: usize) -> (u16, f32) {
    (0..cls_num)
        .map(|k| (k as u16, score(BOX_CH + k)))
        .fold((0, f32::NEG_INFINITY), |best, cur| {
            if cur.1 > best.1 {
                cur
            } else {
                best
            }
        })
}

/// 出力テンソルをデコードして、閾値処理前の検出結果を取り出します
///
/// # Args
/// * `data` - 出力テンソル (row-major)
/// * `shape` - 出力テンソルの形状
/// * `cls_num` - クラスの数
///
/// # Return
/// * YOLOの入力座標系での検出結果
pub fn decode_output(data: &[f32], shape: &[usize], cls_num: usize) -> Result<Vec<DetectionData>> {
    if cls_num == 0 {
        bail!("class count must be at least 1");
    }
    let ch = BOX_CH + cls_num;
    let layout = detect_layout(shape, cls_num)?;
    let anchors = match layout {
        Layout::ChannelsFirst { anchors } | Layout::AnchorsFirst { anchors } => anchors,
    };
    if data.len() != ch * anchors {
        bail!(
            "YOLO output has {} values, expected {} for shape {:?}",
            data.len(),
            ch * anchors,
            shape
        );
    }

    let objs = (0..anchors)
        .map(|i| {
            let at = |c: usize| match layout {
                Layout::ChannelsFirst { .. } => data[c * anchors + i],
                Layout::AnchorsFirst { .. } => data[i * ch + c],
            };
            let (cls_id, confidence) = get_cls_id(at, cls_num);
            DetectionData::new_from_yolo(at(0), at(1), at(2), at(3), confidence, cls_id)
        })
        .collect();
    Ok(objs)
}

/// `post_process`関数は、YOLOの出力から物体検出を行います
///
/// # Args
/// * `data` - YOLOの出力
/// * `shape` - 出力の形状
/// * `cls_num` - クラスの数
/// * `obj_threshold` - 物体検出の閾値
/// * `nms_threshold` - 非最大抑制（NMS）の閾値
/// * `max_det` - 検出数の上限
///
/// # Return
/// * 検出された物体を表すDetectionDataのベクトル
pub fn post_process(
    data: &[f32],
    shape: &[usize],
    cls_num: usize,
    obj_threshold: f32,
    nms_threshold: f32,
    max_det: usize,
) -> Result<Vec<DetectionData>> {
    let boxes = decode_output(data, shape, cls_num)?;
    Ok(nms_process(&boxes, cls_num, obj_threshold, nms_threshold, max_det))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2クラス・3アンカーの `[1, 6, 3]` テンソルを作る
    fn channels_first() -> Vec<f32> {
        #[rustfmt::skip]
        let t = vec![
            // cx
            100., 102., 300.,
            // cy
            100., 101., 300.,
            // w
             20.,  20.,  30.,
            // h
             20.,  20.,  30.,
            // class 0
             0.9,  0.6,  0.1,
            // class 1
             0.1,  0.2,  0.8,
        ];
        t
    }

    #[test]
    fn decodes_channels_first() {
        let objs = decode_output(&channels_first(), &[1, 6, 3], 2).unwrap();
        assert_eq!(objs.len(), 3);
        assert_eq!(objs[0].class, 0);
        assert_eq!(objs[0].confidence, 0.9);
        assert_eq!((objs[0].x1, objs[0].y1), (90., 90.));
        assert_eq!(objs[2].class, 1);
        assert_eq!(objs[2].confidence, 0.8);
    }

    #[test]
    fn decodes_anchors_first() {
        let cf = channels_first();
        let mut af = vec![0.; cf.len()];
        for c in 0..6 {
            for i in 0..3 {
                af[i * 6 + c] = cf[c * 3 + i];
            }
        }
        let a = decode_output(&cf, &[1, 6, 3], 2).unwrap();
        let b = decode_output(&af, &[1, 3, 6], 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn post_process_applies_nms() {
        let objs = post_process(&channels_first(), &[1, 6, 3], 2, 0.25, 0.7, 300).unwrap();
        assert_eq!(objs.len(), 2);
        assert_eq!(objs[0].confidence, 0.9);
        assert_eq!(objs[1].class, 1);
    }

    #[test]
    fn rejects_mismatched_shape() {
        assert!(decode_output(&channels_first(), &[1, 6, 3], 5).is_err());
        assert!(decode_output(&channels_first(), &[1, 18], 2).is_err());
        assert!(decode_output(&[0.; 10], &[1, 6, 3], 2).is_err());
    }
}
