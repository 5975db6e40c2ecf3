//! 物体検出の結果を処理するモジュール

use serde::Serialize;

use crate::img_proc::Letterbox;

/// YOLOから得られた1つの検出結果を保持するための構造体
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionData {
    /// クラス
    pub class: u16,
    /// バウンディングボックス左上のx
    pub x1: f32,
    /// バウンディングボックス左上のy
    pub y1: f32,
    /// バウンディングボックス右下のx
    pub x2: f32,
    /// バウンディングボックス右下のy
    pub y2: f32,
    /// コンフィデンス
    pub confidence: f32,
}

impl DetectionData {
    /// YOLOの結果から新しいDetectionDataを作成します。
    ///
    /// # Args
    ///
    /// * `cx`, `cy` - BBoxの中心座標
    /// * `w`, `h` - BBoxのサイズ
    /// * `confidence` - コンフィデンス
    /// * `cls_id` - クラスID
    ///
    /// # Return
    /// * 新たなDetectionDataインスタンス
    pub fn new_from_yolo(cx: f32, cy: f32, w: f32, h: f32, confidence: f32, cls_id: u16) -> Self {
        Self {
            class: cls_id,
            x1: cx - w / 2.,
            y1: cy - h / 2.,
            x2: cx + w / 2.,
            y2: cy + h / 2.,
            confidence,
        }
    }

    /// YOLOの出力した検出結果の座標を元の画像の座標系に戻します。
    /// 画像の外にはみ出した部分は切り取られます。
    ///
    /// # Args
    ///
    /// * `lb` - 入力画像に適用したレターボックスの情報
    ///
    /// # Return
    /// * 新たなDetectionDataインスタンス
    pub fn reverse_transform(&self, lb: &Letterbox) -> Self {
        let mut new_d = *self;
        (new_d.x1, new_d.y1) = lb.reverse_point(self.x1, self.y1);
        (new_d.x2, new_d.y2) = lb.reverse_point(self.x2, self.y2);
        new_d.clip(lb.src_width as f32, lb.src_height as f32)
    }

    /// 座標を `[0, width] x [0, height]` に収めます。
    pub fn clip(&self, width: f32, height: f32) -> Self {
        let mut new_d = *self;
        new_d.x1 = self.x1.clamp(0., width);
        new_d.x2 = self.x2.clamp(0., width);
        new_d.y1 = self.y1.clamp(0., height);
        new_d.y2 = self.y2.clamp(0., height);
        new_d
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}
