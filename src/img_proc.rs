//! YOLOに関する画像処理モジュール

use std::num::NonZeroU32;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use fast_image_resize as fr;
use image::{DynamicImage, Pixel, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};

use crate::detection_result::DetectionData;

/// レターボックスの余白に詰める値 (0-255)
pub const PAD_VALUE: u8 = 114;

/// 画像を正方形の入力に整形したときの幾何情報
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// 元画像の幅
    pub src_width: u32,
    /// 元画像の高さ
    pub src_height: u32,
    /// 入力サイズ (正方形)
    pub size: u32,
    /// 拡大縮小率
    pub ratio: f32,
    /// リサイズ後の幅
    pub new_width: u32,
    /// リサイズ後の高さ
    pub new_height: u32,
    /// 左側の余白
    pub pad_left: u32,
    /// 上側の余白
    pub pad_top: u32,
}

impl Letterbox {
    /// アスペクト比を保ったまま `size` に収まるリサイズと余白を計算します。
    ///
    /// # Args
    ///
    /// * `width`, `height` - 元画像のサイズ
    /// * `size` - YOLOの入力サイズ
    pub fn new(width: u32, height: u32, size: u32) -> Self {
        let ratio = f32::min(size as f32 / height as f32, size as f32 / width as f32);
        let new_width = ((width as f32 * ratio).round() as u32).min(size).max(1);
        let new_height = ((height as f32 * ratio).round() as u32).min(size).max(1);

        let dw = size.saturating_sub(new_width) as f32 / 2.;
        let dh = size.saturating_sub(new_height) as f32 / 2.;

        Self {
            src_width: width,
            src_height: height,
            size,
            ratio,
            new_width,
            new_height,
            pad_left: (dw - 0.1).round().max(0.) as u32,
            pad_top: (dh - 0.1).round().max(0.) as u32,
        }
    }

    /// YOLOの入力座標を元画像の座標に戻します。
    pub fn reverse_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_left as f32) / self.ratio,
            (y - self.pad_top as f32) / self.ratio,
        )
    }
}

/// RGB画像をバイリニア補間でリサイズします。
fn resize_rgb(img: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    let src_w = NonZeroU32::new(img.width()).context("image width is zero")?;
    let src_h = NonZeroU32::new(img.height()).context("image height is zero")?;
    let dst_w = NonZeroU32::new(width).context("resize width is zero")?;
    let dst_h = NonZeroU32::new(height).context("resize height is zero")?;

    let src = fr::Image::from_vec_u8(src_w, src_h, img.as_raw().clone(), fr::PixelType::U8x3)?;
    let mut dst = fr::Image::new(dst_w, dst_h, src.pixel_type());

    let mut resizer = fr::Resizer::new(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));
    resizer.resize(&src.view(), &mut dst.view_mut())?;

    RgbImage::from_raw(width, height, dst.into_vec()).context("resized buffer size mismatch")
}

/// 画像をリサイズし、正方形に整形したYOLO入力データ (NCHW, 0.0-1.0) を生成します。
///
/// # Args
///
/// * `img` - 入力画像
/// * `size` - YOLOの入力サイズ
///
/// # Return
///
/// * 入力データとレターボックスの情報
pub fn letterbox(img: &DynamicImage, size: u32) -> Result<(Vec<f32>, Letterbox)> {
    ensure!(size > 0, "input size must be positive");
    ensure!(
        img.width() > 0 && img.height() > 0,
        "image has no pixels ({}x{})",
        img.width(),
        img.height()
    );
    let lb = Letterbox::new(img.width(), img.height(), size);
    let resized = resize_rgb(&img.to_rgb8(), lb.new_width, lb.new_height)?;

    let plane = (size * size) as usize;
    let mut data = vec![PAD_VALUE as f32 / 255.; 3 * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let base_addr = ((y + lb.pad_top) * size + x + lb.pad_left) as usize;
        for c in 0..3 {
            data[c * plane + base_addr] = pixel[c] as f32 / 255.;
        }
    }
    Ok((data, lb))
}

const COLORS: [[u8; 3]; 10] = [
    [0, 255, 0],
    [255, 0, 0],
    [255, 255, 0],
    [0, 0, 255],
    [28, 105, 80],
    [190, 159, 53],
    [46, 194, 148],
    [242, 30, 131],
    [97, 101, 198],
    [115, 11, 87],
];

/// BBoxの描画設定
pub struct BoxStyle {
    /// 線の太さ
    pub line_thickness: f32,
    /// ラベルのフォント (Noneならラベルを描画しない)
    pub font: Option<Font<'static>>,
    /// ラベルのフォントサイズ
    pub font_size: f32,
}

impl Default for BoxStyle {
    fn default() -> Self {
        Self {
            line_thickness: 2.,
            font: None,
            font_size: 16.,
        }
    }
}

/// TTFフォントファイルを読み込みます。
pub fn load_font<P: AsRef<Path>>(path: P) -> Result<Font<'static>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read font {}", path.display()))?;
    Font::try_from_vec(bytes).with_context(|| format!("invalid font file {}", path.display()))
}

/// 画像上に線を描画します。
///
/// # Args
///
/// * `img` - 線を描画する画像 (in-place)
/// * `x1`, `y1`, `x2`, `y2` - 線の始点と終点の座標
/// * `thickness` - 線の太さ
/// * `color` - 線の色
fn draw_line(
    img: &mut RgbImage,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    thickness: f32,
    color: Rgb<u8>,
) {
    let (bx, by) = (x1 - (thickness / 2.).floor(), y1 - (thickness / 2.).floor());

    let (w, h) = if x1 == x2 {
        (thickness, (y2 - y1).abs() + thickness)
    } else {
        ((x2 - x1).abs() + thickness, thickness)
    };

    let rect = Rect::at(bx as i32, by as i32).of_size(w as u32, h as u32);
    draw_filled_rect_mut(img, rect, color);
}

/// 画像上に矩形を描画します。
fn draw_rect(
    img: &mut RgbImage,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    thickness: f32,
    color: Rgb<u8>,
) {
    draw_line(img, x1, y1, x1, y2, thickness, color);
    draw_line(img, x1, y2, x2, y2, thickness, color);
    draw_line(img, x1, y1, x2, y1, thickness, color);
    draw_line(img, x2, y1, x2, y2, thickness, color);
}

/// 画像上にラベルを描画します。
///
/// # Args
///
/// * `img` - ラベルを描画する画像 (in-place)
/// * `x1`, `y1` - ラベルの左上の座標
/// * `line_thickness` - ラベルの枠線の太さ
/// * `bg_color` - ラベルの背景色
/// * `font` - ラベルのフォント
/// * `font_size` - ラベルのフォントサイズ
/// * `text` - ラベルに表示するテキスト
#[allow(clippy::too_many_arguments)]
fn draw_label(
    img: &mut RgbImage,
    x1: f32,
    y1: f32,
    line_thickness: f32,
    bg_color: Rgb<u8>,
    font: &Font,
    font_size: f32,
    text: &str,
) {
    let label_h = font_size;
    let dx1 = x1 - (line_thickness / 2.).floor();
    // 上に収まらないときは枠の内側に描く
    let label_y = if y1 - label_h < 0. { y1 } else { y1 - label_h };

    let pad = 6.;
    let scale = Scale::uniform(label_h);
    let (text_w, _) = text_size(scale, font, text);
    let v_metrics = font.v_metrics(scale);
    let text_h = v_metrics.ascent - v_metrics.descent + v_metrics.line_gap;

    let rect = Rect::at(dx1 as i32, label_y as i32)
        .of_size((text_w.max(0) as f32 + pad * 2.) as u32, label_h.max(1.) as u32);
    draw_filled_rect_mut(img, rect, bg_color);

    let text_y = label_y + (label_h - text_h) / 2.;

    let text_color = if (bg_color[0] as i32 + bg_color[1] as i32 + bg_color[2] as i32) < 382 {
        Rgb([255u8, 255, 255])
    } else {
        Rgb([0u8, 0, 0])
    };
    draw_text_mut(
        img,
        text_color,
        (dx1 + pad) as i32,
        text_y as i32,
        scale,
        font,
        text,
    );
}

/// 画像上にバウンディングボックスとラベルを描画します。
///
/// # Args
///
/// * `img` - バウンディングボックスとラベルを描画する画像 (in-place)
/// * `d_result` - 検出結果の配列
/// * `class_names` - クラス名 (ラベルに使用)
/// * `style` - 描画設定
pub fn draw_bbox(
    img: &mut RgbImage,
    d_result: &[DetectionData],
    class_names: &[String],
    style: &BoxStyle,
) {
    let thickness = style.line_thickness.max(1.);
    let mut sorted = d_result.to_vec();
    sorted.sort_by(|a, b| a.confidence.total_cmp(&b.confidence));

    for d in sorted.iter() {
        let color: Rgb<u8> = *Rgb::from_slice(&COLORS[d.class as usize % COLORS.len()]);

        let x1 = d.x1.round();
        let y1 = d.y1.round();
        let x2 = d.x2.round();
        let y2 = d.y2.round();

        draw_rect(img, x1, y1, x2, y2, thickness, color);

        if let Some(font) = &style.font {
            let name = class_names
                .get(d.class as usize)
                .map(String::as_str)
                .unwrap_or("?");
            let text = format!("{}: {:.2}", name, d.confidence);
            draw_label(img, x1, y1, thickness, color, font, style.font_size, &text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letterbox_geometry_for_wide_image() {
        let lb = Letterbox::new(1280, 720, 640);
        assert_eq!(lb.ratio, 0.5);
        assert_eq!((lb.new_width, lb.new_height), (640, 360));
        assert_eq!((lb.pad_left, lb.pad_top), (0, 140));
    }

    #[test]
    fn letterbox_geometry_for_tall_image() {
        let lb = Letterbox::new(300, 600, 640);
        assert!((lb.ratio - 640. / 600.).abs() < 1e-6);
        assert_eq!(lb.new_height, 640);
        assert_eq!(lb.new_width, 320);
        assert_eq!(lb.pad_left, 160);
        assert_eq!(lb.pad_top, 0);
    }

    #[test]
    fn letterbox_pads_with_grey_and_keeps_pixels() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 32, Rgb([255, 0, 0])));
        let (data, lb) = letterbox(&img, 64).unwrap();
        assert_eq!(data.len(), 3 * 64 * 64);
        assert_eq!(lb.pad_top, 16);

        let plane = 64 * 64;
        // 余白
        assert!((data[0] - 114. / 255.).abs() < 1e-6);
        // 画像の中央 (赤)
        let centre = 32 * 64 + 32;
        assert!((data[centre] - 1.0).abs() < 1e-6);
        assert!(data[plane + centre].abs() < 1e-6);
        assert!(data[2 * plane + centre].abs() < 1e-6);
    }

    #[test]
    fn zero_input_size_is_an_error() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(10, 10));
        assert!(letterbox(&img, 0).is_err());
        // 幾何計算だけなら落ちない
        let lb = Letterbox::new(10, 10, 0);
        assert_eq!((lb.pad_left, lb.pad_top), (0, 0));
    }

    #[test]
    fn draw_bbox_paints_box_edges() {
        let mut img = RgbImage::new(40, 40);
        let d = DetectionData {
            class: 0,
            x1: 10.,
            y1: 10.,
            x2: 30.,
            y2: 30.,
            confidence: 0.9,
        };
        draw_bbox(&mut img, &[d], &["hemocyte".to_string()], &BoxStyle::default());
        assert_eq!(*img.get_pixel(10, 20), Rgb([0, 255, 0]));
        assert_eq!(*img.get_pixel(20, 30), Rgb([0, 255, 0]));
        assert_eq!(*img.get_pixel(20, 20), Rgb([0, 0, 0]));
    }
}
