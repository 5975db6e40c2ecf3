//! 解析の設定
//!
//! TOMLファイルから読み込み、コマンドライン引数で上書きします。
//!
//! ```toml
//! model = "weights/hemocyte.onnx"
//! dilution_factor = 2
//! conf_threshold = 0.3
//! ```

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::thc::DILUTION_RANGE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// ONNX形式のYOLOモデル
    pub model: PathBuf,
    /// YOLOの入力サイズ (正方形)
    pub input_size: u32,
    /// コンフィデンスの閾値
    pub conf_threshold: f32,
    /// NMSのIoU閾値
    pub iou_threshold: f32,
    /// 1枚あたりの検出数の上限
    pub max_det: usize,
    /// モデルのクラス名
    pub class_names: Vec<String>,
    /// 希釈倍率
    pub dilution_factor: u32,
    /// 1視野の体積 [μL] (Noneなら既定の換算係数を使う)
    pub field_volume_ul: Option<f64>,
    /// 出力先ディレクトリ
    pub out_dir: PathBuf,
    /// ラベル描画に使うTTFフォント
    pub font: Option<PathBuf>,
    /// 検出結果を描画した画像を保存するか
    pub annotate: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("model.onnx"),
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.7,
            max_det: 300,
            class_names: vec!["hemocyte".to_string()],
            dilution_factor: 1,
            field_volume_ul: None,
            out_dir: PathBuf::from("out"),
            font: None,
            annotate: true,
        }
    }
}

impl AnalysisConfig {
    /// TOMLファイルから設定を読み込みます。書かれていない項目は既定値になります。
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(cfg)
    }

    /// 値の範囲を確認します
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.input_size > 0 && self.input_size % 32 == 0,
            "input_size must be a positive multiple of 32, got {}",
            self.input_size
        );
        ensure!(
            (0.0..=1.0).contains(&self.conf_threshold),
            "conf_threshold must be within [0, 1], got {}",
            self.conf_threshold
        );
        ensure!(
            (0.0..=1.0).contains(&self.iou_threshold),
            "iou_threshold must be within [0, 1], got {}",
            self.iou_threshold
        );
        ensure!(self.max_det > 0, "max_det must be at least 1");
        ensure!(!self.class_names.is_empty(), "class_names must not be empty");
        ensure!(
            DILUTION_RANGE.contains(&self.dilution_factor),
            "dilution_factor must be between {} and {}, got {}",
            DILUTION_RANGE.start(),
            DILUTION_RANGE.end(),
            self.dilution_factor
        );
        if let Some(v) = self.field_volume_ul {
            ensure!(
                v.is_finite() && v > 0.,
                "field_volume_ul must be positive, got {}",
                v
            );
        }
        Ok(())
    }
}
