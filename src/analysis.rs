//! 1枚の画像に対する検出・計数・THC計算をまとめて行うモジュール

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use image::{DynamicImage, RgbImage};
use log::info;
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::detection_result::DetectionData;
use crate::detector::Detector;
use crate::img_proc::{self, BoxStyle};
use crate::recommendation::{ImmunityStatus, Recommendation};
use crate::thc::{calculate_thc, ThcResult};

/// 1枚の画像の解析結果
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    /// 入力画像
    pub source: PathBuf,
    pub width: u32,
    pub height: u32,
    pub analyzed_at: DateTime<Local>,
    pub detections: Vec<DetectionData>,
    pub thc: ThcResult,
    pub status: ImmunityStatus,
}

impl Analysis {
    /// 検出された血球数
    pub fn count(&self) -> usize {
        self.detections.len()
    }

    pub fn recommendation(&self) -> &'static Recommendation {
        self.status.recommendation()
    }
}

/// 検出器と設定をまとめて保持し、画像を順に解析する構造体
pub struct Analyzer<D: Detector> {
    detector: D,
    config: AnalysisConfig,
    style: BoxStyle,
}

impl<D: Detector> Analyzer<D> {
    /// 新しい `Analyzer` を作成します。フォントが設定されていれば読み込みます。
    pub fn new(detector: D, config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let font = config.font.as_ref().map(img_proc::load_font).transpose()?;
        let style = BoxStyle {
            font,
            ..BoxStyle::default()
        };
        Ok(Self {
            detector,
            config,
            style,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// 画像ファイルを読み込んで解析します
    pub fn analyze_path<P: AsRef<Path>>(&mut self, path: P) -> Result<(Analysis, DynamicImage)> {
        let path = path.as_ref();
        let img = image::open(path)
            .with_context(|| format!("failed to open image {}", path.display()))?;
        let analysis = self.analyze_image(&img, path)?;
        Ok((analysis, img))
    }

    /// 読み込み済みの画像を解析します
    ///
    /// # Args
    /// * `img` - 入力画像
    /// * `source` - 入力画像のパス (レポート用)
    pub fn analyze_image(&mut self, img: &DynamicImage, source: &Path) -> Result<Analysis> {
        let start = Instant::now();
        let detections = self
            .detector
            .detect(img)
            .with_context(|| format!("hemocyte detection failed for {}", source.display()))?;
        let t = start.elapsed().as_secs_f64() * 1000.0;

        let thc = calculate_thc(
            detections.len(),
            self.config.dilution_factor,
            self.config.field_volume_ul,
        )?;
        let status = ImmunityStatus::from_thc_per_ml(thc.per_ml);
        info!(
            "{}: {} hemocytes, THC {:.3e} cells/mL ({}), {:.1}ms",
            source.display(),
            thc.count,
            thc.per_ml,
            status,
            t
        );

        Ok(Analysis {
            source: source.to_path_buf(),
            width: img.width(),
            height: img.height(),
            analyzed_at: Local::now(),
            detections,
            thc,
            status,
        })
    }

    /// 検出結果を描画した画像を返します
    pub fn annotate(&self, img: &DynamicImage, analysis: &Analysis) -> RgbImage {
        let mut rgb_img = img.to_rgb8();
        img_proc::draw_bbox(
            &mut rgb_img,
            &analysis.detections,
            self.detector.class_names(),
            &self.style,
        );
        rgb_img
    }
}

/// 複数の個体 (画像) をまとめた池単位の集計
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub samples: usize,
    pub total_hemocytes: usize,
    pub mean_per_ml: f64,
    pub min_per_ml: f64,
    pub max_per_ml: f64,
    /// 平均値に対する免疫状態
    pub status: ImmunityStatus,
}

impl BatchSummary {
    /// 解析結果を集計します。空なら `None` を返します。
    pub fn from_analyses(analyses: &[Analysis]) -> Option<Self> {
        if analyses.is_empty() {
            return None;
        }
        let values = analyses.iter().map(|a| a.thc.per_ml);
        let mean_per_ml = values.clone().sum::<f64>() / analyses.len() as f64;
        Some(Self {
            samples: analyses.len(),
            total_hemocytes: analyses.iter().map(Analysis::count).sum(),
            mean_per_ml,
            min_per_ml: values.clone().fold(f64::INFINITY, f64::min),
            max_per_ml: values.fold(f64::NEG_INFINITY, f64::max),
            status: ImmunityStatus::from_thc_per_ml(mean_per_ml),
        })
    }
}
