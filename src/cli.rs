//! コマンドライン引数と各サブコマンドの処理

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use crate::analysis::{Analysis, Analyzer, BatchSummary};
use crate::config::AnalysisConfig;
use crate::detector::Detector;
use crate::recommendation::{all_tiers, KEY_FACTORS, MONITORING};
use crate::report::{self, JsonReport};

/// 複数画像のときに書き出す集計レポート
pub const BATCH_SUMMARY_FILE: &str = "batch_summary.txt";
/// `--json` のときに書き出すレポート
pub const JSON_REPORT_FILE: &str = "THC_analysis_results.json";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Count shrimp hemocytes with YOLO and compute the Total Hemocyte Count (THC)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze one or more hemocytometer images.
    Analyze(AnalyzeArgs),
    /// Print the THC ranges, key factors and monitoring advice.
    Ranges,
}

#[derive(Parser, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Hemolymph images (jpg, jpeg, png).
    #[arg(required = true)]
    pub images: Vec<PathBuf>,
    /// TOML config file; command line flags override it.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// YOLO model exported to ONNX.
    #[arg(long)]
    pub model: Option<PathBuf>,
    /// Dilution factor used in sample preparation (1 = no dilution).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub dilution: Option<u32>,
    /// Confidence threshold.
    #[arg(long)]
    pub conf: Option<f32>,
    /// IoU threshold for NMS.
    #[arg(long)]
    pub iou: Option<f32>,
    /// Model input size.
    #[arg(long)]
    pub imgsz: Option<u32>,
    /// Hemolymph volume imaged by one microscope field, in microliters.
    #[arg(long)]
    pub field_volume: Option<f64>,
    /// Output directory for annotated images and reports.
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
    /// TTF font used to label boxes.
    #[arg(long)]
    pub font: Option<PathBuf>,
    /// Also write THC_analysis_results.json.
    #[arg(long, default_value_t = false)]
    pub json: bool,
    /// Do not save annotated images.
    #[arg(long, default_value_t = false)]
    pub no_annotate: bool,
}

impl AnalyzeArgs {
    /// 設定ファイルを読み込み、指定されたフラグで上書きします。
    pub fn to_config(&self) -> Result<AnalysisConfig> {
        let mut cfg = match &self.config {
            Some(path) => AnalysisConfig::from_path(path)?,
            None => AnalysisConfig::default(),
        };
        if let Some(v) = &self.model {
            cfg.model = v.clone();
        }
        if let Some(v) = self.dilution {
            cfg.dilution_factor = v;
        }
        if let Some(v) = self.conf {
            cfg.conf_threshold = v;
        }
        if let Some(v) = self.iou {
            cfg.iou_threshold = v;
        }
        if let Some(v) = self.imgsz {
            cfg.input_size = v;
        }
        if let Some(v) = self.field_volume {
            cfg.field_volume_ul = Some(v);
        }
        if let Some(v) = &self.out_dir {
            cfg.out_dir = v.clone();
        }
        if let Some(v) = &self.font {
            cfg.font = Some(v.clone());
        }
        if self.no_annotate {
            cfg.annotate = false;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// 入力画像がすべて存在するか確認します
    pub fn check_images(&self) -> Result<()> {
        for img in &self.images {
            if !img.exists() {
                bail!("input image not found: {}", img.display());
            }
        }
        Ok(())
    }
}

/// `analyze` サブコマンドの本体
///
/// 画像ごとに描画画像とテキストレポートを書き出し、2枚以上なら集計レポートも書き出します。
///
/// # Args
/// * `args` - コマンドライン引数
/// * `cfg` - `args` から組み立てた設定
/// * `detector` - 血球の検出器
///
/// # Return
/// * 画像ごとの解析結果
pub fn run_analyze<D: Detector>(
    args: &AnalyzeArgs,
    cfg: AnalysisConfig,
    detector: D,
) -> Result<Vec<Analysis>> {
    args.check_images()?;

    let mut analyzer = Analyzer::new(detector, cfg)?;
    let out_dir = analyzer.config().out_dir.clone();
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create output directory {}", out_dir.display()))?;

    let mut analyses = Vec::with_capacity(args.images.len());
    for path in &args.images {
        let (analysis, img) = analyzer.analyze_path(path)?;

        if analyzer.config().annotate {
            let out = report::output_path(&out_dir, path, "_annotated.png");
            analyzer
                .annotate(&img, &analysis)
                .save(&out)
                .with_context(|| format!("failed to save annotated image {}", out.display()))?;
            info!("saved annotated image to {}", out.display());
        }

        let text = report::text_report(&analysis);
        let out = report::output_path(&out_dir, path, "_THC_analysis_results.txt");
        report::write_text_report(&out, &text)?;
        println!("{}", text);

        if analysis.count() == 0 {
            warn!("no hemocytes detected in {}", path.display());
        }
        analyses.push(analysis);
    }

    if analyses.len() > 1 {
        if let Some(summary) = BatchSummary::from_analyses(&analyses) {
            let text = report::batch_text_report(&analyses, &summary);
            report::write_text_report(out_dir.join(BATCH_SUMMARY_FILE), &text)?;
            println!("{}", text);
        }
    }

    if args.json {
        let out = out_dir.join(JSON_REPORT_FILE);
        report::write_json_report(&out, &JsonReport::new(analyzer.config(), &analyses))?;
        info!("saved JSON report to {}", out.display());
    }
    Ok(analyses)
}

fn bullet_list(items: &[(&str, &str)]) -> String {
    items
        .iter()
        .map(|(name, text)| format!("- {}: {}\n", name, text))
        .collect()
}

/// `ranges` サブコマンドで表示する文字列
pub fn ranges_text() -> String {
    let tiers: Vec<String> = all_tiers()
        .map(|(_, rec)| {
            format!(
                "{} {}
Range: {}
Water Management: {}
Pond Bottom Management: {}
Feeding Management: {}
",
                rec.marker, rec.status, rec.range, rec.water, rec.pond, rec.feeding
            )
        })
        .collect();
    format!(
        "{}
KEY FACTORS AFFECTING THC
{}
MONITORING RECOMMENDATIONS
{}",
        tiers.join("\n"),
        bullet_list(&KEY_FACTORS),
        bullet_list(&MONITORING)
    )
}
