//! 解析結果をテキスト・JSONで出力するモジュール

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;

use crate::analysis::{Analysis, BatchSummary};
use crate::config::AnalysisConfig;
use crate::recommendation::Recommendation;

/// 仮数部2桁の指数表記 (`7.14e+04`) に整形します
pub fn format_sci(v: f64) -> String {
    let s = format!("{:.2e}", v);
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => s,
    }
}

fn status_line(rec: &Recommendation) -> String {
    format!("{} {}", rec.marker, rec.status)
}

/// 1枚の画像の解析結果をテキストレポートにします
pub fn text_report(analysis: &Analysis) -> String {
    let rec = analysis.recommendation();
    let thc = &analysis.thc;
    format!(
        "
HEMOCYTE COUNT ANALYSIS RESULTS
================================
Analysis Date: {}
Dilution Factor: {}x

COUNTS:
- Hemocytes Detected: {}
- THC (cells/μL): {}
- THC (cells/mL): {}

STATUS: {}
THC Range: {}

RECOMMENDATIONS:
Water Management: {}
Pond Bottom Management: {}
Feeding Management: {}
",
        analysis.analyzed_at.format("%Y-%m-%d %H:%M:%S"),
        thc.dilution_factor,
        thc.count,
        format_sci(thc.per_ul),
        format_sci(thc.per_ml),
        status_line(rec),
        rec.range,
        rec.water,
        rec.pond,
        rec.feeding,
    )
}

/// 複数の個体の集計をテキストレポートにします
pub fn batch_text_report(analyses: &[Analysis], summary: &BatchSummary) -> String {
    let rec = summary.status.recommendation();
    let samples: Vec<String> = analyses
        .iter()
        .map(|a| {
            format!(
                "- {}: {} hemocytes, {} cells/mL, {}",
                a.source.display(),
                a.count(),
                format_sci(a.thc.per_ml),
                a.recommendation().status
            )
        })
        .collect();
    format!(
        "
POND SUMMARY
================================
Samples: {}
Total Hemocytes Detected: {}
Mean THC (cells/mL): {}
Min THC (cells/mL): {}
Max THC (cells/mL): {}

SAMPLES:
{}

STATUS: {}
THC Range: {}

RECOMMENDATIONS:
Water Management: {}
Pond Bottom Management: {}
Feeding Management: {}
",
        summary.samples,
        summary.total_hemocytes,
        format_sci(summary.mean_per_ml),
        format_sci(summary.min_per_ml),
        format_sci(summary.max_per_ml),
        samples.join("\n"),
        status_line(rec),
        rec.range,
        rec.water,
        rec.pond,
        rec.feeding,
    )
}

#[derive(Debug, Serialize)]
struct JsonSettings<'a> {
    model: &'a Path,
    dilution_factor: u32,
    field_volume_ul: Option<f64>,
    conf_threshold: f32,
    iou_threshold: f32,
}

#[derive(Debug, Serialize)]
struct JsonSample<'a> {
    #[serde(flatten)]
    analysis: &'a Analysis,
    recommendation: &'static Recommendation,
}

/// JSONで出力するレポート
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    generated_at: DateTime<Local>,
    settings: JsonSettings<'a>,
    samples: Vec<JsonSample<'a>>,
    summary: Option<BatchSummary>,
}

impl<'a> JsonReport<'a> {
    pub fn new(config: &'a AnalysisConfig, analyses: &'a [Analysis]) -> Self {
        Self {
            generated_at: Local::now(),
            settings: JsonSettings {
                model: &config.model,
                dilution_factor: config.dilution_factor,
                field_volume_ul: config.field_volume_ul,
                conf_threshold: config.conf_threshold,
                iou_threshold: config.iou_threshold,
            },
            samples: analyses
                .iter()
                .map(|analysis| JsonSample {
                    analysis,
                    recommendation: analysis.recommendation(),
                })
                .collect(),
            summary: BatchSummary::from_analyses(analyses),
        }
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

/// テキストレポートをファイルに書き出します
pub fn write_text_report<P: AsRef<Path>>(path: P, text: &str) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    fs::write(path, text).with_context(|| format!("failed to write report {}", path.display()))
}

/// JSONレポートをファイルに書き出します
pub fn write_json_report<P: AsRef<Path>>(path: P, report: &JsonReport) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json).with_context(|| format!("failed to write report {}", path.display()))
}

/// 入力画像に対応する出力ファイルのパスを作ります (`<out_dir>/<stem><suffix>`)
pub fn output_path(out_dir: &Path, source: &Path, suffix: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    out_dir.join(format!("{stem}{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sci_matches_two_digit_exponent_style() {
        assert_eq!(format_sci(71_428.57), "7.14e+04");
        assert_eq!(format_sci(714_285.714), "7.14e+05");
        assert_eq!(format_sci(0.0), "0.00e+00");
        assert_eq!(format_sci(0.00123), "1.23e-03");
        assert_eq!(format_sci(1.5e12), "1.50e+12");
    }

    #[test]
    fn output_path_uses_stem() {
        let source = Path::new("imgs/shrimp_01.jpg");
        let p = output_path(Path::new("out"), source, "_annotated.png");
        assert_eq!(p, PathBuf::from("out/shrimp_01_annotated.png"));
    }
}
