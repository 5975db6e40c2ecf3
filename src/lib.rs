//! # エビ血リンパのTHC (Total Hemocyte Count) 計測ライブラリ
//!
//! このクレートは、血球計算盤の顕微鏡画像からYOLOで血球を検出し、
//! THCを計算して養殖池の管理方針を提示するためのRustライブラリです。
//!
//! ## 主な機能
//!
//! 1. **YOLOモデルの読み込み**: ONNX形式に変換したYOLOv8/YOLO11の検出モデルをCPUで動かします。
//! 2. **血球の検出と計数**: レターボックス処理、出力のデコード、NMSを行い、血球を数えます。
//! 3. **THCの計算**: 血球数・希釈倍率・1視野の体積から cells/μL と cells/mL を求めます。
//! 4. **管理方針の提示**: THCの区分に応じて水質・池底・給餌の推奨事項を返します。
//! 5. **レポート出力**: 検出結果を描画した画像、テキスト、JSONを書き出します。
//!
//! ## Example
//! ```no_run
//! use shrimp_thc::analysis::Analyzer;
//! use shrimp_thc::config::AnalysisConfig;
//! use shrimp_thc::detector::YoloDetector;
//! use shrimp_thc::report::text_report;
//!
//! let cfg = AnalysisConfig::default();
//! let detector = YoloDetector::new((&cfg).into())?;
//! let mut analyzer = Analyzer::new(detector, cfg)?;
//! let (analysis, _img) = analyzer.analyze_path("sample.jpg")?;
//! println!("{}", text_report(&analysis));
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod detection_result;
pub mod detector;
pub mod img_proc;
pub mod nms;
pub mod postprocess;
pub mod recommendation;
pub mod report;
pub mod thc;
