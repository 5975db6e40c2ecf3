//! YOLOのモデルをコントロールするモジュール

use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use image::DynamicImage;
use log::{debug, info};
use tract_onnx::prelude::*;

use crate::config::AnalysisConfig;
use crate::detection_result::DetectionData;
use crate::img_proc;
use crate::postprocess;

/// 画像から血球を検出するもの
pub trait Detector {
    /// 画像を処理し、元画像の座標系で検出結果を返します
    fn detect(&mut self, img: &DynamicImage) -> Result<Vec<DetectionData>>;

    /// クラス名
    fn class_names(&self) -> &[String];
}

/// YOLOの推論パラメータ
#[derive(Debug, Clone)]
pub struct YoloParams {
    pub model: PathBuf,
    pub input_size: u32,
    pub class_names: Vec<String>,
    pub obj_threshold: f32,
    pub nms_threshold: f32,
    pub max_det: usize,
}

impl From<&AnalysisConfig> for YoloParams {
    fn from(cfg: &AnalysisConfig) -> Self {
        Self {
            model: cfg.model.clone(),
            input_size: cfg.input_size,
            class_names: cfg.class_names.clone(),
            obj_threshold: cfg.conf_threshold,
            nms_threshold: cfg.iou_threshold,
            max_det: cfg.max_det,
        }
    }
}

/// ONNX形式のYOLOモデルをCPUで動かす構造体
pub struct YoloDetector {
    plan: TypedRunnableModel<TypedModel>,
    params: YoloParams,
}

impl YoloDetector {
    /// モデルを読み込み、推論できる状態にします。
    ///
    /// # Args
    /// * `params` - 推論パラメータ
    ///
    /// # Return
    /// * 新たな `YoloDetector` インスタンス
    pub fn new(params: YoloParams) -> Result<Self> {
        ensure!(
            params.input_size > 0 && params.input_size % 32 == 0,
            "input size must be a positive multiple of 32, got {}",
            params.input_size
        );
        ensure!(!params.class_names.is_empty(), "class names must not be empty");
        let plan = load_plan(&params.model, params.input_size)?;
        info!(
            "loaded YOLO model {} (input {}x{}, {} classes)",
            params.model.display(),
            params.input_size,
            params.input_size,
            params.class_names.len()
        );
        Ok(Self { plan, params })
    }

    /// 前処理済みのデータに対して推論を行い、出力テンソルとその形状を返します。
    pub fn forward(&self, input_data: Vec<f32>) -> Result<(Vec<f32>, Vec<usize>)> {
        let size = self.params.input_size as usize;
        let input: Tensor =
            tract_ndarray::Array4::from_shape_vec((1, 3, size, size), input_data)?.into();
        let outputs = self.plan.run(tvec!(input.into()))?;
        let output = outputs[0].to_array_view::<f32>()?;
        Ok((output.iter().copied().collect(), output.shape().to_vec()))
    }
}

fn load_plan(path: &Path, input_size: u32) -> Result<TypedRunnableModel<TypedModel>> {
    if path.extension().and_then(|e| e.to_str()) == Some("pt") {
        bail!(
            "{} is a PyTorch checkpoint; export it to ONNX first (yolo export model={} format=onnx)",
            path.display(),
            path.display()
        );
    }
    if !path.exists() {
        bail!("model not found: {}", path.display());
    }
    let size = input_size as usize;
    let plan = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to load ONNX model {}", path.display()))?
        .with_input_fact(0, f32::fact([1, 3, size, size]).into())?
        .into_optimized()
        .with_context(|| format!("failed to optimize ONNX model {}", path.display()))?
        .into_runnable()?;
    Ok(plan)
}

impl Detector for YoloDetector {
    fn detect(&mut self, img: &DynamicImage) -> Result<Vec<DetectionData>> {
        let (input_data, lb) = img_proc::letterbox(img, self.params.input_size)?;
        let (output, shape) = self.forward(input_data)?;
        debug!("YOLO output shape {:?}", shape);

        let objs = postprocess::post_process(
            &output,
            &shape,
            self.params.class_names.len(),
            self.params.obj_threshold,
            self.params.nms_threshold,
            self.params.max_det,
        )?;

        Ok(objs.iter().map(|d| d.reverse_transform(&lb)).collect())
    }

    fn class_names(&self) -> &[String] {
        &self.params.class_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(model: &str) -> YoloParams {
        YoloParams {
            model: PathBuf::from(model),
            ..YoloParams::from(&AnalysisConfig::default())
        }
    }

    #[test]
    fn pytorch_checkpoint_is_rejected_with_hint() {
        let err = YoloDetector::new(params("model.pt")).err().unwrap();
        assert!(err.to_string().contains("format=onnx"));
    }

    #[test]
    fn bad_input_size_is_an_error() {
        for size in [0, 100] {
            let p = YoloParams {
                input_size: size,
                ..params("does/not/exist.onnx")
            };
            let err = YoloDetector::new(p).err().unwrap();
            assert!(err.to_string().contains("multiple of 32"));
        }
    }

    #[test]
    fn missing_model_is_an_error() {
        let err = YoloDetector::new(params("does/not/exist.onnx")).err().unwrap();
        assert!(err.to_string().contains("model not found"));
    }
}
