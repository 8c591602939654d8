#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use serde::Deserialize;
use tract_onnx::prelude::*;

use super::labels::ClassLabel;
use super::{Classifier, RawPrediction};
use crate::frame::Frame;

const DEFAULT_IMG_SIZE: u32 = 224;
const DEFAULT_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const DEFAULT_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Deserialize, Default)]
struct PreprocessFile {
    img_size: Option<u32>,
    mean: Option<[f32; 3]>,
    std: Option<[f32; 3]>,
}

/// Tract-based ONNX classifier.
///
/// Loads a local image-classification model whose single output is a `[1, C]`
/// logit vector, plus a JSON array of `C` class labels and an optional JSON
/// preprocessing file (`img_size`, `mean`, `std`).
pub struct OnnxClassifier {
    model: TypedRunnableModel<TypedModel>,
    class_names: Vec<String>,
    img_size: u32,
    mean: [f32; 3],
    std: [f32; 3],
    presence_min_conf: f32,
}

impl OnnxClassifier {
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        labels_path: P,
        preprocess_path: Option<P>,
        presence_min_conf: f32,
    ) -> Result<Self> {
        let labels_path = labels_path.as_ref();
        let raw = std::fs::read_to_string(labels_path)
            .with_context(|| format!("failed to read class names {}", labels_path.display()))?;
        let class_names: Vec<String> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid class names {}", labels_path.display()))?;
        if class_names.is_empty() {
            return Err(anyhow!("class names file {} is empty", labels_path.display()));
        }

        let preprocess = match preprocess_path {
            Some(path) => {
                let path = path.as_ref();
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read preprocess {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("invalid preprocess {}", path.display()))?
            }
            None => PreprocessFile::default(),
        };
        let img_size = preprocess.img_size.unwrap_or(DEFAULT_IMG_SIZE);
        if img_size == 0 {
            return Err(anyhow!("preprocess img_size must be non-zero"));
        }

        let model_path = model_path.as_ref();
        let side = img_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "onnx classifier loaded from {} ({} classes, {}px input)",
            model_path.display(),
            class_names.len(),
            img_size
        );

        Ok(Self {
            model,
            class_names,
            img_size,
            mean: preprocess.mean.unwrap_or(DEFAULT_MEAN),
            std: preprocess.std.unwrap_or(DEFAULT_STD),
            presence_min_conf,
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let rgb = image::RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        let resized = image::imageops::resize(&rgb, self.img_size, self.img_size, FilterType::Triangle);
        let side = self.img_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            let v = resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
            (v - self.mean[c]) / self.std[c]
        });
        Ok(input.into_tensor())
    }
}

/// Numerically stable softmax.
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f64> = logits.iter().map(|&l| ((l - max) as f64).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|&e| (e / sum) as f32).collect()
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn predict(&mut self, frame: &Frame) -> Result<RawPrediction> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let logits: Vec<f32> = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .iter()
            .cloned()
            .collect();
        if logits.len() != self.class_names.len() {
            return Err(anyhow!(
                "model produced {} scores for {} classes",
                logits.len(),
                self.class_names.len()
            ));
        }

        let probs = softmax(&logits);
        let (best, confidence) = probs
            .iter()
            .cloned()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });
        if !confidence.is_finite() {
            return Err(anyhow!("model produced non-finite scores"));
        }

        let label = &self.class_names[best];
        log::debug!("onnx top class {} ({:.3})", label, confidence);
        Ok(ClassLabel::parse(label).into_prediction(confidence, self.presence_min_conf))
    }
}
