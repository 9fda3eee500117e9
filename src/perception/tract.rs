#![cfg(feature = "backend-tract")]

//! Tract-based perception backends for ONNX classifier models.
//!
//! Both backends load a local model file and run on-CPU inference; no
//! network I/O. Preprocessing mirrors the models' training pipelines:
//! resize to 224x224, scale to [0, 1], sigmoid head. The violence scorer
//! additionally blurs the frame before resizing.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};
use tract_onnx::prelude::*;

use super::adapter::{GenderClassifier, ViolenceScorer};
use super::types::{Gender, GenderEstimate};

const MODEL_INPUT_SIDE: u32 = 224;
const GENDER_DECISION_BOUNDARY: f32 = 0.7;
const GENDER_CONFIDENCE_FLOOR: f32 = 0.6;

/// Shared plumbing for single-output sigmoid classifiers.
struct OnnxSigmoidModel {
    plan: TypedSimplePlan<TypedModel>,
}

impl OnnxSigmoidModel {
    fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let plan = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, MODEL_INPUT_SIDE as usize, MODEL_INPUT_SIDE as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;
        Ok(Self { plan })
    }

    /// BGR pixels in, sigmoid score out.
    fn score(&self, bgr: &[u8], width: u32, height: u32, blur_sigma: Option<f32>) -> Result<f32> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("input dimensions overflow"))?;
        if bgr.len() != expected {
            return Err(anyhow!(
                "expected {} BGR bytes for {}x{}, received {}",
                expected,
                width,
                height,
                bgr.len()
            ));
        }

        let mut rgb = bgr.to_vec();
        for pixel in rgb.chunks_exact_mut(3) {
            pixel.swap(0, 2);
        }
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_raw(width, height, rgb)
            .ok_or_else(|| anyhow!("failed to wrap pixel buffer"))?;
        let img = match blur_sigma {
            Some(sigma) => imageops::blur(&img, sigma),
            None => img,
        };
        let resized = imageops::resize(&img, MODEL_INPUT_SIDE, MODEL_INPUT_SIDE, FilterType::Triangle);

        let side = MODEL_INPUT_SIDE as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
            resized.get_pixel(x as u32, y as u32).0[channel] as f32 / 255.0
        });

        let outputs = self
            .plan
            .run(tvec!(input.into_tensor().into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let score = view
            .iter()
            .next()
            .copied()
            .ok_or_else(|| anyhow!("model output tensor was empty"))?;
        Ok(score.clamp(0.0, 1.0))
    }
}

/// Whole-frame violence classifier.
pub struct TractViolenceScorer {
    model: OnnxSigmoidModel,
    blur_sigma: f32,
}

impl TractViolenceScorer {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        Ok(Self {
            model: OnnxSigmoidModel::load(model_path)?,
            blur_sigma: 1.0,
        })
    }
}

impl ViolenceScorer for TractViolenceScorer {
    fn name(&self) -> &'static str {
        "tract-violence"
    }

    fn score(&mut self, bgr: &[u8], width: u32, height: u32) -> Result<f32> {
        self.model.score(bgr, width, height, Some(self.blur_sigma))
    }
}

/// Per-face gender classifier. Sigmoid > 0.7 reads as female; estimates
/// under the 0.6 confidence floor are withheld.
pub struct TractGenderClassifier {
    model: OnnxSigmoidModel,
}

impl TractGenderClassifier {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        Ok(Self {
            model: OnnxSigmoidModel::load(model_path)?,
        })
    }
}

impl GenderClassifier for TractGenderClassifier {
    fn name(&self) -> &'static str {
        "tract-gender"
    }

    fn classify(
        &mut self,
        face_bgr: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Option<GenderEstimate>> {
        let raw = self.model.score(face_bgr, width, height, None)?;
        let (gender, confidence) = if raw > GENDER_DECISION_BOUNDARY {
            (Gender::Female, raw)
        } else {
            (Gender::Male, 1.0 - raw)
        };
        if confidence > GENDER_CONFIDENCE_FLOOR {
            Ok(Some(GenderEstimate { gender, confidence }))
        } else {
            Ok(None)
        }
    }
}
