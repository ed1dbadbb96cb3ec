use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tract_onnx::prelude::*;
use tract_onnx::tract_hir::internal::DimLike;

use crate::config::ModelConfig;
use crate::error::AppError;
use crate::models::{Label, PredictionResponse};
use crate::preprocess::{InputSpec, Layout, Preprocessor, DEFAULT_INPUT_SIZE};

/// Sigmoid output at or above this is the positive class, `loaf`.
pub const THRESHOLD: f64 = 0.5;

/// A model that maps one preprocessed image to a single probability.
pub trait Scorer: Send + Sync {
    fn input_spec(&self) -> InputSpec;

    fn score(&self, input: Tensor) -> Result<f32, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: Label,
    /// Probability of `label`, in `0.0..=1.0`.
    pub probability: f64,
}

impl Prediction {
    pub fn from_score(score: f32) -> Result<Self, AppError> {
        if !score.is_finite() {
            return Err(AppError::Inference(format!(
                "model produced a non-finite score: {score}"
            )));
        }
        // Widen before `1 - score` so the rounded percentage is computed in f64.
        let score = f64::from(score).clamp(0.0, 1.0);
        let prediction = if score >= THRESHOLD {
            Prediction {
                label: Label::Loaf,
                probability: score,
            }
        } else {
            Prediction {
                label: Label::Cat,
                probability: 1.0 - score,
            }
        };
        Ok(prediction)
    }

    /// Confidence as a percentage with two decimals.
    pub fn confidence(&self) -> f64 {
        (self.probability * 100.0 * 100.0).round() / 100.0
    }
}

impl From<Prediction> for PredictionResponse {
    fn from(prediction: Prediction) -> Self {
        PredictionResponse {
            label: prediction.label,
            confidence: prediction.confidence(),
        }
    }
}

pub struct TractModel {
    plan: TypedRunnableModel<TypedModel>,
    spec: InputSpec,
}

fn model_err(e: TractError) -> AppError {
    AppError::ModelLoad(format!("{e:#}"))
}

impl TractModel {
    /// Loads an ONNX graph and prepares it for single-image batches.
    /// `size_override` replaces the spatial dims the graph declares.
    pub fn load(path: &Path, size_override: Option<u32>) -> Result<Self, AppError> {
        if !path.exists() {
            return Err(AppError::ModelLoad(format!(
                "model not found: {}",
                path.display()
            )));
        }
        tracing::info!("Loading model from {}", path.display());

        let model = tract_onnx::onnx().model_for_path(path).map_err(model_err)?;

        let detected = detect_input_spec(&model);
        let spec = match (detected, size_override) {
            (Some(spec), None) => spec,
            (Some(spec), Some(size)) => InputSpec::square(size, spec.layout),
            (None, size) => {
                let size = size.unwrap_or(DEFAULT_INPUT_SIZE);
                tracing::warn!(
                    size,
                    "model input shape is not fully known, assuming NHWC {}x{}",
                    size,
                    size
                );
                InputSpec::square(size, Layout::Nhwc)
            }
        };

        let plan = model
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), spec.shape()))
            .map_err(model_err)?
            .into_optimized()
            .map_err(model_err)?
            .into_runnable()
            .map_err(model_err)?;

        tracing::info!(
            width = spec.width,
            height = spec.height,
            layout = ?spec.layout,
            "Model ready"
        );
        Ok(Self { plan, spec })
    }

    /// Wraps an already built graph whose input shape is concrete.
    pub fn from_typed(model: TypedModel) -> Result<Self, AppError> {
        let dims: Vec<Option<usize>> = model
            .input_fact(0)
            .map_err(model_err)?
            .shape
            .iter()
            .map(|d| d.to_usize().ok())
            .collect();
        let spec = InputSpec::from_dims(&dims)
            .ok_or_else(|| AppError::ModelLoad(format!("unsupported input shape {dims:?}")))?;
        let plan = model.into_runnable().map_err(model_err)?;
        Ok(Self { plan, spec })
    }
}

fn detect_input_spec(model: &InferenceModel) -> Option<InputSpec> {
    let typed = match model.clone().into_typed() {
        Ok(typed) => typed,
        Err(e) => {
            tracing::debug!("could not type model for shape detection: {e:#}");
            return None;
        }
    };
    let fact = typed.input_fact(0).ok()?;
    let dims: Vec<Option<usize>> = fact.shape.iter().map(|d| d.to_usize().ok()).collect();
    InputSpec::from_dims(&dims)
}

impl Scorer for TractModel {
    fn input_spec(&self) -> InputSpec {
        self.spec
    }

    fn score(&self, input: Tensor) -> Result<f32, AppError> {
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| AppError::Inference(format!("{e:#}")))?;
        let output = outputs
            .first()
            .ok_or_else(|| AppError::Inference("model returned no outputs".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| AppError::Inference(format!("{e:#}")))?;
        view.iter()
            .next()
            .copied()
            .ok_or_else(|| AppError::Inference("model returned an empty output".to_string()))
    }
}

/// Preprocessing and scoring, shared by every request.
#[derive(Clone)]
pub struct Classifier {
    preprocessor: Preprocessor,
    scorer: Arc<dyn Scorer>,
}

impl Classifier {
    pub fn new(scorer: Arc<dyn Scorer>, config: &ModelConfig) -> Self {
        let preprocessor = Preprocessor::new(scorer.input_spec(), config.resize, config.normalization);
        Self {
            preprocessor,
            scorer,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self, AppError> {
        let model = TractModel::load(&config.model_path, config.input_size)?;
        Ok(Self::new(Arc::new(model), config))
    }

    pub fn input_spec(&self) -> InputSpec {
        self.preprocessor.spec()
    }

    pub fn classify_path(&self, path: &Path) -> Result<Prediction, AppError> {
        let input = self.preprocessor.load(path)?;
        let score = self.scorer.score(input)?;
        let prediction = Prediction::from_score(score)?;
        tracing::debug!(score, label = %prediction.label, "scored {}", path.display());
        Ok(prediction)
    }

    /// Classifies each file and writes one line per image to `out`.
    /// Returns how many images failed.
    pub fn classify_report<W: Write>(
        &self,
        images: &[PathBuf],
        out: &mut W,
    ) -> std::io::Result<usize> {
        let mut failed = 0;
        for path in images {
            match self.classify_path(path) {
                Ok(p) => writeln!(out, "{}: {} ({:.2}%)", path.display(), p.label, p.confidence())?,
                Err(e) => {
                    failed += 1;
                    tracing::warn!("could not classify {}: {}", path.display(), e);
                    writeln!(out, "{}: error: {}", path.display(), e)?;
                }
            }
        }
        Ok(failed)
    }
}
