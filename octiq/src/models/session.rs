use std::sync::Mutex;
use std::time::Instant;

use image::DynamicImage;
use log::debug;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use thiserror::Error;

use super::pipeline::{PipelineError, Prediction, QualityPipeline};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to create inference session: {0}")]
    Init(String),

    #[error("inference failed: {0}")]
    Run(String),

    #[error("model produced an empty output tensor")]
    EmptyOutput,

    #[error(transparent)]
    Preprocess(#[from] PipelineError),

    #[error("another model ({loading}) is currently loading")]
    Busy { loading: String },
}

/// Grade plus per-phase wall-clock timing for one classified image.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub prediction: Prediction,
    pub preprocess_ms: f64,
    pub inference_ms: f64,
    pub postprocess_ms: f64,
}

/// An ONNX Runtime session paired with the pipeline its model was trained
/// against. `run` takes `&self`; the session itself is locked per inference.
pub struct QualitySession {
    session: Mutex<Session>,
    pipeline: Box<dyn QualityPipeline>,
}

impl QualitySession {
    /// Build an inference session from model bytes already in memory.
    pub fn from_bytes(
        bytes: &[u8],
        pipeline: Box<dyn QualityPipeline>,
    ) -> Result<Self, SessionError> {
        // Safe to call more than once; only the first init takes effect.
        let _ = ort::init().commit();

        let session = Session::builder()
            .map_err(|e| SessionError::Init(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| SessionError::Init(e.to_string()))?
            .commit_from_memory(bytes)
            .map_err(|e| SessionError::Init(e.to_string()))?;

        Ok(Self {
            session: Mutex::new(session),
            pipeline,
        })
    }

    /// Classify one decoded image, timing each phase.
    pub fn run(&self, image: &DynamicImage) -> Result<RunOutput, SessionError> {
        let started = Instant::now();
        let tensor = self.pipeline.preprocess(image)?;
        let preprocessed = Instant::now();

        let input = Value::from_array(tensor).map_err(|e| SessionError::Run(e.to_string()))?;
        let logit = {
            let mut session = self.session.lock().unwrap();
            let outputs = session
                .run([(&input).into()])
                .map_err(|e| SessionError::Run(e.to_string()))?;
            *outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| SessionError::Run(e.to_string()))?
                .1
                .first()
                .ok_or(SessionError::EmptyOutput)?
        };
        let inferred = Instant::now();

        let prediction = self.pipeline.postprocess(logit);
        let finished = Instant::now();

        debug!(
            "logit {:.4} -> {} (sigmoid {:.4})",
            logit, prediction.label, prediction.sigmoid
        );

        Ok(RunOutput {
            prediction,
            preprocess_ms: (preprocessed - started).as_secs_f64() * 1000.0,
            inference_ms: (inferred - preprocessed).as_secs_f64() * 1000.0,
            postprocess_ms: (finished - inferred).as_secs_f64() * 1000.0,
        })
    }
}
