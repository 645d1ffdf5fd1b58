//! ONNX Runtime backend for the bullying classifier.
//!
//! Runs an ONNX export of the training network. The graph takes one
//! `float32[1, seq_len]` input (Keras feeds token indices as floats by
//! default) and returns one `float32[1, 1]` sigmoid output.

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tracing::info;

use crate::model::lock_runtime;
use crate::{AiError, SequenceModel};

/// Classifier session backed by ONNX Runtime.
///
/// `Session::run` needs exclusive access, so runs are serialized. A run that
/// panics does not take the session out of service.
pub struct OnnxModel {
    session: Mutex<Session>,
}

impl OnnxModel {
    /// Load `model.onnx` from disk.
    pub fn load(model_path: &Path) -> Result<Self, AiError> {
        if !model_path.exists() {
            return Err(AiError::ArtifactNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()
            .map_err(ort_err)?
            .commit_from_file(model_path)
            .map_err(ort_err)?;

        let outputs = session.outputs().len();
        if outputs != 1 {
            return Err(AiError::Ort(format!(
                "expected a single output, model has {outputs}"
            )));
        }

        info!(model = %model_path.display(), "loaded ONNX classifier");
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl SequenceModel for OnnxModel {
    fn predict(&self, sequence: &[i64]) -> Result<f32, AiError> {
        let seq_len = sequence.len();
        let input: Vec<f32> = sequence.iter().map(|&i| i as f32).collect();
        let shape = [1i64, seq_len as i64];
        let tensor = Tensor::from_array((shape, input.into_boxed_slice())).map_err(ort_err)?;

        let mut session = lock_runtime(&self.session);
        let outputs = session.run(ort::inputs![tensor]).map_err(ort_err)?;

        let (output_shape, output_data) = outputs[0].try_extract_tensor::<f32>().map_err(ort_err)?;
        let dims: &[i64] = output_shape;
        if dims.iter().product::<i64>() != 1 {
            return Err(AiError::Ort(format!(
                "unexpected output shape: {dims:?}, expected [1, 1]"
            )));
        }
        output_data
            .first()
            .copied()
            .ok_or_else(|| AiError::Ort("empty output tensor".into()))
    }

    fn backend(&self) -> &'static str {
        "onnx"
    }
}

fn ort_err(e: impl std::fmt::Display) -> AiError {
    AiError::Ort(e.to_string())
}
