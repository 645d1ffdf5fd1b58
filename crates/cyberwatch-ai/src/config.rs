use std::path::{Path, PathBuf};

use cyberwatch_core::BULLYING_THRESHOLD;

use crate::TextCleaning;
use crate::sequence::SEQUENCE_LENGTH;

/// Keras tokenizer export inside the model directory.
pub const TOKENIZER_FILE: &str = "tokenizer.json";
/// Native BiLSTM weights inside the model directory.
pub const WEIGHTS_FILE: &str = "weights.json";
/// ONNX export of the same network, preferred when the `onnx` feature is on.
pub const ONNX_FILE: &str = "model.onnx";

/// Where the classifier artifacts live and how text is fed to them.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    pub model_dir: PathBuf,
    pub sequence_length: usize,
    pub threshold: f32,
    pub cleaning: TextCleaning,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models/cyberbullying"),
            sequence_length: SEQUENCE_LENGTH,
            threshold: BULLYING_THRESHOLD,
            cleaning: TextCleaning::Raw,
        }
    }
}

impl InferenceConfig {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_cleaning(mut self, cleaning: TextCleaning) -> Self {
        self.cleaning = cleaning;
        self
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_dir.join(TOKENIZER_FILE)
    }

    pub fn weights_path(&self) -> PathBuf {
        self.model_dir.join(WEIGHTS_FILE)
    }

    pub fn onnx_path(&self) -> PathBuf {
        self.model_dir.join(ONNX_FILE)
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }
}
