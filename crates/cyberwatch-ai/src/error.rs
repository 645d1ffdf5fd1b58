use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("artifact not found: {0}")]
    ArtifactNotFound(PathBuf),

    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid tokenizer config: {0}")]
    Tokenizer(String),

    #[error("weight shape mismatch in {layer}: expected {expected:?}, got {actual:?}")]
    Shape {
        layer: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("token index {index} outside embedding table of {rows} rows")]
    IndexOutOfRange { index: i64, rows: usize },

    #[error("model produced invalid score: {0}")]
    InvalidScore(f32),

    #[error("onnx runtime error: {0}")]
    Ort(String),

    #[error("inference panicked: {0}")]
    Panicked(String),

    #[error("classifier disabled: {0}")]
    Disabled(String),
}
