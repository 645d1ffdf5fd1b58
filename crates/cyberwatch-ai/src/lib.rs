//! Comment classification: vocabulary lookup, sequence padding, and a
//! pretrained BiLSTM scored natively or through ONNX Runtime.

mod cleaning;
mod config;
mod error;
mod model;
mod sequence;
mod service;
mod vocabulary;

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use onnx::OnnxModel;

pub use cleaning::TextCleaning;
pub use config::{InferenceConfig, ONNX_FILE, TOKENIZER_FILE, WEIGHTS_FILE};
pub use error::AiError;
pub use model::{BiLstmModel, SequenceModel};
pub use sequence::{SEQUENCE_LENGTH, pad_sequence};
pub use service::InferenceService;
pub use vocabulary::Vocabulary;
