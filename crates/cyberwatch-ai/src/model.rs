//! Sequence classifiers that turn a padded index sequence into a probability.
//!
//! [`BiLstmModel`] evaluates the training architecture directly from exported
//! Keras weights:
//!
//! ```text
//! Embedding(vocab, e) → Bidirectional(LSTM(u)) → Dense(d, relu) → Dense(1, sigmoid)
//! ```
//!
//! Dropout layers are identity at inference and have no weights. Padding
//! zeros are not masked: the training model had no `mask_zero`, so they run
//! through both LSTM directions like any other token.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use ndarray::{Array1, Array2, ArrayView1, Axis, concatenate, s};
use serde::Deserialize;
use tracing::info;

use crate::AiError;

/// A loaded binary classifier.
///
/// Implementations hold immutable weights and must be callable from many
/// threads at once.
pub trait SequenceModel: Send + Sync {
    /// Probability that the sequence is bullying, in `[0, 1]`.
    fn predict(&self, sequence: &[i64]) -> Result<f32, AiError>;

    /// Rows in the embedding table, when the backend knows it.
    fn vocab_size(&self) -> Option<usize> {
        None
    }

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Lock per-backend runtime state, taking it over from a call that panicked.
///
/// A run never leaves the state half-updated, so a poisoned lock still
/// guards a usable runtime.
#[cfg_attr(not(feature = "onnx"), allow(dead_code))]
pub(crate) fn lock_runtime<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Native BiLSTM evaluated with `ndarray`.
#[derive(Debug)]
pub struct BiLstmModel {
    embedding: Array2<f32>,
    forward: Lstm,
    backward: Lstm,
    hidden: Dense,
    output: Dense,
}

#[derive(Debug)]
struct Lstm {
    kernel: Array2<f32>,
    recurrent_kernel: Array2<f32>,
    bias: Array1<f32>,
    units: usize,
}

#[derive(Debug)]
struct Dense {
    kernel: Array2<f32>,
    bias: Array1<f32>,
}

// ── On-disk layout ──

#[derive(Deserialize)]
struct WeightsFile {
    embedding: Vec<Vec<f32>>,
    forward: LstmFile,
    backward: LstmFile,
    dense: DenseFile,
    output: DenseFile,
}

#[derive(Deserialize)]
struct LstmFile {
    kernel: Vec<Vec<f32>>,
    recurrent_kernel: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

#[derive(Deserialize)]
struct DenseFile {
    kernel: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

impl BiLstmModel {
    /// Load weights exported to `weights.json`.
    pub fn load(path: &Path) -> Result<Self, AiError> {
        if !path.exists() {
            return Err(AiError::ArtifactNotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|source| AiError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model = Self::from_json_str(&raw)?;
        info!(
            vocab = model.embedding.nrows(),
            embed_dim = model.embedding.ncols(),
            units = model.forward.units,
            dense = model.hidden.bias.len(),
            path = %path.display(),
            "loaded BiLSTM weights"
        );
        Ok(model)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, AiError> {
        let file: WeightsFile = serde_json::from_str(raw)?;
        Self::from_file(file)
    }

    fn from_file(file: WeightsFile) -> Result<Self, AiError> {
        let embedding = matrix("embedding", file.embedding)?;
        let embed_dim = embedding.ncols();

        let forward = Lstm::new("forward", file.forward, embed_dim)?;
        let backward = Lstm::new("backward", file.backward, embed_dim)?;
        if backward.units != forward.units {
            return Err(AiError::Shape {
                layer: "backward.recurrent_kernel",
                expected: vec![forward.units, 4 * forward.units],
                actual: vec![backward.units, 4 * backward.units],
            });
        }

        let hidden = Dense::new("dense", file.dense, 2 * forward.units)?;
        let output = Dense::new("output", file.output, hidden.bias.len())?;
        if output.bias.len() != 1 {
            return Err(AiError::Shape {
                layer: "output.bias",
                expected: vec![1],
                actual: vec![output.bias.len()],
            });
        }

        Ok(Self {
            embedding,
            forward,
            backward,
            hidden,
            output,
        })
    }

    pub fn units(&self) -> usize {
        self.forward.units
    }

    pub fn embed_dim(&self) -> usize {
        self.embedding.ncols()
    }

    fn row(&self, index: i64) -> Result<usize, AiError> {
        let rows = self.embedding.nrows();
        usize::try_from(index)
            .ok()
            .filter(|&r| r < rows)
            .ok_or(AiError::IndexOutOfRange { index, rows })
    }
}

impl SequenceModel for BiLstmModel {
    fn predict(&self, sequence: &[i64]) -> Result<f32, AiError> {
        let rows = sequence
            .iter()
            .map(|&i| self.row(i))
            .collect::<Result<Vec<_>, _>>()?;

        let h_fwd = self
            .forward
            .final_state(rows.iter().map(|&r| self.embedding.row(r)));
        let h_bwd = self
            .backward
            .final_state(rows.iter().rev().map(|&r| self.embedding.row(r)));

        let merged = concatenate(Axis(0), &[h_fwd.view(), h_bwd.view()]).map_err(|_| {
            AiError::Shape {
                layer: "bidirectional",
                expected: vec![self.forward.units, self.backward.units],
                actual: vec![h_fwd.len(), h_bwd.len()],
            }
        })?;

        let hidden = self.hidden.apply(merged.view()).mapv(|v| v.max(0.0));
        let logit = self.output.apply(hidden.view())[0];
        Ok(sigmoid(logit))
    }

    fn vocab_size(&self) -> Option<usize> {
        Some(self.embedding.nrows())
    }

    fn backend(&self) -> &'static str {
        "bilstm"
    }
}

impl Lstm {
    fn new(layer: &'static str, file: LstmFile, input_dim: usize) -> Result<Self, AiError> {
        let kernel = matrix(layer, file.kernel)?;
        let recurrent_kernel = matrix(layer, file.recurrent_kernel)?;
        let bias = Array1::from(file.bias);

        let units = recurrent_kernel.nrows();
        expect_shape(layer, &[input_dim, 4 * units], kernel.shape())?;
        expect_shape(layer, &[units, 4 * units], recurrent_kernel.shape())?;
        expect_shape(layer, &[4 * units], bias.shape())?;

        Ok(Self {
            kernel,
            recurrent_kernel,
            bias,
            units,
        })
    }

    /// Run the cell over `steps` and return the last hidden state.
    ///
    /// Gate layout follows Keras: input, forget, candidate, output.
    fn final_state<'a>(&self, steps: impl Iterator<Item = ArrayView1<'a, f32>>) -> Array1<f32> {
        let u = self.units;
        let mut h = Array1::<f32>::zeros(u);
        let mut c = Array1::<f32>::zeros(u);

        for x in steps {
            let z = x.dot(&self.kernel) + h.dot(&self.recurrent_kernel) + &self.bias;
            let i = z.slice(s![0..u]).mapv(sigmoid);
            let f = z.slice(s![u..2 * u]).mapv(sigmoid);
            let g = z.slice(s![2 * u..3 * u]).mapv(f32::tanh);
            let o = z.slice(s![3 * u..4 * u]).mapv(sigmoid);
            c = &f * &c + &i * &g;
            h = &o * &c.mapv(f32::tanh);
        }
        h
    }
}

impl Dense {
    fn new(layer: &'static str, file: DenseFile, input_dim: usize) -> Result<Self, AiError> {
        let kernel = matrix(layer, file.kernel)?;
        let bias = Array1::from(file.bias);
        expect_shape(layer, &[input_dim, bias.len()], kernel.shape())?;
        Ok(Self { kernel, bias })
    }

    fn apply(&self, x: ArrayView1<'_, f32>) -> Array1<f32> {
        x.dot(&self.kernel) + &self.bias
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Convert row-major nested vectors into a matrix, rejecting ragged input.
fn matrix(layer: &'static str, rows: Vec<Vec<f32>>) -> Result<Array2<f32>, AiError> {
    let n = rows.len();
    let m = rows.first().map(Vec::len).unwrap_or(0);
    if let Some(bad) = rows.iter().find(|r| r.len() != m) {
        return Err(AiError::Shape {
            layer,
            expected: vec![n, m],
            actual: vec![n, bad.len()],
        });
    }
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((n, m), flat).map_err(|_| AiError::Shape {
        layer,
        expected: vec![n, m],
        actual: vec![n * m],
    })
}

fn expect_shape(layer: &'static str, expected: &[usize], actual: &[usize]) -> Result<(), AiError> {
    if expected == actual {
        Ok(())
    } else {
        Err(AiError::Shape {
            layer,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}
