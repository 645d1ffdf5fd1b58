//! Process-wide bullying classifier with a safe fallback.
//!
//! The service loads the vocabulary and model once. If either artifact is
//! missing or unreadable it stays up in a disabled state and labels every
//! text [`Label::FALLBACK`]. A failure while scoring one text falls back for
//! that text only.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

use cyberwatch_core::Label;
use tracing::{debug, info, warn};

use crate::model::BiLstmModel;
use crate::sequence::pad_sequence;
use crate::{AiError, InferenceConfig, SequenceModel, Vocabulary};

static SHARED: OnceLock<InferenceService> = OnceLock::new();

pub struct InferenceService {
    config: InferenceConfig,
    state: State,
}

enum State {
    Ready {
        vocabulary: Vocabulary,
        model: Box<dyn SequenceModel>,
    },
    Disabled {
        reason: String,
    },
}

impl InferenceService {
    /// The process-wide service, loaded on first call.
    ///
    /// Only the first caller's `config` is used; concurrent first callers
    /// block until that single load finishes.
    pub fn shared(config: &InferenceConfig) -> &'static Self {
        SHARED.get_or_init(|| Self::load(config.clone()))
    }

    /// Load artifacts from `config.model_dir`. Never fails: load errors
    /// produce a disabled service.
    pub fn load(config: InferenceConfig) -> Self {
        match load_artifacts(&config) {
            Ok((vocabulary, model)) => {
                info!(
                    model_dir = %config.model_dir.display(),
                    backend = model.backend(),
                    words = vocabulary.len(),
                    cleaning = ?config.cleaning,
                    "bullying classifier ready"
                );
                Self::from_parts(config, vocabulary, model)
            }
            Err(e) => {
                warn!(
                    model_dir = %config.model_dir.display(),
                    error = %e,
                    "bullying classifier unavailable, comments will be labelled {}",
                    Label::FALLBACK
                );
                Self::disabled(config, e.to_string())
            }
        }
    }

    pub fn from_parts(
        config: InferenceConfig,
        vocabulary: Vocabulary,
        model: Box<dyn SequenceModel>,
    ) -> Self {
        Self {
            config,
            state: State::Ready { vocabulary, model },
        }
    }

    pub fn disabled(config: InferenceConfig, reason: impl Into<String>) -> Self {
        Self {
            config,
            state: State::Disabled {
                reason: reason.into(),
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.state, State::Ready { .. })
    }

    pub fn disabled_reason(&self) -> Option<&str> {
        match &self.state {
            State::Ready { .. } => None,
            State::Disabled { reason } => Some(reason),
        }
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Clean, tokenize, and pad `text` to the configured sequence length.
    pub fn vectorize(&self, text: &str) -> Result<Vec<i64>, AiError> {
        let vocabulary = match &self.state {
            State::Ready { vocabulary, .. } => vocabulary,
            State::Disabled { reason } => return Err(AiError::Disabled(reason.clone())),
        };
        let cleaned = self.config.cleaning.apply(text);
        let indices = vocabulary.encode(&cleaned);
        Ok(pad_sequence(&indices, self.config.sequence_length))
    }

    /// Probability that `text` is bullying.
    pub fn score(&self, text: &str) -> Result<f32, AiError> {
        let model = match &self.state {
            State::Ready { model, .. } => model,
            State::Disabled { reason } => return Err(AiError::Disabled(reason.clone())),
        };
        let score = panic::catch_unwind(AssertUnwindSafe(|| {
            let sequence = self.vectorize(text)?;
            model.predict(&sequence)
        }))
        .map_err(|payload| AiError::Panicked(panic_message(payload)))??;

        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(AiError::InvalidScore(score));
        }
        Ok(score)
    }

    /// Label `text`. Never fails; any problem yields [`Label::FALLBACK`].
    pub fn classify(&self, text: &str) -> Label {
        if !self.is_enabled() {
            return Label::FALLBACK;
        }
        match self.score(text) {
            Ok(score) => {
                let label = Label::from_score(score, self.config.threshold);
                debug!(score, label = %label, chars = text.len(), "classified text");
                label
            }
            Err(e) => {
                warn!(error = %e, "classification failed, using fallback label");
                Label::FALLBACK
            }
        }
    }
}

fn load_artifacts(
    config: &InferenceConfig,
) -> Result<(Vocabulary, Box<dyn SequenceModel>), AiError> {
    let vocabulary = Vocabulary::load(&config.tokenizer_path())?;
    let model = load_model(config)?;

    if let Some(rows) = model.vocab_size() {
        let max = vocabulary.max_index() as usize;
        if max >= rows {
            return Err(AiError::Shape {
                layer: "embedding",
                expected: vec![max + 1],
                actual: vec![rows],
            });
        }
    }
    Ok((vocabulary, model))
}

fn load_model(config: &InferenceConfig) -> Result<Box<dyn SequenceModel>, AiError> {
    #[cfg(feature = "onnx")]
    {
        let onnx_path = config.onnx_path();
        if onnx_path.exists() {
            return Ok(Box::new(crate::OnnxModel::load(&onnx_path)?));
        }
    }
    Ok(Box::new(BiLstmModel::load(&config.weights_path())?))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SEQUENCE_LENGTH, TextCleaning};
    use crate::model::lock_runtime;
    use crate::model::tests::{constant_weights, keyword_weights};
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    struct FixedScore(f32);

    impl SequenceModel for FixedScore {
        fn predict(&self, _sequence: &[i64]) -> Result<f32, AiError> {
            Ok(self.0)
        }

        fn backend(&self) -> &'static str {
            "fixed"
        }
    }

    struct Failing;

    impl SequenceModel for Failing {
        fn predict(&self, _sequence: &[i64]) -> Result<f32, AiError> {
            Err(AiError::Ort("session exploded".into()))
        }

        fn backend(&self) -> &'static str {
            "failing"
        }
    }

    struct Panicking;

    impl SequenceModel for Panicking {
        fn predict(&self, sequence: &[i64]) -> Result<f32, AiError> {
            if sequence[0] == 4 {
                panic!("bad tensor");
            }
            Ok(0.9)
        }

        fn backend(&self) -> &'static str {
            "panicking"
        }
    }

    /// Keeps a run counter behind a lock like a stateful runtime session,
    /// and panics mid-run (guard held) when it sees index 4.
    struct LockedRuntime {
        runs: Mutex<u32>,
    }

    impl SequenceModel for LockedRuntime {
        fn predict(&self, sequence: &[i64]) -> Result<f32, AiError> {
            let mut runs = lock_runtime(&self.runs);
            *runs += 1;
            if sequence[0] == 4 {
                panic!("runtime aborted");
            }
            Ok(0.9)
        }

        fn backend(&self) -> &'static str {
            "locked"
        }
    }

    fn vocab() -> Vocabulary {
        Vocabulary::from_words(
            [("<OOV>", 1), ("you", 2), ("are", 3), ("ugly", 4), ("stupid", 5)],
            Some(2000),
            Some("<OOV>"),
        )
        .unwrap()
    }

    fn service(model: impl SequenceModel + 'static) -> InferenceService {
        InferenceService::from_parts(InferenceConfig::default(), vocab(), Box::new(model))
    }

    fn write_artifacts(dir: &Path, weights: &str) {
        std::fs::write(
            dir.join("tokenizer.json"),
            r#"{"class_name": "Tokenizer", "config": {"num_words": 8, "oov_token": "<OOV>",
                "word_index": "{\"<OOV>\": 1, \"you\": 2, \"are\": 3, \"ugly\": 5}"}}"#,
        )
        .unwrap();
        std::fs::write(dir.join("weights.json"), weights).unwrap();
    }

    #[test]
    fn disabled_service_returns_fallback() {
        let svc = InferenceService::disabled(InferenceConfig::default(), "no artifacts");
        assert!(!svc.is_enabled());
        assert_eq!(svc.disabled_reason(), Some("no artifacts"));
        for text in ["you are stupid", "", "hello", "💀💀💀"] {
            assert_eq!(svc.classify(text), Label::NotBullying);
        }
        assert!(matches!(svc.score("x"), Err(AiError::Disabled(_))));
    }

    #[test]
    fn missing_artifacts_disable_service() {
        let svc = InferenceService::load(InferenceConfig::new("/nonexistent/models"));
        assert!(!svc.is_enabled());
        assert!(svc.disabled_reason().unwrap().contains("tokenizer.json"));
        assert_eq!(svc.classify("you are stupid"), Label::NotBullying);
    }

    #[test]
    fn missing_weights_disable_service() {
        let tmp = tempfile::TempDir::new().unwrap();
        write_artifacts(tmp.path(), "{}");
        std::fs::remove_file(tmp.path().join("weights.json")).unwrap();
        let svc = InferenceService::load(InferenceConfig::new(tmp.path()));
        assert!(!svc.is_enabled());
        assert!(svc.disabled_reason().unwrap().contains("weights.json"));
    }

    #[test]
    fn corrupt_weights_disable_service() {
        let tmp = tempfile::TempDir::new().unwrap();
        write_artifacts(tmp.path(), "[1, 2");
        let svc = InferenceService::load(InferenceConfig::new(tmp.path()));
        assert!(!svc.is_enabled());
        assert_eq!(svc.classify("you are ugly"), Label::NotBullying);
    }

    #[test]
    fn embedding_too_small_for_vocabulary_disables_service() {
        let tmp = tempfile::TempDir::new().unwrap();
        // Vocabulary can emit index 5; the table only has 4 rows.
        write_artifacts(tmp.path(), &constant_weights(4, 2, 1, 0.0));
        let svc = InferenceService::load(InferenceConfig::new(tmp.path()));
        assert!(!svc.is_enabled());
    }

    #[test]
    fn loads_native_artifacts_from_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        write_artifacts(tmp.path(), &keyword_weights(8, 5));
        let svc = InferenceService::load(InferenceConfig::new(tmp.path()));
        assert!(svc.is_enabled());
        assert_eq!(svc.classify("you are ugly"), Label::BullyingWords);
        assert_eq!(svc.classify("you are kind"), Label::NotBullying);
    }

    #[test]
    fn exact_threshold_is_bullying() {
        let svc = service(FixedScore(0.5));
        assert_eq!(svc.classify("anything"), Label::BullyingWords);
    }

    #[test]
    fn native_model_at_half_is_bullying() {
        let model = BiLstmModel::from_json_str(&constant_weights(10, 4, 2, 0.0)).unwrap();
        let svc = service(model);
        assert_eq!(svc.score("you are").unwrap(), 0.5);
        assert_eq!(svc.classify("you are"), Label::BullyingWords);
    }

    #[test]
    fn below_threshold_is_not_bullying() {
        let svc = service(FixedScore(0.49));
        assert_eq!(svc.classify("anything"), Label::NotBullying);
    }

    #[test]
    fn model_error_falls_back_without_disabling() {
        let svc = service(Failing);
        assert_eq!(svc.classify("you are ugly"), Label::NotBullying);
        assert!(svc.is_enabled());
    }

    #[test]
    fn model_panic_falls_back_for_that_call_only() {
        let svc = service(Panicking);
        assert_eq!(svc.classify("ugly"), Label::NotBullying);
        assert!(matches!(svc.score("ugly"), Err(AiError::Panicked(m)) if m == "bad tensor"));
        assert_eq!(svc.classify("you"), Label::BullyingWords);
    }

    #[test]
    fn panic_while_holding_runtime_lock_does_not_stick() {
        let svc = service(LockedRuntime {
            runs: Mutex::new(0),
        });
        assert!(matches!(svc.score("ugly"), Err(AiError::Panicked(m)) if m == "runtime aborted"));
        assert_eq!(svc.classify("ugly"), Label::NotBullying);
        assert_eq!(svc.classify("you are"), Label::BullyingWords);
        assert_eq!(svc.classify("you are"), Label::BullyingWords);
        assert!(svc.is_enabled());
    }

    #[test]
    fn guarded_scoring_sees_cleaned_padded_sequence() {
        struct Expects(Vec<i64>);

        impl SequenceModel for Expects {
            fn predict(&self, sequence: &[i64]) -> Result<f32, AiError> {
                assert_eq!(sequence, self.0.as_slice(), "unexpected model input");
                Ok(0.8)
            }

            fn backend(&self) -> &'static str {
                "expects"
            }
        }

        let mut expected = vec![0i64; SEQUENCE_LENGTH];
        expected[..3].copy_from_slice(&[2, 3, 4]);
        let config = InferenceConfig::default().with_cleaning(TextCleaning::LettersOnly);
        let svc = InferenceService::from_parts(config, vocab(), Box::new(Expects(expected)));
        assert_eq!(svc.classify("you are ugly!!1"), Label::BullyingWords);
        // A wrong sequence panics in the model and is caught like any other panic.
        assert_eq!(svc.classify("stupid"), Label::NotBullying);
    }

    #[test]
    fn out_of_range_scores_fall_back() {
        for bad in [f32::NAN, f32::INFINITY, 1.5, -0.1] {
            let svc = service(FixedScore(bad));
            assert_eq!(svc.classify("you are ugly"), Label::NotBullying);
            assert!(svc.score("x").is_err());
        }
    }

    #[test]
    fn out_of_vocabulary_index_falls_back() {
        // Vocabulary emits index 5 but the table has 4 rows.
        let model = BiLstmModel::from_json_str(&constant_weights(4, 2, 1, 5.0)).unwrap();
        let svc = service(model);
        assert_eq!(svc.classify("you are"), Label::BullyingWords);
        assert_eq!(svc.classify("stupid"), Label::NotBullying);
        assert!(matches!(
            svc.score("stupid"),
            Err(AiError::IndexOutOfRange { index: 5, .. })
        ));
    }

    #[test]
    fn vectorize_pads_to_sequence_length() {
        let svc = service(FixedScore(0.1));
        let seq = svc.vectorize("You are UGLY!").unwrap();
        assert_eq!(seq.len(), 100);
        assert_eq!(&seq[..3], &[2, 3, 4]);
        assert!(seq[3..].iter().all(|&v| v == 0));
    }

    #[test]
    fn vectorize_truncates_long_text() {
        let svc = service(FixedScore(0.1));
        let text = format!("{} {}", "you ".repeat(100), "ugly ".repeat(50));
        let seq = svc.vectorize(&text).unwrap();
        assert_eq!(seq.len(), 100);
        assert!(seq.iter().all(|&v| v == 2));
    }

    #[test]
    fn raw_mode_keeps_punctuated_tokens() {
        let svc = service(FixedScore(0.1));
        // Apostrophes survive Keras filters, so "you're" is unknown.
        assert_eq!(&svc.vectorize("you're ugly").unwrap()[..2], &[1, 4]);
    }

    #[test]
    fn letters_only_mode_matches_training_cleaning() {
        let config = InferenceConfig::default().with_cleaning(TextCleaning::LettersOnly);
        let svc = InferenceService::from_parts(config, vocab(), Box::new(FixedScore(0.1)));
        // "ugly123" becomes "ugly" once digits are stripped.
        assert_eq!(&svc.vectorize("you are ugly123").unwrap()[..3], &[2, 3, 4]);
    }

    #[test]
    fn classify_is_deterministic() {
        let model = BiLstmModel::from_json_str(&keyword_weights(8, 4)).unwrap();
        let svc = service(model);
        let first = svc.classify("you are ugly");
        let second = svc.classify("you are ugly");
        assert_eq!(first, second);
        assert_eq!(first, Label::BullyingWords);
    }

    #[test]
    fn concurrent_classify_shares_state() {
        let model = BiLstmModel::from_json_str(&keyword_weights(8, 4)).unwrap();
        let svc = Arc::new(service(model));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let svc = Arc::clone(&svc);
                std::thread::spawn(move || {
                    let text = if i % 2 == 0 { "you are ugly" } else { "you are" };
                    (i, svc.classify(text))
                })
            })
            .collect();
        for handle in handles {
            let (i, label) = handle.join().unwrap();
            let expected = if i % 2 == 0 {
                Label::BullyingWords
            } else {
                Label::NotBullying
            };
            assert_eq!(label, expected);
        }
    }

    #[test]
    fn shared_instance_initializes_once() {
        let first = InferenceService::shared(&InferenceConfig::new("/nonexistent/shared"));
        let second = InferenceService::shared(&InferenceConfig::new("/elsewhere"));
        assert!(std::ptr::eq(first, second));
        assert_eq!(
            second.config().model_dir,
            std::path::PathBuf::from("/nonexistent/shared")
        );
        assert_eq!(second.classify("you are stupid"), Label::NotBullying);
    }
}
