//! Word-index vocabulary fitted offline by a Keras `Tokenizer`.
//!
//! Loads the JSON produced by `Tokenizer.to_json()` and reproduces
//! `texts_to_sequences` for a single text: lowercase, map filter characters
//! to the split character, split, then look every word up in `word_index`
//! subject to the `num_words` cap and the OOV token.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::AiError;

/// Keras' default `filters` argument.
pub const DEFAULT_FILTERS: &str = "!\"#$%&()*+,-./:;<=>?@[\\]^_`{|}~\t\n";

#[derive(Debug, Clone)]
pub struct Vocabulary {
    word_index: HashMap<String, u32>,
    num_words: Option<usize>,
    oov_index: Option<u32>,
    filters: HashSet<char>,
    lower: bool,
    split: String,
    char_level: bool,
}

#[derive(Deserialize)]
struct TokenizerJson {
    #[serde(default)]
    class_name: Option<String>,
    config: TokenizerConfig,
}

#[derive(Deserialize)]
struct TokenizerConfig {
    #[serde(default)]
    num_words: Option<usize>,
    #[serde(default = "default_filters")]
    filters: String,
    #[serde(default = "default_lower")]
    lower: bool,
    #[serde(default = "default_split")]
    split: String,
    #[serde(default)]
    char_level: bool,
    #[serde(default)]
    oov_token: Option<String>,
    word_index: Value,
}

fn default_filters() -> String {
    DEFAULT_FILTERS.to_string()
}

fn default_lower() -> bool {
    true
}

fn default_split() -> String {
    " ".to_string()
}

impl Vocabulary {
    /// Load a tokenizer export from disk.
    pub fn load(path: &Path) -> Result<Self, AiError> {
        if !path.exists() {
            return Err(AiError::ArtifactNotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|source| AiError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let vocab = Self::from_json_str(&raw)?;
        info!(
            words = vocab.len(),
            num_words = ?vocab.num_words,
            path = %path.display(),
            "loaded vocabulary"
        );
        Ok(vocab)
    }

    /// Parse a tokenizer export.
    ///
    /// Accepts the `to_json()` object directly, or that object wrapped once
    /// more as a JSON string (what `json.dump(tokenizer.to_json())` writes).
    /// `word_index` may likewise be an object or a JSON-encoded string.
    pub fn from_json_str(raw: &str) -> Result<Self, AiError> {
        let value: Value = serde_json::from_str(raw)?;
        let value = match value {
            Value::String(inner) => serde_json::from_str(&inner)?,
            other => other,
        };
        let parsed: TokenizerJson = serde_json::from_value(value)?;
        if let Some(class) = parsed.class_name.as_deref()
            && class != "Tokenizer"
        {
            return Err(AiError::Tokenizer(format!(
                "expected class_name Tokenizer, got {class}"
            )));
        }

        let config = parsed.config;
        let word_index: HashMap<String, u32> = match config.word_index {
            Value::String(s) => serde_json::from_str(&s)?,
            other => serde_json::from_value(other)?,
        };
        if word_index.values().any(|&i| i == 0) {
            return Err(AiError::Tokenizer(
                "index 0 is reserved for padding".into(),
            ));
        }
        if config.split.is_empty() {
            return Err(AiError::Tokenizer("split must not be empty".into()));
        }

        let oov_index = match &config.oov_token {
            Some(token) => Some(*word_index.get(token).ok_or_else(|| {
                AiError::Tokenizer(format!("oov token {token:?} missing from word_index"))
            })?),
            None => None,
        };

        Ok(Self {
            word_index,
            // Keras treats `num_words=0` the same as no cap.
            num_words: config.num_words.filter(|&n| n > 0),
            oov_index,
            filters: config.filters.chars().collect(),
            lower: config.lower,
            split: config.split,
            char_level: config.char_level,
        })
    }

    /// Build a vocabulary with Keras default text handling.
    ///
    /// `oov_token`, when given, must be one of `words`.
    pub fn from_words<I, S>(
        words: I,
        num_words: Option<usize>,
        oov_token: Option<&str>,
    ) -> Result<Self, AiError>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let word_index: HashMap<String, u32> =
            words.into_iter().map(|(w, i)| (w.into(), i)).collect();
        let value = serde_json::json!({
            "class_name": "Tokenizer",
            "config": {
                "num_words": num_words,
                "oov_token": oov_token,
                "word_index": word_index,
            }
        });
        Self::from_json_str(&value.to_string())
    }

    /// Number of entries in `word_index` (not capped by `num_words`).
    pub fn len(&self) -> usize {
        self.word_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.word_index.is_empty()
    }

    pub fn num_words(&self) -> Option<usize> {
        self.num_words
    }

    pub fn oov_index(&self) -> Option<u32> {
        self.oov_index
    }

    /// Largest index this vocabulary can emit.
    pub fn max_index(&self) -> u32 {
        let max = self.word_index.values().copied().max().unwrap_or(0);
        match self.num_words {
            Some(cap) => max.min(cap.saturating_sub(1) as u32).max(self.oov_index.unwrap_or(0)),
            None => max,
        }
    }

    /// Split text into the tokens Keras would look up.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let text = if self.lower {
            text.to_lowercase()
        } else {
            text.to_string()
        };

        if self.char_level {
            return text.chars().map(String::from).collect();
        }

        let translated: String = text
            .chars()
            .map(|c| {
                if self.filters.contains(&c) {
                    self.split.clone()
                } else {
                    c.to_string()
                }
            })
            .collect();

        translated
            .split(self.split.as_str())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Map text to vocabulary indices, unpadded.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        self.tokenize(text)
            .iter()
            .filter_map(|token| self.lookup(token))
            .collect()
    }

    fn lookup(&self, token: &str) -> Option<u32> {
        match self.word_index.get(token) {
            Some(&i) if self.num_words.is_some_and(|cap| i as usize >= cap) => self.oov_index,
            Some(&i) => Some(i),
            None => self.oov_index,
        }
    }
}
