//! Optional text normalisation applied before tokenizing.
//!
//! The training pipeline lowercases and strips everything except ASCII
//! letters and whitespace before fitting the vocabulary. Serving passes raw
//! text by default; `LettersOnly` applies the training-side cleaning instead.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static NON_LETTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z\s]").expect("non-letter pattern is valid"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextCleaning {
    /// Hand text to the tokenizer unchanged.
    #[default]
    Raw,
    /// Lowercase, then drop every character that is not `a-z` or whitespace.
    LettersOnly,
}

impl TextCleaning {
    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match self {
            Self::Raw => Cow::Borrowed(text),
            Self::LettersOnly => {
                let lower = text.to_lowercase();
                Cow::Owned(NON_LETTERS.replace_all(&lower, "").into_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_is_untouched() {
        let text = "You're SO dumb!!! 100%";
        assert!(matches!(TextCleaning::Raw.apply(text), Cow::Borrowed(t) if t == text));
    }

    #[test]
    fn letters_only_matches_training_cleaner() {
        assert_eq!(
            TextCleaning::LettersOnly.apply("You're SO dumb!!! 100%"),
            "youre so dumb "
        );
    }

    #[test]
    fn letters_only_keeps_whitespace_runs() {
        assert_eq!(
            TextCleaning::LettersOnly.apply("a\tb\n\nc"),
            "a\tb\n\nc"
        );
    }

    #[test]
    fn letters_only_drops_non_ascii_letters() {
        assert_eq!(TextCleaning::LettersOnly.apply("café naïve"), "caf nave");
    }
}
