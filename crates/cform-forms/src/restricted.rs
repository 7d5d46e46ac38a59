//! Restricted-word validator.
//!
//! Rejects text containing any configured forbidden term. Matching is
//! case-sensitive substring containment, not whole-word: `"barfoo"` contains
//! both `"foo"` and `"bar"`. Offending terms are reported in configuration
//! order, each once.

use crate::validator::{ValidationError, ValidatorId, ValidatorRule};
use crate::value::FieldValue;

/// Forbidden substrings, in the order they were configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestrictedWords {
    words: Vec<String>,
}

impl RestrictedWords {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: words.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Every configured word occurring in `text`, in configuration order.
    #[must_use]
    pub fn offending<'a>(&'a self, text: &str) -> Vec<&'a str> {
        self.words
            .iter()
            .filter(|w| text.contains(w.as_str()))
            .map(String::as_str)
            .collect()
    }
}

impl ValidatorRule for RestrictedWords {
    fn id(&self) -> ValidatorId {
        ValidatorId::RESTRICTED_WORDS
    }

    fn validate(&self, value: &FieldValue) -> Result<(), ValidationError> {
        let Some(text) = value.as_text().filter(|t| !t.is_empty()) else {
            return Ok(());
        };
        let words = self.offending(text);
        if words.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ContainsRestrictedWords {
                words: words.into_iter().map(str::to_string).collect(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn foo_bar() -> RestrictedWords {
        RestrictedWords::new(["foo", "bar"])
    }

    fn failing_words(rule: &RestrictedWords, text: &str) -> Option<Vec<String>> {
        match rule.validate(&FieldValue::from(text)) {
            Ok(()) => None,
            Err(ValidationError::ContainsRestrictedWords { words }) => Some(words),
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn single_offending_word() {
        assert_eq!(failing_words(&foo_bar(), "foo is nice"), Some(vec!["foo".to_string()]));
    }

    #[test]
    fn empty_value_passes() {
        assert_eq!(failing_words(&RestrictedWords::new(["foo"]), ""), None);
        assert!(foo_bar().validate(&FieldValue::Null).is_ok());
    }

    #[test]
    fn substring_matches_in_configured_order() {
        assert_eq!(
            failing_words(&foo_bar(), "barfoo"),
            Some(vec!["foo".to_string(), "bar".to_string()])
        );
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(failing_words(&foo_bar(), "FOO and Bar"), None);
    }

    #[test]
    fn repeated_occurrence_reported_once() {
        assert_eq!(failing_words(&foo_bar(), "foo foo foo"), Some(vec!["foo".to_string()]));
    }

    #[test]
    fn non_text_values_pass() {
        assert!(foo_bar().validate(&FieldValue::from(true)).is_ok());
        assert!(foo_bar().validate(&FieldValue::from(42i64)).is_ok());
    }

    #[test]
    fn display_is_comma_joined() {
        let err = foo_bar().validate(&FieldValue::from("a bar and a foo")).unwrap_err();
        assert_eq!(err.to_string(), "contains restricted words: foo,bar");
    }

    proptest! {
        #[test]
        fn reports_exactly_the_contained_words(text in "[a-z ]{0,24}") {
            let rule = RestrictedWords::new(["ab", "c", "zz"]);
            let expected: Vec<String> = ["ab", "c", "zz"]
                .iter()
                .filter(|w| text.contains(*w))
                .map(|w| w.to_string())
                .collect();
            let got = failing_words(&rule, &text).unwrap_or_default();
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn text_without_any_word_passes(text in "[d-y ]{0,24}") {
            let rule = RestrictedWords::new(["ab", "c", "zz"]);
            prop_assert!(rule.validate(&FieldValue::from(text.as_str())).is_ok());
        }
    }
}
