//! Form configuration.

use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::error::{FormError, Result};

/// Tunables for a [`crate::ContactForm`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    /// Quiet period before `required` returns to the address fields.
    pub address_quiet_period_ms: u64,
    /// Substrings rejected in notes.
    pub restricted_words: Vec<String>,
    pub first_name_min_length: usize,
    /// Phone items in a brand-new contact.
    pub initial_phone_slots: usize,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            address_quiet_period_ms: 2000,
            restricted_words: vec!["foo".to_string(), "bar".to_string()],
            first_name_min_length: 3,
            initial_phone_slots: 1,
        }
    }
}

impl FormConfig {
    /// Set the address commit quiet period.
    ///
    /// The period is stored in whole milliseconds; anything else is a
    /// [`FormError::Config`].
    pub fn with_address_quiet_period(mut self, quiet: Duration) -> Result<Self> {
        if quiet.subsec_nanos() % 1_000_000 != 0 {
            return Err(FormError::config(format!(
                "address quiet period must be whole milliseconds, got {quiet:?}"
            )));
        }
        self.address_quiet_period_ms = u64::try_from(quiet.as_millis())
            .map_err(|_| FormError::config(format!("address quiet period {quiet:?} is too long")))?;
        Ok(self)
    }

    #[must_use]
    pub fn with_restricted_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.restricted_words = words.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_first_name_min_length(mut self, min: usize) -> Self {
        self.first_name_min_length = min;
        self
    }

    #[must_use]
    pub fn with_initial_phone_slots(mut self, slots: usize) -> Self {
        self.initial_phone_slots = slots;
        self
    }

    #[must_use]
    pub fn address_quiet_period(&self) -> Duration {
        Duration::from_millis(self.address_quiet_period_ms)
    }

    /// Parse from JSON; missing keys take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.address_quiet_period_ms == 0 {
            return Err(FormError::config("address_quiet_period_ms must be positive"));
        }
        if self.restricted_words.iter().any(String::is_empty) {
            return Err(FormError::config("restricted_words must not contain empty words"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = FormConfig::default();
        assert_eq!(c.address_quiet_period(), Duration::from_millis(2000));
        assert_eq!(c.restricted_words, vec!["foo", "bar"]);
        assert_eq!(c.first_name_min_length, 3);
        assert_eq!(c.initial_phone_slots, 1);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c = FormConfig::from_json_str(r#"{"address_quiet_period_ms": 500}"#).unwrap();
        assert_eq!(c.address_quiet_period_ms, 500);
        assert_eq!(c.first_name_min_length, 3);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            FormConfig::from_json_str(r#"{"address_quiet_period_ms": 0}"#),
            Err(FormError::Config { .. })
        ));
        assert!(FormConfig::default().with_restricted_words(["ok", ""]).validate().is_err());
        assert!(matches!(
            FormConfig::from_json_str("{not json"),
            Err(FormError::Json(_))
        ));
    }

    #[test]
    fn builders() {
        let c = FormConfig::default()
            .with_address_quiet_period(Duration::from_millis(250))
            .unwrap()
            .with_restricted_words(["spam"])
            .with_first_name_min_length(2)
            .with_initial_phone_slots(0);
        assert_eq!(c.address_quiet_period_ms, 250);
        assert_eq!(c.restricted_words, vec!["spam"]);
        assert_eq!(c.first_name_min_length, 2);
        assert_eq!(c.initial_phone_slots, 0);
    }

    #[test]
    fn sub_millisecond_quiet_period_is_rejected() {
        let err = FormConfig::default()
            .with_address_quiet_period(Duration::from_micros(1500))
            .unwrap_err();
        assert!(matches!(&err, FormError::Config { message } if message.contains("whole milliseconds")));
        assert!(
            FormConfig::default()
                .with_address_quiet_period(Duration::from_micros(500))
                .is_err()
        );
        assert!(
            FormConfig::default()
                .with_address_quiet_period(Duration::from_secs(u64::MAX))
                .is_err()
        );
    }
}
