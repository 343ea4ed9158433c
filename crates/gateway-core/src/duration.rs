//! Gateway-API duration strings such as `60s`, `1h30m` or `500ms`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::ValidationError;

static DURATION_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{1,5}(h|m|s|ms)){1,4}$").unwrap());

static DURATION_PART: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]{1,5})(ms|h|m|s)").unwrap());

/// A duration kept in its declared textual form.
///
/// The text is preserved verbatim so that a declaration round-trips
/// unchanged; [`GatewayDuration::to_std`] checks and converts it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GatewayDuration(String);

impl GatewayDuration {
    /// Wrap a duration string without checking it.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Format a whole number of seconds.
    #[must_use]
    pub fn from_secs(secs: u64) -> Self {
        Self(format!("{secs}s"))
    }

    /// The declared text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the text follows the Gateway-API duration grammar.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        DURATION_FORMAT.is_match(&self.0)
    }

    /// Convert to a standard duration.
    pub fn to_std(&self) -> Result<Duration, ValidationError> {
        if !self.is_valid() {
            return Err(ValidationError::invalid(
                "",
                format!("invalid duration {:?}, expected e.g. 60s, 1h30m or 500ms", self.0),
            ));
        }

        let mut total = Duration::ZERO;
        for part in DURATION_PART.captures_iter(&self.0) {
            let value: u64 = part[1].parse().unwrap_or_default();
            total += match &part[2] {
                "h" => Duration::from_secs(value * 3600),
                "m" => Duration::from_secs(value * 60),
                "s" => Duration::from_secs(value),
                _ => Duration::from_millis(value),
            };
        }
        Ok(total)
    }
}

impl fmt::Display for GatewayDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_unit() {
        assert_eq!(
            GatewayDuration::new("60s").to_std().unwrap(),
            Duration::from_secs(60)
        );
        assert_eq!(
            GatewayDuration::new("250ms").to_std().unwrap(),
            Duration::from_millis(250)
        );
        assert_eq!(GatewayDuration::from_secs(60), GatewayDuration::new("60s"));
    }

    #[test]
    fn test_parse_compound() {
        assert_eq!(
            GatewayDuration::new("1h30m").to_std().unwrap(),
            Duration::from_secs(5400)
        );
        assert_eq!(
            GatewayDuration::new("1m500ms").to_std().unwrap(),
            Duration::from_millis(60_500)
        );
    }

    #[test]
    fn test_rejects_invalid() {
        for text in ["", "60", "1d", "-5s", "1.5s", "123456s", "1h1h1h1h1h"] {
            assert!(GatewayDuration::new(text).to_std().is_err(), "{text}");
        }
    }
}
