//! Duration parsing for activation commands
//!
//! Accepted forms:
//! - a bare number of seconds (`2.5`)
//! - a numeric magnitude with an optional unit word (`"40 seconds"`,
//!   `"2 min"`, `"1.5h"`); hour words multiply by 3600, minute words by 60,
//!   anything else counts as seconds
//! - a small set of English number words (`"five minutes"`, `"half an hour"`)

use crate::error::CommandError;
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Duration used when a command does not give one
pub const DEFAULT_DURATION_SECS: f64 = 1.0;

/// Duration as supplied by a front-end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum DurationSpec {
    Seconds(f64),
    Text(String),
}

impl From<f64> for DurationSpec {
    fn from(secs: f64) -> Self {
        DurationSpec::Seconds(secs)
    }
}

impl From<&str> for DurationSpec {
    fn from(text: &str) -> Self {
        DurationSpec::Text(text.to_string())
    }
}

/// Words skipped between the magnitude and the unit
const FILLERS: &[&str] = &["a", "an", "of", "and"];

static NUMBER_WORDS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    [
        ("zero", 0.0),
        ("half", 0.5),
        ("a", 1.0),
        ("an", 1.0),
        ("one", 1.0),
        ("two", 2.0),
        ("couple", 2.0),
        ("three", 3.0),
        ("four", 4.0),
        ("five", 5.0),
        ("six", 6.0),
        ("seven", 7.0),
        ("eight", 8.0),
        ("nine", 9.0),
        ("ten", 10.0),
        ("eleven", 11.0),
        ("twelve", 12.0),
        ("thirteen", 13.0),
        ("fourteen", 14.0),
        ("fifteen", 15.0),
        ("sixteen", 16.0),
        ("seventeen", 17.0),
        ("eighteen", 18.0),
        ("nineteen", 19.0),
        ("twenty", 20.0),
        ("thirty", 30.0),
        ("forty", 40.0),
        ("fifty", 50.0),
        ("sixty", 60.0),
        ("ninety", 90.0),
    ]
    .into_iter()
    .collect()
});

/// Validate a command's duration, applying the default when absent
pub fn parse_duration(spec: Option<&DurationSpec>) -> Result<Duration, CommandError> {
    let (secs, shown) = match spec {
        None => return Ok(Duration::from_secs_f64(DEFAULT_DURATION_SECS)),
        Some(DurationSpec::Seconds(secs)) => (Some(*secs), secs.to_string()),
        Some(DurationSpec::Text(text)) => (parse_duration_text(text), text.clone()),
    };

    secs.filter(|s| s.is_finite() && *s >= 0.0)
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .ok_or(CommandError::InvalidDuration(shown))
}

/// Parse a free-form duration string into seconds
pub fn parse_duration_text(text: &str) -> Option<f64> {
    let lowered = text.trim().to_ascii_lowercase();
    if lowered.starts_with('-') {
        return None;
    }
    let mut tokens = lowered
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|t| !t.is_empty())
        .peekable();

    let first = tokens.next()?;
    let numeric_len = first
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(first.len());

    let (magnitude, glued_unit) = if numeric_len > 0 {
        let magnitude = first[..numeric_len].parse::<f64>().ok()?;
        let unit = &first[numeric_len..];
        (magnitude, (!unit.is_empty()).then_some(unit))
    } else {
        let mut magnitude = *NUMBER_WORDS.get(first)?;
        // "forty five"
        let ones = tokens
            .peek()
            .and_then(|t| NUMBER_WORDS.get(*t).copied())
            .filter(|v| (1.0..10.0).contains(v) && v.fract() == 0.0);
        if let Some(ones) = ones {
            if magnitude >= 20.0 {
                magnitude += ones;
                tokens.next();
            }
        }
        (magnitude, None)
    };

    let unit = glued_unit.or_else(|| tokens.find(|t| !FILLERS.contains(t)));
    Some(magnitude * unit.map_or(1.0, unit_multiplier))
}

fn unit_multiplier(unit: &str) -> f64 {
    if unit.starts_with('h') {
        3600.0
    } else if unit == "m" || unit.starts_with("min") {
        60.0
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn text(s: &str) -> Result<f64, CommandError> {
        parse_duration(Some(&DurationSpec::from(s))).map(|d| d.as_secs_f64())
    }

    #[test]
    fn test_default_duration() {
        assert_eq!(parse_duration(None).unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn test_bare_numbers() {
        assert_eq!(
            parse_duration(Some(&DurationSpec::Seconds(2.5))).unwrap(),
            Duration::from_millis(2500)
        );
        assert_eq!(
            parse_duration(Some(&DurationSpec::Seconds(0.0))).unwrap(),
            Duration::ZERO
        );
        assert!(matches!(
            parse_duration(Some(&DurationSpec::Seconds(-1.0))),
            Err(CommandError::InvalidDuration(_))
        ));
        assert!(parse_duration(Some(&DurationSpec::Seconds(f64::NAN))).is_err());
        assert!(parse_duration(Some(&DurationSpec::Seconds(f64::INFINITY))).is_err());
    }

    #[test]
    fn test_unit_strings() {
        assert_eq!(text("40 seconds").unwrap(), 40.0);
        assert_eq!(text("2 min").unwrap(), 120.0);
        assert_eq!(text("3 minutes").unwrap(), 180.0);
        assert_eq!(text("1.5h").unwrap(), 5400.0);
        assert_eq!(text("2 hours").unwrap(), 7200.0);
        assert_eq!(text("  7  ").unwrap(), 7.0);
        assert_eq!(text("10s").unwrap(), 10.0);
    }

    #[test]
    fn test_number_words() {
        assert_eq!(text("five").unwrap(), 5.0);
        assert_eq!(text("five minutes").unwrap(), 300.0);
        assert_eq!(text("a minute").unwrap(), 60.0);
        assert_eq!(text("half an hour").unwrap(), 1800.0);
        assert_eq!(text("forty-five seconds").unwrap(), 45.0);
        assert_eq!(text("Twenty Two").unwrap(), 22.0);
    }

    #[test]
    fn test_rejected_strings() {
        assert_eq!(text("soon"), Err(CommandError::InvalidDuration("soon".into())));
        assert!(text("").is_err());
        assert!(text("-3").is_err());
        assert!(text("1.2.3 seconds").is_err());
    }

    #[test]
    fn test_duration_spec_deserializes_number_or_string() {
        let n: DurationSpec = serde_json::from_str("5").unwrap();
        assert_eq!(n, DurationSpec::Seconds(5.0));
        let s: DurationSpec = serde_json::from_str("\"2 min\"").unwrap();
        assert_eq!(s, DurationSpec::Text("2 min".into()));
    }

    proptest! {
        #[test]
        fn prop_plain_seconds_parse_exactly(secs in 0u32..100_000) {
            prop_assert_eq!(parse_duration_text(&secs.to_string()), Some(secs as f64));
        }

        #[test]
        fn prop_minutes_scale_by_sixty(n in 0u32..10_000) {
            prop_assert_eq!(parse_duration_text(&format!("{n} min")), Some(n as f64 * 60.0));
        }

        #[test]
        fn prop_parse_never_panics(s in "\\PC{0,24}") {
            let _ = parse_duration(Some(&DurationSpec::Text(s)));
        }
    }
}
