//! Field normalization and validation shared by record constructors.

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use std::sync::LazyLock;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("email pattern compiles"));

/// Payload rejected before anything was persisted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Trimmed, non-empty value or a "`field` is required" error.
pub fn required(field: &str, value: Option<String>) -> Result<String, ValidationError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ValidationError(format!("{} is required", field))),
    }
}

/// Trimmed value; blank strings collapse to `None`.
pub fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Required, lower-cased, `local@domain.tld` shaped.
pub fn email(value: Option<String>) -> Result<String, ValidationError> {
    let v = required("email", value)?.to_lowercase();
    if EMAIL_RE.is_match(&v) {
        Ok(v)
    } else {
        Err(ValidationError::new("Please provide a valid email"))
    }
}

pub fn amount(value: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::new("amount must be a finite number"));
    }
    if value < 0.0 {
        return Err(ValidationError::new("Amount cannot be negative"));
    }
    Ok(value)
}

/// Win likelihood in percent; fractional values are kept as given.
pub fn probability(value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::new("probability must be between 0 and 100"))
    }
}

/// Parses an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

pub fn timestamp(field: &str, value: Option<String>) -> Result<DateTime<Utc>, ValidationError> {
    let raw = required(field, value)?;
    parse_timestamp(&raw).ok_or_else(|| {
        ValidationError(format!("{} must be a date (YYYY-MM-DD or RFC 3339)", field))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_trimmed_and_lowercased() {
        assert_eq!(
            email(Some("  Ada@Example.COM ".to_string())).unwrap(),
            "ada@example.com"
        );
        assert!(email(Some("not-an-email".to_string())).is_err());
        assert!(email(Some("a@b".to_string())).is_err());
        assert_eq!(
            email(None).unwrap_err(),
            ValidationError::new("email is required")
        );
    }

    #[test]
    fn blank_required_field_is_rejected() {
        assert!(required("phone", Some("   ".to_string())).is_err());
        assert_eq!(optional(Some("  ".to_string())), None);
        assert_eq!(optional(Some(" x ".to_string())), Some("x".to_string()));
    }

    #[test]
    fn numeric_ranges() {
        assert!(amount(-1.0).is_err());
        assert!(amount(f64::NAN).is_err());
        assert_eq!(amount(0.0).unwrap(), 0.0);
        assert_eq!(probability(100.0).unwrap(), 100.0);
        assert_eq!(probability(33.5).unwrap(), 33.5);
        assert_eq!(probability(0.0).unwrap(), 0.0);
        assert!(probability(100.5).is_err());
        assert!(probability(-0.1).is_err());
        assert!(probability(f64::NAN).is_err());
        assert!(probability(f64::INFINITY).is_err());
    }

    #[test]
    fn timestamps_accept_dates_and_rfc3339() {
        let d = parse_timestamp("2024-03-01").unwrap();
        assert_eq!(d.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        let t = parse_timestamp("2024-03-01T10:30:00+02:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2024-03-01T08:30:00+00:00");
        assert!(parse_timestamp("yesterday").is_none());
    }
}
