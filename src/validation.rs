// 📐 Input Validation - field rules for everything users submit
// Collects every failure into one field → message map before anything is written

use crate::error::{Result, ValidationErrors};
use chrono::{NaiveDate, NaiveTime};
use std::str::FromStr;
use url::Url;

/// Default maximum length for short text columns
pub const MAX_STRING: usize = 255;

/// Turn `ring_number` into `ring number` for messages
fn label(field: &str) -> String {
    field.replace('_', " ")
}

/// Trim and drop empty strings
pub fn clean(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ============================================================================
// VALIDATOR
// ============================================================================

/// Accumulates field errors while converting raw input into typed values.
///
/// Every method returns the parsed value (or a neutral default when the value
/// is invalid), so callers can build their typed record first and call
/// [`Validator::finish`] once at the end.
#[derive(Debug, Default)]
pub struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.add(field, message);
    }

    pub fn has_error(&self, field: &str) -> bool {
        self.errors.contains(field)
    }

    /// Non-empty after trimming, at most `max` characters
    pub fn required(&mut self, field: &str, value: Option<&str>, max: usize) -> String {
        match clean(value) {
            Some(v) => {
                self.check_length(field, v, max);
                v.to_string()
            }
            None => {
                self.error(field, format!("The {} field is required.", label(field)));
                String::new()
            }
        }
    }

    /// Empty strings become `None`; `max` of `None` means unbounded text
    pub fn optional(&mut self, field: &str, value: Option<&str>, max: Option<usize>) -> Option<String> {
        let v = clean(value)?;
        if let Some(max) = max {
            self.check_length(field, v, max);
        }
        Some(v.to_string())
    }

    fn check_length(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.error(
                field,
                format!("The {} field must not be greater than {} characters.", label(field), max),
            );
        }
    }

    /// One of the values an enum accepts; absent is fine
    pub fn choice<T: FromStr>(&mut self, field: &str, value: Option<&str>) -> Option<T> {
        let v = clean(value)?;
        match v.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                self.error(field, format!("The selected {} is invalid.", label(field)));
                None
            }
        }
    }

    /// Like [`Validator::choice`] but the field must be present
    pub fn required_choice<T: FromStr + Default>(&mut self, field: &str, value: Option<&str>) -> T {
        if clean(value).is_none() {
            self.error(field, format!("The {} field is required.", label(field)));
            return T::default();
        }
        self.choice(field, value).unwrap_or_default()
    }

    /// `YYYY-MM-DD`
    pub fn date(&mut self, field: &str, value: Option<&str>) -> Option<NaiveDate> {
        let v = clean(value)?;
        match NaiveDate::parse_from_str(v, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                self.error(field, format!("The {} field must be a valid date.", label(field)));
                None
            }
        }
    }

    /// Time of day in a fixed format (`%H:%M` or `%H:%M:%S`)
    pub fn time(&mut self, field: &str, value: Option<&str>, format: &str) -> Option<NaiveTime> {
        let v = clean(value)?;
        let display = format.replace("%H", "H").replace("%M", "i").replace("%S", "s");
        match NaiveTime::parse_from_str(v, format) {
            // chrono accepts "7:05" for %H:%M, the form fields do not
            Ok(time) if v.len() == format.len() => Some(time),
            _ => {
                self.error(
                    field,
                    format!("The {} field must match the format {}.", label(field), display),
                );
                None
            }
        }
    }

    /// `later` must not come before `earlier`
    pub fn not_before(
        &mut self,
        field: &str,
        later: Option<NaiveDate>,
        earlier_field: &str,
        earlier: Option<NaiveDate>,
    ) {
        if let (Some(later), Some(earlier)) = (later, earlier) {
            if later < earlier {
                self.error(
                    field,
                    format!(
                        "The {} field must be a date after or equal to {}.",
                        label(field),
                        label(earlier_field)
                    ),
                );
            }
        }
    }

    pub fn min_number(&mut self, field: &str, value: Option<f64>, min: f64) -> Option<f64> {
        let v = value?;
        if !v.is_finite() || v < min {
            self.error(field, format!("The {} field must be at least {}.", label(field), min));
            return None;
        }
        Some(v)
    }

    pub fn min_integer(&mut self, field: &str, value: Option<i64>, min: i64) -> Option<i64> {
        let v = value?;
        if v < min {
            self.error(field, format!("The {} field must be at least {}.", label(field), min));
            return None;
        }
        Some(v)
    }

    /// Required integer within `min..=max`
    pub fn integer_between(&mut self, field: &str, value: Option<i64>, min: i64, max: i64) -> i64 {
        match value {
            Some(v) if (min..=max).contains(&v) => v,
            Some(_) => {
                self.error(
                    field,
                    format!("The {} field must be between {} and {}.", label(field), min, max),
                );
                min
            }
            None => {
                self.error(field, format!("The {} field is required.", label(field)));
                min
            }
        }
    }

    /// Required `#RRGGBB`, returned uppercase
    pub fn hex_color(&mut self, field: &str, value: Option<&str>) -> String {
        let Some(v) = clean(value) else {
            self.error(field, format!("The {} field is required.", label(field)));
            return String::new();
        };
        let valid = v.len() == 7
            && v.starts_with('#')
            && v[1..].chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            self.error(field, "Color must be a valid hex color (e.g., #FF5733).");
        }
        v.to_ascii_uppercase()
    }

    /// Optional absolute http(s) URL
    pub fn url(&mut self, field: &str, value: Option<&str>) -> Option<String> {
        let v = clean(value)?;
        if !is_url(v) {
            self.error(field, format!("The {} field must be a valid URL.", label(field)));
        }
        self.check_length(field, v, MAX_STRING);
        Some(v.to_string())
    }

    /// Every entry must be a URL; messages are keyed `field.N`
    pub fn urls(&mut self, field: &str, values: &[String]) -> Vec<String> {
        let mut out = Vec::with_capacity(values.len());
        for (i, value) in values.iter().enumerate() {
            let key = format!("{}.{}", field, i);
            if let Some(url) = self.url(&key, Some(value)) {
                out.push(url);
            }
        }
        out
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn finish(self) -> Result<()> {
        self.errors.into_result()
    }
}

fn is_url(value: &str) -> bool {
    match Url::parse(value) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|host| !host.is_empty())
        }
        Err(_) => false,
    }
}

// ============================================================================
// TESTS
// ============================================================================
