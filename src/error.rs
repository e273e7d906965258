// Error types shared by the library, the CLI and the HTTP server

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// ============================================================================
// VALIDATION ERRORS
// ============================================================================

/// Field-level validation messages, one per field (the first one wins).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an error map holding a single message
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Record a message for `field` unless it already has one
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// `Ok(())` when empty, otherwise a `LoftError::Validation`
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(LoftError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

// ============================================================================
// LOFT ERROR
// ============================================================================

#[derive(Debug, Error)]
pub enum LoftError {
    /// Record is missing or hidden from the caller
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Record exists but belongs to someone else
    #[error("forbidden")]
    Forbidden,

    /// No (known) user attached to the request
    #[error("missing or unknown user")]
    Unauthorized,

    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Request is well-formed but conflicts with stored state
    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LoftError {
    /// Shorthand for a one-field validation failure
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        LoftError::Validation(ValidationErrors::single(field, message))
    }
}

pub type Result<T> = std::result::Result<T, LoftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_message_per_field_wins() {
        let mut errors = ValidationErrors::new();
        errors.add("ring_number", "The ring number field is required.");
        errors.add("ring_number", "second");
        errors.add("gender", "The selected gender is invalid.");

        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors.get("ring_number"),
            Some("The ring number field is required.")
        );
    }

    #[test]
    fn test_into_result() {
        assert!(ValidationErrors::new().into_result().is_ok());

        let err = ValidationErrors::single("name", "bad").into_result().unwrap_err();
        match err {
            LoftError::Validation(errors) => assert_eq!(errors.get("name"), Some("bad")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_serializes_as_flat_map() {
        let errors = ValidationErrors::single("color", "Color must be a valid hex color (e.g., #FF5733).");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"color": "Color must be a valid hex color (e.g., #FF5733)."})
        );
    }
}
