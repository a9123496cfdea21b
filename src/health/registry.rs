//! Active error records of one robot
//!
//! Errors persist until cleared explicitly; identical records are kept once.

use vda_protocol::{AgvError, ErrorKind, ErrorLevel, ErrorReference};

/// Build an error record.
pub fn error_record(
    kind: ErrorKind,
    level: ErrorLevel,
    description: impl Into<String>,
    references: &[(&str, &str)],
) -> AgvError {
    AgvError {
        error_type: kind.as_str().to_string(),
        error_level: level,
        error_description: Some(description.into()),
        error_references: references
            .iter()
            .map(|(key, value)| ErrorReference {
                reference_key: key.to_string(),
                reference_value: value.to_string(),
            })
            .collect(),
    }
}

/// Ordered set of active errors
#[derive(Debug, Clone, Default)]
pub struct ErrorRegistry {
    errors: Vec<AgvError>,
}

impl ErrorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error unless an identical one (type, level, references) is
    /// already active. Returns true if it was added.
    pub fn raise(&mut self, error: AgvError) -> bool {
        let duplicate = self.errors.iter().any(|e| {
            e.error_type == error.error_type
                && e.error_level == error.error_level
                && e.error_references == error.error_references
        });
        if duplicate {
            return false;
        }
        self.errors.push(error);
        true
    }

    /// Clear every error, or only those of `error_type`. Returns the number
    /// removed.
    pub fn clear(&mut self, error_type: Option<&str>) -> usize {
        let before = self.errors.len();
        match error_type {
            Some(t) => self.errors.retain(|e| e.error_type != t),
            None => self.errors.clear(),
        }
        before - self.errors.len()
    }

    pub fn has_fatal(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.error_level == ErrorLevel::Fatal)
    }

    /// Whether an error with this type and description is active
    pub fn contains(&self, error_type: &str, description: &str) -> bool {
        self.errors.iter().any(|e| {
            e.error_type == error_type && e.error_description.as_deref() == Some(description)
        })
    }

    pub fn errors(&self) -> &[AgvError] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_deduplicates() {
        let mut registry = ErrorRegistry::new();
        let err = error_record(
            ErrorKind::ActionError,
            ErrorLevel::Warning,
            "timed out",
            &[("actionId", "a1")],
        );

        assert!(registry.raise(err.clone()));
        assert!(!registry.raise(err));
        assert_eq!(registry.errors().len(), 1);

        let other = error_record(
            ErrorKind::ActionError,
            ErrorLevel::Warning,
            "timed out",
            &[("actionId", "a2")],
        );
        assert!(registry.raise(other));
        assert_eq!(registry.errors().len(), 2);
    }

    #[test]
    fn test_fatal_detection_and_clear_by_type() {
        let mut registry = ErrorRegistry::new();
        registry.raise(error_record(ErrorKind::DeviceError, ErrorLevel::Fatal, "motor", &[]));
        registry.raise(error_record(ErrorKind::ValidationError, ErrorLevel::Warning, "bad", &[]));
        assert!(registry.has_fatal());

        assert_eq!(registry.clear(Some("DEVICE_ERROR")), 1);
        assert!(!registry.has_fatal());
        assert_eq!(registry.errors().len(), 1);

        assert_eq!(registry.clear(None), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_record_fields() {
        let err = error_record(
            ErrorKind::ValidationError,
            ErrorLevel::Warning,
            "stale update",
            &[("orderId", "o1"), ("orderUpdateId", "3")],
        );
        assert_eq!(err.error_type, "VALIDATION_ERROR");
        assert_eq!(err.error_references.len(), 2);
        assert_eq!(err.error_references[1].reference_value, "3");
    }
}
