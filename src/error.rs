//! Error types for the masking engine.
//!
//! Errors are split along recovery lines: configuration and I/O problems
//! propagate to the caller and stop processing, while detection and adapter
//! failures are recovered locally and surface as report warnings.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for masking operations.
pub type MaskerResult<T> = Result<T, MaskerError>;

/// Error type for all masking operations.
#[derive(Debug, Error)]
pub enum MaskerError {
    /// Bad policy, template, or detector pattern. Nothing is processed.
    #[error("configuration error in '{subject}': {reason}")]
    Configuration { subject: String, reason: String },

    /// A detector or the NER capability failed. Isolated; the scan continues
    /// and the failure is attached to the report by entity type only.
    #[error("detection failure for '{entity_type}': {reason}")]
    Detection { entity_type: String, reason: String },

    /// A document adapter could not process one scan unit. The unit is
    /// skipped and flagged; other units are still processed.
    #[error("adapter error for scan unit '{unit_id}': {reason}")]
    Adapter { unit_id: String, reason: String },

    /// Document unreadable or unwritable. Surfaced; nothing is written.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MaskerError {
    /// Shorthand for a configuration error.
    pub fn config(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            subject: subject.into(),
            reason: reason.into(),
        }
    }
}

impl From<regex::Error> for MaskerError {
    fn from(err: regex::Error) -> Self {
        Self::Configuration {
            subject: "pattern".to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MaskerError::config("template", "unsupported placeholder '{orig}'");
        assert_eq!(
            err.to_string(),
            "configuration error in 'template': unsupported placeholder '{orig}'"
        );
    }

    #[test]
    fn test_regex_error_maps_to_configuration() {
        let err: MaskerError = regex::Regex::new("(").unwrap_err().into();
        assert!(matches!(err, MaskerError::Configuration { .. }));
    }
}
