use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while issuing an electronic document.
///
/// Every variant maps to one failure class of the issuance pipeline; see
/// [`FailureKind`](crate::core::FailureKind) for the class persisted on a record.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SifenError {
    /// A business field has no entry in the authority catalog.
    #[error("unknown {catalog} value: {value:?}")]
    UnknownCatalogValue { catalog: &'static str, value: String },

    /// Builder encountered invalid or missing input.
    #[error("build error: {0}")]
    Build(String),

    /// One or more field-level validation rules failed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Certificate or key problem. Raised before any network call.
    #[error("signing error: {0}")]
    Signing(String),

    /// Network failure or timeout talking to the authority or relay.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The authority validated the document and rejected it.
    #[error("authority rejected document ({code}): {message}")]
    AuthorityRejection { code: String, message: String },

    /// The response did not parse into a known shape.
    #[error("ambiguous authority response: {message}")]
    AmbiguousResponse { message: String, raw: String },

    /// XML generation or parsing error.
    #[error("XML error: {0}")]
    Xml(String),

    /// Invoice record store error.
    #[error("store error: {0}")]
    Store(String),

    /// Invalid or missing configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl SifenError {
    pub(crate) fn unknown(catalog: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownCatalogValue {
            catalog,
            value: value.into(),
        }
    }

    /// Whether the caller may retry the same document unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::UnknownCatalogValue { .. } => FailureKind::Catalog,
            Self::Build(_) | Self::Validation(_) | Self::Xml(_) => FailureKind::Build,
            Self::Signing(_) => FailureKind::Signing,
            Self::Transport(_) => FailureKind::Transport,
            Self::AuthorityRejection { .. } => FailureKind::Rejected,
            Self::AmbiguousResponse { .. } => FailureKind::Ambiguous,
            Self::Store(_) => FailureKind::Store,
            Self::Config(_) => FailureKind::Config,
        }
    }
}

/// Failure class persisted on an invoice record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Catalog,
    Build,
    Signing,
    Transport,
    Rejected,
    Ambiguous,
    Store,
    Config,
}

impl FailureKind {
    /// Failures that leave the document state unknown at the authority.
    pub fn needs_lookup(&self) -> bool {
        matches!(self, Self::Transport | Self::Ambiguous)
    }
}

/// A single validation error with field path and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dot-separated path to the invalid field (e.g. "items[0].quantity").
    pub field: String,
    /// Human-readable error description.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_catalog_value_names_input() {
        let err = SifenError::unknown("department", "Atlantis");
        assert_eq!(err.to_string(), "unknown department value: \"Atlantis\"");
    }

    #[test]
    fn only_transport_is_retryable() {
        assert!(SifenError::Transport("timeout".into()).is_retryable());
        assert!(
            !SifenError::AuthorityRejection {
                code: "1001".into(),
                message: "CDC duplicado".into()
            }
            .is_retryable()
        );
        assert!(!SifenError::Signing("expired".into()).is_retryable());
    }

    #[test]
    fn failure_kinds() {
        assert_eq!(
            SifenError::unknown("currency", "XYZ").kind(),
            FailureKind::Catalog
        );
        assert_eq!(
            SifenError::Build("timbrado expired".into()).kind(),
            FailureKind::Build
        );
        assert!(SifenError::Transport("timeout".into()).kind().needs_lookup());
        assert!(!FailureKind::Rejected.needs_lookup());
    }
}
