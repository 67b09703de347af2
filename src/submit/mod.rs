//! Submission to the tax authority, directly or through a relay.
//!
//! Both clients normalize what comes back into an [`AuthorityResult`].
//! Failures fall into three classes: transport problems (retryable), a
//! rejection by the authority (final for that document), and responses
//! that cannot be interpreted (left for an operator).

#[cfg(feature = "submit")]
mod relay;
#[cfg(feature = "submit")]
mod sifen;
#[cfg(all(feature = "submit", feature = "store"))]
mod submitter;

#[cfg(feature = "submit")]
pub use relay::*;
#[cfg(feature = "submit")]
pub use sifen::*;
#[cfg(all(feature = "submit", feature = "store"))]
pub use submitter::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{ControlCode, SifenError};

/// Longest verification URL kept on a record, in characters.
pub const MAX_URL_LEN: usize = 512;

/// The authority's verdict on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityStatus {
    /// Approved, possibly with observations.
    Accepted,
    Rejected,
    /// Received but not yet decided.
    Pending,
}

/// Normalized response from the authority or relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityResult {
    pub status: AuthorityStatus,
    pub control_code: Option<ControlCode>,
    /// dProtAut: authorization protocol number.
    pub protocol_number: Option<String>,
    /// dCodRes
    pub code: Option<String>,
    /// dMsgRes
    pub message: Option<String>,
    pub verification_url: Option<String>,
    /// Response body as received, for audit.
    pub raw_response: String,
}

impl AuthorityResult {
    pub fn is_accepted(&self) -> bool {
        self.status == AuthorityStatus::Accepted
    }
}

/// Failures that leave the outcome of a submission unknown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    /// Connection failure, timeout, or server-side error. Safe to retry
    /// after a lookup.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The response could not be interpreted.
    #[error("ambiguous response: {message}")]
    Ambiguous { message: String, raw: String },
}

impl SubmissionError {
    pub(crate) fn ambiguous(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Ambiguous {
            message: message.into(),
            raw: raw.into(),
        }
    }
}

impl From<SubmissionError> for SifenError {
    fn from(e: SubmissionError) -> Self {
        match e {
            SubmissionError::Transport(msg) => SifenError::Transport(msg),
            SubmissionError::Ambiguous { message, raw } => {
                SifenError::AmbiguousResponse { message, raw }
            }
        }
    }
}

/// The outbound port to the authority.
#[cfg(feature = "submit")]
#[async_trait::async_trait]
pub trait AuthorityClient: Send + Sync {
    /// Send a signed document. One attempt; no retries here.
    async fn submit(
        &self,
        document: &crate::sign::SignedDocument,
    ) -> Result<AuthorityResult, SubmissionError>;

    /// Ask for the state of a previously sent document. `None` means the
    /// authority has no record of it.
    async fn lookup(
        &self,
        control_code: &ControlCode,
    ) -> Result<Option<AuthorityResult>, SubmissionError>;
}

/// Keep at most `max` characters of `s`, cutting on a character boundary.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_keeps_prefix() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn truncation_respects_multibyte_chars() {
        assert_eq!(truncate_chars("añoñ", 2), "añ");
        assert_eq!(truncate_chars("ñññ", 1), "ñ");
    }

    #[test]
    fn long_url_is_truncated_to_limit() {
        let url = format!("https://ekuatia.set.gov.py/consultas/qr?{}", "a".repeat(1000));
        let kept = truncate_chars(&url, MAX_URL_LEN);
        assert_eq!(kept.chars().count(), MAX_URL_LEN);
        assert!(url.starts_with(kept));
    }

    #[test]
    fn submission_errors_convert() {
        let e: SifenError = SubmissionError::Transport("timeout".into()).into();
        assert!(e.is_retryable());
        let e: SifenError = SubmissionError::ambiguous("no status", "<x/>").into();
        assert!(matches!(e, SifenError::AmbiguousResponse { ref raw, .. } if raw == "<x/>"));
    }
}
