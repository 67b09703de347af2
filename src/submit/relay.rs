use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AuthorityClient, AuthorityResult, AuthorityStatus, SubmissionError};
use crate::core::{ControlCode, SifenError, normalize_label};
use crate::sign::SignedDocument;

/// Client for a third-party relay that forwards documents to SIFEN.
///
/// The relay speaks JSON with bearer authentication. Relays disagree on
/// field names and nesting, so the response is read leniently and then
/// normalized into an [`AuthorityResult`].
#[derive(Clone)]
pub struct RelayClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    control_code: &'a str,
    xml: String,
}

#[derive(Debug, Default, Deserialize)]
struct RelayEnvelope {
    success: Option<bool>,
    #[serde(alias = "result", alias = "documento")]
    data: Option<RelayDocument>,
    #[serde(flatten)]
    inline: RelayDocument,
}

#[derive(Debug, Default, Deserialize)]
struct RelayDocument {
    #[serde(alias = "estado", alias = "state")]
    status: Option<String>,
    #[serde(alias = "cdc", alias = "controlCode")]
    control_code: Option<String>,
    #[serde(alias = "protocolo", alias = "protocol", alias = "dProtAut")]
    protocol_number: Option<String>,
    #[serde(alias = "codigo", alias = "dCodRes")]
    code: Option<String>,
    #[serde(alias = "mensaje", alias = "error", alias = "dMsgRes")]
    message: Option<String>,
    #[serde(alias = "qr", alias = "qr_url", alias = "url")]
    verification_url: Option<String>,
}

impl RelayClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SifenError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SifenError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http,
        })
    }

    fn check_status(status: reqwest::StatusCode, body: &str) -> Result<(), SubmissionError> {
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SubmissionError::Transport(format!("relay returned HTTP {status}")));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SubmissionError::ambiguous(
                format!("relay refused credentials (HTTP {status})"),
                body,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthorityClient for RelayClient {
    async fn submit(&self, document: &SignedDocument) -> Result<AuthorityResult, SubmissionError> {
        let url = format!("{}/documents", self.base_url);
        let payload = SubmitRequest {
            control_code: document.control_code().as_str(),
            xml: document
                .xml()
                .map_err(|e| SubmissionError::Transport(format!("cannot render document: {e}")))?,
        };

        tracing::info!(control_code = %document.control_code(), "submitting through relay");
        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| SubmissionError::Transport(format!("POST {url}: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| SubmissionError::Transport(format!("reading relay response: {e}")))?;
        Self::check_status(status, &body)?;

        parse_relay_response(&body)
    }

    async fn lookup(
        &self,
        control_code: &ControlCode,
    ) -> Result<Option<AuthorityResult>, SubmissionError> {
        let url = format!("{}/documents/{}", self.base_url, control_code);
        let resp = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| SubmissionError::Transport(format!("GET {url}: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = resp
            .text()
            .await
            .map_err(|e| SubmissionError::Transport(format!("reading relay response: {e}")))?;
        Self::check_status(status, &body)?;

        parse_relay_response(&body).map(Some)
    }
}

fn relay_status(label: &str) -> Option<AuthorityStatus> {
    match normalize_label(label).as_str() {
        "APROBADO" | "APROBADO CON OBSERVACION" | "ACCEPTED" | "APPROVED" => {
            Some(AuthorityStatus::Accepted)
        }
        "RECHAZADO" | "REJECTED" => Some(AuthorityStatus::Rejected),
        "PENDIENTE" | "EN PROCESAMIENTO" | "PENDING" | "PROCESSING" => {
            Some(AuthorityStatus::Pending)
        }
        _ => None,
    }
}

/// Normalize a relay JSON body.
///
/// The document may sit at the top level or under `data`/`result`. Only an
/// explicit status label is a verdict: `"success": false` without one is a
/// relay-side failure and comes back as [`SubmissionError::Ambiguous`].
pub fn parse_relay_response(body: &str) -> Result<AuthorityResult, SubmissionError> {
    let envelope: RelayEnvelope = serde_json::from_str(body)
        .map_err(|e| SubmissionError::ambiguous(format!("relay response is not JSON: {e}"), body))?;

    let RelayEnvelope {
        success,
        data,
        inline,
    } = envelope;
    let doc = data.unwrap_or(inline);

    let status = match (doc.status.as_deref(), success) {
        (Some(label), _) => relay_status(label).ok_or_else(|| {
            SubmissionError::ambiguous(format!("unknown relay status {label:?}"), body)
        })?,
        (None, Some(false)) => {
            return Err(SubmissionError::ambiguous(
                format!(
                    "relay failed without an authority status: {}",
                    doc.message.as_deref().unwrap_or("no message")
                ),
                body,
            ));
        }
        (None, _) => return Err(SubmissionError::ambiguous("relay response carries no status", body)),
    };

    if status == AuthorityStatus::Accepted && doc.protocol_number.is_none() {
        return Err(SubmissionError::ambiguous(
            "relay reports approval without a protocol number",
            body,
        ));
    }

    let control_code = match doc.control_code.as_deref() {
        Some(raw) => Some(ControlCode::parse(raw).map_err(|e| {
            SubmissionError::ambiguous(format!("relay returned a bad control code: {e}"), body)
        })?),
        None => None,
    };

    Ok(AuthorityResult {
        status,
        control_code,
        protocol_number: doc.protocol_number,
        code: doc.code,
        message: doc.message,
        verification_url: doc.verification_url,
        raw_response: body.to_string(),
    })
}
