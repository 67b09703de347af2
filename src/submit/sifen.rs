use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use super::{AuthorityClient, AuthorityResult, AuthorityStatus, SubmissionError};
use crate::config::Environment;
use crate::core::{ControlCode, SifenError, normalize_label};
use crate::sign::SignedDocument;
use crate::xml::{C14nWriter, Leaf, SIFEN_NS, first_text, leaf_texts};

const SOAP_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

/// dCodRes returned by rEnviConsDe when the CDC is unknown.
pub const LOOKUP_NOT_FOUND: &str = "0420";
/// dCodRes returned by rEnviConsDe when the CDC exists.
pub const LOOKUP_FOUND: &str = "0422";

/// Direct SOAP client for the SIFEN synchronous services.
#[derive(Clone)]
pub struct SifenClient {
    submit_url: String,
    lookup_url: String,
    http: reqwest::Client,
}

impl SifenClient {
    /// Client for `environment`. `identity_pem` is a PEM bundle with the
    /// client certificate and key for mutual TLS.
    pub fn new(
        environment: Environment,
        timeout: Duration,
        identity_pem: Option<&[u8]>,
    ) -> Result<Self, SifenError> {
        Self::with_endpoints(
            environment.submit_url(),
            environment.lookup_url(),
            timeout,
            identity_pem,
        )
    }

    /// Client for explicit endpoints.
    pub fn with_endpoints(
        submit_url: impl Into<String>,
        lookup_url: impl Into<String>,
        timeout: Duration,
        identity_pem: Option<&[u8]>,
    ) -> Result<Self, SifenError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(pem) = identity_pem {
            let identity = reqwest::Identity::from_pem(pem)
                .map_err(|e| SifenError::Config(format!("invalid TLS identity: {e}")))?;
            builder = builder.identity(identity);
        }
        let http = builder
            .build()
            .map_err(|e| SifenError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            submit_url: submit_url.into(),
            lookup_url: lookup_url.into(),
            http,
        })
    }

    async fn post(&self, url: &str, envelope: String) -> Result<String, SubmissionError> {
        let resp = self
            .http
            .post(url)
            .header("Content-Type", "application/soap+xml; charset=utf-8")
            .body(envelope)
            .send()
            .await
            .map_err(|e| SubmissionError::Transport(format!("POST {url}: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| SubmissionError::Transport(format!("reading response: {e}")))?;

        if status.is_server_error() && !body.contains("rProtDe") {
            return Err(SubmissionError::Transport(format!("HTTP {status} from {url}")));
        }
        Ok(body)
    }
}

#[async_trait]
impl AuthorityClient for SifenClient {
    async fn submit(&self, document: &SignedDocument) -> Result<AuthorityResult, SubmissionError> {
        let xml = document
            .xml()
            .map_err(|e| SubmissionError::Transport(format!("cannot render document: {e}")))?;
        let envelope = soap_envelope("rEnviDe", &[("dId", &request_id()), ("xDE", &xml)])
            .map_err(|e| SubmissionError::Transport(e.to_string()))?;

        tracing::info!(control_code = %document.control_code(), "submitting to SIFEN");
        let body = self.post(&self.submit_url, envelope).await?;
        parse_submit_response(&body)
    }

    async fn lookup(
        &self,
        control_code: &ControlCode,
    ) -> Result<Option<AuthorityResult>, SubmissionError> {
        let envelope = soap_envelope(
            "rEnviConsDe",
            &[("dId", &request_id()), ("dCDC", control_code.as_str())],
        )
        .map_err(|e| SubmissionError::Transport(e.to_string()))?;

        tracing::info!(control_code = %control_code, "looking up document");
        let body = self.post(&self.lookup_url, envelope).await?;
        parse_lookup_response(&body)
    }
}

/// dId: request identifier, up to 15 digits.
fn request_id() -> String {
    rand::thread_rng()
        .gen_range(1..1_000_000_000_000_000u64)
        .to_string()
}

/// Write a SOAP 1.2 request. `xDE` is embedded verbatim since it is
/// already XML; every other field is escaped text.
fn soap_envelope(operation: &str, fields: &[(&str, &str)]) -> Result<String, SifenError> {
    let mut w = C14nWriter::new();
    w.start_element_with_attrs("soap:Envelope", &[("xmlns:soap", SOAP_NS)])?;
    w.start_element("soap:Header")?.end_element("soap:Header")?;
    w.start_element("soap:Body")?;
    w.start_element_with_attrs(operation, &[("xmlns", SIFEN_NS)])?;
    for (name, value) in fields {
        if *name == "xDE" {
            w.start_element(name)?.raw(value)?.end_element(name)?;
        } else {
            w.text_element(name, value)?;
        }
    }
    w.end_element(operation)?;
    w.end_element("soap:Body")?;
    w.end_element("soap:Envelope")?;
    w.into_string()
}

fn soap_fault(leaves: &[Leaf]) -> Option<String> {
    leaves
        .iter()
        .filter(|l| l.within("Fault"))
        .find(|l| matches!(l.name(), "Text" | "faultstring" | "Reason"))
        .map(|l| l.text.clone())
}

fn status_from_label(label: &str) -> Option<AuthorityStatus> {
    match normalize_label(label).as_str() {
        "APROBADO" | "APROBADO CON OBSERVACION" => Some(AuthorityStatus::Accepted),
        "RECHAZADO" => Some(AuthorityStatus::Rejected),
        "EN PROCESAMIENTO" | "PENDIENTE" => Some(AuthorityStatus::Pending),
        _ => None,
    }
}

/// Interpret an rRetEnviDe response.
pub fn parse_submit_response(body: &str) -> Result<AuthorityResult, SubmissionError> {
    let leaves = leaf_texts(body)
        .map_err(|e| SubmissionError::ambiguous(format!("unparseable response: {e}"), body))?;

    if let Some(fault) = soap_fault(&leaves) {
        return Err(SubmissionError::ambiguous(format!("SOAP fault: {fault}"), body));
    }

    let state = first_text(&leaves, "dEstRes")
        .ok_or_else(|| SubmissionError::ambiguous("response carries no dEstRes", body))?;
    let status = status_from_label(state)
        .ok_or_else(|| SubmissionError::ambiguous(format!("unknown dEstRes {state:?}"), body))?;

    let protocol_number = first_text(&leaves, "dProtAut").map(str::to_string);
    if status == AuthorityStatus::Accepted && protocol_number.is_none() {
        return Err(SubmissionError::ambiguous(
            "approved response without dProtAut",
            body,
        ));
    }

    Ok(AuthorityResult {
        status,
        control_code: leaves
            .iter()
            .find(|l| l.name() == "Id" && l.within("rProtDe"))
            .and_then(|l| ControlCode::parse(&l.text).ok()),
        protocol_number,
        code: first_text(&leaves, "dCodRes").map(str::to_string),
        message: first_text(&leaves, "dMsgRes").map(str::to_string),
        verification_url: None,
        raw_response: body.to_string(),
    })
}

/// Interpret an rEnviConsDe response.
pub fn parse_lookup_response(body: &str) -> Result<Option<AuthorityResult>, SubmissionError> {
    let leaves = leaf_texts(body)
        .map_err(|e| SubmissionError::ambiguous(format!("unparseable response: {e}"), body))?;

    if let Some(fault) = soap_fault(&leaves) {
        return Err(SubmissionError::ambiguous(format!("SOAP fault: {fault}"), body));
    }

    let code = first_text(&leaves, "dCodRes")
        .ok_or_else(|| SubmissionError::ambiguous("lookup response carries no dCodRes", body))?;
    let message = first_text(&leaves, "dMsgRes").map(str::to_string);

    match code {
        LOOKUP_NOT_FOUND => Ok(None),
        LOOKUP_FOUND => {
            let status = match first_text(&leaves, "dEstRes") {
                Some(label) => status_from_label(label).ok_or_else(|| {
                    SubmissionError::ambiguous(format!("unknown dEstRes {label:?}"), body)
                })?,
                None => AuthorityStatus::Accepted,
            };
            let protocol_number = first_text(&leaves, "dProtAut").map(str::to_string);
            if status == AuthorityStatus::Accepted && protocol_number.is_none() {
                return Err(SubmissionError::ambiguous(
                    "document found without dProtAut",
                    body,
                ));
            }
            Ok(Some(AuthorityResult {
                status,
                control_code: first_text(&leaves, "Id")
                    .or_else(|| first_text(&leaves, "dCDC"))
                    .and_then(|c| ControlCode::parse(c).ok()),
                protocol_number,
                code: Some(code.to_string()),
                message,
                verification_url: None,
                raw_response: body.to_string(),
            }))
        }
        other => Err(SubmissionError::ambiguous(
            format!(
                "unexpected lookup code {other}: {}",
                message.as_deref().unwrap_or("")
            ),
            body,
        )),
    }
}
