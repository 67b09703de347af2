use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::Signature;
use sha2::{Digest, Sha256};

use super::credentials::{SigningCredentials, verifying_key_from_der};
use crate::core::{ControlCode, SifenError};
use crate::qr::{QrBuilder, QrInput};
use crate::xml::{C14nWriter, CanonicalDocument, DocumentSummary, envelope};

pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
pub const DIGEST_SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
pub const SIGNATURE_ECDSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";

/// The values of an enveloped XML-DSig signature, all base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureBlock {
    /// SHA-256 of the canonical DE.
    pub digest_value: String,
    /// ECDSA P-256 (r ‖ s) over the canonical SignedInfo.
    pub signature_value: String,
    /// DER certificate of the signer.
    pub certificate: String,
}

/// A canonical document with its signature attached.
///
/// Only [`sign`] creates one, and nothing changes its signed content. It
/// is the only form the submission client accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDocument {
    document: CanonicalDocument,
    signature: SignatureBlock,
    signature_xml: String,
    verification_url: Option<String>,
}

impl SignedDocument {
    pub fn control_code(&self) -> &ControlCode {
        self.document.control_code()
    }

    pub fn summary(&self) -> &DocumentSummary {
        self.document.summary()
    }

    pub fn signature(&self) -> &SignatureBlock {
        &self.signature
    }

    pub fn digest_value(&self) -> &str {
        &self.signature.digest_value
    }

    pub fn verification_url(&self) -> Option<&str> {
        self.verification_url.as_deref()
    }

    /// Add the verification QR (`gCamFuFD`).
    ///
    /// The QR block sits outside the signed `DE` and is derived only from
    /// the signed content, so the signature stays valid.
    pub fn with_qr(mut self, qr: &QrBuilder) -> Self {
        self.verification_url = Some(qr.build(&QrInput::from_signed(&self)));
        self
    }

    /// The full `rDE` envelope as submitted.
    pub fn xml(&self) -> Result<String, SifenError> {
        envelope(
            self.document.embedded_de(),
            &self.signature_xml,
            self.verification_url.as_deref(),
        )
    }
}

/// Sign a canonical document.
///
/// Fails with [`SifenError::Signing`] when the certificate is not valid at
/// `now`. No network access happens here.
pub fn sign(
    document: CanonicalDocument,
    credentials: &SigningCredentials,
    now: DateTime<Utc>,
) -> Result<SignedDocument, SifenError> {
    credentials.check_validity(now)?;

    let digest_value = BASE64.encode(Sha256::digest(document.digest_input()));
    let signed_info = SignedInfo::new(document.control_code(), &digest_value)?;

    let signature: Signature = credentials.signing_key().sign(signed_info.canonical.as_bytes());
    let signature_value = BASE64.encode(signature.to_bytes());
    let certificate = BASE64.encode(credentials.certificate_der());

    tracing::debug!(
        control_code = %document.control_code(),
        digest = %digest_value,
        "signed document"
    );

    let signature_xml = signature_element(&signed_info.body, &signature_value, &certificate)?;

    Ok(SignedDocument {
        document,
        signature: SignatureBlock {
            digest_value,
            signature_value,
            certificate,
        },
        signature_xml,
        verification_url: None,
    })
}

/// Recompute the digest and check the signature against the embedded
/// certificate key.
pub fn verify(document: &SignedDocument) -> Result<(), SifenError> {
    let block = &document.signature;

    let digest = BASE64.encode(Sha256::digest(document.document.digest_input()));
    if digest != block.digest_value {
        return Err(SifenError::Signing("digest does not match document".into()));
    }

    let certificate = BASE64
        .decode(&block.certificate)
        .map_err(|e| SifenError::Signing(format!("certificate is not base64: {e}")))?;
    let key = verifying_key_from_der(&certificate)?;

    let raw = BASE64
        .decode(&block.signature_value)
        .map_err(|e| SifenError::Signing(format!("signature is not base64: {e}")))?;
    let signature = Signature::from_slice(&raw)
        .map_err(|_| SifenError::Signing("malformed ECDSA signature".into()))?;

    let signed_info = SignedInfo::new(document.control_code(), &block.digest_value)?;
    key.verify(signed_info.canonical.as_bytes(), &signature)
        .map_err(|_| SifenError::Signing("signature does not verify".into()))
}

/// SignedInfo written once, wrapped twice: standalone canonical form
/// (signed) and embedded form inside `Signature`.
struct SignedInfo {
    canonical: String,
    body: String,
}

impl SignedInfo {
    fn new(control_code: &ControlCode, digest_value: &str) -> Result<Self, SifenError> {
        let reference = format!("#{control_code}");
        let mut w = C14nWriter::new();
        w.start_element_with_attrs("CanonicalizationMethod", &[("Algorithm", EXC_C14N)])?
            .end_element("CanonicalizationMethod")?;
        w.start_element_with_attrs("SignatureMethod", &[("Algorithm", SIGNATURE_ECDSA_SHA256)])?
            .end_element("SignatureMethod")?;
        w.start_element_with_attrs("Reference", &[("URI", reference.as_str())])?;
        w.start_element("Transforms")?;
        w.start_element_with_attrs("Transform", &[("Algorithm", ENVELOPED_SIGNATURE)])?
            .end_element("Transform")?;
        w.start_element_with_attrs("Transform", &[("Algorithm", EXC_C14N)])?
            .end_element("Transform")?;
        w.end_element("Transforms")?;
        w.start_element_with_attrs("DigestMethod", &[("Algorithm", DIGEST_SHA256)])?
            .end_element("DigestMethod")?;
        w.text_element("DigestValue", digest_value)?;
        w.end_element("Reference")?;
        let inner = w.into_string()?;

        let mut canonical = C14nWriter::new();
        canonical
            .start_element_with_attrs("SignedInfo", &[("xmlns", XMLDSIG_NS)])?
            .raw(&inner)?
            .end_element("SignedInfo")?;

        let mut body = C14nWriter::new();
        body.start_element("SignedInfo")?
            .raw(&inner)?
            .end_element("SignedInfo")?;

        Ok(Self {
            canonical: canonical.into_string()?,
            body: body.into_string()?,
        })
    }
}

fn signature_element(
    signed_info: &str,
    signature_value: &str,
    certificate: &str,
) -> Result<String, SifenError> {
    let mut w = C14nWriter::new();
    w.start_element_with_attrs("Signature", &[("xmlns", XMLDSIG_NS)])?;
    w.raw(signed_info)?;
    w.text_element("SignatureValue", signature_value)?;
    w.start_element("KeyInfo")?;
    w.start_element("X509Data")?;
    w.text_element("X509Certificate", certificate)?;
    w.end_element("X509Data")?;
    w.end_element("KeyInfo")?;
    w.end_element("Signature")?;
    w.into_string()
}
