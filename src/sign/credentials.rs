use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use p256::SecretKey;
use p256::ecdsa::{SigningKey, VerifyingKey};
use p256::pkcs8::DecodePrivateKey;
use x509_cert::Certificate;
use x509_cert::der::{Decode, DecodePem, Encode};
use x509_cert::time::Time;

use crate::core::SifenError;

/// An X.509 certificate with its matching P-256 private key.
///
/// The key/certificate match is checked on load; the validity window is
/// checked on every signature, against the signing time.
pub struct SigningCredentials {
    key: SigningKey,
    certificate_der: Vec<u8>,
    subject: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl SigningCredentials {
    /// Load from a PEM certificate and a PEM private key (PKCS#8 or SEC1).
    pub fn from_pem(certificate_pem: &str, key_pem: &str) -> Result<Self, SifenError> {
        let certificate = Certificate::from_pem(certificate_pem.as_bytes())
            .map_err(|e| SifenError::Signing(format!("invalid certificate: {e}")))?;
        let key = parse_key(key_pem)?;

        let public_key = certificate_key(&certificate)?;
        if *key.verifying_key() != public_key {
            return Err(SifenError::Signing(
                "private key does not match the certificate".into(),
            ));
        }

        let validity = &certificate.tbs_certificate.validity;
        let certificate_der = certificate
            .to_der()
            .map_err(|e| SifenError::Signing(format!("certificate encoding: {e}")))?;

        Ok(Self {
            key,
            subject: certificate.tbs_certificate.subject.to_string(),
            not_before: to_utc(&validity.not_before)?,
            not_after: to_utc(&validity.not_after)?,
            certificate_der,
        })
    }

    pub fn from_files(certificate: &Path, key: &Path) -> Result<Self, SifenError> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|e| {
                SifenError::Signing(format!("cannot read {}: {e}", path.display()))
            })
        };
        Self::from_pem(&read(certificate)?, &read(key)?)
    }

    /// Fail unless `now` lies inside the certificate's validity window.
    pub fn check_validity(&self, now: DateTime<Utc>) -> Result<(), SifenError> {
        if now < self.not_before {
            return Err(SifenError::Signing(format!(
                "certificate {} is not valid before {}",
                self.subject, self.not_before
            )));
        }
        if now > self.not_after {
            return Err(SifenError::Signing(format!(
                "certificate {} expired at {}",
                self.subject, self.not_after
            )));
        }
        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.key
    }
}

impl fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("subject", &self.subject)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

fn parse_key(pem: &str) -> Result<SigningKey, SifenError> {
    if let Ok(key) = SigningKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    SecretKey::from_sec1_pem(pem)
        .map(SigningKey::from)
        .map_err(|_| SifenError::Signing("private key is not a P-256 PKCS#8 or SEC1 PEM".into()))
}

fn certificate_key(certificate: &Certificate) -> Result<VerifyingKey, SifenError> {
    let spki = &certificate.tbs_certificate.subject_public_key_info;
    VerifyingKey::from_sec1_bytes(spki.subject_public_key.raw_bytes())
        .map_err(|_| SifenError::Signing("certificate key is not a P-256 public key".into()))
}

/// Public key of a DER certificate, as embedded in a signature.
pub(crate) fn verifying_key_from_der(der: &[u8]) -> Result<VerifyingKey, SifenError> {
    let certificate = Certificate::from_der(der)
        .map_err(|e| SifenError::Signing(format!("invalid embedded certificate: {e}")))?;
    certificate_key(&certificate)
}

fn to_utc(time: &Time) -> Result<DateTime<Utc>, SifenError> {
    let secs = i64::try_from(time.to_unix_duration().as_secs())
        .map_err(|_| SifenError::Signing("certificate date out of range".into()))?;
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| SifenError::Signing("certificate date out of range".into()))
}
