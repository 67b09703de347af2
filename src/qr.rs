//! Verification QR link (`dCarQR`).
//!
//! The link lets a receiver check the document against the authority.
//! Its parameter order is fixed, and the final `cHashQR` is the SHA-256 of
//! the parameter string followed by the emitter's secret CSC.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::config::Environment;
use crate::sign::SignedDocument;
use crate::xml::{DATETIME_FORMAT, DE_VERSION, ReceiverId, format_decimal};

/// Everything the QR link is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrInput {
    pub control_code: String,
    pub issued_at: NaiveDateTime,
    pub receiver: ReceiverId,
    pub grand_total: Decimal,
    pub tax_total: Decimal,
    pub item_count: usize,
    /// Base64 DigestValue of the signature.
    pub digest_value: String,
}

impl QrInput {
    pub fn from_signed(doc: &SignedDocument) -> Self {
        let summary = doc.summary();
        Self {
            control_code: doc.control_code().to_string(),
            issued_at: summary.issued_at,
            receiver: summary.receiver.clone(),
            grand_total: summary.grand_total,
            tax_total: summary.tax_total,
            item_count: summary.item_count,
            digest_value: doc.digest_value().to_string(),
        }
    }
}

/// Builds verification links for one emitter and environment.
#[derive(Clone)]
pub struct QrBuilder {
    environment: Environment,
    csc_id: String,
    csc: String,
}

impl QrBuilder {
    /// `csc_id` is the IdCSC assigned by the authority (e.g. "0001");
    /// `csc` is the secret code it identifies.
    pub fn new(environment: Environment, csc_id: impl Into<String>, csc: impl Into<String>) -> Self {
        Self {
            environment,
            csc_id: csc_id.into(),
            csc: csc.into(),
        }
    }

    pub fn build(&self, input: &QrInput) -> String {
        let receiver = match &input.receiver {
            ReceiverId::Ruc(ruc) => format!("dRucRec={ruc}"),
            ReceiverId::Document(number) => format!("dNumIDRec={number}"),
        };
        let params = format!(
            "nVersion={DE_VERSION}&Id={}&dFeEmiDE={}&{receiver}&dTotGralOpe={}&dTotIVA={}&cItems={}&DigestValue={}&IdCSC={}",
            input.control_code,
            hex::encode(input.issued_at.format(DATETIME_FORMAT).to_string()),
            format_decimal(input.grand_total),
            format_decimal(input.tax_total),
            input.item_count,
            hex::encode(&input.digest_value),
            self.csc_id,
        );
        let hash = hex::encode(Sha256::digest(format!("{params}{}", self.csc)));
        format!("{}{params}&cHashQR={hash}", self.environment.qr_base_url())
    }
}

impl std::fmt::Debug for QrBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QrBuilder")
            .field("environment", &self.environment)
            .field("csc_id", &self.csc_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn input() -> QrInput {
        QrInput {
            control_code: "01800695631001001000002322024061511234567891".into(),
            issued_at: NaiveDate::from_ymd_opt(2024, 6, 15)
                .unwrap()
                .and_hms_opt(10, 30, 0)
                .unwrap(),
            receiver: ReceiverId::Document("4567890".into()),
            grand_total: dec!(110000),
            tax_total: dec!(10000),
            item_count: 1,
            digest_value: "q1w2e3r4".into(),
        }
    }

    #[test]
    fn parameter_order_is_fixed() {
        let url = QrBuilder::new(Environment::Test, "0001", "ABCD0000000000000000000000000000").build(&input());
        let query = url
            .strip_prefix("https://ekuatia.set.gov.py/consultas-test/qr?")
            .unwrap();
        let keys: Vec<&str> = query
            .split('&')
            .map(|kv| kv.split_once('=').unwrap().0)
            .collect();
        assert_eq!(
            keys,
            [
                "nVersion",
                "Id",
                "dFeEmiDE",
                "dNumIDRec",
                "dTotGralOpe",
                "dTotIVA",
                "cItems",
                "DigestValue",
                "IdCSC",
                "cHashQR"
            ]
        );
        // "2024-06-15T10:30:00" hex-encoded
        assert!(query.contains("dFeEmiDE=323032342d30362d31355431303a33303a3030"));
        assert!(query.contains("DigestValue=7131773265337234"));
    }

    #[test]
    fn deterministic_and_keyed_by_csc() {
        let a = QrBuilder::new(Environment::Test, "0001", "secret-a");
        let b = QrBuilder::new(Environment::Test, "0001", "secret-b");
        assert_eq!(a.build(&input()), a.build(&input()));
        assert_ne!(a.build(&input()), b.build(&input()));
    }

    #[test]
    fn hash_covers_parameters() {
        let qr = QrBuilder::new(Environment::Production, "0002", "secret");
        let url = qr.build(&input());
        assert!(url.starts_with("https://ekuatia.set.gov.py/consultas/qr?"));
        let (params, hash) = url
            .strip_prefix("https://ekuatia.set.gov.py/consultas/qr?")
            .unwrap()
            .rsplit_once("&cHashQR=")
            .unwrap();
        let expected = hex::encode(Sha256::digest(format!("{params}secret")));
        assert_eq!(hash, expected);
    }

    #[test]
    fn taxpayer_receiver_uses_ruc() {
        let mut i = input();
        i.receiver = ReceiverId::Ruc("80012345".into());
        let url = QrBuilder::new(Environment::Test, "0001", "s").build(&i);
        assert!(url.contains("&dRucRec=80012345&"));
        assert!(!url.contains("dNumIDRec"));
    }

    #[test]
    fn debug_hides_secret() {
        let qr = QrBuilder::new(Environment::Test, "0001", "TOPSECRET");
        assert!(!format!("{qr:?}").contains("TOPSECRET"));
    }
}
