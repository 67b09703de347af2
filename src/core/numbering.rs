use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::SifenError;
use super::types::DocumentType;

/// Largest document number an expedition point can issue (7 digits).
pub const MAX_DOCUMENT_NUMBER: u32 = 9_999_999;

/// Printed document number, e.g. "001-001-0000023".
///
/// Establishment and expedition point are 3-digit codes assigned in the
/// timbrado; the sequential part is 7 digits and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentNumber {
    pub establishment: u16,
    pub point: u16,
    pub number: u32,
}

impl DocumentNumber {
    pub fn new(establishment: u16, point: u16, number: u32) -> Result<Self, SifenError> {
        if !(1..=999).contains(&establishment) {
            return Err(SifenError::Build(format!(
                "establishment {establishment} must be between 1 and 999"
            )));
        }
        if !(1..=999).contains(&point) {
            return Err(SifenError::Build(format!(
                "expedition point {point} must be between 1 and 999"
            )));
        }
        if !(1..=MAX_DOCUMENT_NUMBER).contains(&number) {
            return Err(SifenError::Build(format!(
                "document number {number} must be between 1 and {MAX_DOCUMENT_NUMBER}"
            )));
        }
        Ok(Self {
            establishment,
            point,
            number,
        })
    }

    /// Parse "001-001-0000023".
    pub fn parse(input: &str) -> Result<Self, SifenError> {
        let parts: Vec<&str> = input.trim().split('-').collect();
        let [est, pun, num] = parts.as_slice() else {
            return Err(SifenError::Build(format!(
                "document number {input:?} must look like 001-001-0000001"
            )));
        };
        let bad = || SifenError::Build(format!("document number {input:?} is not numeric"));
        Self::new(
            est.parse().map_err(|_| bad())?,
            pun.parse().map_err(|_| bad())?,
            num.parse().map_err(|_| bad())?,
        )
    }
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:03}-{:03}-{:07}",
            self.establishment, self.point, self.number
        )
    }
}

/// A numbering series: one counter per document type, establishment and
/// expedition point.
///
/// The counter itself lives in the record store, which hands out numbers
/// atomically per series key; see `RecordStore::allocate_number`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Series {
    pub document_type: DocumentType,
    pub establishment: u16,
    pub point: u16,
}

impl Series {
    pub fn new(document_type: DocumentType, establishment: u16, point: u16) -> Self {
        Self {
            document_type,
            establishment,
            point,
        }
    }

    /// Storage key, e.g. "01-001-001".
    pub fn key(&self) -> String {
        format!(
            "{:02}-{:03}-{:03}",
            self.document_type.code(),
            self.establishment,
            self.point
        )
    }

    /// The document number for the `n`-th allocation in this series.
    pub fn number(&self, n: u64) -> Result<DocumentNumber, SifenError> {
        let n = u32::try_from(n)
            .ok()
            .filter(|n| *n <= MAX_DOCUMENT_NUMBER)
            .ok_or_else(|| {
                SifenError::Build(format!("series {} is exhausted at {n}", self.key()))
            })?;
        DocumentNumber::new(self.establishment, self.point, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_zero_padded() {
        let n = DocumentNumber::new(1, 2, 23).unwrap();
        assert_eq!(n.to_string(), "001-002-0000023");
    }

    #[test]
    fn parse_round_trip() {
        let n = DocumentNumber::parse("002-015-0001234").unwrap();
        assert_eq!(n, DocumentNumber::new(2, 15, 1234).unwrap());
        assert!(DocumentNumber::parse("001-001").is_err());
        assert!(DocumentNumber::parse("001-001-abc").is_err());
        assert!(DocumentNumber::parse("000-001-0000001").is_err());
    }

    #[test]
    fn ranges_enforced() {
        assert!(DocumentNumber::new(1000, 1, 1).is_err());
        assert!(DocumentNumber::new(1, 0, 1).is_err());
        assert!(DocumentNumber::new(1, 1, 0).is_err());
        assert!(DocumentNumber::new(1, 1, MAX_DOCUMENT_NUMBER).is_ok());
        assert!(DocumentNumber::new(1, 1, MAX_DOCUMENT_NUMBER + 1).is_err());
    }

    #[test]
    fn series_key_and_exhaustion() {
        let s = Series::new(DocumentType::CreditNote, 1, 3);
        assert_eq!(s.key(), "05-001-003");
        assert_eq!(s.number(7).unwrap().to_string(), "001-003-0000007");
        assert!(s.number(10_000_000).is_err());
        assert!(s.number(u64::MAX).is_err());
    }
}
