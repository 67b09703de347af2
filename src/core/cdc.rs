//! Control code (CDC), security code and RUC check digits.
//!
//! The CDC is the 44-digit public identifier of an electronic document:
//!
//! | digits | field |
//! |--------|-------|
//! | 2 | document type (iTiDE) |
//! | 8 | emitter RUC, zero-padded |
//! | 1 | RUC check digit |
//! | 3 | establishment |
//! | 3 | expedition point |
//! | 7 | document number |
//! | 1 | taxpayer type |
//! | 8 | emission date `yyyyMMdd` |
//! | 1 | emission type |
//! | 9 | security code |
//! | 1 | check digit (modulo 11) |

use std::fmt;

use chrono::NaiveDate;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::error::SifenError;
use super::numbering::DocumentNumber;
use super::types::{DocumentType, EmissionType, TaxpayerType};

/// Modulo-11 check digit as published by the SET (base 11).
///
/// Non-digit characters are replaced by their ASCII code before weighting.
/// Weights run 2, 3, …, 11 from the rightmost digit and wrap back to 2.
pub fn check_digit(input: &str) -> u8 {
    let digits: String = input
        .chars()
        .map(|c| {
            if c.is_ascii_digit() {
                c.to_string()
            } else {
                (c.to_ascii_uppercase() as u32).to_string()
            }
        })
        .collect();

    let mut weight = 2u32;
    let mut sum = 0u32;
    for d in digits.bytes().rev() {
        if weight > 11 {
            weight = 2;
        }
        sum += u32::from(d - b'0') * weight;
        weight += 1;
    }

    let remainder = sum % 11;
    if remainder > 1 { (11 - remainder) as u8 } else { 0 }
}

/// Taxpayer registry number (RUC) with its verified check digit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ruc {
    number: String,
    check_digit: u8,
}

impl Ruc {
    /// Parse `"80069563-1"`. The check digit must match.
    pub fn parse(input: &str) -> Result<Self, SifenError> {
        let trimmed = input.trim();
        let (number, dv) = trimmed
            .split_once('-')
            .ok_or_else(|| SifenError::Build(format!("RUC {trimmed:?} lacks a check digit")))?;
        let dv: u8 = dv
            .parse()
            .map_err(|_| SifenError::Build(format!("RUC {trimmed:?} has a malformed check digit")))?;
        Self::new(number, dv)
    }

    /// Build from number and check digit, verifying the digit.
    pub fn new(number: &str, dv: u8) -> Result<Self, SifenError> {
        if number.is_empty() || number.len() > 8 || !number.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SifenError::Build(format!(
                "RUC number {number:?} must be 1-8 alphanumeric characters"
            )));
        }
        let expected = check_digit(number);
        if expected != dv {
            return Err(SifenError::Build(format!(
                "RUC {number}-{dv} has an invalid check digit (expected {expected})"
            )));
        }
        Ok(Self {
            number: number.to_string(),
            check_digit: dv,
        })
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn check_digit(&self) -> u8 {
        self.check_digit
    }
}

impl fmt::Display for Ruc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.number, self.check_digit)
    }
}

impl TryFrom<String> for Ruc {
    type Error = SifenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Ruc> for String {
    fn from(r: Ruc) -> String {
        r.to_string()
    }
}

/// dCodSeg: 9-digit random code, chosen once per document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecurityCode(String);

impl SecurityCode {
    /// Draw a fresh code. Zero is excluded.
    pub fn generate() -> Self {
        let n: u32 = rand::thread_rng().gen_range(1..=999_999_999);
        Self(format!("{n:09}"))
    }

    pub fn parse(input: &str) -> Result<Self, SifenError> {
        if input.len() != 9 || !input.chars().all(|c| c.is_ascii_digit()) {
            return Err(SifenError::Build(format!(
                "security code {input:?} must be exactly 9 digits"
            )));
        }
        if input.chars().all(|c| c == '0') {
            return Err(SifenError::Build("security code must not be zero".into()));
        }
        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecurityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SecurityCode {
    type Error = SifenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SecurityCode> for String {
    fn from(c: SecurityCode) -> String {
        c.0
    }
}

/// The 44-digit document control code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ControlCode(String);

impl ControlCode {
    pub const LEN: usize = 44;

    /// Derive the CDC from the identifying fields of a document.
    pub fn derive(
        document_type: DocumentType,
        ruc: &Ruc,
        number: &DocumentNumber,
        taxpayer_type: TaxpayerType,
        date: NaiveDate,
        emission_type: EmissionType,
        security_code: &SecurityCode,
    ) -> Self {
        let body = format!(
            "{:02}{:0>8}{}{:03}{:03}{:07}{}{}{}{}",
            document_type.code(),
            ruc.number(),
            ruc.check_digit(),
            number.establishment,
            number.point,
            number.number,
            taxpayer_type.code(),
            date.format("%Y%m%d"),
            emission_type.code(),
            security_code.as_str(),
        );
        let dv = check_digit(&body);
        Self(format!("{body}{dv}"))
    }

    /// Parse and verify length, digits and check digit.
    pub fn parse(input: &str) -> Result<Self, SifenError> {
        if input.len() != Self::LEN || !input.chars().all(|c| c.is_ascii_digit()) {
            return Err(SifenError::Build(format!(
                "control code must be {} digits, got {input:?}",
                Self::LEN
            )));
        }
        let (body, dv) = input.split_at(Self::LEN - 1);
        if dv != check_digit(body).to_string() {
            return Err(SifenError::Build(format!(
                "control code {input} has an invalid check digit"
            )));
        }
        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The check digit (dDVId).
    pub fn check_digit(&self) -> u8 {
        self.0.as_bytes()[Self::LEN - 1] - b'0'
    }

    /// The security code embedded at positions 34..43.
    pub fn security_code(&self) -> &str {
        &self.0[34..43]
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ControlCode {
    type Error = SifenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ControlCode> for String {
    fn from(c: ControlCode) -> String {
        c.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_ruc_check_digits() {
        assert_eq!(check_digit("80069563"), 1);
        assert_eq!(check_digit("80012345"), 0);
        assert_eq!(check_digit("1234567"), 9);
        assert_eq!(check_digit("80024627"), 6);
    }

    #[test]
    fn ruc_parse_validates_digit() {
        let ruc = Ruc::parse("80069563-1").unwrap();
        assert_eq!(ruc.number(), "80069563");
        assert_eq!(ruc.check_digit(), 1);
        assert_eq!(ruc.to_string(), "80069563-1");

        assert!(Ruc::parse("80069563-2").is_err());
        assert!(Ruc::parse("80069563").is_err());
        assert!(Ruc::parse("-1").is_err());
    }

    #[test]
    fn security_code_shape() {
        for _ in 0..100 {
            let code = SecurityCode::generate();
            assert_eq!(code.as_str().len(), 9);
            assert!(code.as_str().chars().all(|c| c.is_ascii_digit()));
            assert_ne!(code.as_str(), "000000000");
        }
        assert!(SecurityCode::parse("000000000").is_err());
        assert!(SecurityCode::parse("12345").is_err());
        assert!(SecurityCode::parse("000000123").is_ok());
    }

    #[test]
    fn control_code_layout() {
        let cdc = ControlCode::derive(
            DocumentType::Invoice,
            &Ruc::parse("80069563-1").unwrap(),
            &DocumentNumber::new(1, 1, 23).unwrap(),
            TaxpayerType::Company,
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            EmissionType::Normal,
            &SecurityCode::parse("123456789").unwrap(),
        );
        let s = cdc.as_str();
        assert_eq!(s.len(), 44);
        assert_eq!(&s[0..2], "01");
        assert_eq!(&s[2..10], "80069563");
        assert_eq!(&s[10..11], "1");
        assert_eq!(&s[11..14], "001");
        assert_eq!(&s[14..17], "001");
        assert_eq!(&s[17..24], "0000023");
        assert_eq!(&s[24..25], "2");
        assert_eq!(&s[25..33], "20240315");
        assert_eq!(&s[33..34], "1");
        assert_eq!(cdc.security_code(), "123456789");
        assert_eq!(cdc.check_digit(), check_digit(&s[..43]));
        assert_eq!(ControlCode::parse(s).unwrap(), cdc);
    }

    #[test]
    fn short_ruc_is_zero_padded() {
        let cdc = ControlCode::derive(
            DocumentType::Invoice,
            &Ruc::parse("1234567-9").unwrap(),
            &DocumentNumber::new(1, 1, 1).unwrap(),
            TaxpayerType::Person,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            EmissionType::Normal,
            &SecurityCode::parse("000000001").unwrap(),
        );
        assert_eq!(&cdc.as_str()[2..10], "01234567");
    }

    #[test]
    fn control_code_rejects_bad_digit() {
        let cdc = ControlCode::derive(
            DocumentType::Invoice,
            &Ruc::parse("80069563-1").unwrap(),
            &DocumentNumber::new(1, 1, 1).unwrap(),
            TaxpayerType::Company,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            EmissionType::Normal,
            &SecurityCode::parse("555555555").unwrap(),
        );
        let mut tampered = cdc.as_str()[..43].to_string();
        tampered.push(char::from(b'0' + (cdc.check_digit() + 1) % 10));
        assert!(ControlCode::parse(&tampered).is_err());
        assert!(ControlCode::parse("123").is_err());
    }
}
