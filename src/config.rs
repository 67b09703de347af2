//! Issuer configuration, persisted with `confy`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::core::*;

/// Authority environment. Test and production use different endpoints and
/// different QR hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Test,
    Production,
}

impl Environment {
    pub fn qr_base_url(&self) -> &'static str {
        match self {
            Self::Test => "https://ekuatia.set.gov.py/consultas-test/qr?",
            Self::Production => "https://ekuatia.set.gov.py/consultas/qr?",
        }
    }

    /// Synchronous reception service (rEnviDe).
    pub fn submit_url(&self) -> &'static str {
        match self {
            Self::Test => "https://sifen-test.set.gov.py/de/ws/sync/recibe.wsdl",
            Self::Production => "https://sifen.set.gov.py/de/ws/sync/recibe.wsdl",
        }
    }

    /// Lookup by control code (rEnviConsDe).
    pub fn lookup_url(&self) -> &'static str {
        match self {
            Self::Test => "https://sifen-test.set.gov.py/de/ws/consultas/consulta.wsdl",
            Self::Production => "https://sifen.set.gov.py/de/ws/consultas/consulta.wsdl",
        }
    }
}

/// How documents reach the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SubmissionConfig {
    /// SOAP straight to SIFEN. `identity_pem` holds a client certificate
    /// and key for mutual TLS.
    Direct { identity_pem: Option<PathBuf> },
    /// Through a third-party relay's JSON API.
    Relay { base_url: String, api_key: String },
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self::Direct { identity_pem: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimbradoConfig {
    pub number: String,
    pub valid_from: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityConfig {
    pub code: String,
    pub description: String,
}

/// The emitter as configured: labels are resolved through the catalogs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// RUC with check digit, e.g. "80069563-1".
    pub ruc: String,
    pub name: String,
    #[serde(default)]
    pub trade_name: Option<String>,
    #[serde(default)]
    pub person: bool,
    #[serde(default)]
    pub tax_regime: Option<String>,
    pub street: String,
    pub house_number: String,
    pub department: String,
    pub city: String,
    pub phone: String,
    pub email: String,
    pub activities: Vec<ActivityConfig>,
    pub timbrado: TimbradoConfig,
    pub establishment: u16,
    pub point: u16,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            ruc: String::new(),
            name: String::new(),
            trade_name: None,
            person: false,
            tax_regime: None,
            street: String::new(),
            house_number: "0".into(),
            department: "CAPITAL".into(),
            city: "ASUNCION".into(),
            phone: String::new(),
            email: String::new(),
            activities: Vec::new(),
            timbrado: TimbradoConfig::default(),
            establishment: 1,
            point: 1,
        }
    }
}

impl EmitterConfig {
    /// Resolve catalog labels and build the emitter.
    pub fn to_emitter(&self) -> Result<Emitter, SifenError> {
        let department = resolve_department(&self.department)?;
        let city = resolve_city(department, &self.city)?;
        let valid_from = self
            .timbrado
            .valid_from
            .ok_or_else(|| SifenError::Config("timbrado.valid_from is required".into()))?;

        let mut builder = EmitterBuilder::new(
            Ruc::parse(&self.ruc)?,
            &self.name,
            Timbrado {
                number: self.timbrado.number.clone(),
                valid_from,
                valid_until: self.timbrado.valid_until,
            },
            department,
            city,
        )
        .taxpayer_type(if self.person {
            TaxpayerType::Person
        } else {
            TaxpayerType::Company
        })
        .address(&self.street, &self.house_number)
        .phone(&self.phone)
        .email(&self.email);

        if let Some(trade_name) = &self.trade_name {
            builder = builder.trade_name(trade_name);
        }
        if let Some(regime) = &self.tax_regime {
            builder = builder.tax_regime(resolve_tax_regime(regime)?);
        }
        for activity in &self.activities {
            builder = builder.activity(&activity.code, &activity.description);
        }
        Ok(builder.build())
    }

    pub fn series(&self) -> Series {
        Series::new(DocumentType::Invoice, self.establishment, self.point)
    }
}

/// Everything the issuer needs at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SifenConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub submission: SubmissionConfig,
    pub certificate_path: PathBuf,
    pub key_path: PathBuf,
    /// IdCSC, 4 digits.
    pub csc_id: String,
    /// The secret CSC used to key the QR hash.
    pub csc: String,
    pub emitter: EmitterConfig,
    pub store_path: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Offset of the emitter's local time, used for dFeEmiDE.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    256
}

fn default_max_concurrent() -> usize {
    4
}

fn default_utc_offset_hours() -> i32 {
    -3
}

impl Default for SifenConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Test,
            submission: SubmissionConfig::default(),
            certificate_path: PathBuf::from("certs/emitter_cert.pem"),
            key_path: PathBuf::from("certs/emitter_key.pem"),
            csc_id: "0001".into(),
            csc: String::new(),
            emitter: EmitterConfig::default(),
            store_path: PathBuf::from("sifen-records"),
            timeout_secs: default_timeout_secs(),
            queue_capacity: default_queue_capacity(),
            max_concurrent: default_max_concurrent(),
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

impl SifenConfig {
    /// Load from `path`, writing a default file first if none exists.
    pub fn load(path: &Path) -> Result<Self, SifenError> {
        confy::load_path(path)
            .map_err(|e| SifenError::Config(format!("cannot load {}: {e}", path.display())))
    }

    pub fn store(&self, path: &Path) -> Result<(), SifenError> {
        confy::store_path(path, self)
            .map_err(|e| SifenError::Config(format!("cannot store {}: {e}", path.display())))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, SifenError> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            SifenError::Config(format!("utc_offset_hours {} out of range", self.utc_offset_hours))
        })
    }

    /// Report every problem at once.
    pub fn validate(&self) -> Result<(), SifenError> {
        let mut problems = Vec::new();

        if self.csc_id.len() != 4 || !self.csc_id.chars().all(|c| c.is_ascii_digit()) {
            problems.push(format!("csc_id {:?} must be 4 digits", self.csc_id));
        }
        if self.csc.trim().is_empty() {
            problems.push("csc is required".to_string());
        }
        if self.timeout_secs == 0 {
            problems.push("timeout_secs must be positive".to_string());
        }
        if self.queue_capacity == 0 {
            problems.push("queue_capacity must be positive".to_string());
        }
        if self.max_concurrent == 0 {
            problems.push("max_concurrent must be positive".to_string());
        }
        if !(-12..=14).contains(&self.utc_offset_hours) {
            problems.push(format!("utc_offset_hours {} out of range", self.utc_offset_hours));
        }
        if let SubmissionConfig::Relay { base_url, api_key } = &self.submission {
            if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
                problems.push(format!("relay base_url {base_url:?} is not an http(s) URL"));
            }
            if api_key.trim().is_empty() {
                problems.push("relay api_key is required".to_string());
            }
        }

        let emitter = &self.emitter;
        if let Err(e) = emitter.to_emitter() {
            problems.push(format!("emitter: {e}"));
        }
        if emitter.activities.is_empty() {
            problems.push("emitter needs at least one economic activity".to_string());
        }
        let timbrado = &emitter.timbrado.number;
        if timbrado.len() != 8 || !timbrado.chars().all(|c| c.is_ascii_digit()) {
            problems.push(format!("timbrado {timbrado:?} must be 8 digits"));
        }
        if !(1..=999).contains(&emitter.establishment) || !(1..=999).contains(&emitter.point) {
            problems.push("establishment and point must be between 1 and 999".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SifenError::Config(problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> SifenConfig {
        SifenConfig {
            csc: "ABCD0000000000000000000000000000".into(),
            emitter: EmitterConfig {
                ruc: "80069563-1".into(),
                name: "Servicios Digitales SA".into(),
                street: "Avda. España".into(),
                house_number: "1234".into(),
                department: "Central".into(),
                city: "San Lorenzo".into(),
                phone: "021 555 000".into(),
                email: "facturacion@example.com.py".into(),
                activities: vec![ActivityConfig {
                    code: "62010".into(),
                    description: "Programación informática".into(),
                }],
                timbrado: TimbradoConfig {
                    number: "12558946".into(),
                    valid_from: NaiveDate::from_ymd_opt(2024, 1, 1),
                    valid_until: None,
                },
                ..EmitterConfig::default()
            },
            ..SifenConfig::default()
        }
    }

    #[test]
    fn valid_config_passes() {
        valid().validate().unwrap();
        let emitter = valid().emitter.to_emitter().unwrap();
        assert_eq!(emitter.city.code, 6181);
        assert_eq!(emitter.taxpayer_type, TaxpayerType::Company);
    }

    #[test]
    fn problems_are_collected() {
        let mut cfg = valid();
        cfg.csc_id = "1".into();
        cfg.max_concurrent = 0;
        cfg.emitter.city = "Atlantis".into();
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("csc_id"));
        assert!(msg.contains("max_concurrent"));
        assert!(msg.contains("Atlantis"));
    }

    #[test]
    fn relay_needs_key() {
        let mut cfg = valid();
        cfg.submission = SubmissionConfig::Relay {
            base_url: "https://relay.example.com".into(),
            api_key: " ".into(),
        };
        assert!(cfg.validate().unwrap_err().to_string().contains("api_key"));
    }

    #[test]
    fn store_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sifen.toml");
        let cfg = valid();
        cfg.store(&path).unwrap();
        assert_eq!(SifenConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SifenConfig::load(&dir.path().join("new.toml")).unwrap();
        assert_eq!(cfg, SifenConfig::default());
        assert!(cfg.validate().is_err());
    }
}
