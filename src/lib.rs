//! # sifen
//!
//! Electronic invoice issuance for Paraguay's SIFEN (e-Kuatia): builds the
//! DE v150 document, serializes it canonically, signs it with an XML-DSig
//! enveloped signature, derives the verification QR link, submits it to the
//! authority (directly or through a relay), and keeps a durable record of
//! every attempt.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{NaiveDate, TimeZone, Utc};
//! use rust_decimal_macros::dec;
//! use sifen::core::*;
//! use sifen::sign::{SigningCredentials, sign, verify};
//! use sifen::xml::serialize;
//!
//! let capital = resolve_department("Capital").unwrap();
//! let emitter = EmitterBuilder::new(
//!     Ruc::parse("80069563-1").unwrap(),
//!     "Servicios Digitales SA",
//!     Timbrado {
//!         number: "12558946".into(),
//!         valid_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!         valid_until: None,
//!     },
//!     capital,
//!     resolve_city(capital, "Asunción").unwrap(),
//! )
//! .activity("62010", "Actividades de programación informática")
//! .build();
//! let receiver = ReceiverBuilder::taxpayer(
//!     Ruc::parse("80012345-0").unwrap(),
//!     TaxpayerType::Company,
//!     "Cliente SA",
//! )
//! .build();
//!
//! let now = Utc.with_ymd_and_hms(2024, 6, 15, 13, 30, 0).unwrap();
//! let doc = DocumentBuilder::new(emitter, receiver, DocumentNumber::new(1, 1, 1).unwrap())
//!     .add_item(ItemBuilder::new("WEB", "Desarrollo web", dec!(1), dec!(1100000)).build())
//!     .build_at(now.naive_utc())
//!     .unwrap();
//!
//! let credentials = SigningCredentials::from_pem(
//!     include_str!("../tests/fixtures/emitter_cert.pem"),
//!     include_str!("../tests/fixtures/emitter_key.pem"),
//! )
//! .unwrap();
//! let signed = sign(serialize(&doc).unwrap(), &credentials, now).unwrap();
//! verify(&signed).unwrap();
//! assert_eq!(doc.totals.tax_10, dec!(100000));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | (always) | Catalogs, builder, totals, DE serialization, signing, QR |
//! | `submit` | SOAP and relay clients (`reqwest`, `tokio`) |
//! | `store` | Invoice record store on `sled` |
//! | `pipeline` (default) | `Issuer` and the background `IssuanceQueue` |

pub mod config;
pub mod core;
pub mod qr;
pub mod sign;
pub mod submit;
pub mod xml;

#[cfg(feature = "store")]
pub mod store;

#[cfg(feature = "pipeline")]
pub mod pipeline;

// Re-export core types at crate root for convenience
pub use crate::core::*;
