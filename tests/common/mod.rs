#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;
use sifen::config::Environment;
use sifen::core::*;
use sifen::qr::QrBuilder;
use sifen::sign::{SignedDocument, SigningCredentials, sign};
use sifen::xml::serialize;

pub const CERT: &str = include_str!("../fixtures/emitter_cert.pem");
pub const KEY: &str = include_str!("../fixtures/emitter_key.pem");

/// Route pipeline logs through the test harness; set `RUST_LOG` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 13, 30, 0).unwrap()
}

pub fn credentials() -> SigningCredentials {
    SigningCredentials::from_pem(CERT, KEY).unwrap()
}

pub fn qr() -> QrBuilder {
    QrBuilder::new(Environment::Test, "0001", "ABCD0000000000000000000000000000")
}

pub fn emitter(valid_until: Option<NaiveDate>) -> Emitter {
    let capital = resolve_department("Capital").unwrap();
    EmitterBuilder::new(
        Ruc::parse("80069563-1").unwrap(),
        "Servicios Digitales SA",
        Timbrado {
            number: "12558946".into(),
            valid_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            valid_until,
        },
        capital,
        resolve_city(capital, "Asunción").unwrap(),
    )
    .address("Avda. España", "1234")
    .activity("62010", "Actividades de programación informática")
    .build()
}

/// A signed one-line invoice with a QR link.
pub fn signed_document(security_code: &str) -> SignedDocument {
    let receiver = ReceiverBuilder::document(IdentityDocument::NationalId, "4567890", "Juan Pérez").build();
    let doc = DocumentBuilder::new(emitter(None), receiver, DocumentNumber::new(1, 1, 1).unwrap())
        .security_code(SecurityCode::parse(security_code).unwrap())
        .add_item(ItemBuilder::new("WEB", "Desarrollo web", dec!(1), dec!(110000)).build())
        .build_at(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap().and_hms_opt(10, 30, 0).unwrap())
        .unwrap();
    sign(serialize(&doc).unwrap(), &credentials(), now())
        .unwrap()
        .with_qr(&qr())
}

/// rRetEnviDe body as SIFEN returns it.
pub fn submit_response(cdc: &str, state: &str, code: &str, msg: &str, protocol: Option<&str>) -> String {
    let prot = protocol
        .map(|p| format!("<ns2:dProtAut>{p}</ns2:dProtAut>"))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope"><env:Header/><env:Body><ns2:rRetEnviDe xmlns:ns2="http://ekuatia.set.gov.py/sifen/xsd"><ns2:rProtDe><ns2:Id>{cdc}</ns2:Id><ns2:dFecProc>2024-06-15T10:30:05-03:00</ns2:dFecProc><ns2:dEstRes>{state}</ns2:dEstRes>{prot}<ns2:gResProc><ns2:dCodRes>{code}</ns2:dCodRes><ns2:dMsgRes>{msg}</ns2:dMsgRes></ns2:gResProc></ns2:rProtDe></ns2:rRetEnviDe></env:Body></env:Envelope>"#
    )
}

/// rResEnviConsDe body.
pub fn lookup_response(code: &str, msg: &str, inner: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope"><env:Body><ns2:rEnviConsDeResponse xmlns:ns2="http://ekuatia.set.gov.py/sifen/xsd"><ns2:dFecProc>2024-06-15T10:35:00-03:00</ns2:dFecProc><ns2:dCodRes>{code}</ns2:dCodRes><ns2:dMsgRes>{msg}</ns2:dMsgRes>{inner}</ns2:rEnviConsDeResponse></env:Body></env:Envelope>"#
    )
}
