use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal_macros::dec;
use sifen::core::*;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(10, 30, 0).unwrap()
}

fn emitter(valid_until: Option<NaiveDate>) -> Emitter {
    let central = resolve_department("Central").unwrap();
    EmitterBuilder::new(
        Ruc::parse("80069563-1").unwrap(),
        "Servicios Digitales SA",
        Timbrado {
            number: "12558946".into(),
            valid_from: date(2024, 1, 1),
            valid_until,
        },
        central,
        resolve_city(central, "San Lorenzo").unwrap(),
    )
    .trade_name("SerDig")
    .address("Avda. España", "1234")
    .phone("021 555 000")
    .email("facturacion@serdig.com.py")
    .activity("62010", "Actividades de programación informática")
    .build()
}

fn consumer() -> Receiver {
    ReceiverBuilder::document(IdentityDocument::NationalId, "4567890", "Juan Pérez").build()
}

fn number(n: u32) -> DocumentNumber {
    DocumentNumber::new(1, 1, n).unwrap()
}

// ── Domestic invoice ────────────────────────────────────────────────────────

#[test]
fn mixed_rates_invoice() {
    let doc = DocumentBuilder::new(emitter(None), consumer(), number(23))
        .add_item(ItemBuilder::new("WEB", "Desarrollo web", dec!(1), dec!(1100000)).build())
        .add_item(
            ItemBuilder::new("LIB", "Manual impreso", dec!(3), dec!(52500))
                .taxed(dec!(5))
                .build(),
        )
        .add_item(
            ItemBuilder::new("CUR", "Curso presencial", dec!(1), dec!(200000))
                .exempt()
                .build(),
        )
        .build_at(at(2024, 6, 15))
        .unwrap();

    let t = &doc.totals;
    assert_eq!(t.taxed_10, dec!(1100000));
    assert_eq!(t.taxed_5, dec!(157500));
    assert_eq!(t.exempt, dec!(200000));
    assert_eq!(t.grand_total, dec!(1457500));
    assert_eq!(t.tax_10, dec!(100000));
    assert_eq!(t.tax_5, dec!(7500));
    assert_eq!(t.tax_total, dec!(107500));
    assert_eq!(t.base_10, dec!(1000000));
    assert_eq!(t.base_5, dec!(150000));
    assert_eq!(t.pyg_total, None);
    assert_eq!(doc.number.to_string(), "001-001-0000023");
}

#[test]
fn caller_supplied_amounts_are_recomputed() {
    let mut item = ItemBuilder::new("X", "Servicio", dec!(2), dec!(55000)).build();
    item.amounts.total = dec!(1);
    item.amounts.tax = dec!(999);
    let doc = DocumentBuilder::new(emitter(None), consumer(), number(1))
        .add_item(item)
        .build_at(at(2024, 6, 15))
        .unwrap();
    assert_eq!(doc.items[0].amounts.total, dec!(110000));
    assert_eq!(doc.items[0].amounts.tax, dec!(10000));
}

#[test]
fn control_code_embeds_document_fields() {
    let doc = DocumentBuilder::new(emitter(None), consumer(), number(23))
        .security_code(SecurityCode::parse("123456789").unwrap())
        .add_item(ItemBuilder::new("WEB", "Desarrollo web", dec!(1), dec!(110000)).build())
        .build_at(at(2024, 6, 15))
        .unwrap();
    let cdc = doc.control_code();
    assert!(cdc.as_str().starts_with("01800695631001001000002322024061511234567"));
    assert_eq!(ControlCode::parse(cdc.as_str()).unwrap(), cdc);
    assert_eq!(cdc.security_code(), "123456789");
}

#[test]
fn security_code_is_generated_once() {
    let doc = DocumentBuilder::new(emitter(None), consumer(), number(1))
        .add_item(ItemBuilder::new("X", "Servicio", dec!(1), dec!(1000)).build())
        .build_at(at(2024, 6, 15))
        .unwrap();
    assert_eq!(doc.control_code(), doc.control_code());
    assert_eq!(doc.control_code().security_code(), doc.security_code.as_str());
}

// ── Validation ──────────────────────────────────────────────────────────────

#[test]
fn expired_timbrado_is_a_build_error() {
    let err = DocumentBuilder::new(emitter(Some(date(2024, 5, 31))), consumer(), number(1))
        .add_item(ItemBuilder::new("X", "Servicio", dec!(1), dec!(1000)).build())
        .build_at(at(2024, 6, 15))
        .unwrap_err();
    assert!(matches!(err, SifenError::Build(ref m) if m.contains("emitter.timbrado")));
}

#[test]
fn timbrado_not_yet_valid() {
    let err = DocumentBuilder::new(emitter(None), consumer(), number(1))
        .add_item(ItemBuilder::new("X", "Servicio", dec!(1), dec!(1000)).build())
        .build_at(at(2023, 12, 31))
        .unwrap_err();
    assert!(err.to_string().contains("not valid on 2023-12-31"));
}

#[test]
fn all_item_problems_are_reported() {
    let err = DocumentBuilder::new(emitter(None), consumer(), number(1))
        .add_item(ItemBuilder::new("A", "", dec!(0), dec!(1000)).build())
        .add_item(ItemBuilder::new("B", "Servicio", dec!(1), dec!(-5)).build())
        .add_item(ItemBuilder::new("C", "Servicio", dec!(1), dec!(10)).taxed(dec!(7)).build())
        .build_at(at(2024, 6, 15))
        .unwrap_err()
        .to_string();
    assert!(err.contains("items[0].description"));
    assert!(err.contains("items[0].quantity"));
    assert!(err.contains("items[1].unit_price"));
    assert!(err.contains("items[2].tax_rate"));
}

#[test]
fn empty_identity_is_rejected() {
    let receiver = ReceiverBuilder::document(IdentityDocument::NationalId, " ", "Juan").build();
    let err = DocumentBuilder::new(emitter(None), receiver, number(1))
        .add_item(ItemBuilder::new("X", "Servicio", dec!(1), dec!(1000)).build())
        .build_at(at(2024, 6, 15))
        .unwrap_err();
    assert!(err.to_string().contains("receiver.identity"));
}

#[test]
fn no_items_is_rejected() {
    let err = DocumentBuilder::new(emitter(None), consumer(), number(1))
        .build_at(at(2024, 6, 15))
        .unwrap_err();
    assert!(err.to_string().contains("at least one line item"));
}

#[test]
fn oversized_amounts_are_build_errors() {
    let err = DocumentBuilder::new(emitter(None), consumer(), number(1))
        .add_item(ItemBuilder::new("X", "Servicio", dec!(1), dec!(10000000000000000000000000)).build())
        .build_at(at(2024, 6, 15))
        .unwrap_err();
    assert!(matches!(err, SifenError::Build(ref m) if m.contains("items[0].unit_price")), "{err}");

    let err = DocumentBuilder::new(emitter(None), consumer(), number(1))
        .add_item(ItemBuilder::new("X", "Servicio", dec!(20000000000), dec!(1)).build())
        .build_at(at(2024, 6, 15))
        .unwrap_err();
    assert!(err.to_string().contains("items[0].quantity"));
}

#[test]
fn only_invoices_are_issued() {
    let err = DocumentBuilder::new(emitter(None), consumer(), number(1))
        .document_type(DocumentType::CreditNote)
        .add_item(ItemBuilder::new("X", "Servicio", dec!(1), dec!(1000)).build())
        .build_at(at(2024, 6, 15))
        .unwrap_err();
    assert!(err.to_string().contains("document_type"));
}

// ── Currency ────────────────────────────────────────────────────────────────

#[test]
fn foreign_currency_needs_rate() {
    let err = DocumentBuilder::new(emitter(None), consumer(), number(1))
        .payment(PaymentInfo {
            currency: Currency::Usd,
            ..PaymentInfo::default()
        })
        .add_item(ItemBuilder::new("X", "Servicio", dec!(1), dec!(100)).build())
        .build_at(at(2024, 6, 15))
        .unwrap_err();
    assert!(err.to_string().contains("USD requires an exchange rate"));
}

#[test]
fn foreign_currency_rate_is_kept_verbatim() {
    let doc = DocumentBuilder::new(emitter(None), consumer(), number(1))
        .payment(PaymentInfo {
            currency: Currency::Usd,
            exchange_rate: Some(dec!(7312.55)),
            ..PaymentInfo::default()
        })
        .add_item(ItemBuilder::new("X", "Servicio", dec!(3), dec!(33.33)).build())
        .build_at(at(2024, 6, 15))
        .unwrap();
    assert_eq!(doc.payment.exchange_rate, Some(dec!(7312.55)));
    assert_eq!(doc.totals.grand_total, dec!(99.99));
    assert_eq!(doc.totals.pyg_total, Some(dec!(731182)));
    assert_eq!(doc.pyg_total(), 731_182);
}

#[test]
fn base_currency_drops_rate() {
    let doc = DocumentBuilder::new(emitter(None), consumer(), number(1))
        .payment(PaymentInfo {
            exchange_rate: Some(dec!(1)),
            ..PaymentInfo::default()
        })
        .add_item(ItemBuilder::new("X", "Servicio", dec!(1), dec!(1000)).build())
        .build_at(at(2024, 6, 15))
        .unwrap();
    assert_eq!(doc.payment.exchange_rate, None);
}

// ── Catalogs ────────────────────────────────────────────────────────────────

#[test]
fn unknown_tax_affectation() {
    let err = resolve_tax_affectation("medio gravado").unwrap_err();
    assert!(matches!(
        err,
        SifenError::UnknownCatalogValue { catalog: "tax affectation", ref value } if value == "medio gravado"
    ));
    assert_eq!(err.kind(), FailureKind::Catalog);
}

#[test]
fn catalog_lookup_is_deterministic() {
    for _ in 0..3 {
        assert_eq!(resolve_tax_affectation("Exento").unwrap(), TaxAffectation::Exempt);
        assert_eq!(resolve_tax_affectation("3").unwrap(), TaxAffectation::Exempt);
        assert_eq!(resolve_currency("usd").unwrap(), Currency::Usd);
        assert_eq!(resolve_identity_document("Cédula").unwrap(), IdentityDocument::NationalId);
    }
}

#[test]
fn parties_survive_json() {
    let original = emitter(None);
    let json = serde_json::to_string(&original).unwrap();
    let back: Emitter = serde_json::from_str(&json).unwrap();
    assert_eq!(back.department, original.department);
    assert_eq!(back.city, original.city);
    assert_eq!(back.city.name, "SAN LORENZO (MUNIC)");

    let value = serde_json::to_value(consumer()).unwrap();
    let receiver: Receiver = serde_json::from_value(value).unwrap();
    assert_eq!(receiver.name, consumer().name);
}

#[test]
fn unknown_city_is_not_guessed() {
    let central = resolve_department("Central").unwrap();
    assert!(resolve_city(central, "Ciudad del Este").is_err());
    assert!(resolve_city(central, "San Lorenzo").is_ok());
}

// ── Amount in words ─────────────────────────────────────────────────────────

#[test]
fn amount_in_words_for_receipts() {
    let doc = DocumentBuilder::new(emitter(None), consumer(), number(1))
        .add_item(ItemBuilder::new("X", "Servicio", dec!(1), dec!(1000000)).build())
        .build_at(at(2024, 6, 15))
        .unwrap();
    assert_eq!(doc.amount_in_words(Language::English), "ONE MILLION");
    assert_eq!(amount_in_words(100, Language::English), "ONE HUNDRED");
    assert_eq!(amount_in_words(0, Language::English), "ZERO");
}
