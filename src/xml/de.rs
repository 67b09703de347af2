use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::writer::{C14nWriter, format_decimal};
use super::{DE_VERSION, SIFEN_NS};
use crate::core::*;

/// Timestamp layout used for dFeEmiDE and dFecFirma.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A serialized DE whose bytes are fixed.
///
/// Produced only by [`serialize`]. There are no mutators: changing any
/// content means building and serializing a new document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalDocument {
    control_code: ControlCode,
    canonical_de: String,
    embedded_de: String,
    summary: DocumentSummary,
}

impl CanonicalDocument {
    pub fn control_code(&self) -> &ControlCode {
        &self.control_code
    }

    /// Canonical `DE` element with its namespace declaration: the exact
    /// bytes hashed for the signature reference.
    pub fn digest_input(&self) -> &[u8] {
        self.canonical_de.as_bytes()
    }

    /// The same element as it appears inside `rDE`, inheriting the
    /// namespace from its parent.
    pub fn embedded_de(&self) -> &str {
        &self.embedded_de
    }

    pub fn summary(&self) -> &DocumentSummary {
        &self.summary
    }
}

/// The receiver identifier printed in the verification QR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiverId {
    /// dRucRec (without check digit).
    Ruc(String),
    /// dNumIDRec
    Document(String),
}

/// Values carried alongside the canonical bytes for the QR link and for
/// the invoice record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub issued_at: NaiveDateTime,
    pub number: DocumentNumber,
    pub security_code: SecurityCode,
    pub receiver: ReceiverId,
    pub currency: Currency,
    pub exchange_rate: Option<Decimal>,
    pub grand_total: Decimal,
    pub tax_total: Decimal,
    pub item_count: usize,
}

/// Serialize a built document into canonical DE bytes.
///
/// Element order follows the DE v150 schema and is written out explicitly.
/// Documents whose amounts do not add up are refused.
pub fn serialize(doc: &InvoiceDocument) -> Result<CanonicalDocument, SifenError> {
    let errors = validate_arithmetic(doc);
    if !errors.is_empty() {
        let msg = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(SifenError::Validation(msg));
    }

    let control_code = doc.control_code();
    let body = write_body(doc, &control_code)?;

    let mut canonical = C14nWriter::new();
    canonical
        .start_element_with_attrs("DE", &[("xmlns", SIFEN_NS), ("Id", control_code.as_str())])?
        .raw(&body)?
        .end_element("DE")?;

    let mut embedded = C14nWriter::new();
    embedded
        .start_element_with_attrs("DE", &[("Id", control_code.as_str())])?
        .raw(&body)?
        .end_element("DE")?;

    let receiver = match &doc.receiver.identity {
        ReceiverIdentity::Taxpayer { ruc, .. } => ReceiverId::Ruc(ruc.number().to_string()),
        ReceiverIdentity::Document { number, .. } => ReceiverId::Document(number.clone()),
    };

    Ok(CanonicalDocument {
        control_code,
        canonical_de: canonical.into_string()?,
        embedded_de: embedded.into_string()?,
        summary: DocumentSummary {
            issued_at: doc.issued_at,
            number: doc.number,
            security_code: doc.security_code.clone(),
            receiver,
            currency: doc.payment.currency,
            exchange_rate: doc.payment.exchange_rate,
            grand_total: doc.totals.grand_total,
            tax_total: doc.totals.tax_total,
            item_count: doc.items.len(),
        },
    })
}

/// Wrap a signed DE in the `rDE` envelope submitted to the authority.
pub(crate) fn envelope(embedded_de: &str, signature: &str, qr_url: Option<&str>) -> Result<String, SifenError> {
    let schema_location = format!("{SIFEN_NS} siRecepDE_v{DE_VERSION}.xsd");
    let mut w = C14nWriter::new();
    w.start_element_with_attrs(
        "rDE",
        &[
            ("xmlns", SIFEN_NS),
            ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
            ("xsi:schemaLocation", schema_location.as_str()),
        ],
    )?;
    w.text_element("dVerFor", DE_VERSION)?;
    w.raw(embedded_de)?;
    w.raw(signature)?;
    if let Some(url) = qr_url {
        w.start_element("gCamFuFD")?;
        w.text_element("dCarQR", url)?;
        w.end_element("gCamFuFD")?;
    }
    w.end_element("rDE")?;
    w.into_string()
}

fn write_body(doc: &InvoiceDocument, cdc: &ControlCode) -> Result<String, SifenError> {
    let mut w = C14nWriter::new();
    let issued = doc.issued_at.format(DATETIME_FORMAT).to_string();

    w.number_element("dDVId", cdc.check_digit())?;
    w.text_element("dFecFirma", &issued)?;
    w.number_element("dSisFact", 1)?;

    w.start_element("gOpeDE")?;
    w.number_element("iTipEmi", doc.emission_type.code())?;
    w.text_element("dDesTipEmi", doc.emission_type.description())?;
    w.text_element("dCodSeg", doc.security_code.as_str())?;
    w.end_element("gOpeDE")?;

    w.start_element("gTimb")?;
    w.number_element("iTiDE", doc.document_type.code())?;
    w.text_element("dDesTiDE", doc.document_type.description())?;
    w.text_element("dNumTim", &doc.emitter.timbrado.number)?;
    w.text_element("dEst", &format!("{:03}", doc.number.establishment))?;
    w.text_element("dPunExp", &format!("{:03}", doc.number.point))?;
    w.text_element("dNumDoc", &format!("{:07}", doc.number.number))?;
    w.text_element(
        "dFeIniT",
        &doc.emitter.timbrado.valid_from.format("%Y-%m-%d").to_string(),
    )?;
    w.end_element("gTimb")?;

    w.start_element("gDatGralOpe")?;
    w.text_element("dFeEmiDE", &issued)?;
    write_operation(&mut w, doc)?;
    write_emitter(&mut w, &doc.emitter)?;
    write_receiver(&mut w, &doc.receiver)?;
    w.end_element("gDatGralOpe")?;

    w.start_element("gDtipDE")?;
    w.start_element("gCamFE")?;
    w.number_element("iIndPres", 2)?;
    w.text_element("dDesIndPres", "Operación electrónica")?;
    w.end_element("gCamFE")?;
    write_condition(&mut w, doc)?;
    for item in &doc.items {
        write_item(&mut w, item, &doc.payment)?;
    }
    w.end_element("gDtipDE")?;

    write_totals(&mut w, &doc.totals)?;

    w.into_string()
}

fn write_operation(w: &mut C14nWriter, doc: &InvoiceDocument) -> Result<(), SifenError> {
    let payment = &doc.payment;
    w.start_element("gOpeCom")?;
    w.number_element("iTipTra", doc.transaction_type.code())?;
    w.text_element("dDesTipTra", doc.transaction_type.description())?;
    w.number_element("iTImp", 1)?;
    w.text_element("dDesTImp", "IVA")?;
    w.text_element("cMoneOpe", payment.currency.code())?;
    w.text_element("dDesMoneOpe", payment.currency.description())?;
    if let Some(rate) = payment.exchange_rate {
        // Global rate for the whole document.
        w.number_element("dCondTiCam", 1)?;
        w.decimal_element("dTiCam", rate)?;
    }
    w.end_element("gOpeCom")?;
    Ok(())
}

fn write_emitter(w: &mut C14nWriter, e: &Emitter) -> Result<(), SifenError> {
    w.start_element("gEmis")?;
    w.text_element("dRucEm", e.ruc.number())?;
    w.number_element("dDVEmi", e.ruc.check_digit())?;
    w.number_element("iTipCont", e.taxpayer_type.code())?;
    if let Some(regime) = e.tax_regime {
        w.number_element("cTipReg", regime.code())?;
    }
    w.text_element("dNomEmi", &e.name)?;
    if let Some(trade_name) = &e.trade_name {
        w.text_element("dNomFanEmi", trade_name)?;
    }
    w.text_element("dDirEmi", &e.street)?;
    w.text_element("dNumCas", &e.house_number)?;
    w.number_element("cDepEmi", e.department.code)?;
    w.text_element("dDesDepEmi", e.department.name)?;
    w.number_element("cCiuEmi", e.city.code)?;
    w.text_element("dDesCiuEmi", e.city.name)?;
    w.text_element("dTelEmi", &e.phone)?;
    w.text_element("dEmailE", &e.email)?;
    for activity in &e.activities {
        w.start_element("gActEco")?;
        w.text_element("cActEco", &activity.code)?;
        w.text_element("dDesActEco", &activity.description)?;
        w.end_element("gActEco")?;
    }
    w.end_element("gEmis")?;
    Ok(())
}

fn write_receiver(w: &mut C14nWriter, r: &Receiver) -> Result<(), SifenError> {
    w.start_element("gDatRec")?;
    w.number_element("iNatRec", r.nature().code())?;
    w.number_element("iTiOpe", r.operation_type.code())?;
    w.text_element("cPaisRec", &r.country_code)?;
    w.text_element("dDesPaisRe", &r.country_name)?;
    match &r.identity {
        ReceiverIdentity::Taxpayer { ruc, taxpayer_type } => {
            w.number_element("iTiContRec", taxpayer_type.code())?;
            w.text_element("dRucRec", ruc.number())?;
            w.number_element("dDVRec", ruc.check_digit())?;
        }
        ReceiverIdentity::Document { kind, number } => {
            w.number_element("iTipIDRec", kind.code())?;
            w.text_element("dDTipIDRec", kind.description())?;
            w.text_element("dNumIDRec", number)?;
        }
    }
    w.text_element("dNomRec", &r.name)?;
    if let Some(street) = &r.street {
        w.text_element("dDirRec", street)?;
        w.text_element("dNumCasRec", r.house_number.as_deref().unwrap_or("0"))?;
    }
    if let (Some(department), Some(city)) = (r.department, r.city) {
        w.number_element("cDepRec", department.code)?;
        w.text_element("dDesDepRec", department.name)?;
        w.number_element("cCiuRec", city.code)?;
        w.text_element("dDesCiuRec", city.name)?;
    }
    if let Some(phone) = &r.phone {
        w.text_element("dTelRec", phone)?;
    }
    if let Some(email) = &r.email {
        w.text_element("dEmailRec", email)?;
    }
    w.end_element("gDatRec")?;
    Ok(())
}

fn write_condition(w: &mut C14nWriter, doc: &InvoiceDocument) -> Result<(), SifenError> {
    let payment = &doc.payment;
    w.start_element("gCamCond")?;
    w.number_element("iCondOpe", payment.condition.code())?;
    w.text_element("dDCondOpe", payment.condition.description())?;
    match payment.condition {
        PaymentCondition::Cash => {
            w.start_element("gPaConEIni")?;
            w.number_element("iTiPago", payment.method.code())?;
            w.text_element("dDesTiPag", payment.method.description())?;
            w.decimal_element("dMonTiPag", doc.totals.grand_total)?;
            w.text_element("cMoneTiPag", payment.currency.code())?;
            w.text_element("dDMoneTiPag", payment.currency.description())?;
            if let Some(rate) = payment.exchange_rate {
                w.decimal_element("dTiCamTiPag", rate)?;
            }
            w.end_element("gPaConEIni")?;
        }
        PaymentCondition::Credit { days } => {
            w.start_element("gPagCred")?;
            w.number_element("iCondCred", 1)?;
            w.text_element("dDCondCred", "Plazo")?;
            w.text_element("dPlazoCre", &format!("{days} días"))?;
            w.end_element("gPagCred")?;
        }
    }
    w.end_element("gCamCond")?;
    Ok(())
}

fn write_item(w: &mut C14nWriter, item: &LineItem, payment: &PaymentInfo) -> Result<(), SifenError> {
    let unit = unit_description(item.unit_code)
        .ok_or_else(|| SifenError::unknown("unit of measure", item.unit_code.to_string()))?;
    let a = &item.amounts;

    w.start_element("gCamItem")?;
    w.text_element("dCodInt", &item.code)?;
    w.text_element("dDesProSer", &item.description)?;
    w.number_element("cUniMed", item.unit_code)?;
    w.text_element("dDesUniMed", unit)?;
    w.decimal_element("dCantProSer", item.quantity)?;

    w.start_element("gValorItem")?;
    w.decimal_element("dPUniProSer", item.unit_price)?;
    if let Some(rate) = payment.exchange_rate {
        w.decimal_element("dTiCamIt", rate)?;
    }
    w.decimal_element("dTotBruOpeItem", a.total)?;
    w.start_element("gValorRestaItem")?;
    for zero in ["dDescItem", "dPorcDesIt", "dDescGloItem", "dAntPreUniIt", "dAntGloPreUniIt"] {
        w.decimal_element(zero, Decimal::ZERO)?;
    }
    w.decimal_element("dTotOpeItem", a.total)?;
    w.end_element("gValorRestaItem")?;
    w.end_element("gValorItem")?;

    w.start_element("gCamIVA")?;
    w.number_element("iAfecIVA", item.affectation.code())?;
    w.text_element("dDesAfecIVA", item.affectation.description())?;
    w.decimal_element("dPropIVA", item.taxed_proportion)?;
    w.decimal_element("dTasaIVA", item.tax_rate)?;
    w.decimal_element("dBasGravIVA", a.tax_base)?;
    w.decimal_element("dLiqIVAItem", a.tax)?;
    w.decimal_element("dBasExe", a.exempt_base)?;
    w.end_element("gCamIVA")?;

    w.end_element("gCamItem")?;
    Ok(())
}

fn write_totals(w: &mut C14nWriter, t: &Totals) -> Result<(), SifenError> {
    w.start_element("gTotSub")?;
    w.decimal_element("dSubExe", t.exempt)?;
    w.decimal_element("dSubExo", t.exonerated)?;
    w.decimal_element("dSub5", t.taxed_5)?;
    w.decimal_element("dSub10", t.taxed_10)?;
    w.decimal_element("dTotOpe", t.operation_total)?;
    for zero in [
        "dTotDesc",
        "dTotDescGlotem",
        "dTotAntItem",
        "dTotAnt",
        "dPorcDescTotal",
        "dDescTotal",
        "dAnticipo",
        "dRedon",
    ] {
        w.decimal_element(zero, Decimal::ZERO)?;
    }
    w.decimal_element("dTotGralOpe", t.grand_total)?;
    w.decimal_element("dIVA5", t.tax_5)?;
    w.decimal_element("dIVA10", t.tax_10)?;
    w.decimal_element("dLiqTotIVA5", Decimal::ZERO)?;
    w.decimal_element("dLiqTotIVA10", Decimal::ZERO)?;
    w.decimal_element("dTotIVA", t.tax_total)?;
    w.decimal_element("dBaseGrav5", t.base_5)?;
    w.decimal_element("dBaseGrav10", t.base_10)?;
    w.decimal_element("dTBasGraIVA", t.base_total)?;
    if let Some(pyg) = t.pyg_total {
        w.text_element("dTotalGs", &format_decimal(pyg))?;
    }
    w.end_element("gTotSub")?;
    Ok(())
}
