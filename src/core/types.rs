use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::catalog::{City, Department};
use super::cdc::{ControlCode, Ruc, SecurityCode};
use super::numbering::DocumentNumber;
use super::words::{Language, amount_in_words};

/// Electronic document (DE), the top-level tax document.
///
/// Built by [`DocumentBuilder`](super::DocumentBuilder); all monetary fields
/// are computed there and never taken from the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceDocument {
    /// iTiDE: document type.
    pub document_type: DocumentType,
    /// dEst / dPunExp / dNumDoc.
    pub number: DocumentNumber,
    /// iTipEmi: normal or contingency emission.
    pub emission_type: EmissionType,
    /// dCodSeg: random code chosen once per document.
    pub security_code: SecurityCode,
    /// dFeEmiDE: emission timestamp (local time of the emitter).
    pub issued_at: NaiveDateTime,
    /// iTipTra: kind of transaction.
    pub transaction_type: TransactionType,
    /// gEmis
    pub emitter: Emitter,
    /// gDatRec
    pub receiver: Receiver,
    /// gCamItem
    pub items: Vec<LineItem>,
    /// gCamCond + gOpeCom currency fields.
    pub payment: PaymentInfo,
    /// gTotSub
    pub totals: Totals,
}

impl InvoiceDocument {
    /// The 44-digit control code (CDC) identifying this document.
    pub fn control_code(&self) -> ControlCode {
        ControlCode::derive(
            self.document_type,
            &self.emitter.ruc,
            &self.number,
            self.emitter.taxpayer_type,
            self.issued_at.date(),
            self.emission_type,
            &self.security_code,
        )
    }

    /// Grand total in guaraníes, rounded to whole units.
    pub fn pyg_total(&self) -> u64 {
        let total = self.totals.pyg_total.unwrap_or(self.totals.grand_total);
        total.round().to_u64().unwrap_or(0)
    }

    /// Human-readable rendering of the guaraní total (for printed receipts).
    pub fn amount_in_words(&self, language: Language) -> String {
        amount_in_words(self.pyg_total(), language)
    }
}

/// gEmis: the issuing taxpayer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Emitter {
    /// dRucEm + dDVEmi
    pub ruc: Ruc,
    /// dNomEmi: legal name.
    pub name: String,
    /// dNomFanEmi: trade name.
    pub trade_name: Option<String>,
    /// iTipCont
    pub taxpayer_type: TaxpayerType,
    /// cTipReg
    pub tax_regime: Option<TaxRegime>,
    /// dDirEmi
    pub street: String,
    /// dNumCas
    pub house_number: String,
    pub department: Department,
    pub city: City,
    /// dTelEmi
    pub phone: String,
    /// dEmailE
    pub email: String,
    /// gActEco (at least one).
    pub activities: Vec<EconomicActivity>,
    /// gTimb: issuing-point authorization.
    pub timbrado: Timbrado,
}

/// gActEco
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomicActivity {
    pub code: String,
    pub description: String,
}

/// Issuing-point authorization ("timbrado") and its validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timbrado {
    /// dNumTim: 8-digit authorization number.
    pub number: String,
    /// dFeIniT
    pub valid_from: NaiveDate,
    /// End of validity; `None` for open-ended electronic timbrados.
    pub valid_until: Option<NaiveDate>,
}

impl Timbrado {
    /// Whether the authorization window covers `date`.
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.valid_from && self.valid_until.is_none_or(|until| date <= until)
    }
}

/// gDatRec: the receiving party.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receiver {
    pub identity: ReceiverIdentity,
    /// dNomRec
    pub name: String,
    /// iTiOpe
    pub operation_type: OperationType,
    /// cPaisRec: ISO 3166-1 alpha-3.
    pub country_code: String,
    /// dDesPaisRe
    pub country_name: String,
    /// dDirRec
    pub street: Option<String>,
    /// dNumCasRec
    pub house_number: Option<String>,
    pub department: Option<Department>,
    pub city: Option<City>,
    /// dTelRec
    pub phone: Option<String>,
    /// dEmailRec
    pub email: Option<String>,
}

impl Receiver {
    /// iNatRec, derived from the identity.
    pub fn nature(&self) -> ReceiverNature {
        match self.identity {
            ReceiverIdentity::Taxpayer { .. } => ReceiverNature::Taxpayer,
            ReceiverIdentity::Document { .. } => ReceiverNature::NonTaxpayer,
        }
    }

    /// The identifier used in the QR link and logs.
    pub fn identifier(&self) -> String {
        match &self.identity {
            ReceiverIdentity::Taxpayer { ruc, .. } => ruc.number().to_string(),
            ReceiverIdentity::Document { number, .. } => number.clone(),
        }
    }
}

/// How the receiver is identified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiverIdentity {
    /// Registered taxpayer identified by RUC.
    Taxpayer {
        ruc: Ruc,
        taxpayer_type: TaxpayerType,
    },
    /// Non-taxpayer identified by an identity document.
    Document {
        kind: IdentityDocument,
        number: String,
    },
}

/// gCamItem: one invoice line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    /// dCodInt: internal item code.
    pub code: String,
    /// dDesProSer
    pub description: String,
    /// cUniMed: unit of measure code (77 = unit).
    pub unit_code: u16,
    /// dCantProSer
    pub quantity: Decimal,
    /// dPUniProSer: unit price, tax included.
    pub unit_price: Decimal,
    /// iAfecIVA
    pub affectation: TaxAffectation,
    /// dPropIVA: taxed proportion in percent (100 unless partially taxed).
    pub taxed_proportion: Decimal,
    /// dTasaIVA: 0, 5 or 10.
    pub tax_rate: Decimal,
    /// Calculated by the builder.
    pub amounts: LineAmounts,
}

/// Per-line values calculated from quantity, price and tax classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAmounts {
    /// dTotOpeItem: quantity × unit price, rounded to currency precision.
    pub total: Decimal,
    /// dBasGravIVA
    pub tax_base: Decimal,
    /// dLiqIVAItem
    pub tax: Decimal,
    /// dBasExe: exempt base of a partially taxed line.
    pub exempt_base: Decimal,
}

/// gTotSub: document totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    /// dSubExe
    pub exempt: Decimal,
    /// dSubExo
    pub exonerated: Decimal,
    /// dSub5
    pub taxed_5: Decimal,
    /// dSub10
    pub taxed_10: Decimal,
    /// dTotOpe
    pub operation_total: Decimal,
    /// dTotGralOpe: always equals the sum of line totals.
    pub grand_total: Decimal,
    /// dIVA5
    pub tax_5: Decimal,
    /// dIVA10
    pub tax_10: Decimal,
    /// dTotIVA
    pub tax_total: Decimal,
    /// dBaseGrav5
    pub base_5: Decimal,
    /// dBaseGrav10
    pub base_10: Decimal,
    /// dTBasGraIVA
    pub base_total: Decimal,
    /// dTotalGs: guaraní equivalent for foreign-currency documents.
    pub pyg_total: Option<Decimal>,
}

/// Payment condition, method, currency and frozen exchange rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub condition: PaymentCondition,
    pub method: PaymentMethod,
    pub currency: Currency,
    /// dTiCam: guaraníes per unit of `currency`, as declared at build time.
    pub exchange_rate: Option<Decimal>,
}

impl Default for PaymentInfo {
    fn default() -> Self {
        Self {
            condition: PaymentCondition::Cash,
            method: PaymentMethod::Transfer,
            currency: Currency::Pyg,
            exchange_rate: None,
        }
    }
}

/// iCondOpe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentCondition {
    Cash,
    /// Credit with a term in days.
    Credit { days: u16 },
}

impl PaymentCondition {
    pub fn code(&self) -> u8 {
        match self {
            Self::Cash => 1,
            Self::Credit { .. } => 2,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Cash => "Contado",
            Self::Credit { .. } => "Crédito",
        }
    }
}

/// iTiPago (subset used for online sales).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    Cheque,
    CreditCard,
    DebitCard,
    Transfer,
    Giro,
    EWallet,
    ElectronicPayment,
    Other,
}

impl PaymentMethod {
    pub fn code(&self) -> u8 {
        match self {
            Self::Cash => 1,
            Self::Cheque => 2,
            Self::CreditCard => 3,
            Self::DebitCard => 4,
            Self::Transfer => 5,
            Self::Giro => 6,
            Self::EWallet => 7,
            Self::ElectronicPayment => 21,
            Self::Other => 99,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Cash => "Efectivo",
            Self::Cheque => "Cheque",
            Self::CreditCard => "Tarjeta de crédito",
            Self::DebitCard => "Tarjeta de débito",
            Self::Transfer => "Transferencia",
            Self::Giro => "Giro",
            Self::EWallet => "Billetera electrónica",
            Self::ElectronicPayment => "Pago Electrónico",
            Self::Other => "Otro",
        }
    }

    pub(crate) const ALL: [Self; 9] = [
        Self::Cash,
        Self::Cheque,
        Self::CreditCard,
        Self::DebitCard,
        Self::Transfer,
        Self::Giro,
        Self::EWallet,
        Self::ElectronicPayment,
        Self::Other,
    ];
}

/// cMoneOpe: currencies accepted for issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// Paraguayan guaraní, the authority's base currency.
    Pyg,
    Usd,
    Eur,
    Brl,
    Ars,
}

impl Currency {
    /// ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Pyg => "PYG",
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Brl => "BRL",
            Self::Ars => "ARS",
        }
    }

    /// dDesMoneOpe
    pub fn description(&self) -> &'static str {
        match self {
            Self::Pyg => "Guarani",
            Self::Usd => "US Dollar",
            Self::Eur => "Euro",
            Self::Brl => "Brazilian Real",
            Self::Ars => "Argentine Peso",
        }
    }

    /// Decimal places used for amounts in this currency.
    pub fn precision(&self) -> u32 {
        match self {
            Self::Pyg => 0,
            _ => 2,
        }
    }

    pub fn is_base(&self) -> bool {
        *self == Self::Pyg
    }

    pub(crate) const ALL: [Self; 5] = [Self::Pyg, Self::Usd, Self::Eur, Self::Brl, Self::Ars];
}

/// iTiDE: electronic document types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    /// 1: Factura electrónica.
    Invoice,
    /// 2
    ExportInvoice,
    /// 3
    ImportInvoice,
    /// 4
    SelfInvoice,
    /// 5
    CreditNote,
    /// 6
    DebitNote,
    /// 7
    RemissionNote,
}

impl DocumentType {
    pub fn code(&self) -> u8 {
        match self {
            Self::Invoice => 1,
            Self::ExportInvoice => 2,
            Self::ImportInvoice => 3,
            Self::SelfInvoice => 4,
            Self::CreditNote => 5,
            Self::DebitNote => 6,
            Self::RemissionNote => 7,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// dDesTiDE
    pub fn description(&self) -> &'static str {
        match self {
            Self::Invoice => "Factura electrónica",
            Self::ExportInvoice => "Factura electrónica de exportación",
            Self::ImportInvoice => "Factura electrónica de importación",
            Self::SelfInvoice => "Autofactura electrónica",
            Self::CreditNote => "Nota de crédito electrónica",
            Self::DebitNote => "Nota de débito electrónica",
            Self::RemissionNote => "Nota de remisión electrónica",
        }
    }

    pub(crate) const ALL: [Self; 7] = [
        Self::Invoice,
        Self::ExportInvoice,
        Self::ImportInvoice,
        Self::SelfInvoice,
        Self::CreditNote,
        Self::DebitNote,
        Self::RemissionNote,
    ];
}

/// iAfecIVA: tax-affectation classification of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaxAffectation {
    /// 1: Gravado IVA.
    Taxed,
    /// 2: Exonerado (Art. 83 Ley 125/91).
    Exonerated,
    /// 3: Exento.
    Exempt,
    /// 4: Gravado parcial (Grav-Exento).
    PartiallyTaxed,
}

impl TaxAffectation {
    pub fn code(&self) -> u8 {
        match self {
            Self::Taxed => 1,
            Self::Exonerated => 2,
            Self::Exempt => 3,
            Self::PartiallyTaxed => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.code() == code)
    }

    /// dDesAfecIVA
    pub fn description(&self) -> &'static str {
        match self {
            Self::Taxed => "Gravado IVA",
            Self::Exonerated => "Exonerado (Art. 83- Ley 125/91)",
            Self::Exempt => "Exento",
            Self::PartiallyTaxed => "Gravado parcial (Grav-Exento)",
        }
    }

    pub fn is_taxed(&self) -> bool {
        matches!(self, Self::Taxed | Self::PartiallyTaxed)
    }

    pub(crate) const ALL: [Self; 4] = [
        Self::Taxed,
        Self::Exonerated,
        Self::Exempt,
        Self::PartiallyTaxed,
    ];
}

/// iTipCont
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaxpayerType {
    /// 1: Persona física.
    Person,
    /// 2: Persona jurídica.
    Company,
}

impl TaxpayerType {
    pub fn code(&self) -> u8 {
        match self {
            Self::Person => 1,
            Self::Company => 2,
        }
    }
}

/// cTipReg: special tax regimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaxRegime {
    Tourism,
    Importer,
    Exporter,
    Maquila,
    Law60_90,
    SmallProducer,
    MediumProducer,
    Accounting,
}

impl TaxRegime {
    pub fn code(&self) -> u8 {
        match self {
            Self::Tourism => 1,
            Self::Importer => 2,
            Self::Exporter => 3,
            Self::Maquila => 4,
            Self::Law60_90 => 5,
            Self::SmallProducer => 6,
            Self::MediumProducer => 7,
            Self::Accounting => 8,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Tourism => "Régimen de Turismo",
            Self::Importer => "Importador",
            Self::Exporter => "Exportador",
            Self::Maquila => "Maquila",
            Self::Law60_90 => "Ley N° 60/90",
            Self::SmallProducer => "Régimen del Pequeño Productor",
            Self::MediumProducer => "Régimen del Mediano Productor",
            Self::Accounting => "Régimen Contable",
        }
    }

    pub(crate) const ALL: [Self; 8] = [
        Self::Tourism,
        Self::Importer,
        Self::Exporter,
        Self::Maquila,
        Self::Law60_90,
        Self::SmallProducer,
        Self::MediumProducer,
        Self::Accounting,
    ];
}

/// iNatRec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiverNature {
    Taxpayer,
    NonTaxpayer,
}

impl ReceiverNature {
    pub fn code(&self) -> u8 {
        match self {
            Self::Taxpayer => 1,
            Self::NonTaxpayer => 2,
        }
    }
}

/// iTiOpe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    B2B,
    B2C,
    B2G,
    B2F,
}

impl OperationType {
    pub fn code(&self) -> u8 {
        match self {
            Self::B2B => 1,
            Self::B2C => 2,
            Self::B2G => 3,
            Self::B2F => 4,
        }
    }
}

/// iTipIDRec: identity documents for non-taxpayer receivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityDocument {
    NationalId,
    Passport,
    ForeignId,
    ResidenceCard,
    Unnamed,
    DiplomaticCard,
    Other,
}

impl IdentityDocument {
    pub fn code(&self) -> u8 {
        match self {
            Self::NationalId => 1,
            Self::Passport => 2,
            Self::ForeignId => 3,
            Self::ResidenceCard => 4,
            Self::Unnamed => 5,
            Self::DiplomaticCard => 6,
            Self::Other => 9,
        }
    }

    /// dDTipIDRec
    pub fn description(&self) -> &'static str {
        match self {
            Self::NationalId => "Cédula paraguaya",
            Self::Passport => "Pasaporte",
            Self::ForeignId => "Cédula extranjera",
            Self::ResidenceCard => "Carnet de residencia",
            Self::Unnamed => "Innominado",
            Self::DiplomaticCard => "Tarjeta Diplomática de exoneración fiscal",
            Self::Other => "Otro",
        }
    }

    pub(crate) const ALL: [Self; 7] = [
        Self::NationalId,
        Self::Passport,
        Self::ForeignId,
        Self::ResidenceCard,
        Self::Unnamed,
        Self::DiplomaticCard,
        Self::Other,
    ];
}

/// iTipTra
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    SaleOfGoods,
    Services,
    Mixed,
}

impl TransactionType {
    pub fn code(&self) -> u8 {
        match self {
            Self::SaleOfGoods => 1,
            Self::Services => 2,
            Self::Mixed => 3,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::SaleOfGoods => "Venta de mercadería",
            Self::Services => "Prestación de servicios",
            Self::Mixed => "Mixto (Venta de mercadería y servicios)",
        }
    }
}

/// iTipEmi
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmissionType {
    Normal,
    Contingency,
}

impl EmissionType {
    pub fn code(&self) -> u8 {
        match self {
            Self::Normal => 1,
            Self::Contingency => 2,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Contingency => "Contingencia",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn timbrado_window() {
        let t = Timbrado {
            number: "12558946".into(),
            valid_from: date(2024, 1, 1),
            valid_until: Some(date(2024, 12, 31)),
        };
        assert!(t.covers(date(2024, 1, 1)));
        assert!(t.covers(date(2024, 12, 31)));
        assert!(!t.covers(date(2023, 12, 31)));
        assert!(!t.covers(date(2025, 1, 1)));

        let open = Timbrado {
            valid_until: None,
            ..t
        };
        assert!(open.covers(date(2030, 6, 1)));
    }

    #[test]
    fn code_round_trips() {
        for t in DocumentType::ALL {
            assert_eq!(DocumentType::from_code(t.code()), Some(t));
        }
        for a in TaxAffectation::ALL {
            assert_eq!(TaxAffectation::from_code(a.code()), Some(a));
        }
        assert_eq!(DocumentType::from_code(8), None);
    }

    #[test]
    fn currency_precision() {
        assert_eq!(Currency::Pyg.precision(), 0);
        assert_eq!(Currency::Usd.precision(), 2);
        assert!(Currency::Pyg.is_base());
        assert!(!Currency::Eur.is_base());
    }
}
