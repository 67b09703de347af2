use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::catalog::{City, Department, unit_description};
use super::cdc::{Ruc, SecurityCode};
use super::error::{SifenError, ValidationError};
use super::numbering::DocumentNumber;
use super::totals;
use super::types::*;

/// Maximum number of lines accepted on a single document.
pub const MAX_ITEMS: usize = 999;

/// Builder for electronic documents.
///
/// All amounts are computed here from quantity, unit price and tax
/// classification; the caller never supplies totals.
///
/// ```
/// use sifen::core::*;
/// use rust_decimal_macros::dec;
/// use chrono::NaiveDate;
///
/// let asuncion = resolve_department("Capital").unwrap();
/// let emitter = EmitterBuilder::new(
///     Ruc::parse("80069563-1").unwrap(),
///     "Servicios Digitales SA",
///     Timbrado {
///         number: "12558946".into(),
///         valid_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
///         valid_until: None,
///     },
///     asuncion,
///     resolve_city(asuncion, "Asuncion").unwrap(),
/// )
/// .address("Avda. España", "1234")
/// .activity("62010", "Actividades de programación informática")
/// .build();
///
/// let receiver = ReceiverBuilder::document(IdentityDocument::NationalId, "4567890", "Juan Pérez")
///     .build();
///
/// let now = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap().and_hms_opt(10, 30, 0).unwrap();
/// let doc = DocumentBuilder::new(emitter, receiver, DocumentNumber::new(1, 1, 1).unwrap())
///     .add_item(ItemBuilder::new("SUB-M", "Suscripción mensual", dec!(1), dec!(110000)).taxed(dec!(10)).build())
///     .build_at(now)
///     .unwrap();
///
/// assert_eq!(doc.totals.grand_total, dec!(110000));
/// assert_eq!(doc.totals.tax_10, dec!(10000));
/// assert_eq!(doc.control_code().as_str().len(), 44);
/// ```
pub struct DocumentBuilder {
    emitter: Emitter,
    receiver: Receiver,
    number: DocumentNumber,
    document_type: DocumentType,
    transaction_type: TransactionType,
    emission_type: EmissionType,
    security_code: Option<SecurityCode>,
    payment: PaymentInfo,
    items: Vec<LineItem>,
}

impl DocumentBuilder {
    pub fn new(emitter: Emitter, receiver: Receiver, number: DocumentNumber) -> Self {
        Self {
            emitter,
            receiver,
            number,
            document_type: DocumentType::Invoice,
            transaction_type: TransactionType::Services,
            emission_type: EmissionType::Normal,
            security_code: None,
            payment: PaymentInfo::default(),
            items: Vec::new(),
        }
    }

    pub fn document_type(mut self, document_type: DocumentType) -> Self {
        self.document_type = document_type;
        self
    }

    pub fn transaction_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = transaction_type;
        self
    }

    pub fn emission_type(mut self, emission_type: EmissionType) -> Self {
        self.emission_type = emission_type;
        self
    }

    /// Fix the security code instead of drawing a random one.
    pub fn security_code(mut self, code: SecurityCode) -> Self {
        self.security_code = Some(code);
        self
    }

    pub fn payment(mut self, payment: PaymentInfo) -> Self {
        self.payment = payment;
        self
    }

    pub fn add_item(mut self, item: LineItem) -> Self {
        self.items.push(item);
        self
    }

    /// Build the document as issued at `now`, calculating every amount.
    /// Returns all input problems at once (not just the first).
    pub fn build_at(self, now: NaiveDateTime) -> Result<InvoiceDocument, SifenError> {
        let errors = self.check(now.date());
        if !errors.is_empty() {
            let msg = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(SifenError::Build(msg));
        }

        let mut payment = self.payment;
        if payment.currency.is_base() {
            payment.exchange_rate = None;
        }

        let mut items = self.items;
        let totals = totals::calculate_totals(&mut items, &payment);

        Ok(InvoiceDocument {
            document_type: self.document_type,
            number: self.number,
            emission_type: self.emission_type,
            security_code: self.security_code.unwrap_or_else(SecurityCode::generate),
            issued_at: now,
            transaction_type: self.transaction_type,
            emitter: self.emitter,
            receiver: self.receiver,
            items,
            payment,
            totals,
        })
    }

    fn check(&self, date: NaiveDate) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.document_type != DocumentType::Invoice {
            errors.push(ValidationError::new(
                "document_type",
                format!("{} cannot be issued from a payment", self.document_type.description()),
            ));
        }

        let emitter = &self.emitter;
        if emitter.name.trim().is_empty() {
            errors.push(ValidationError::new("emitter.name", "legal name is required"));
        }
        if emitter.activities.is_empty() {
            errors.push(ValidationError::new(
                "emitter.activities",
                "at least one economic activity is required",
            ));
        }
        let timbrado = &emitter.timbrado;
        if timbrado.number.len() != 8 || !timbrado.number.chars().all(|c| c.is_ascii_digit()) {
            errors.push(ValidationError::new(
                "emitter.timbrado.number",
                format!("timbrado {:?} must be 8 digits", timbrado.number),
            ));
        }
        if !timbrado.covers(date) {
            errors.push(ValidationError::new(
                "emitter.timbrado",
                format!("timbrado {} is not valid on {date}", timbrado.number),
            ));
        }

        let receiver = &self.receiver;
        if receiver.name.trim().is_empty() {
            errors.push(ValidationError::new("receiver.name", "name is required"));
        }
        if let ReceiverIdentity::Document { number, .. } = &receiver.identity {
            if number.trim().is_empty() {
                errors.push(ValidationError::new(
                    "receiver.identity",
                    "identity document number is required",
                ));
            }
        }

        if self.items.is_empty() {
            errors.push(ValidationError::new("items", "at least one line item is required"));
        }
        for (i, item) in self.items.iter().enumerate() {
            check_item(i, item, &mut errors);
        }
        errors.extend(totals::check_ranges(&self.items, &self.payment));

        let payment = &self.payment;
        if !payment.currency.is_base() {
            match payment.exchange_rate {
                Some(rate) if rate > Decimal::ZERO => {}
                Some(rate) => errors.push(ValidationError::new(
                    "payment.exchange_rate",
                    format!("exchange rate {rate} must be positive"),
                )),
                None => errors.push(ValidationError::new(
                    "payment.exchange_rate",
                    format!("{} requires an exchange rate", payment.currency.code()),
                )),
            }
        }

        errors
    }
}

fn check_item(i: usize, item: &LineItem, errors: &mut Vec<ValidationError>) {
    let field = |name: &str| format!("items[{i}].{name}");

    if item.description.trim().is_empty() {
        errors.push(ValidationError::new(field("description"), "description is required"));
    }
    if unit_description(item.unit_code).is_none() {
        errors.push(ValidationError::new(
            field("unit_code"),
            format!("unknown unit of measure {}", item.unit_code),
        ));
    }
    if item.quantity <= Decimal::ZERO {
        errors.push(ValidationError::new(
            field("quantity"),
            format!("quantity {} must be positive", item.quantity),
        ));
    }
    if item.unit_price < Decimal::ZERO {
        errors.push(ValidationError::new(
            field("unit_price"),
            format!("unit price {} must not be negative", item.unit_price),
        ));
    }

    match item.affectation {
        TaxAffectation::Taxed | TaxAffectation::PartiallyTaxed => {
            if item.tax_rate != dec!(5) && item.tax_rate != dec!(10) {
                errors.push(ValidationError::new(
                    field("tax_rate"),
                    format!("taxed lines use 5 or 10 percent, got {}", item.tax_rate),
                ));
            }
        }
        TaxAffectation::Exempt | TaxAffectation::Exonerated => {
            if !item.tax_rate.is_zero() {
                errors.push(ValidationError::new(
                    field("tax_rate"),
                    format!("untaxed lines carry rate 0, got {}", item.tax_rate),
                ));
            }
        }
    }

    let proportion_ok = match item.affectation {
        TaxAffectation::PartiallyTaxed => {
            item.taxed_proportion > Decimal::ZERO && item.taxed_proportion < dec!(100)
        }
        TaxAffectation::Taxed => item.taxed_proportion == dec!(100),
        TaxAffectation::Exempt | TaxAffectation::Exonerated => true,
    };
    if !proportion_ok {
        errors.push(ValidationError::new(
            field("taxed_proportion"),
            format!(
                "proportion {} does not fit {}",
                item.taxed_proportion,
                item.affectation.description()
            ),
        ));
    }
}

/// Builder for the issuing taxpayer.
pub struct EmitterBuilder {
    ruc: Ruc,
    name: String,
    trade_name: Option<String>,
    taxpayer_type: TaxpayerType,
    tax_regime: Option<TaxRegime>,
    street: String,
    house_number: String,
    department: Department,
    city: City,
    phone: String,
    email: String,
    activities: Vec<EconomicActivity>,
    timbrado: Timbrado,
}

impl EmitterBuilder {
    pub fn new(
        ruc: Ruc,
        name: impl Into<String>,
        timbrado: Timbrado,
        department: Department,
        city: City,
    ) -> Self {
        Self {
            ruc,
            name: name.into(),
            trade_name: None,
            taxpayer_type: TaxpayerType::Company,
            tax_regime: None,
            street: String::new(),
            house_number: "0".to_string(),
            department,
            city,
            phone: String::new(),
            email: String::new(),
            activities: Vec::new(),
            timbrado,
        }
    }

    pub fn trade_name(mut self, name: impl Into<String>) -> Self {
        self.trade_name = Some(name.into());
        self
    }

    pub fn taxpayer_type(mut self, taxpayer_type: TaxpayerType) -> Self {
        self.taxpayer_type = taxpayer_type;
        self
    }

    pub fn tax_regime(mut self, regime: TaxRegime) -> Self {
        self.tax_regime = Some(regime);
        self
    }

    pub fn address(mut self, street: impl Into<String>, house_number: impl Into<String>) -> Self {
        self.street = street.into();
        self.house_number = house_number.into();
        self
    }

    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = phone.into();
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn activity(mut self, code: impl Into<String>, description: impl Into<String>) -> Self {
        self.activities.push(EconomicActivity {
            code: code.into(),
            description: description.into(),
        });
        self
    }

    pub fn build(self) -> Emitter {
        Emitter {
            ruc: self.ruc,
            name: self.name,
            trade_name: self.trade_name,
            taxpayer_type: self.taxpayer_type,
            tax_regime: self.tax_regime,
            street: self.street,
            house_number: self.house_number,
            department: self.department,
            city: self.city,
            phone: self.phone,
            email: self.email,
            activities: self.activities,
            timbrado: self.timbrado,
        }
    }
}

/// Builder for the receiving party.
pub struct ReceiverBuilder {
    identity: ReceiverIdentity,
    name: String,
    operation_type: OperationType,
    country_code: String,
    country_name: String,
    street: Option<String>,
    house_number: Option<String>,
    department: Option<Department>,
    city: Option<City>,
    phone: Option<String>,
    email: Option<String>,
}

impl ReceiverBuilder {
    /// A registered taxpayer; defaults to a B2B operation.
    pub fn taxpayer(ruc: Ruc, taxpayer_type: TaxpayerType, name: impl Into<String>) -> Self {
        Self::with_identity(
            ReceiverIdentity::Taxpayer { ruc, taxpayer_type },
            name,
            OperationType::B2B,
        )
    }

    /// A non-taxpayer identified by an identity document; defaults to B2C.
    pub fn document(
        kind: IdentityDocument,
        number: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::with_identity(
            ReceiverIdentity::Document {
                kind,
                number: number.into(),
            },
            name,
            OperationType::B2C,
        )
    }

    fn with_identity(
        identity: ReceiverIdentity,
        name: impl Into<String>,
        operation_type: OperationType,
    ) -> Self {
        Self {
            identity,
            name: name.into(),
            operation_type,
            country_code: "PRY".to_string(),
            country_name: "Paraguay".to_string(),
            street: None,
            house_number: None,
            department: None,
            city: None,
            phone: None,
            email: None,
        }
    }

    pub fn operation_type(mut self, operation_type: OperationType) -> Self {
        self.operation_type = operation_type;
        self
    }

    pub fn country(mut self, code: impl Into<String>, name: impl Into<String>) -> Self {
        self.country_code = code.into();
        self.country_name = name.into();
        self
    }

    pub fn address(mut self, street: impl Into<String>, house_number: impl Into<String>) -> Self {
        self.street = Some(street.into());
        self.house_number = Some(house_number.into());
        self
    }

    pub fn location(mut self, department: Department, city: City) -> Self {
        self.department = Some(department);
        self.city = Some(city);
        self
    }

    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn build(self) -> Receiver {
        Receiver {
            identity: self.identity,
            name: self.name,
            operation_type: self.operation_type,
            country_code: self.country_code,
            country_name: self.country_name,
            street: self.street,
            house_number: self.house_number,
            department: self.department,
            city: self.city,
            phone: self.phone,
            email: self.email,
        }
    }
}

/// Builder for a line item. Defaults to one unit (cUniMed 77) taxed at 10%.
pub struct ItemBuilder {
    code: String,
    description: String,
    unit_code: u16,
    quantity: Decimal,
    unit_price: Decimal,
    affectation: TaxAffectation,
    taxed_proportion: Decimal,
    tax_rate: Decimal,
}

impl ItemBuilder {
    pub fn new(
        code: impl Into<String>,
        description: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            unit_code: 77,
            quantity,
            unit_price,
            affectation: TaxAffectation::Taxed,
            taxed_proportion: dec!(100),
            tax_rate: dec!(10),
        }
    }

    pub fn unit(mut self, unit_code: u16) -> Self {
        self.unit_code = unit_code;
        self
    }

    pub fn taxed(self, rate: Decimal) -> Self {
        self.tax(TaxAffectation::Taxed, rate)
    }

    pub fn exempt(self) -> Self {
        self.tax(TaxAffectation::Exempt, Decimal::ZERO)
    }

    pub fn exonerated(self) -> Self {
        self.tax(TaxAffectation::Exonerated, Decimal::ZERO)
    }

    /// Taxed on `proportion` percent of the price, exempt on the rest.
    pub fn partially_taxed(mut self, proportion: Decimal, rate: Decimal) -> Self {
        self.affectation = TaxAffectation::PartiallyTaxed;
        self.taxed_proportion = proportion;
        self.tax_rate = rate;
        self
    }

    /// Set the classification directly, e.g. from a catalog lookup.
    pub fn tax(mut self, affectation: TaxAffectation, rate: Decimal) -> Self {
        self.affectation = affectation;
        self.tax_rate = rate;
        self.taxed_proportion = match affectation {
            TaxAffectation::Taxed => dec!(100),
            TaxAffectation::PartiallyTaxed => self.taxed_proportion,
            TaxAffectation::Exempt | TaxAffectation::Exonerated => Decimal::ZERO,
        };
        self
    }

    pub fn build(self) -> LineItem {
        LineItem {
            code: self.code,
            description: self.description,
            unit_code: self.unit_code,
            quantity: self.quantity,
            unit_price: self.unit_price,
            affectation: self.affectation,
            taxed_proportion: self.taxed_proportion,
            tax_rate: self.tax_rate,
            amounts: LineAmounts::default(),
        }
    }
}
