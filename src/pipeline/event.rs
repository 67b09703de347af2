use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::core::*;

/// The inbound trigger: a payment was approved and must be invoiced.
///
/// Labels (currency, tax affectation, identity document, location) are
/// free text from the business side and are resolved through the catalogs
/// when the document is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentApproved {
    /// Idempotency key, e.g. the payment stage id.
    pub business_ref: String,
    /// Amount paid, tax included.
    pub amount: Decimal,
    pub currency: String,
    /// Guaraníes per unit of `currency`, for foreign currencies.
    #[serde(default)]
    pub exchange_rate: Option<Decimal>,
    pub receiver: ReceiverConfig,
    /// Line description printed on the invoice.
    pub description: String,
    #[serde(default = "default_tax_affectation")]
    pub tax_affectation: String,
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,
    /// Taxed share in percent for partially taxed lines.
    #[serde(default)]
    pub taxed_proportion: Option<Decimal>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

fn default_tax_affectation() -> String {
    "gravado".to_string()
}

fn default_tax_rate() -> Decimal {
    dec!(10)
}

/// Receiver data as the business side knows it.
///
/// A `ruc` makes the receiver a registered taxpayer; otherwise
/// `document_type` and `document_number` identify a non-taxpayer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    pub name: String,
    #[serde(default)]
    pub ruc: Option<String>,
    /// Taxpayer is a natural person rather than a company.
    #[serde(default)]
    pub person: bool,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub document_number: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub house_number: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl ReceiverConfig {
    pub fn to_receiver(&self) -> Result<Receiver, SifenError> {
        let mut builder = match (&self.ruc, &self.document_number) {
            (Some(ruc), _) => ReceiverBuilder::taxpayer(
                Ruc::parse(ruc)?,
                if self.person {
                    TaxpayerType::Person
                } else {
                    TaxpayerType::Company
                },
                &self.name,
            ),
            (None, Some(number)) => {
                let kind = match &self.document_type {
                    Some(label) => resolve_identity_document(label)?,
                    None => IdentityDocument::NationalId,
                };
                ReceiverBuilder::document(kind, number, &self.name)
            }
            (None, None) => {
                return Err(SifenError::Build(
                    "receiver needs a RUC or an identity document number".into(),
                ));
            }
        };

        if let Some(street) = &self.street {
            builder = builder.address(street, self.house_number.as_deref().unwrap_or("0"));
        }
        match (&self.department, &self.city) {
            (Some(dept), Some(city)) => {
                let department = resolve_department(dept)?;
                builder = builder.location(department, resolve_city(department, city)?);
            }
            (None, None) => {}
            _ => {
                return Err(SifenError::Build(
                    "receiver department and city must be given together".into(),
                ));
            }
        }
        if let Some(phone) = &self.phone {
            builder = builder.phone(phone);
        }
        if let Some(email) = &self.email {
            builder = builder.email(email);
        }
        Ok(builder.build())
    }
}

/// Catalog-resolved parts of a [`PaymentApproved`].
#[derive(Debug, Clone)]
pub struct ResolvedPayment {
    pub receiver: Receiver,
    pub item: LineItem,
    pub payment: PaymentInfo,
}

impl PaymentApproved {
    /// Resolve every label. Fails with `UnknownCatalogValue` before any
    /// document exists.
    pub fn resolve(&self) -> Result<ResolvedPayment, SifenError> {
        let currency = resolve_currency(&self.currency)?;
        let affectation = resolve_tax_affectation(&self.tax_affectation)?;
        let method = match &self.payment_method {
            Some(label) => resolve_payment_method(label)?,
            None => PaymentInfo::default().method,
        };
        let receiver = self.receiver.to_receiver()?;

        let mut item = ItemBuilder::new(&self.business_ref, &self.description, dec!(1), self.amount);
        item = match (affectation, self.taxed_proportion) {
            (TaxAffectation::PartiallyTaxed, Some(proportion)) => {
                item.partially_taxed(proportion, self.tax_rate)
            }
            (TaxAffectation::PartiallyTaxed, None) => {
                return Err(SifenError::Build(
                    "partially taxed payment needs taxed_proportion".into(),
                ));
            }
            (TaxAffectation::Taxed, _) => item.taxed(self.tax_rate),
            (other, _) => item.tax(other, Decimal::ZERO),
        };

        Ok(ResolvedPayment {
            receiver,
            item: item.build(),
            payment: PaymentInfo {
                method,
                currency,
                exchange_rate: self.exchange_rate,
                ..PaymentInfo::default()
            },
        })
    }

    /// Currency code for the record: ISO code when the label resolves,
    /// otherwise the label itself.
    pub(crate) fn currency_code(&self) -> String {
        resolve_currency(&self.currency)
            .map(|c| c.code().to_string())
            .unwrap_or_else(|_| self.currency.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> PaymentApproved {
        PaymentApproved {
            business_ref: "stage-41".into(),
            amount: dec!(1500000),
            currency: "Guaraníes".into(),
            exchange_rate: None,
            receiver: ReceiverConfig {
                name: "Juan Pérez".into(),
                document_type: Some("Cédula".into()),
                document_number: Some("4567890".into()),
                department: Some("Central".into()),
                city: Some("San Lorenzo".into()),
                ..ReceiverConfig::default()
            },
            description: "Desarrollo de sitio web - etapa 2".into(),
            tax_affectation: "Gravado IVA".into(),
            tax_rate: dec!(10),
            taxed_proportion: None,
            payment_method: Some("transferencia".into()),
        }
    }

    #[test]
    fn labels_resolve() {
        let resolved = event().resolve().unwrap();
        assert_eq!(resolved.payment.currency, Currency::Pyg);
        assert_eq!(resolved.payment.method, PaymentMethod::Transfer);
        assert_eq!(resolved.item.affectation, TaxAffectation::Taxed);
        assert_eq!(resolved.item.unit_price, dec!(1500000));
        assert_eq!(resolved.receiver.nature(), ReceiverNature::NonTaxpayer);
        assert_eq!(resolved.receiver.city.unwrap().code, 6181);
    }

    #[test]
    fn unknown_affectation_fails() {
        let mut e = event();
        e.tax_affectation = "medio gravado".into();
        assert!(matches!(
            e.resolve(),
            Err(SifenError::UnknownCatalogValue { catalog: "tax affectation", .. })
        ));
    }

    #[test]
    fn taxpayer_receiver() {
        let mut e = event();
        e.receiver.ruc = Some("80069563-1".into());
        let receiver = e.resolve().unwrap().receiver;
        assert_eq!(receiver.nature(), ReceiverNature::Taxpayer);
        assert_eq!(receiver.operation_type, OperationType::B2B);
    }

    #[test]
    fn receiver_without_identity_fails() {
        let mut e = event();
        e.receiver.document_number = None;
        assert!(matches!(e.resolve(), Err(SifenError::Build(_))));
    }

    #[test]
    fn unresolved_currency_keeps_label() {
        let mut e = event();
        assert_eq!(e.currency_code(), "PYG");
        e.currency = "doubloons".into();
        assert_eq!(e.currency_code(), "doubloons");
    }
}
