//! Authority catalogs: free-form business labels → SIFEN codes.
//!
//! Lookups are exact matches after [`normalize_label`], which folds case,
//! Spanish diacritics and runs of whitespace. Numeric codes are accepted as
//! well. Nothing is ever guessed: an unmapped label is an
//! [`SifenError::UnknownCatalogValue`].

use serde::{Deserialize, Deserializer, Serialize};

use super::error::SifenError;
use super::types::{Currency, DocumentType, IdentityDocument, PaymentMethod, TaxAffectation, TaxRegime};

/// cDep*: one of the 18 departments (Capital counted as one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "u8")]
pub struct Department {
    pub code: u8,
    /// dDesDep*
    pub name: &'static str,
}

impl TryFrom<u8> for Department {
    type Error = SifenError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        DEPARTMENTS
            .iter()
            .find(|d| d.code == code)
            .copied()
            .ok_or_else(|| SifenError::unknown("department", code.to_string()))
    }
}

impl From<Department> for u8 {
    fn from(d: Department) -> u8 {
        d.code
    }
}

// Serialized as the bare code; the name comes back from the table.
impl<'de> Deserialize<'de> for Department {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Department::try_from(code).map_err(serde::de::Error::custom)
    }
}

/// cCiu*: a city, always tied to its department.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "u16")]
pub struct City {
    pub code: u16,
    pub department: u8,
    /// dDesCiu*
    pub name: &'static str,
}

impl TryFrom<u16> for City {
    type Error = SifenError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        CITIES
            .iter()
            .find(|c| c.code == code)
            .copied()
            .ok_or_else(|| SifenError::unknown("city", code.to_string()))
    }
}

impl From<City> for u16 {
    fn from(c: City) -> u16 {
        c.code
    }
}

impl<'de> Deserialize<'de> for City {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u16::deserialize(deserializer)?;
        City::try_from(code).map_err(serde::de::Error::custom)
    }
}

const fn dep(code: u8, name: &'static str) -> Department {
    Department { code, name }
}

const fn city(code: u16, department: u8, name: &'static str) -> City {
    City {
        code,
        department,
        name,
    }
}

static DEPARTMENTS: &[Department] = &[
    dep(1, "CAPITAL"),
    dep(2, "CONCEPCION"),
    dep(3, "SAN PEDRO"),
    dep(4, "CORDILLERA"),
    dep(5, "GUAIRA"),
    dep(6, "CAAGUAZU"),
    dep(7, "CAAZAPA"),
    dep(8, "ITAPUA"),
    dep(9, "MISIONES"),
    dep(10, "PARAGUARI"),
    dep(11, "ALTO PARANA"),
    dep(12, "CENTRAL"),
    dep(13, "NEEMBUCU"),
    dep(14, "AMAMBAY"),
    dep(15, "CANINDEYU"),
    dep(16, "PRESIDENTE HAYES"),
    dep(17, "BOQUERON"),
    dep(18, "ALTO PARAGUAY"),
];

/// Extra spellings people actually type for a department.
static DEPARTMENT_ALIASES: &[(&str, u8)] = &[
    ("ASUNCION", 1),
    ("DISTRITO CAPITAL", 1),
    ("GRAN ASUNCION", 12),
    ("PDTE HAYES", 16),
    ("PTE HAYES", 16),
];

/// Cities handled by the issuer. Codes follow the authority's geographic
/// reference table; extend from the published catalog when a new city appears.
static CITIES: &[City] = &[
    city(1, 1, "ASUNCION (DISTRITO)"),
    city(169, 2, "CONCEPCION (MUNIC)"),
    city(1245, 4, "CAACUPE (MUNIC)"),
    city(1829, 5, "VILLARRICA (MUNIC)"),
    city(2280, 6, "CORONEL OVIEDO (MUNIC)"),
    city(3001, 8, "ENCARNACION (MUNIC)"),
    city(3344, 11, "PASO ITA (INDIGENA)"),
    city(3432, 11, "PUERTO PTE.STROESSNER (MUNIC)"),
    city(3512, 11, "HERNANDARIAS (MUNIC)"),
    city(3589, 11, "PRESIDENTE FRANCO (MUNIC)"),
    city(6064, 12, "CAPIATA (MUNIC)"),
    city(6081, 12, "FERNANDO DE LA MORA (MUNIC)"),
    city(6097, 12, "LAMBARE (MUNIC)"),
    city(6106, 12, "LUQUE (MUNIC)"),
    city(6130, 12, "MARIANO ROQUE ALONSO (MUNIC)"),
    city(6155, 12, "ÑEMBY (MUNIC)"),
    city(6181, 12, "SAN LORENZO (MUNIC)"),
    city(6220, 12, "LIMPIO (MUNIC)"),
    city(6239, 12, "VILLA ELISA (MUNIC)"),
    city(7400, 14, "PEDRO JUAN CABALLERO (MUNIC)"),
];

/// Extra spellings for cities, keyed by (department, alias).
static CITY_ALIASES: &[(u8, &str, u16)] = &[
    (1, "ASUNCION", 1),
    (11, "CIUDAD DEL ESTE", 3432),
    (11, "CDE", 3432),
    (12, "SAN LORENZO", 6181),
    (12, "LUQUE", 6106),
    (12, "LAMBARE", 6097),
    (12, "FERNANDO DE LA MORA", 6081),
    (12, "CAPIATA", 6064),
    (12, "NEMBY", 6155),
    (12, "LIMPIO", 6220),
    (12, "VILLA ELISA", 6239),
    (12, "MARIANO ROQUE ALONSO", 6130),
    (8, "ENCARNACION", 3001),
    (4, "CAACUPE", 1245),
    (5, "VILLARRICA", 1829),
    (6, "CORONEL OVIEDO", 2280),
    (14, "PEDRO JUAN CABALLERO", 7400),
    (2, "CONCEPCION", 169),
];

static DOCUMENT_TYPE_LABELS: &[(&str, DocumentType)] = &[
    ("FACTURA", DocumentType::Invoice),
    ("FACTURA ELECTRONICA", DocumentType::Invoice),
    ("INVOICE", DocumentType::Invoice),
    ("FACTURA DE EXPORTACION", DocumentType::ExportInvoice),
    ("FACTURA ELECTRONICA DE EXPORTACION", DocumentType::ExportInvoice),
    ("FACTURA DE IMPORTACION", DocumentType::ImportInvoice),
    ("FACTURA ELECTRONICA DE IMPORTACION", DocumentType::ImportInvoice),
    ("AUTOFACTURA", DocumentType::SelfInvoice),
    ("AUTOFACTURA ELECTRONICA", DocumentType::SelfInvoice),
    ("NOTA DE CREDITO", DocumentType::CreditNote),
    ("NOTA DE CREDITO ELECTRONICA", DocumentType::CreditNote),
    ("CREDIT NOTE", DocumentType::CreditNote),
    ("NOTA DE DEBITO", DocumentType::DebitNote),
    ("NOTA DE DEBITO ELECTRONICA", DocumentType::DebitNote),
    ("DEBIT NOTE", DocumentType::DebitNote),
    ("NOTA DE REMISION", DocumentType::RemissionNote),
    ("NOTA DE REMISION ELECTRONICA", DocumentType::RemissionNote),
];

static TAX_AFFECTATION_LABELS: &[(&str, TaxAffectation)] = &[
    ("GRAVADO", TaxAffectation::Taxed),
    ("GRAVADO IVA", TaxAffectation::Taxed),
    ("TAXED", TaxAffectation::Taxed),
    ("EXONERADO", TaxAffectation::Exonerated),
    ("EXONERATED", TaxAffectation::Exonerated),
    ("EXENTO", TaxAffectation::Exempt),
    ("EXEMPT", TaxAffectation::Exempt),
    ("GRAVADO PARCIAL", TaxAffectation::PartiallyTaxed),
    ("GRAVADO PARCIAL (GRAV-EXENTO)", TaxAffectation::PartiallyTaxed),
    ("PARTIALLY TAXED", TaxAffectation::PartiallyTaxed),
];

static IDENTITY_DOCUMENT_LABELS: &[(&str, IdentityDocument)] = &[
    ("CI", IdentityDocument::NationalId),
    ("C.I.", IdentityDocument::NationalId),
    ("CEDULA", IdentityDocument::NationalId),
    ("CEDULA PARAGUAYA", IdentityDocument::NationalId),
    ("CEDULA DE IDENTIDAD", IdentityDocument::NationalId),
    ("PASAPORTE", IdentityDocument::Passport),
    ("PASSPORT", IdentityDocument::Passport),
    ("CEDULA EXTRANJERA", IdentityDocument::ForeignId),
    ("CARNET DE RESIDENCIA", IdentityDocument::ResidenceCard),
    ("INNOMINADO", IdentityDocument::Unnamed),
    ("SIN NOMBRE", IdentityDocument::Unnamed),
    ("TARJETA DIPLOMATICA", IdentityDocument::DiplomaticCard),
    ("TARJETA DIPLOMATICA DE EXONERACION FISCAL", IdentityDocument::DiplomaticCard),
    ("OTRO", IdentityDocument::Other),
];

static TAX_REGIME_LABELS: &[(&str, TaxRegime)] = &[
    ("TURISMO", TaxRegime::Tourism),
    ("REGIMEN DE TURISMO", TaxRegime::Tourism),
    ("IMPORTADOR", TaxRegime::Importer),
    ("EXPORTADOR", TaxRegime::Exporter),
    ("MAQUILA", TaxRegime::Maquila),
    ("LEY 60/90", TaxRegime::Law60_90),
    ("LEY N° 60/90", TaxRegime::Law60_90),
    ("PEQUENO PRODUCTOR", TaxRegime::SmallProducer),
    ("REGIMEN DEL PEQUENO PRODUCTOR", TaxRegime::SmallProducer),
    ("MEDIANO PRODUCTOR", TaxRegime::MediumProducer),
    ("REGIMEN DEL MEDIANO PRODUCTOR", TaxRegime::MediumProducer),
    ("CONTABLE", TaxRegime::Accounting),
    ("REGIMEN CONTABLE", TaxRegime::Accounting),
];

static PAYMENT_METHOD_LABELS: &[(&str, PaymentMethod)] = &[
    ("EFECTIVO", PaymentMethod::Cash),
    ("CASH", PaymentMethod::Cash),
    ("CHEQUE", PaymentMethod::Cheque),
    ("TARJETA DE CREDITO", PaymentMethod::CreditCard),
    ("CREDIT CARD", PaymentMethod::CreditCard),
    ("TARJETA DE DEBITO", PaymentMethod::DebitCard),
    ("DEBIT CARD", PaymentMethod::DebitCard),
    ("TRANSFERENCIA", PaymentMethod::Transfer),
    ("TRANSFERENCIA BANCARIA", PaymentMethod::Transfer),
    ("TRANSFER", PaymentMethod::Transfer),
    ("BANK TRANSFER", PaymentMethod::Transfer),
    ("GIRO", PaymentMethod::Giro),
    ("BILLETERA ELECTRONICA", PaymentMethod::EWallet),
    ("BILLETERA", PaymentMethod::EWallet),
    ("PAGO ELECTRONICO", PaymentMethod::ElectronicPayment),
    ("OTRO", PaymentMethod::Other),
];

static CURRENCY_LABELS: &[(&str, Currency)] = &[
    ("GUARANI", Currency::Pyg),
    ("GUARANIES", Currency::Pyg),
    ("GS", Currency::Pyg),
    ("DOLAR", Currency::Usd),
    ("DOLARES", Currency::Usd),
    ("US DOLLAR", Currency::Usd),
    ("EURO", Currency::Eur),
    ("EUROS", Currency::Eur),
    ("REAL", Currency::Brl),
    ("REALES", Currency::Brl),
    ("PESO ARGENTINO", Currency::Ars),
];

/// cUniMed → dDesUniMed, for the units this issuer sells in.
static UNITS: &[(u16, &str)] = &[(77, "UNI"), (83, "kg")];

static UNIT_LABELS: &[(&str, u16)] = &[
    ("UNIDAD", 77),
    ("UNIDADES", 77),
    ("UNIT", 77),
    ("KILOGRAMO", 83),
    ("KILOGRAMOS", 83),
];

/// Fold a label for catalog comparison: uppercase, strip Spanish diacritics
/// (Ñ becomes N), collapse whitespace.
pub fn normalize_label(input: &str) -> String {
    let folded: String = input
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' | 'Á' | 'À' | 'Ä' | 'Â' => 'A',
            'é' | 'è' | 'ë' | 'ê' | 'É' | 'È' | 'Ë' | 'Ê' => 'E',
            'í' | 'ì' | 'ï' | 'î' | 'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
            'ó' | 'ò' | 'ö' | 'ô' | 'Ó' | 'Ò' | 'Ö' | 'Ô' => 'O',
            'ú' | 'ù' | 'ü' | 'û' | 'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
            'ñ' | 'Ñ' => 'N',
            'ç' | 'Ç' => 'C',
            other => other.to_ascii_uppercase(),
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn lookup<T: Copy>(
    catalog: &'static str,
    labels: &[(&str, T)],
    input: &str,
    by_code: impl Fn(u16) -> Option<T>,
) -> Result<T, SifenError> {
    let key = normalize_label(input);
    if key.is_empty() {
        return Err(SifenError::unknown(catalog, input));
    }
    if let Ok(code) = key.parse::<u16>() {
        return by_code(code).ok_or_else(|| SifenError::unknown(catalog, input));
    }
    labels
        .iter()
        .find(|(label, _)| normalize_label(label) == key)
        .map(|(_, value)| *value)
        .ok_or_else(|| SifenError::unknown(catalog, input))
}

/// Resolve a department name (or code) to its catalog entry.
pub fn resolve_department(input: &str) -> Result<Department, SifenError> {
    let by_code = |code: u16| DEPARTMENTS.iter().find(|d| u16::from(d.code) == code).copied();
    let key = normalize_label(input);
    if let Some(d) = DEPARTMENTS.iter().find(|d| d.name == key) {
        return Ok(*d);
    }
    let aliases: Vec<(&str, Department)> = DEPARTMENT_ALIASES
        .iter()
        .filter_map(|(alias, code)| by_code(u16::from(*code)).map(|d| (*alias, d)))
        .collect();
    lookup("department", &aliases, input, by_code)
}

/// Resolve a city within `department`. The same city name in another
/// department is not a match.
pub fn resolve_city(department: Department, input: &str) -> Result<City, SifenError> {
    let in_department = |c: &&City| c.department == department.code;
    let key = normalize_label(input);
    if let Some(c) = CITIES
        .iter()
        .filter(in_department)
        .find(|c| normalize_label(c.name) == key)
    {
        return Ok(*c);
    }
    let by_code = |code: u16| {
        CITIES
            .iter()
            .filter(in_department)
            .find(|c| c.code == code)
            .copied()
    };
    let aliases: Vec<(&str, City)> = CITY_ALIASES
        .iter()
        .filter(|(dep, _, _)| *dep == department.code)
        .filter_map(|(_, alias, code)| by_code(*code).map(|c| (*alias, c)))
        .collect();
    lookup("city", &aliases, input, by_code)
}

pub fn resolve_document_type(input: &str) -> Result<DocumentType, SifenError> {
    lookup("document type", DOCUMENT_TYPE_LABELS, input, |code| {
        u8::try_from(code).ok().and_then(DocumentType::from_code)
    })
}

pub fn resolve_tax_affectation(input: &str) -> Result<TaxAffectation, SifenError> {
    lookup("tax affectation", TAX_AFFECTATION_LABELS, input, |code| {
        u8::try_from(code).ok().and_then(TaxAffectation::from_code)
    })
}

pub fn resolve_identity_document(input: &str) -> Result<IdentityDocument, SifenError> {
    lookup("identity document", IDENTITY_DOCUMENT_LABELS, input, |code| {
        IdentityDocument::ALL
            .into_iter()
            .find(|d| u16::from(d.code()) == code)
    })
}

pub fn resolve_tax_regime(input: &str) -> Result<TaxRegime, SifenError> {
    lookup("tax regime", TAX_REGIME_LABELS, input, |code| {
        TaxRegime::ALL.into_iter().find(|r| u16::from(r.code()) == code)
    })
}

pub fn resolve_payment_method(input: &str) -> Result<PaymentMethod, SifenError> {
    lookup("payment method", PAYMENT_METHOD_LABELS, input, |code| {
        PaymentMethod::ALL
            .into_iter()
            .find(|m| u16::from(m.code()) == code)
    })
}

/// Short description of a unit of measure code, if known.
pub fn unit_description(code: u16) -> Option<&'static str> {
    UNITS.iter().find(|(c, _)| *c == code).map(|(_, d)| *d)
}

/// Resolve a unit of measure by code, abbreviation or name.
pub fn resolve_unit(input: &str) -> Result<u16, SifenError> {
    let key = normalize_label(input);
    if let Some((code, _)) = UNITS.iter().find(|(_, d)| normalize_label(d) == key) {
        return Ok(*code);
    }
    lookup("unit of measure", UNIT_LABELS, input, |code| {
        unit_description(code).map(|_| code)
    })
}

/// Resolve a currency by ISO code or common name.
pub fn resolve_currency(input: &str) -> Result<Currency, SifenError> {
    let key = normalize_label(input);
    if let Some(c) = Currency::ALL.into_iter().find(|c| c.code() == key) {
        return Ok(c);
    }
    lookup("currency", CURRENCY_LABELS, input, |_| None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn departments_fold_case_and_accents() {
        assert_eq!(resolve_department("Central").unwrap().code, 12);
        assert_eq!(resolve_department("  alto   paraná ").unwrap().code, 11);
        assert_eq!(resolve_department("Ñeembucú").unwrap().code, 13);
        assert_eq!(resolve_department("Asunción").unwrap().code, 1);
        assert_eq!(resolve_department("12").unwrap().name, "CENTRAL");
    }

    #[test]
    fn unknown_department_is_an_error() {
        let err = resolve_department("Atlantis").unwrap_err();
        assert!(matches!(
            err,
            SifenError::UnknownCatalogValue { catalog: "department", ref value } if value == "Atlantis"
        ));
        assert!(resolve_department("").is_err());
        assert!(resolve_department("99").is_err());
    }

    #[test]
    fn city_must_belong_to_department() {
        let central = resolve_department("Central").unwrap();
        let alto_parana = resolve_department("Alto Parana").unwrap();
        assert_eq!(resolve_city(central, "San Lorenzo").unwrap().code, 6181);
        assert_eq!(resolve_city(alto_parana, "Ciudad del Este").unwrap().code, 3432);
        assert!(resolve_city(alto_parana, "San Lorenzo").is_err());
        assert!(resolve_city(central, "3432").is_err());
    }

    #[test]
    fn lookups_are_deterministic() {
        let a = resolve_city(resolve_department("CAPITAL").unwrap(), "asuncion").unwrap();
        let b = resolve_city(resolve_department("capital").unwrap(), "ASUNCIÓN").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.code, 1);
    }

    #[test]
    fn tax_affectation_labels() {
        assert_eq!(resolve_tax_affectation("Gravado IVA").unwrap(), TaxAffectation::Taxed);
        assert_eq!(resolve_tax_affectation("exento").unwrap(), TaxAffectation::Exempt);
        assert_eq!(resolve_tax_affectation("4").unwrap(), TaxAffectation::PartiallyTaxed);
        assert!(resolve_tax_affectation("zero rated").is_err());
        assert!(resolve_tax_affectation("5").is_err());
    }

    #[test]
    fn document_and_identity_labels() {
        assert_eq!(resolve_document_type("Factura electrónica").unwrap(), DocumentType::Invoice);
        assert_eq!(resolve_document_type("nota de crédito").unwrap(), DocumentType::CreditNote);
        assert_eq!(resolve_identity_document("Cédula").unwrap(), IdentityDocument::NationalId);
        assert_eq!(resolve_identity_document("9").unwrap(), IdentityDocument::Other);
        assert!(resolve_identity_document("licencia").is_err());
    }

    #[test]
    fn currencies() {
        assert_eq!(resolve_currency("usd").unwrap(), Currency::Usd);
        assert_eq!(resolve_currency("Guaraníes").unwrap(), Currency::Pyg);
        assert!(resolve_currency("JPY").is_err());
    }

    #[test]
    fn serde_uses_codes() {
        let central = resolve_department("Central").unwrap();
        assert_eq!(serde_json::to_string(&central).unwrap(), "12");
        let back: Department = serde_json::from_str("12").unwrap();
        assert_eq!(back, central);
        assert!(serde_json::from_str::<Department>("42").is_err());

        let san_lorenzo = resolve_city(central, "San Lorenzo").unwrap();
        let json = serde_json::to_string(&san_lorenzo).unwrap();
        assert_eq!(json, "6181");
        let back: City = serde_json::from_reader(json.as_bytes()).unwrap();
        assert_eq!(back, san_lorenzo);
        assert!(serde_json::from_str::<City>("1").is_err());
    }

    #[test]
    fn units() {
        assert_eq!(resolve_unit("Unidad").unwrap(), 77);
        assert_eq!(resolve_unit("UNI").unwrap(), 77);
        assert_eq!(resolve_unit("KG").unwrap(), 83);
        assert_eq!(unit_description(77), Some("UNI"));
        assert!(resolve_unit("fathom").is_err());
        assert!(resolve_unit("12").is_err());
    }

    #[test]
    fn city_codes_are_unique() {
        for (i, a) in CITIES.iter().enumerate() {
            for b in &CITIES[i + 1..] {
                assert_ne!(a.code, b.code, "duplicate city code {}", a.code);
            }
        }
    }
}
