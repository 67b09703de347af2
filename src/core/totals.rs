use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use super::builder::MAX_ITEMS;
use super::error::ValidationError;
use super::types::*;

/// Decimal places kept for per-line tax values (dBasGravIVA, dLiqIVAItem).
pub const LINE_TAX_PRECISION: u32 = 8;

/// dCantProSer: at most 10 integer digits.
pub const MAX_QUANTITY: Decimal = dec!(9999999999);

/// dTotBruOpeItem: at most 15 integer digits.
pub const MAX_LINE_TOTAL: Decimal = dec!(999999999999999);

/// dTiCam: at most 5 integer digits.
pub const MAX_EXCHANGE_RATE: Decimal = dec!(99999);

/// Round a Decimal to `dp` decimal places using half-up (commercial rounding).
pub fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Check that amounts fit the DE field widths.
///
/// [`calculate_line`] and [`calculate_totals`] rely on these bounds; inputs
/// that pass cannot overflow `Decimal` arithmetic.
pub fn check_ranges(items: &[LineItem], payment: &PaymentInfo) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if items.len() > MAX_ITEMS {
        errors.push(ValidationError::new(
            "items",
            format!("a document cannot have more than {MAX_ITEMS} line items"),
        ));
    }

    let percent = Decimal::ZERO..=dec!(100);
    for (i, item) in items.iter().enumerate() {
        if item.quantity.abs() > MAX_QUANTITY {
            errors.push(ValidationError::new(
                format!("items[{i}].quantity"),
                format!("quantity {} exceeds {MAX_QUANTITY}", item.quantity),
            ));
        }
        let total_fits = item
            .quantity
            .checked_mul(item.unit_price)
            .is_some_and(|total| total.abs() <= MAX_LINE_TOTAL);
        if !total_fits {
            errors.push(ValidationError::new(
                format!("items[{i}].unit_price"),
                format!(
                    "line total of {} x {} exceeds {MAX_LINE_TOTAL}",
                    item.quantity, item.unit_price
                ),
            ));
        }
        if !percent.contains(&item.tax_rate) {
            errors.push(ValidationError::new(
                format!("items[{i}].tax_rate"),
                format!("tax rate {} is not a percentage", item.tax_rate),
            ));
        }
        if !percent.contains(&item.taxed_proportion) {
            errors.push(ValidationError::new(
                format!("items[{i}].taxed_proportion"),
                format!("proportion {} is not a percentage", item.taxed_proportion),
            ));
        }
    }

    if let Some(rate) = payment.exchange_rate.filter(|_| !payment.currency.is_base()) {
        if rate.abs() > MAX_EXCHANGE_RATE {
            errors.push(ValidationError::new(
                "payment.exchange_rate",
                format!("exchange rate {rate} exceeds {MAX_EXCHANGE_RATE}"),
            ));
        }
    }
    errors
}

/// Compute a line's total, tax base, tax and exempt base.
///
/// Prices include IVA. For a line with total `T`, rate `r` and taxed
/// proportion `p` (percent):
///
/// - base = 100·T·p / (10000 + r·p)
/// - tax = base · r / 100
/// - exempt base = 100·T·(100 − p) / (10000 + r·p)
pub fn calculate_line(item: &mut LineItem, currency: Currency) {
    let total = round_half_up(item.quantity * item.unit_price, currency.precision());

    let (tax_base, tax, exempt_base) = if item.affectation.is_taxed() {
        let p = item.taxed_proportion;
        let r = item.tax_rate;
        let divisor = dec!(10000) + r * p;
        let base = round_half_up(dec!(100) * total * p / divisor, LINE_TAX_PRECISION);
        let tax = round_half_up(base * r / dec!(100), LINE_TAX_PRECISION);
        let exempt = if item.affectation == TaxAffectation::PartiallyTaxed {
            round_half_up(
                dec!(100) * total * (dec!(100) - p) / divisor,
                LINE_TAX_PRECISION,
            )
        } else {
            Decimal::ZERO
        };
        (base, tax, exempt)
    } else {
        (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
    };

    item.amounts = LineAmounts {
        total,
        tax_base,
        tax,
        exempt_base,
    };
}

/// Calculate every line and the document totals.
///
/// The grand total is the exact sum of line totals. Subtotals partition it
/// exactly: the taxed share of a partially taxed line is rounded to currency
/// precision and the remainder counts as exempt.
pub fn calculate_totals(items: &mut [LineItem], payment: &PaymentInfo) -> Totals {
    let precision = payment.currency.precision();
    let mut totals = Totals::default();
    let mut tax_5 = Decimal::ZERO;
    let mut tax_10 = Decimal::ZERO;
    let mut base_5 = Decimal::ZERO;
    let mut base_10 = Decimal::ZERO;

    for item in items.iter_mut() {
        calculate_line(item, payment.currency);
        let a = &item.amounts;
        totals.grand_total += a.total;

        match item.affectation {
            TaxAffectation::Exempt => totals.exempt += a.total,
            TaxAffectation::Exonerated => totals.exonerated += a.total,
            TaxAffectation::Taxed | TaxAffectation::PartiallyTaxed => {
                let taxed_share = if item.affectation == TaxAffectation::Taxed {
                    a.total
                } else {
                    round_half_up(a.tax_base + a.tax, precision)
                };
                totals.exempt += a.total - taxed_share;
                if item.tax_rate == dec!(5) {
                    totals.taxed_5 += taxed_share;
                    tax_5 += a.tax;
                    base_5 += a.tax_base;
                } else {
                    totals.taxed_10 += taxed_share;
                    tax_10 += a.tax;
                    base_10 += a.tax_base;
                }
            }
        }
    }

    totals.operation_total = totals.grand_total;
    totals.tax_5 = round_half_up(tax_5, precision);
    totals.tax_10 = round_half_up(tax_10, precision);
    totals.tax_total = totals.tax_5 + totals.tax_10;
    totals.base_5 = round_half_up(base_5, precision);
    totals.base_10 = round_half_up(base_10, precision);
    totals.base_total = totals.base_5 + totals.base_10;
    totals.pyg_total = match (payment.currency.is_base(), payment.exchange_rate) {
        (false, Some(rate)) => Some(round_half_up(totals.grand_total * rate, 0)),
        _ => None,
    };
    totals
}

/// Check the arithmetic of a built document.
///
/// Documents from the builder always pass; this guards the serializer
/// against documents whose public fields were edited after building.
pub fn validate_arithmetic(doc: &InvoiceDocument) -> Vec<ValidationError> {
    let mut errors = check_ranges(&doc.items, &doc.payment);
    if !errors.is_empty() {
        return errors;
    }

    let mut items = doc.items.clone();
    let expected = calculate_totals(&mut items, &doc.payment);

    for (i, (actual, recomputed)) in doc.items.iter().zip(&items).enumerate() {
        if actual.amounts != recomputed.amounts {
            errors.push(ValidationError::new(
                format!("items[{i}].amounts"),
                "line amounts do not match quantity, price and tax classification",
            ));
        }
    }

    let Some(line_sum) = doc
        .items
        .iter()
        .try_fold(Decimal::ZERO, |sum, i| sum.checked_add(i.amounts.total))
    else {
        errors.push(ValidationError::new("items", "sum of line totals is out of range"));
        return errors;
    };
    if doc.totals.grand_total != line_sum {
        errors.push(ValidationError::new(
            "totals.grand_total",
            format!(
                "grand total {} differs from sum of lines {line_sum}",
                doc.totals.grand_total
            ),
        ));
    } else if doc.totals != expected {
        errors.push(ValidationError::new(
            "totals",
            "document totals do not match recalculated totals",
        ));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(qty: Decimal, price: Decimal, affectation: TaxAffectation, rate: Decimal) -> LineItem {
        LineItem {
            code: "X".into(),
            description: "x".into(),
            unit_code: 77,
            quantity: qty,
            unit_price: price,
            affectation,
            taxed_proportion: dec!(100),
            tax_rate: rate,
            amounts: LineAmounts::default(),
        }
    }

    #[test]
    fn ten_percent_included_tax() {
        let mut line = item(dec!(1), dec!(110000), TaxAffectation::Taxed, dec!(10));
        calculate_line(&mut line, Currency::Pyg);
        assert_eq!(line.amounts.total, dec!(110000));
        assert_eq!(line.amounts.tax_base, dec!(100000));
        assert_eq!(line.amounts.tax, dec!(10000));
    }

    #[test]
    fn repeating_decimal_tax_is_kept_at_eight_places() {
        let mut line = item(dec!(1), dec!(100000), TaxAffectation::Taxed, dec!(10));
        calculate_line(&mut line, Currency::Pyg);
        assert_eq!(line.amounts.tax_base, dec!(90909.09090909));
        assert_eq!(line.amounts.tax, dec!(9090.90909091));
    }

    #[test]
    fn five_percent() {
        let mut line = item(dec!(2), dec!(52500), TaxAffectation::Taxed, dec!(5));
        calculate_line(&mut line, Currency::Pyg);
        assert_eq!(line.amounts.total, dec!(105000));
        assert_eq!(line.amounts.tax_base, dec!(100000));
        assert_eq!(line.amounts.tax, dec!(5000));
    }

    #[test]
    fn partially_taxed_splits_exactly() {
        let mut items = vec![LineItem {
            taxed_proportion: dec!(30),
            ..item(dec!(1), dec!(100000), TaxAffectation::PartiallyTaxed, dec!(10))
        }];
        let totals = calculate_totals(&mut items, &PaymentInfo::default());
        let a = &items[0].amounts;
        // 100·100000·30 / (10000 + 300) = 29126.21359223…
        assert_eq!(a.tax_base, dec!(29126.21359223));
        assert_eq!(a.exempt_base, dec!(67961.16504854));
        assert_eq!(totals.grand_total, dec!(100000));
        assert_eq!(
            totals.exempt + totals.taxed_10,
            totals.grand_total,
            "subtotals must partition the grand total"
        );
    }

    #[test]
    fn exempt_and_exonerated_carry_no_tax() {
        let mut items = vec![
            item(dec!(3), dec!(1000), TaxAffectation::Exempt, dec!(0)),
            item(dec!(1), dec!(500), TaxAffectation::Exonerated, dec!(0)),
        ];
        let totals = calculate_totals(&mut items, &PaymentInfo::default());
        assert_eq!(totals.exempt, dec!(3000));
        assert_eq!(totals.exonerated, dec!(500));
        assert_eq!(totals.tax_total, dec!(0));
        assert_eq!(totals.grand_total, dec!(3500));
    }

    #[test]
    fn foreign_currency_pyg_equivalent() {
        let payment = PaymentInfo {
            currency: Currency::Usd,
            exchange_rate: Some(dec!(7312.55)),
            ..PaymentInfo::default()
        };
        let mut items = vec![item(dec!(3), dec!(33.33), TaxAffectation::Taxed, dec!(10))];
        let totals = calculate_totals(&mut items, &payment);
        assert_eq!(totals.grand_total, dec!(99.99));
        // 99.99 × 7312.55 = 731181.8745
        assert_eq!(totals.pyg_total, Some(dec!(731182)));
        assert_eq!(totals.tax_10, dec!(9.09));
    }

    #[test]
    fn out_of_range_amounts_are_reported() {
        let items = vec![
            item(dec!(1), dec!(10000000000000000000000000), TaxAffectation::Taxed, dec!(10)),
            item(dec!(10000000000), dec!(1), TaxAffectation::Exempt, dec!(0)),
            item(dec!(1), dec!(1000), TaxAffectation::Taxed, dec!(-100)),
        ];
        let payment = PaymentInfo {
            currency: Currency::Usd,
            exchange_rate: Some(dec!(100000)),
            ..PaymentInfo::default()
        };
        let fields: Vec<String> = check_ranges(&items, &payment)
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(
            fields,
            [
                "items[0].unit_price",
                "items[1].quantity",
                "items[2].tax_rate",
                "payment.exchange_rate",
            ]
        );
    }

    #[test]
    fn largest_accepted_amounts_compute() {
        let mut items = vec![item(dec!(1), MAX_LINE_TOTAL, TaxAffectation::Taxed, dec!(10)); MAX_ITEMS];
        let payment = PaymentInfo {
            currency: Currency::Usd,
            exchange_rate: Some(MAX_EXCHANGE_RATE),
            ..PaymentInfo::default()
        };
        assert!(check_ranges(&items, &payment).is_empty());
        let totals = calculate_totals(&mut items, &payment);
        assert_eq!(totals.grand_total, MAX_LINE_TOTAL * Decimal::from(MAX_ITEMS as u64));
        assert!(totals.pyg_total.is_some());
    }

    #[test]
    fn line_totals_round_half_up_in_pyg() {
        let mut line = item(dec!(1.5), dec!(333), TaxAffectation::Taxed, dec!(10));
        calculate_line(&mut line, Currency::Pyg);
        assert_eq!(line.amounts.total, dec!(500));
    }
}
