//! Line amount computation.
//!
//! Every monetary result is rounded to cents, half away from zero. Tax is
//! derived from the rounded net amount, gross from the rounded net and tax.
//!
//! Inputs and amounts are bounded by the persisted column types:
//! NUMERIC(14,4) for quantity and unit price, NUMERIC(5,2) for the tax rate
//! and NUMERIC(14,2) for amounts. Anything outside those bounds is rejected
//! here so every store keeps exactly what was priced.

use crate::models::{LineAmounts, LineInput};
use rust_decimal::{Decimal, RoundingStrategy};
use service_core::error::field_error;
use thiserror::Error;
use validator::ValidationError;

const CENTS: u32 = 2;

/// Decimal places accepted for quantity and unit price.
pub const INPUT_SCALE: u32 = 4;

/// Decimal places accepted for the tax rate.
pub const TAX_RATE_SCALE: u32 = 2;

/// Integer digits accepted for quantity and unit price.
const INPUT_INTEGER_DIGITS: u32 = 10;

/// Integer digits of a line amount or an invoice total.
const AMOUNT_INTEGER_DIGITS: u32 = 12;

/// A line input the calculator refuses to price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidLineInput {
    #[error("Quantity must be greater than zero and below 10000000000")]
    Quantity,
    #[error("Quantity allows at most 4 decimal places")]
    QuantityScale,
    #[error("Unit price must be at least zero and below 10000000000")]
    UnitPrice,
    #[error("Unit price allows at most 4 decimal places")]
    UnitPriceScale,
    #[error("Tax rate must be between 0 and 100")]
    TaxRate,
    #[error("Tax rate allows at most 2 decimal places")]
    TaxRateScale,
    #[error("Line amount exceeds 999999999999.99")]
    Amount,
}

impl InvalidLineInput {
    /// Name of the offending field on [`LineInput`].
    pub fn field(&self) -> &'static str {
        match self {
            InvalidLineInput::Quantity | InvalidLineInput::QuantityScale => "quantity",
            InvalidLineInput::UnitPrice
            | InvalidLineInput::UnitPriceScale
            | InvalidLineInput::Amount => "unit_price",
            InvalidLineInput::TaxRate | InvalidLineInput::TaxRateScale => "tax_rate",
        }
    }

    fn code(&self) -> &'static str {
        match self {
            InvalidLineInput::Quantity | InvalidLineInput::UnitPrice => "range",
            InvalidLineInput::TaxRate => "tax_rate_range",
            InvalidLineInput::QuantityScale
            | InvalidLineInput::UnitPriceScale
            | InvalidLineInput::TaxRateScale => "scale",
            InvalidLineInput::Amount => "amount_range",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            InvalidLineInput::Quantity => "Quantity must be greater than zero and below 10000000000",
            InvalidLineInput::QuantityScale => "Quantity allows at most 4 decimal places",
            InvalidLineInput::UnitPrice => "Unit price must be at least zero and below 10000000000",
            InvalidLineInput::UnitPriceScale => "Unit price allows at most 4 decimal places",
            InvalidLineInput::TaxRate => "Tax rate must be between 0 and 100",
            InvalidLineInput::TaxRateScale => "Tax rate allows at most 2 decimal places",
            InvalidLineInput::Amount => "Line amount exceeds 999999999999.99",
        }
    }
}

impl From<InvalidLineInput> for ValidationError {
    fn from(err: InvalidLineInput) -> Self {
        field_error(err.code(), err.message())
    }
}

/// `10^digits`, the exclusive upper bound of a value with `digits` integer digits.
fn digits_bound(digits: u32) -> Decimal {
    Decimal::from(10_i64.pow(digits))
}

/// Decimal places once trailing zeros are dropped, so `1.50000` counts as 1.
fn significant_scale(value: Decimal) -> u32 {
    value.normalize().scale()
}

pub fn check_quantity(quantity: Decimal) -> Result<(), InvalidLineInput> {
    if quantity <= Decimal::ZERO || quantity >= digits_bound(INPUT_INTEGER_DIGITS) {
        return Err(InvalidLineInput::Quantity);
    }
    if significant_scale(quantity) > INPUT_SCALE {
        return Err(InvalidLineInput::QuantityScale);
    }
    Ok(())
}

pub fn check_unit_price(unit_price: Decimal) -> Result<(), InvalidLineInput> {
    if unit_price < Decimal::ZERO || unit_price >= digits_bound(INPUT_INTEGER_DIGITS) {
        return Err(InvalidLineInput::UnitPrice);
    }
    if significant_scale(unit_price) > INPUT_SCALE {
        return Err(InvalidLineInput::UnitPriceScale);
    }
    Ok(())
}

pub fn check_tax_rate(tax_rate: Decimal) -> Result<(), InvalidLineInput> {
    if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE_HUNDRED {
        return Err(InvalidLineInput::TaxRate);
    }
    if significant_scale(tax_rate) > TAX_RATE_SCALE {
        return Err(InvalidLineInput::TaxRateScale);
    }
    Ok(())
}

/// Whether `amount` fits a NUMERIC(14,2) column.
pub fn amount_in_range(amount: Decimal) -> bool {
    amount.abs() < digits_bound(AMOUNT_INTEGER_DIGITS)
}

fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CENTS, RoundingStrategy::MidpointAwayFromZero)
}

/// Prices one line. Pure; the same inputs always give the same amounts.
pub fn compute_line_amounts(
    quantity: Decimal,
    unit_price: Decimal,
    tax_rate: Decimal,
) -> Result<LineAmounts, InvalidLineInput> {
    check_quantity(quantity)?;
    check_unit_price(unit_price)?;
    check_tax_rate(tax_rate)?;

    let net = quantity
        .checked_mul(unit_price)
        .map(round_cents)
        .ok_or(InvalidLineInput::Amount)?;
    let tax = net
        .checked_mul(tax_rate)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .map(round_cents)
        .ok_or(InvalidLineInput::Amount)?;
    let gross = net
        .checked_add(tax)
        .map(round_cents)
        .ok_or(InvalidLineInput::Amount)?;

    if !amount_in_range(gross) {
        return Err(InvalidLineInput::Amount);
    }

    Ok(LineAmounts { net, tax, gross })
}

/// Prices a caller-supplied line.
pub fn price_line(input: &LineInput) -> Result<LineAmounts, InvalidLineInput> {
    compute_line_amounts(input.quantity, input.unit_price, input.tax_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amounts(q: Decimal, p: Decimal, t: Decimal) -> (Decimal, Decimal, Decimal) {
        let a = compute_line_amounts(q, p, t).unwrap();
        (a.net, a.tax, a.gross)
    }

    #[test]
    fn prices_standard_lines() {
        assert_eq!(
            amounts(dec!(10), dec!(500.00), dec!(20)),
            (dec!(5000.00), dec!(1000.00), dec!(6000.00))
        );
        assert_eq!(
            amounts(dec!(2), dec!(800.00), dec!(20)),
            (dec!(1600.00), dec!(320.00), dec!(1920.00))
        );
    }

    #[test]
    fn rounds_half_up_at_each_step() {
        // 3 x 3.335 = 10.005 -> 10.01; 10.01 x 5.5% = 0.55055 -> 0.55
        assert_eq!(
            amounts(dec!(3), dec!(3.335), dec!(5.5)),
            (dec!(10.01), dec!(0.55), dec!(10.56))
        );
        // 0.5 x 0.05 = 0.025 -> 0.03
        assert_eq!(amounts(dec!(0.5), dec!(0.05), dec!(0)).0, dec!(0.03));
    }

    #[test]
    fn tax_is_derived_from_rounded_net() {
        // net 1.005 -> 1.01; 1.01 x 50% = 0.505 -> 0.51
        assert_eq!(
            amounts(dec!(1), dec!(1.005), dec!(50)),
            (dec!(1.01), dec!(0.51), dec!(1.52))
        );
    }

    #[test]
    fn boundary_rates_and_free_lines() {
        assert_eq!(
            amounts(dec!(1), dec!(0), dec!(100)),
            (dec!(0.00), dec!(0.00), dec!(0.00))
        );
        assert_eq!(
            amounts(dec!(1), dec!(10), dec!(100)),
            (dec!(10.00), dec!(10.00), dec!(20.00))
        );
        assert_eq!(
            amounts(dec!(1), dec!(10), dec!(0)),
            (dec!(10.00), dec!(0.00), dec!(10.00))
        );
    }

    #[test]
    fn rejects_out_of_range_inputs() {
        assert_eq!(
            compute_line_amounts(dec!(0), dec!(1), dec!(1)),
            Err(InvalidLineInput::Quantity)
        );
        assert_eq!(
            compute_line_amounts(dec!(1), dec!(-0.01), dec!(1)),
            Err(InvalidLineInput::UnitPrice)
        );
        assert_eq!(
            compute_line_amounts(dec!(1), dec!(1), dec!(100.01)),
            Err(InvalidLineInput::TaxRate)
        );
        assert_eq!(
            compute_line_amounts(dec!(1), dec!(1), dec!(-1)),
            Err(InvalidLineInput::TaxRate)
        );
    }

    #[test]
    fn rejects_inputs_beyond_column_bounds() {
        assert_eq!(
            compute_line_amounts(dec!(79228162514264337593543950335), dec!(2), dec!(0)),
            Err(InvalidLineInput::Quantity)
        );
        assert_eq!(
            compute_line_amounts(dec!(1), dec!(10000000000), dec!(0)),
            Err(InvalidLineInput::UnitPrice)
        );
        assert!(compute_line_amounts(dec!(9999999999.9999), dec!(0), dec!(0)).is_ok());
    }

    #[test]
    fn rejects_excess_decimal_places() {
        assert_eq!(
            compute_line_amounts(dec!(0.00001), dec!(1), dec!(0)),
            Err(InvalidLineInput::QuantityScale)
        );
        assert_eq!(
            compute_line_amounts(dec!(1), dec!(1.00005), dec!(0)),
            Err(InvalidLineInput::UnitPriceScale)
        );
        assert_eq!(
            compute_line_amounts(dec!(1), dec!(1), dec!(5.555)),
            Err(InvalidLineInput::TaxRateScale)
        );
        // Trailing zeros are not significant.
        assert!(compute_line_amounts(dec!(1.50000), dec!(2.100000), dec!(5.500)).is_ok());
    }

    #[test]
    fn rejects_line_amount_beyond_cents_column() {
        // Both inputs are in range but the product needs 20 integer digits.
        assert_eq!(
            compute_line_amounts(dec!(9999999999), dec!(9999999999), dec!(0)),
            Err(InvalidLineInput::Amount)
        );
        // Net fits, tax at 100% pushes gross past the bound.
        assert_eq!(
            compute_line_amounts(dec!(1000), dec!(600000000), dec!(100)),
            Err(InvalidLineInput::Amount)
        );
        assert!(compute_line_amounts(dec!(1000), dec!(600000000), dec!(0)).is_ok());
        assert_eq!(InvalidLineInput::Amount.field(), "unit_price");
    }

    #[test]
    fn rejection_names_the_field() {
        assert_eq!(InvalidLineInput::UnitPrice.field(), "unit_price");
        let err: ValidationError = InvalidLineInput::TaxRate.into();
        assert_eq!(err.code, "tax_rate_range");
        assert!(err.message.is_some());
    }
}
