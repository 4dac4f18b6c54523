//! Invoice line model for invoicing-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::services::calculator;
use service_core::error::field_error;

/// Line on an invoice. The three amounts are always derived from quantity,
/// unit price and tax rate when the line is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct InvoiceLine {
    pub line_id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub net_amount: Decimal,
    pub tax_amount: Decimal,
    pub gross_amount: Decimal,
    pub position: i32,
    pub created_utc: DateTime<Utc>,
}

impl InvoiceLine {
    pub fn amounts(&self) -> LineAmounts {
        LineAmounts {
            net: self.net_amount,
            tax: self.tax_amount,
            gross: self.gross_amount,
        }
    }

    /// Overwrites the caller-controlled fields and the derived amounts.
    pub fn rewrite(&mut self, input: &LineInput, amounts: LineAmounts) {
        self.description = input.description.trim().to_string();
        self.quantity = input.quantity;
        self.unit_price = input.unit_price;
        self.tax_rate = input.tax_rate;
        self.net_amount = amounts.net;
        self.tax_amount = amounts.tax;
        self.gross_amount = amounts.gross;
    }
}

/// Derived monetary amounts of one line, rounded to cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LineAmounts {
    pub net: Decimal,
    pub tax: Decimal,
    pub gross: Decimal,
}

/// Caller-supplied line specification.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LineInput {
    #[validate(custom(function = "validate_description"))]
    pub description: String,
    #[validate(custom(function = "validate_quantity"))]
    pub quantity: Decimal,
    #[validate(custom(function = "validate_unit_price"))]
    pub unit_price: Decimal,
    #[validate(custom(function = "validate_tax_rate"))]
    pub tax_rate: Decimal,
}

/// A complete replacement line set.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LineSet {
    #[validate(
        length(min = 1, message = "At least one invoice line is required"),
        nested
    )]
    pub lines: Vec<LineInput>,
}

/// Maximum length of a line description, in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

fn validate_description(description: &str) -> Result<(), ValidationError> {
    let description = description.trim();
    if description.is_empty() {
        return Err(field_error("required", "Line description is required"));
    }
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(field_error(
            "length",
            "Line description cannot exceed 500 characters",
        ));
    }
    Ok(())
}

fn validate_quantity(quantity: &Decimal) -> Result<(), ValidationError> {
    calculator::check_quantity(*quantity).map_err(Into::into)
}

fn validate_unit_price(unit_price: &Decimal) -> Result<(), ValidationError> {
    calculator::check_unit_price(*unit_price).map_err(Into::into)
}

fn validate_tax_rate(tax_rate: &Decimal) -> Result<(), ValidationError> {
    calculator::check_tax_rate(*tax_rate).map_err(Into::into)
}
