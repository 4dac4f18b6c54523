//! Keeps invoice totals equal to the sum of the invoice's line amounts.
//!
//! Nothing here commits. Callers run these inside their own transaction and
//! drop it on error, so a half-applied line set is never visible.

use super::calculator::{self, InvalidLineInput};
use super::store::StoreTransaction;
use crate::models::{Invoice, InvoiceLine, InvoiceTotals, LineAmounts, LineInput};
use chrono::Utc;
use service_core::error::AppError;
use std::collections::BTreeMap;
use tracing::{debug, instrument};
use uuid::Uuid;
use validator::{ValidationErrors, ValidationErrorsKind};

/// Coordinate-wise sum of line amounts.
///
/// Fails with a validation error on `lines` when a total no longer fits the
/// invoice's amount columns.
pub fn sum_totals(lines: &[InvoiceLine]) -> Result<InvoiceTotals, AppError> {
    lines
        .iter()
        .map(InvoiceLine::amounts)
        .try_fold(InvoiceTotals::default(), |acc, a| {
            Some(InvoiceTotals {
                net: acc.net.checked_add(a.net)?,
                tax: acc.tax.checked_add(a.tax)?,
                gross: acc.gross.checked_add(a.gross)?,
            })
        })
        .filter(|totals| {
            [totals.net, totals.tax, totals.gross]
                .into_iter()
                .all(calculator::amount_in_range)
        })
        .ok_or_else(|| {
            AppError::invalid_field(
                "lines",
                "total_range",
                "Invoice total exceeds 999999999999.99",
            )
        })
}

/// Prices one line, reporting a rejection against the line's own field.
pub fn price_single_line(input: &LineInput) -> Result<LineAmounts, AppError> {
    calculator::price_line(input).map_err(|err| {
        let mut errors = ValidationErrors::new();
        errors.add(err.field(), err.into());
        AppError::ValidationError(errors)
    })
}

/// Prices a whole line set, collecting every rejection under `lines[i]`.
pub fn price_line_set(lines: &[LineInput]) -> Result<Vec<LineAmounts>, AppError> {
    let mut rejected: BTreeMap<usize, Box<ValidationErrors>> = BTreeMap::new();
    let mut priced = Vec::with_capacity(lines.len());

    for (index, input) in lines.iter().enumerate() {
        match calculator::price_line(input) {
            Ok(amounts) => priced.push(amounts),
            Err(err) => {
                rejected.insert(index, Box::new(line_errors(err)));
            }
        }
    }

    if rejected.is_empty() {
        return Ok(priced);
    }
    let mut errors = ValidationErrors::new();
    errors
        .errors_mut()
        .insert("lines", ValidationErrorsKind::List(rejected));
    Err(AppError::ValidationError(errors))
}

fn line_errors(err: InvalidLineInput) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.add(err.field(), err.into());
    errors
}

/// Replaces every line of `invoice` with `inputs` and stores the new totals.
///
/// All lines are priced and summed before anything is written.
#[instrument(skip(tx, invoice, inputs), fields(invoice_id = %invoice.invoice_id, lines = inputs.len()))]
pub async fn apply_line_set(
    tx: &mut dyn StoreTransaction,
    invoice: &mut Invoice,
    inputs: &[LineInput],
) -> Result<Vec<InvoiceLine>, AppError> {
    if inputs.is_empty() {
        return Err(AppError::invalid_field(
            "lines",
            "length",
            "At least one invoice line is required",
        ));
    }
    let priced = price_line_set(inputs)?;

    let now = Utc::now();
    let lines: Vec<InvoiceLine> = inputs
        .iter()
        .zip(priced)
        .enumerate()
        .map(|(position, (input, amounts))| {
            new_line(invoice.invoice_id, input, amounts, position as i32, now)
        })
        .collect();
    let totals = sum_totals(&lines)?;

    let removed = tx.delete_lines(invoice.invoice_id).await?;
    for line in &lines {
        tx.insert_line(line).await?;
    }

    invoice.set_totals(totals);
    tx.update_invoice(invoice).await?;

    debug!(removed, inserted = lines.len(), "Line set applied");
    Ok(lines)
}

/// Re-derives the totals from the lines currently stored for `invoice`.
#[instrument(skip(tx, invoice), fields(invoice_id = %invoice.invoice_id))]
pub async fn recompute_totals(
    tx: &mut dyn StoreTransaction,
    invoice: &mut Invoice,
) -> Result<Vec<InvoiceLine>, AppError> {
    let lines = tx.get_lines(invoice.invoice_id).await?;
    invoice.set_totals(sum_totals(&lines)?);
    tx.update_invoice(invoice).await?;
    Ok(lines)
}

pub fn new_line(
    invoice_id: Uuid,
    input: &LineInput,
    amounts: LineAmounts,
    position: i32,
    created_utc: chrono::DateTime<Utc>,
) -> InvoiceLine {
    InvoiceLine {
        line_id: Uuid::new_v4(),
        invoice_id,
        description: input.description.trim().to_string(),
        quantity: input.quantity,
        unit_price: input.unit_price,
        tax_rate: input.tax_rate,
        net_amount: amounts.net,
        tax_amount: amounts.tax,
        gross_amount: amounts.gross,
        position,
        created_utc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Client;
    use crate::services::memory::MemoryStore;
    use crate::services::store::InvoiceStore;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn input(quantity: Decimal, unit_price: Decimal, tax_rate: Decimal) -> LineInput {
        LineInput {
            description: "Item".to_string(),
            quantity,
            unit_price,
            tax_rate,
        }
    }

    async fn seeded(store: &MemoryStore) -> Invoice {
        let client = Client {
            client_id: Uuid::new_v4(),
            name: "Acme".into(),
            email: "a@acme.test".into(),
            tax_id: None,
            creation_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            created_utc: Utc::now(),
        };
        let invoice = Invoice::new(
            client.client_id,
            "FAC-202401-0001".into(),
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
        );
        let mut tx = store.begin().await.unwrap();
        tx.insert_client(&client).await.unwrap();
        tx.insert_invoice(&invoice).await.unwrap();
        tx.commit().await.unwrap();
        invoice
    }

    #[tokio::test]
    async fn applies_line_set_and_sums_totals() {
        let store = MemoryStore::new();
        let mut invoice = seeded(&store).await;

        let mut tx = store.begin().await.unwrap();
        let lines = apply_line_set(
            tx.as_mut(),
            &mut invoice,
            &[
                input(dec!(10), dec!(500.00), dec!(20)),
                input(dec!(2), dec!(800.00), dec!(20)),
            ],
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].position, 1);
        assert_eq!(
            invoice.totals(),
            InvoiceTotals {
                net: dec!(6600.00),
                tax: dec!(1320.00),
                gross: dec!(7920.00),
            }
        );

        let mut tx = store.begin().await.unwrap();
        let stored = tx.get_invoice(invoice.invoice_id).await.unwrap().unwrap();
        assert_eq!(stored.totals(), invoice.totals());
    }

    #[tokio::test]
    async fn replacing_discards_previous_lines() {
        let store = MemoryStore::new();
        let mut invoice = seeded(&store).await;

        let mut tx = store.begin().await.unwrap();
        apply_line_set(tx.as_mut(), &mut invoice, &[input(dec!(1), dec!(1), dec!(0))])
            .await
            .unwrap();
        apply_line_set(tx.as_mut(), &mut invoice, &[input(dec!(3), dec!(2), dec!(10))])
            .await
            .unwrap();

        let lines = tx.get_lines(invoice.invoice_id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(invoice.gross_total, dec!(6.60));
    }

    #[tokio::test]
    async fn rejected_line_writes_nothing() {
        let store = MemoryStore::new();
        let mut invoice = seeded(&store).await;

        let mut tx = store.begin().await.unwrap();
        apply_line_set(tx.as_mut(), &mut invoice, &[input(dec!(1), dec!(5), dec!(0))])
            .await
            .unwrap();

        let err = apply_line_set(
            tx.as_mut(),
            &mut invoice,
            &[input(dec!(1), dec!(1), dec!(0)), input(dec!(0), dec!(1), dec!(0))],
        )
        .await
        .unwrap_err();

        let AppError::ValidationError(errors) = err else {
            panic!("expected validation error");
        };
        let json = serde_json::to_value(&errors).unwrap();
        assert!(json["lines"]["1"]["quantity"].is_array());
        assert_eq!(tx.get_lines(invoice.invoice_id).await.unwrap().len(), 1);
        assert_eq!(invoice.gross_total, dec!(5.00));
    }

    #[tokio::test]
    async fn recompute_reads_persisted_lines() {
        let store = MemoryStore::new();
        let mut invoice = seeded(&store).await;

        let mut tx = store.begin().await.unwrap();
        let lines = apply_line_set(
            tx.as_mut(),
            &mut invoice,
            &[input(dec!(1), dec!(10), dec!(20)), input(dec!(1), dec!(5), dec!(0))],
        )
        .await
        .unwrap();

        tx.delete_line(lines[0].line_id).await.unwrap();
        recompute_totals(tx.as_mut(), &mut invoice).await.unwrap();

        assert_eq!(
            invoice.totals(),
            InvoiceTotals {
                net: dec!(5.00),
                tax: dec!(0.00),
                gross: dec!(5.00),
            }
        );
    }

    #[test]
    fn sum_of_no_lines_is_zero() {
        assert_eq!(sum_totals(&[]).unwrap(), InvoiceTotals::default());
    }

    #[tokio::test]
    async fn total_beyond_amount_columns_is_rejected() {
        let store = MemoryStore::new();
        let mut invoice = seeded(&store).await;

        let mut tx = store.begin().await.unwrap();
        let err = apply_line_set(
            tx.as_mut(),
            &mut invoice,
            &[
                input(dec!(1000), dec!(600000000), dec!(0)),
                input(dec!(1000), dec!(600000000), dec!(0)),
            ],
        )
        .await
        .unwrap_err();

        let AppError::ValidationError(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.field_errors().contains_key("lines"));
        assert_eq!(invoice.gross_total, Decimal::ZERO);
    }
}
