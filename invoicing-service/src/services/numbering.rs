//! Sequential invoice numbers of the form `FAC-YYYYMM-NNNN`.
//!
//! Best effort: the count is read without reserving the slot, so two
//! concurrent creations in one month can pick the same number. The store's
//! unique constraint rejects the second.

use chrono::{Datelike, Months, NaiveDate};

pub const INVOICE_NUMBER_PREFIX: &str = "FAC";

/// Next number for a month that already holds `existing` invoices.
pub fn generate_invoice_number(year: i32, month: u32, existing: u64) -> String {
    format!(
        "{}-{:04}{:02}-{:04}",
        INVOICE_NUMBER_PREFIX,
        year,
        month,
        existing + 1
    )
}

/// First and last day of the month containing `date`.
pub fn period_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(NaiveDate::MAX);
    (first, last)
}
