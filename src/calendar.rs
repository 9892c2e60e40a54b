//! Date arithmetic shared by the loans and the payment loop.

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::{SimulationError, SimulationResult};

/// Interest accrues against a flat 365-day year, leap years included.
pub const DAYS_PER_YEAR: Decimal = dec!(365);

/// Adds calendar months, clamping the day to the last valid day of the target month
/// (Jan 31 + 1 month is Feb 28, or Feb 29 in a leap year).
pub fn add_months(date: NaiveDate, months: u32) -> SimulationResult<NaiveDate> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| SimulationError::DateError(format!("{} plus {} months is out of range", date, months)))
}

// whole days from `from` to `to`; negative when `to` is earlier
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    to.signed_duration_since(from).num_days()
}

/// The payment one month after `previous`. Each step starts from the last payment, so
/// once a day is clamped it stays clamped (Jan 31, Feb 28, Mar 28, ...).
pub fn next_payment_date(previous: NaiveDate) -> SimulationResult<NaiveDate> {
    add_months(previous, 1)
}
