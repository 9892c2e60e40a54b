use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Payment too low: interest of {interest} accrued by {date} outgrows payment of {payment}")]
    PaymentTooLow {
        date: NaiveDate,
        payment: Decimal,
        interest: Decimal,
    },

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Accrual date {requested} precedes last accrual date {last_accrual}")]
    AccrualDateRegression {
        requested: NaiveDate,
        last_accrual: NaiveDate,
    },

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Arithmetic overflow in {context}")]
    Overflow { context: String },

    #[error("Convergence failure: {process} did not finish after {iterations} iterations")]
    ConvergenceFailure { process: String, iterations: u32 },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),
}

pub type SimulationResult<T> = Result<T, SimulationError>;

impl SimulationError {
    pub(crate) fn invalid_input(field: &str, reason: impl Into<String>) -> Self {
        SimulationError::InvalidInput {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
