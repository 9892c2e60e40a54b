use chrono::NaiveDate;
use log::trace;
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use rust_decimal_macros::dec;
use std::{fmt, str::FromStr};

use crate::calendar::{days_between, DAYS_PER_YEAR};
use crate::error::{SimulationError, SimulationResult};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Compounding {
    Daily,
    Monthly,
    Quarterly,
    SemiAnnually,
    Annually,
    /// Any other number of compounding periods per year.
    Periods(u32),
}

impl Compounding {
    pub fn periods_per_year(&self) -> u32 {
        match self {
            Compounding::Daily => 365,
            Compounding::Monthly => 12,
            Compounding::Quarterly => 4,
            Compounding::SemiAnnually => 2,
            Compounding::Annually => 1,
            Compounding::Periods(n) => *n,
        }
    }
}

impl fmt::Display for Compounding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compounding::Daily => write!(f, "daily"),
            Compounding::Monthly => write!(f, "monthly"),
            Compounding::Quarterly => write!(f, "quarterly"),
            Compounding::SemiAnnually => write!(f, "semiannually"),
            Compounding::Annually => write!(f, "annually"),
            Compounding::Periods(n) => write!(f, "{} periods", n),
        }
    }
}

impl FromStr for Compounding {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Compounding::Daily),
            "monthly" => Ok(Compounding::Monthly),
            "quarterly" => Ok(Compounding::Quarterly),
            "semiannually" | "semi-annually" => Ok(Compounding::SemiAnnually),
            "annually" => Ok(Compounding::Annually),
            other => match other.parse::<u32>() {
                Ok(365) => Ok(Compounding::Daily),
                Ok(12) => Ok(Compounding::Monthly),
                Ok(4) => Ok(Compounding::Quarterly),
                Ok(2) => Ok(Compounding::SemiAnnually),
                Ok(1) => Ok(Compounding::Annually),
                Ok(n) => Ok(Compounding::Periods(n)),
                Err(_) => Err(SimulationError::invalid_input(
                    "compounding",
                    format!("unknown compounding '{}'", s),
                )),
            },
        }
    }
}

/// A single fixed-rate loan. Interest accrues from `last_accrual_date`; the balance only
/// moves when a payment is applied.
#[derive(Clone, PartialEq, Debug)]
pub struct Loan {
    pub start_date: NaiveDate,
    pub annual_rate: Decimal,
    pub compound_type: Compounding,
    pub principal: Decimal,
    period_rate: Decimal,
    last_accrual_date: NaiveDate,
    current_balance: Decimal,
    interest_accrued: Decimal,
    payoff_date: Option<NaiveDate>,
}

impl Loan {
    /// `annual_rate` is a percentage (i.e., 4.25, 6.55) and is stored as a fraction.
    pub fn new(
        start_date: NaiveDate,
        annual_rate: Decimal,
        principal: Decimal,
        compound_type: Compounding,
    ) -> SimulationResult<Self> {
        if principal < Decimal::ZERO {
            return Err(SimulationError::invalid_input("principal", "must not be negative"));
        }
        if annual_rate < Decimal::ZERO {
            return Err(SimulationError::invalid_input("annual_rate", "must not be negative"));
        }
        let periods = compound_type.periods_per_year();
        if periods == 0 {
            return Err(SimulationError::invalid_input(
                "compounding",
                "needs at least one period per year",
            ));
        }

        let annual_rate = annual_rate / dec!(100);
        Ok(Self {
            start_date,
            annual_rate,
            compound_type,
            principal,
            period_rate: annual_rate / Decimal::from(periods),
            last_accrual_date: start_date,
            current_balance: principal,
            interest_accrued: Decimal::ZERO,
            payoff_date: None,
        })
    }

    pub fn get_balance(&self) -> Decimal {
        self.current_balance
    }

    pub fn get_last_accrual_date(&self) -> NaiveDate {
        self.last_accrual_date
    }

    pub fn get_period_rate(&self) -> Decimal {
        self.period_rate
    }

    pub fn get_interest_accrued(&self) -> Decimal {
        self.interest_accrued
    }

    pub fn get_payoff_date(&self) -> Option<NaiveDate> {
        self.payoff_date
    }

    pub fn annual_rate_percent(&self) -> Decimal {
        self.annual_rate * dec!(100)
    }

    pub fn is_paid_off(&self) -> bool {
        self.current_balance.is_zero()
    }

    /// Compound interest on the current balance from the last accrual date through
    /// `as_of`, using whole days over a 365-day year. Moves the accrual date forward
    /// but leaves the balance alone. Before `start_date` nothing accrues.
    pub fn calculate_interest(&mut self, as_of: NaiveDate) -> SimulationResult<Decimal> {
        if as_of < self.start_date {
            trace!("loan starting {} accrues nothing by {}", self.start_date, as_of);
            return Ok(Decimal::ZERO);
        }
        if as_of < self.last_accrual_date {
            return Err(SimulationError::AccrualDateRegression {
                requested: as_of,
                last_accrual: self.last_accrual_date,
            });
        }

        let days = days_between(self.last_accrual_date, as_of);
        self.last_accrual_date = as_of;
        if days == 0 || self.current_balance.is_zero() {
            return Ok(Decimal::ZERO);
        }

        // periods * days first so daily compounding gets a whole-number exponent
        let exponent =
            Decimal::from(self.compound_type.periods_per_year()) * Decimal::from(days) / DAYS_PER_YEAR;
        let factor = (Decimal::ONE + self.period_rate)
            .checked_powd(exponent)
            .ok_or_else(|| SimulationError::Overflow {
                context: format!("compounding factor over {} days", days),
            })?;
        let interest = self.current_balance * factor - self.current_balance;
        self.interest_accrued += interest;

        trace!(
            "accrued {} over {} days at {}% on balance {}",
            interest,
            days,
            self.annual_rate_percent(),
            self.current_balance
        );
        Ok(interest)
    }

    /// Pays down the balance and returns whatever was not needed. A loan that is already
    /// at zero passes the whole amount through.
    pub fn apply_payment(&mut self, amount: Decimal) -> Decimal {
        if amount <= Decimal::ZERO {
            return amount;
        }

        if self.current_balance > Decimal::ZERO {
            self.current_balance -= amount;
            if self.current_balance < Decimal::ZERO {
                let leftover = -self.current_balance;
                self.current_balance = Decimal::ZERO;
                leftover
            } else {
                Decimal::ZERO
            }
        } else {
            amount
        }
    }

    pub(crate) fn mark_paid_off(&mut self, date: NaiveDate) {
        if self.is_paid_off() && self.payoff_date.is_none() {
            self.payoff_date = Some(date);
        }
    }
}

impl fmt::Display for Loan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rate {:.2}% ({}), principal ${:.2}, balance ${:.2}",
            round(self.annual_rate_percent(), 2),
            self.compound_type,
            round(self.principal, 2),
            round(self.current_balance, 2)
        )
    }
}

/// Rounds half to even, the convention for every reported money value.
pub fn round(amt: Decimal, dec_places: u32) -> Decimal {
    amt.round_dp_with_strategy(dec_places, RoundingStrategy::MidpointNearestEven)
}
