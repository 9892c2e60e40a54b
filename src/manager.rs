use chrono::NaiveDate;
use log::{debug, info, trace, warn};
use rust_decimal::Decimal;
use std::fmt;

use crate::calendar::next_payment_date;
use crate::consolidation::{ConsolidationResult, ConsolidationSearch};
use crate::error::{SimulationError, SimulationResult};
use crate::loan::{round, Loan};

/// 100 years of monthly payments.
pub const DEFAULT_MAX_CYCLES: u32 = 1200;

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PaymentCycle {
    pub cycle_number: u32,
    pub pmt_date: NaiveDate,
    pub pmt_amount: Decimal,
    pub interest_paid: Decimal,
    pub principal_paid: Decimal,
    pub end_balance: Decimal,
}

impl fmt::Display for PaymentCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pmt number {}, date {}, payment ${:.2}, interest paid ${:.2}, principal paid ${:.2}, ending balance ${:.2}",
            self.cycle_number,
            self.pmt_date,
            round(self.pmt_amount, 2),
            round(self.interest_paid, 2),
            round(self.principal_paid, 2),
            round(self.end_balance, 2)
        )
    }
}

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RepaymentSummary {
    pub payoff_date: NaiveDate,
    pub cycle_count: u32,
    pub total_paid: Decimal,
    pub total_interest: Decimal,
}

impl fmt::Display for RepaymentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total to be paid by {} is {:.2}",
            self.payoff_date,
            round(self.total_paid, 2)
        )
    }
}

/// Spreads `amount` over the loans in order, each loan taking what it can and handing
/// the rest to the next. Returns what no loan could absorb.
pub fn allocate_avalanche(loans: &mut [Loan], amount: Decimal) -> Decimal {
    loans
        .iter_mut()
        .fold(amount, |remaining, loan| loan.apply_payment(remaining))
}

/// One repayment simulation: a portfolio of loans paid down with a fixed monthly
/// payment, highest annual rate first.
#[derive(Clone, Debug)]
pub struct LoanManager {
    loans: Vec<Loan>,
    regular_payment: Decimal,
    start_date: NaiveDate,
    max_cycles: u32,
    original_total: Decimal,
    total_balance: Decimal,
    total_interest: Decimal,
    total_paid: Decimal,
    weighted_average_rate: Option<Decimal>,
    last_payment_date: Option<NaiveDate>,
    cycles: Vec<PaymentCycle>,
}

impl LoanManager {
    pub fn new(regular_payment: Decimal, start_date: NaiveDate) -> Self {
        Self {
            loans: Vec::new(),
            regular_payment,
            start_date,
            max_cycles: DEFAULT_MAX_CYCLES,
            original_total: Decimal::ZERO,
            total_balance: Decimal::ZERO,
            total_interest: Decimal::ZERO,
            total_paid: Decimal::ZERO,
            weighted_average_rate: None,
            last_payment_date: None,
            cycles: Vec::new(),
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: u32) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn get_loans(&self) -> &[Loan] {
        &self.loans
    }

    pub fn get_regular_payment(&self) -> Decimal {
        self.regular_payment
    }

    pub fn get_start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn get_max_cycles(&self) -> u32 {
        self.max_cycles
    }

    pub fn get_original_total(&self) -> Decimal {
        self.original_total
    }

    pub fn get_total_balance(&self) -> Decimal {
        self.total_balance
    }

    pub fn get_total_interest(&self) -> Decimal {
        self.total_interest
    }

    pub fn get_total_paid(&self) -> Decimal {
        self.total_paid
    }

    pub fn get_weighted_average_rate(&self) -> Option<Decimal> {
        self.weighted_average_rate
    }

    pub fn get_cycles(&self) -> &[PaymentCycle] {
        &self.cycles
    }

    pub fn is_paid_off(&self) -> bool {
        self.total_balance.is_zero()
    }

    /// Adds a loan and restores the highest-rate-first order. The sort is stable, so
    /// loans with equal rates keep their load order.
    pub fn load_loan(&mut self, loan: Loan) {
        self.total_balance += loan.get_balance();
        self.original_total += loan.get_balance();
        self.loans.push(loan);
        self.loans.sort_by(|a, b| b.annual_rate.cmp(&a.annual_rate));
    }

    /// Balance-weighted average annual rate (as a fraction) over the current balances.
    pub fn weighted_average_interest(&mut self) -> SimulationResult<Decimal> {
        let total_dollars: Decimal = self.loans.iter().map(Loan::get_balance).sum();
        if total_dollars.is_zero() {
            return Err(SimulationError::DivisionByZero {
                context: "weighted average interest over a zero balance".into(),
            });
        }

        let weighted: Decimal = self
            .loans
            .iter()
            .map(|loan| loan.get_balance() / total_dollars * loan.annual_rate)
            .sum();
        self.weighted_average_rate = Some(weighted);
        Ok(weighted)
    }

    /// One payment cycle: accrue interest on every loan up to `pmt_date`, pay it out of
    /// `amount`, and push the rest through the loans in avalanche order.
    pub fn apply_monthly_payment(
        &mut self,
        amount: Decimal,
        pmt_date: NaiveDate,
    ) -> SimulationResult<PaymentCycle> {
        self.total_paid += amount;

        let mut group_interest = Decimal::ZERO;
        for loan in self.loans.iter_mut() {
            group_interest += loan.calculate_interest(pmt_date)?;
        }
        self.total_interest += group_interest;

        let principal_payable = amount - group_interest;
        if principal_payable <= Decimal::ZERO {
            warn!(
                "payment {} on {} does not cover accrued interest {}",
                amount,
                pmt_date,
                round(group_interest, 2)
            );
            return Err(SimulationError::PaymentTooLow {
                date: pmt_date,
                payment: amount,
                interest: group_interest,
            });
        }

        let leftover = allocate_avalanche(&mut self.loans, principal_payable);
        // money left after every loan is retired was never owed
        if leftover > Decimal::ZERO {
            trace!("returning unused {} on {}", leftover, pmt_date);
            self.total_paid -= leftover;
        }

        for loan in self.loans.iter_mut() {
            loan.mark_paid_off(pmt_date);
        }
        self.total_balance = self.loans.iter().map(Loan::get_balance).sum();
        self.last_payment_date = Some(pmt_date);

        let cycle = PaymentCycle {
            cycle_number: self.cycles.len() as u32 + 1,
            pmt_date,
            pmt_amount: amount - leftover,
            interest_paid: group_interest,
            principal_paid: principal_payable - leftover,
            end_balance: self.total_balance,
        };
        debug!("{}", cycle);
        self.cycles.push(cycle.clone());
        Ok(cycle)
    }

    /// Pays `regular_payment` every month, starting one month after `start_date` and
    /// stepping one month from the previous payment, until nothing is owed.
    pub fn run_to_completion(&mut self) -> SimulationResult<RepaymentSummary> {
        while self.total_balance > Decimal::ZERO {
            let cycle = self.cycles.len() as u32;
            if cycle >= self.max_cycles {
                return Err(SimulationError::ConvergenceFailure {
                    process: "repayment simulation".into(),
                    iterations: cycle,
                });
            }
            let pmt_date = next_payment_date(self.last_payment_date.unwrap_or(self.start_date))?;
            self.apply_monthly_payment(self.regular_payment, pmt_date)?;
        }

        let summary = self.summary();
        info!(
            "paid off {} by {} after {} payments, interest {:.2}",
            round(self.original_total, 2),
            summary.payoff_date,
            summary.cycle_count,
            round(summary.total_interest, 2)
        );
        Ok(summary)
    }

    pub fn summary(&self) -> RepaymentSummary {
        RepaymentSummary {
            payoff_date: self.last_payment_date.unwrap_or(self.start_date),
            cycle_count: self.cycles.len() as u32,
            total_paid: self.total_paid,
            total_interest: self.total_interest,
        }
    }

    /// Runs the portfolio to completion if that has not happened yet, then searches for
    /// the single daily-compounded rate that costs the same in total.
    pub fn find_equivalent_consolidation_rate(&mut self) -> SimulationResult<ConsolidationResult> {
        if !self.is_paid_off() {
            self.run_to_completion()?;
        }
        ConsolidationSearch::new(self)?.run()
    }

    pub fn show_schedule(&self) {
        for cycle in &self.cycles {
            println!("{}", cycle);
        }
    }
}
