//! Search for the single consolidated rate that costs as much as the whole portfolio.
//!
//! Candidate rates are percentages. The scan starts at the lowest rate in the
//! portfolio and climbs in coarse steps until a candidate costs at least as much as
//! the portfolio, steps back and climbs again in fine steps until that happens a
//! second time. Totals are compared in cents, so a tie settles on the lower rate.

use chrono::NaiveDate;
use log::{debug, info};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;

use crate::error::{SimulationError, SimulationResult};
use crate::loan::{round, Compounding, Loan};
use crate::manager::{LoanManager, RepaymentSummary};

pub const COARSE_STEP: Decimal = dec!(0.05);
pub const FINE_STEP: Decimal = dec!(0.01);
pub const BACKOFF: Decimal = dec!(0.1);
pub const MAX_CANDIDATES: u32 = 10_000;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SearchPhase {
    Coarse,
    Fine,
    Converged,
}

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CandidateOutcome {
    pub phase: SearchPhase,
    pub rate: Decimal,
    pub payoff_date: NaiveDate,
    pub total_paid: Decimal,
    pub total_interest: Decimal,
}

impl fmt::Display for CandidateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "At rate {:.2}: total to be paid by {} is {:.2}",
            round(self.rate, 2),
            self.payoff_date,
            round(self.total_paid, 2)
        )
    }
}

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConsolidationResult {
    pub rate: Decimal,
    pub baseline_total_paid: Decimal,
    pub candidates: Vec<CandidateOutcome>,
}

impl ConsolidationResult {
    pub fn final_candidate(&self) -> Option<&CandidateOutcome> {
        self.candidates.last()
    }
}

/// Coarse scan, then fine scan, then done. Every `step` runs one candidate.
#[derive(Clone, Debug)]
pub struct ConsolidationSearch {
    phase: SearchPhase,
    next_rate: Decimal,
    converged_rate: Option<Decimal>,
    principal: Decimal,
    regular_payment: Decimal,
    start_date: NaiveDate,
    max_cycles: u32,
    baseline_total_paid: Decimal,
    candidates: Vec<CandidateOutcome>,
}

impl ConsolidationSearch {
    /// Takes the baseline from a portfolio that has already been run to completion.
    pub fn new(manager: &LoanManager) -> SimulationResult<Self> {
        let lowest = manager
            .get_loans()
            .last()
            .ok_or_else(|| SimulationError::InsufficientData("consolidation needs at least one loan".into()))?;
        if !manager.is_paid_off() {
            return Err(SimulationError::InsufficientData(
                "the portfolio has not been run to completion".into(),
            ));
        }

        Ok(Self {
            phase: SearchPhase::Coarse,
            next_rate: lowest.annual_rate_percent(),
            converged_rate: None,
            principal: manager.get_original_total(),
            regular_payment: manager.get_regular_payment(),
            start_date: manager.get_start_date(),
            max_cycles: manager.get_max_cycles(),
            baseline_total_paid: manager.get_total_paid(),
            candidates: Vec::new(),
        })
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    pub fn next_rate(&self) -> Decimal {
        self.next_rate
    }

    pub fn candidates(&self) -> &[CandidateOutcome] {
        &self.candidates
    }

    /// A fresh single-loan simulation at `rate` with the portfolio's principal and payment.
    pub fn evaluate(&self, rate: Decimal) -> SimulationResult<RepaymentSummary> {
        let mut manager = LoanManager::new(self.regular_payment, self.start_date).with_max_cycles(self.max_cycles);
        manager.load_loan(Loan::new(
            self.start_date,
            rate,
            self.principal,
            Compounding::Daily,
        )?);
        manager.run_to_completion()
    }

    /// Tries the next candidate rate and moves the state machine on.
    pub fn step(&mut self) -> SimulationResult<SearchPhase> {
        if self.phase == SearchPhase::Converged {
            return Ok(self.phase);
        }

        let rate = self.next_rate;
        let summary = self.evaluate(rate)?;
        let crossed = round(summary.total_paid, 2) >= round(self.baseline_total_paid, 2);

        let outcome = CandidateOutcome {
            phase: self.phase,
            rate,
            payoff_date: summary.payoff_date,
            total_paid: summary.total_paid,
            total_interest: summary.total_interest,
        };
        info!("{}", outcome);
        self.candidates.push(outcome);

        self.phase = match (self.phase, crossed) {
            (SearchPhase::Coarse, false) => {
                self.next_rate = rate + COARSE_STEP;
                SearchPhase::Coarse
            }
            (SearchPhase::Coarse, true) => {
                self.next_rate = (rate + COARSE_STEP - BACKOFF).max(Decimal::ZERO);
                debug!("crossed at {}, fine scan from {}", rate, self.next_rate);
                SearchPhase::Fine
            }
            (SearchPhase::Fine, false) => {
                self.next_rate = rate + FINE_STEP;
                SearchPhase::Fine
            }
            (SearchPhase::Fine, true) => {
                self.converged_rate = Some(rate);
                SearchPhase::Converged
            }
            (SearchPhase::Converged, _) => SearchPhase::Converged,
        };
        Ok(self.phase)
    }

    pub fn run(mut self) -> SimulationResult<ConsolidationResult> {
        while self.phase != SearchPhase::Converged {
            if self.candidates.len() as u32 >= MAX_CANDIDATES {
                return Err(SimulationError::ConvergenceFailure {
                    process: "consolidation rate search".into(),
                    iterations: MAX_CANDIDATES,
                });
            }
            self.step()?;
        }

        let rate = self.converged_rate.unwrap_or(self.next_rate);
        info!(
            "equivalent consolidation rate {:.2}% after {} candidates",
            round(rate, 2),
            self.candidates.len()
        );
        Ok(ConsolidationResult {
            rate,
            baseline_total_paid: self.baseline_total_paid,
            candidates: self.candidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ConsolidationSearch, SearchPhase};
    use crate::error::SimulationError;
    use crate::loan::{round, Compounding, Loan};
    use crate::manager::LoanManager;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use test_log::test;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn portfolio(payment: Decimal, loans: &[(Decimal, Decimal)]) -> LoanManager {
        let start = ymd(2023, 1, 15);
        let mut manager = LoanManager::new(payment, start);
        for (rate, principal) in loans {
            manager.load_loan(Loan::new(start, *rate, *principal, Compounding::Daily).unwrap());
        }
        manager
    }

    #[test]
    fn test_identical_rates_find_the_same_rate() {
        let mut manager = portfolio(dec!(500), &[(dec!(5), dec!(3000)), (dec!(5), dec!(2000))]);
        let result = manager.find_equivalent_consolidation_rate().unwrap();

        assert_eq!(round(result.baseline_total_paid, 2), dec!(5117.58));
        assert_eq!(result.rate, dec!(5));

        // one coarse hit at 5.00, then 4.95 through 5.00 in fine steps
        let rates: Vec<Decimal> = result.candidates.iter().map(|c| c.rate).collect();
        assert_eq!(
            rates,
            vec![dec!(5), dec!(4.95), dec!(4.96), dec!(4.97), dec!(4.98), dec!(4.99), dec!(5.00)]
        );
        assert_eq!(result.candidates[0].phase, SearchPhase::Coarse);
        assert!(result.candidates[1..].iter().all(|c| c.phase == SearchPhase::Fine));

        let last = result.final_candidate().unwrap();
        assert_eq!(round(last.total_paid, 2), round(result.baseline_total_paid, 2));
        assert_eq!(last.payoff_date, ymd(2023, 12, 15));
    }

    #[test]
    fn test_mixed_rates_bracket_the_crossing() {
        let mut manager = portfolio(
            dec!(400),
            &[(dec!(3.61), dec!(2705.95)), (dec!(6.55), dec!(5634.57)), (dec!(4.25), dec!(3378.96))],
        );
        let result = manager.find_equivalent_consolidation_rate().unwrap();
        let baseline = round(result.baseline_total_paid, 2);

        assert_eq!(baseline, dec!(12451.75));
        assert_eq!(result.rate, dec!(4.58));

        let last = result.final_candidate().unwrap();
        assert_eq!(last.rate, result.rate);
        assert!(round(last.total_paid, 2) >= baseline);

        // the fine candidate just below the answer was still cheaper
        let below = &result.candidates[result.candidates.len() - 2];
        assert_eq!(below.phase, SearchPhase::Fine);
        assert_eq!(below.rate + dec!(0.01), result.rate);
        assert!(round(below.total_paid, 2) < baseline);
    }

    #[test]
    fn test_candidate_matches_portfolio_at_same_rate() {
        let mut manager = portfolio(dec!(500), &[(dec!(5), dec!(3000)), (dec!(5), dec!(2000))]);
        let baseline = manager.run_to_completion().unwrap();

        let search = ConsolidationSearch::new(&manager).unwrap();
        let candidate = search.evaluate(dec!(5)).unwrap();
        assert_eq!(candidate.payoff_date, baseline.payoff_date);
        assert_eq!(candidate.cycle_count, baseline.cycle_count);
        assert_eq!(round(candidate.total_paid, 2), round(baseline.total_paid, 2));
    }

    #[test]
    fn test_step_walks_the_phases() {
        let mut manager = portfolio(dec!(500), &[(dec!(5), dec!(3000)), (dec!(5), dec!(2000))]);
        manager.run_to_completion().unwrap();

        let mut search = ConsolidationSearch::new(&manager).unwrap();
        assert_eq!(search.phase(), SearchPhase::Coarse);
        assert_eq!(search.next_rate(), dec!(5));

        assert_eq!(search.step().unwrap(), SearchPhase::Fine);
        assert_eq!(search.next_rate(), dec!(4.95));

        while search.phase() != SearchPhase::Converged {
            search.step().unwrap();
        }
        let tried = search.candidates().len();
        assert_eq!(search.step().unwrap(), SearchPhase::Converged);
        assert_eq!(search.candidates().len(), tried);
    }

    #[test]
    fn test_backoff_never_goes_below_zero() {
        let mut manager = portfolio(dec!(1000), &[(dec!(0.02), dec!(3000))]);
        let result = manager.find_equivalent_consolidation_rate().unwrap();

        assert!(result.candidates.iter().all(|c| c.rate >= Decimal::ZERO));
        assert_eq!(result.candidates[1].rate, Decimal::ZERO);
        assert_eq!(result.rate, dec!(0.02));
    }

    #[test]
    fn test_search_needs_loans() {
        let manager = LoanManager::new(dec!(100), ymd(2023, 1, 1));
        assert!(matches!(
            ConsolidationSearch::new(&manager),
            Err(SimulationError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_search_needs_finished_baseline() {
        let manager = portfolio(dec!(500), &[(dec!(5), dec!(3000))]);
        assert!(matches!(
            ConsolidationSearch::new(&manager),
            Err(SimulationError::InsufficientData(_))
        ));
    }
}
