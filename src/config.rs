use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;

use crate::error::{SimulationError, SimulationResult};
use crate::loan::{Compounding, Loan};
use crate::manager::{LoanManager, DEFAULT_MAX_CYCLES};

/// Parameters for one loan. `annual_rate` is a percentage; a missing start date means
/// the loan starts with the simulation.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoanSpec {
    pub annual_rate: Decimal,
    pub principal: Decimal,
    pub compounding: Compounding,
    pub start_date: Option<NaiveDate>,
}

impl LoanSpec {
    pub fn new(annual_rate: Decimal, principal: Decimal, compounding: Compounding) -> Self {
        Self {
            annual_rate,
            principal,
            compounding,
            start_date: None,
        }
    }

    pub fn to_loan(&self, default_start: NaiveDate) -> SimulationResult<Loan> {
        Loan::new(
            self.start_date.unwrap_or(default_start),
            self.annual_rate,
            self.principal,
            self.compounding,
        )
    }
}

// RATE:PRINCIPAL[:COMPOUNDING[:START_DATE]], compounding defaults to daily
impl FromStr for LoanSpec {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        if parts.len() < 2 || parts.len() > 4 {
            return Err(SimulationError::invalid_input(
                "loan",
                format!("expected RATE:PRINCIPAL[:COMPOUNDING[:START_DATE]], got '{}'", s),
            ));
        }

        let annual_rate = parts[0]
            .parse::<Decimal>()
            .map_err(|e| SimulationError::invalid_input("loan rate", e.to_string()))?;
        let principal = parts[1]
            .parse::<Decimal>()
            .map_err(|e| SimulationError::invalid_input("loan principal", e.to_string()))?;
        let compounding = match parts.get(2) {
            Some(c) => c.parse::<Compounding>()?,
            None => Compounding::Daily,
        };
        let start_date = parts
            .get(3)
            .map(|d| d.parse::<NaiveDate>())
            .transpose()
            .map_err(|e| SimulationError::invalid_input("loan start date", e.to_string()))?;

        Ok(Self {
            annual_rate,
            principal,
            compounding,
            start_date,
        })
    }
}

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationConfig {
    pub start_date: NaiveDate,
    pub regular_payment: Decimal,
    pub loans: Vec<LoanSpec>,
    pub max_cycles: u32,
}

impl SimulationConfig {
    pub fn build_manager(&self) -> SimulationResult<LoanManager> {
        if self.regular_payment <= Decimal::ZERO {
            return Err(SimulationError::invalid_input("payment", "must be positive"));
        }
        let mut manager = LoanManager::new(self.regular_payment, self.start_date).with_max_cycles(self.max_cycles);
        for spec in &self.loans {
            manager.load_loan(spec.to_loan(self.start_date)?);
        }
        Ok(manager)
    }
}

impl Default for SimulationConfig {
    /// A thirteen-loan portfolio paid down at 500 a month from 2018-04-14.
    fn default() -> Self {
        let loans = [
            (dec!(4.25), dec!(3378.96)),
            (dec!(6.55), dec!(2206.69)),
            (dec!(6.55), dec!(5634.57)),
            (dec!(6.55), dec!(7512.61)),
            (dec!(3.61), dec!(2705.95)),
            (dec!(3.61), dec!(1086.73)),
            (dec!(3.61), dec!(2705.95)),
            (dec!(3.61), dec!(540.81)),
            (dec!(3.61), dec!(2705.95)),
            (dec!(3.61), dec!(534.49)),
            (dec!(5.96), dec!(3923.04)),
            (dec!(5.96), dec!(14821.44)),
            (dec!(5.59), dec!(21056.49)),
        ];

        Self {
            start_date: NaiveDate::from_ymd_opt(2018, 4, 14).unwrap_or(NaiveDate::MIN),
            regular_payment: dec!(500),
            loans: loans
                .iter()
                .map(|(rate, principal)| LoanSpec::new(*rate, *principal, Compounding::Daily))
                .collect(),
            max_cycles: DEFAULT_MAX_CYCLES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LoanSpec, SimulationConfig};
    use crate::error::SimulationError;
    use crate::loan::Compounding;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use test_log::test;

    #[test]
    fn test_parse_loan_spec() {
        let spec: LoanSpec = "6.55:2206.69".parse().unwrap();
        assert_eq!(spec, LoanSpec::new(dec!(6.55), dec!(2206.69), Compounding::Daily));

        let spec: LoanSpec = "12:1000:monthly:2023-01-15".parse().unwrap();
        assert_eq!(spec.annual_rate, dec!(12));
        assert_eq!(spec.compounding, Compounding::Monthly);
        assert_eq!(spec.start_date, NaiveDate::from_ymd_opt(2023, 1, 15));

        let spec: LoanSpec = " 5 : 100 : 52 ".parse().unwrap();
        assert_eq!(spec.compounding, Compounding::Periods(52));
    }

    #[test]
    fn test_parse_loan_spec_errors() {
        for bad in ["", "5", "x:100", "5:y", "5:100:hourly", "5:100:daily:2023-13-01", "1:2:daily:2023-01-01:9"] {
            assert!(
                matches!(bad.parse::<LoanSpec>(), Err(SimulationError::InvalidInput { .. })),
                "{} should not parse",
                bad
            );
        }
    }

    #[test]
    fn test_default_portfolio() {
        let config = SimulationConfig::default();
        assert_eq!(config.loans.len(), 13);
        assert_eq!(config.regular_payment, dec!(500));

        let manager = config.build_manager().unwrap();
        assert_eq!(manager.get_original_total(), dec!(68813.68));
        assert_eq!(manager.get_loans()[0].annual_rate_percent(), dec!(6.55));
        assert_eq!(manager.get_loans()[12].annual_rate_percent(), dec!(3.61));
    }

    #[test]
    fn test_loan_start_date_override() {
        let config = SimulationConfig {
            loans: vec!["5:100:daily:2018-05-01".parse().unwrap(), "4:100".parse().unwrap()],
            ..SimulationConfig::default()
        };
        let manager = config.build_manager().unwrap();
        let starts: Vec<NaiveDate> = manager.get_loans().iter().map(|l| l.start_date).collect();
        assert_eq!(
            starts,
            vec![
                NaiveDate::from_ymd_opt(2018, 5, 1).unwrap(),
                NaiveDate::from_ymd_opt(2018, 4, 14).unwrap()
            ]
        );
    }

    #[test]
    fn test_loan_starting_after_first_payment() {
        let config = SimulationConfig {
            regular_payment: dec!(200),
            loans: vec!["5:1000:daily:2018-06-01".parse().unwrap(), "4:500".parse().unwrap()],
            ..SimulationConfig::default()
        };
        let mut manager = config.build_manager().unwrap();
        let summary = manager.run_to_completion().unwrap();

        assert!(manager.is_paid_off());
        assert_eq!(summary.cycle_count, manager.get_cycles().len() as u32);
        // only the 4% loan has started by the first payment on 2018-05-14
        let first = &manager.get_cycles()[0];
        assert_eq!(first.pmt_date, NaiveDate::from_ymd_opt(2018, 5, 14).unwrap());
        assert!(first.interest_paid > Decimal::ZERO);
        assert!(first.interest_paid < dec!(2));
    }

    #[test]
    fn test_build_manager_rejects_bad_payment() {
        let config = SimulationConfig {
            regular_payment: Decimal::ZERO,
            ..SimulationConfig::default()
        };
        assert!(matches!(config.build_manager(), Err(SimulationError::InvalidInput { .. })));
    }
}
