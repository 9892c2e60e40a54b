use avalanche::config::{LoanSpec, SimulationConfig};
use avalanche::loan::round;
use avalanche::manager::DEFAULT_MAX_CYCLES;
use chrono::NaiveDate;
use clap::Parser;
use log::{error, info};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use simple_logger::SimpleLogger;
use std::process::ExitCode;

/// Avalanche repayment of a loan portfolio and its equivalent consolidation rate
#[derive(Parser, Debug)]
#[command(name = "avalanche", version, about)]
struct Cli {
    /// Fixed payment made every month
    #[arg(long)]
    payment: Option<Decimal>,

    /// Date the loans start accruing; the first payment is one month later
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// RATE:PRINCIPAL[:COMPOUNDING[:START_DATE]], repeat once per loan. Without any,
    /// the built-in portfolio is used
    #[arg(long = "loan")]
    loans: Vec<LoanSpec>,

    /// Give up after this many monthly payments
    #[arg(long, default_value_t = DEFAULT_MAX_CYCLES)]
    max_cycles: u32,

    /// Print every payment cycle
    #[arg(long)]
    schedule: bool,

    /// Skip the consolidation rate search
    #[arg(long)]
    skip_consolidation: bool,

    #[arg(long, default_value = "info")]
    log_level: log::LevelFilter,
}

impl Cli {
    fn config(&self) -> SimulationConfig {
        let mut config = SimulationConfig::default();
        if let Some(payment) = self.payment {
            config.regular_payment = payment;
        }
        if let Some(start_date) = self.start_date {
            config.start_date = start_date;
        }
        if !self.loans.is_empty() {
            config.loans = self.loans.clone();
        }
        config.max_cycles = self.max_cycles;
        config
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.config();
    info!(
        "simulating {} loans at {} a month from {}",
        config.loans.len(),
        config.regular_payment,
        config.start_date
    );

    let mut manager = config.build_manager()?;
    // a portfolio with nothing owed has no weighted rate
    if !manager.is_paid_off() {
        let average = manager.weighted_average_interest()?;
        println!("Weighted average rate is {:.2}%", round(average * dec!(100), 2));
    }

    let summary = manager.run_to_completion()?;
    if cli.schedule {
        manager.show_schedule();
    }
    println!("{}", summary);

    if !cli.skip_consolidation {
        println!("Consolidation Scenarios");
        let result = manager.find_equivalent_consolidation_rate()?;
        for candidate in &result.candidates {
            println!("{}", candidate);
        }
        println!("Equivalent consolidation rate is {:.2}%", round(result.rate, 2));
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = SimpleLogger::new().with_level(cli.log_level).init() {
        eprintln!("logger setup failed: {}", e);
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

// the public simulation types are thread-safe and Unpin
#[allow(dead_code)]
fn is_normal<T: Sized + Send + Sync + Unpin>() {}

#[test]
fn normal_types() {
    is_normal::<avalanche::loan::Loan>();
    is_normal::<avalanche::manager::LoanManager>();
    is_normal::<avalanche::consolidation::ConsolidationResult>();
    is_normal::<avalanche::SimulationError>();
}

#[test]
fn cli_overrides_default_portfolio() {
    let cli = Cli::parse_from([
        "avalanche",
        "--payment",
        "250",
        "--start-date",
        "2024-01-31",
        "--loan",
        "7:1000",
        "--loan",
        "3:500:monthly",
    ]);
    let config = cli.config();
    assert_eq!(config.regular_payment, dec!(250));
    assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
    assert_eq!(config.loans.len(), 2);
    assert_eq!(config.max_cycles, DEFAULT_MAX_CYCLES);
    assert_eq!(cli.log_level, log::LevelFilter::Info);
}

#[test]
fn zero_balance_portfolio_runs() {
    let cli = Cli::parse_from(["avalanche", "--loan", "5:0", "--loan", "3:0:monthly"]);
    assert!(run(&cli).is_ok());
}
