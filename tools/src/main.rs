//! batch-runner: headless runner for the nightly accrual batch.
//!
//! Usage:
//!   batch-runner --scenario data/demo_scenario.json
//!   batch-runner --scenario data/demo_scenario.json --config batch.json --account 6
//!
//! Set RUST_LOG=debug to see per-account decisions and daily state dumps.

mod scenario;

use accrual_core::{BatchConfig, BatchScheduler, LedgerStore};
use anyhow::Result;
use rust_decimal::Decimal;
use scenario::Scenario;
use std::collections::BTreeMap;
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let scenario_path = string_arg(&args, "--scenario").unwrap_or("./data/demo_scenario.json");
    let config_path = string_arg(&args, "--config");
    let account = string_arg(&args, "--account")
        .map(str::parse::<i64>)
        .transpose()?;

    let mut config = match config_path {
        Some(path) => BatchConfig::load(path)?,
        None => BatchConfig::default(),
    };
    if let Some(id) = account {
        config.snapshot_accounts = Some(vec![id]);
    }

    let scenario = Scenario::load(scenario_path)?;
    let first_day = scenario.first_day()?;

    println!("Deposit interest accrual batch: batch-runner");
    println!("  scenario:  {scenario_path}");
    println!("  days:      {first_day} ..= {}", scenario.today);
    println!("  policy:    {:?}", config.failure_policy);
    println!();

    let store = LedgerStore::open_migrated()?;
    scenario.seed_schemes(&store)?;

    let mut scheduler = BatchScheduler::build(store, config, first_day, scenario.today);
    scheduler.schedule_all(scenario.actions()?);
    scheduler.run()?;

    print_summary(&scheduler, account)?;
    Ok(())
}

fn print_summary(scheduler: &BatchScheduler, account: Option<i64>) -> Result<()> {
    let store = &scheduler.store;
    let wanted = |id: i64| account.map_or(true, |a| a == id);

    println!("=== RUN SUMMARY ===");
    println!("  days run:       {}", scheduler.days_run());
    let balance_runs = store.eod_balance_runs()?;
    let accrual_runs = store.accrual_runs()?;
    println!("  balance runs:   {}", balance_runs.iter().filter(|r| wanted(r.account_id)).count());
    println!("  accrual runs:   {}", accrual_runs.iter().filter(|r| wanted(r.account_id)).count());

    println!();
    println!("=== PAYMENTS ===");
    let payments = match account {
        Some(id) => store.payments_for_account(id)?,
        None => store.payments()?,
    };
    if payments.is_empty() {
        println!("  (none)");
    }
    for p in payments {
        println!(
            "  account {:>4}  period {:>3}  {:>12}  on {}",
            p.account_id, p.period_id, p.amount, p.date
        );
    }

    println!();
    println!("=== LEDGER (posted per product) ===");
    let mut totals: BTreeMap<i64, (usize, Decimal)> = BTreeMap::new();
    for entry in store.ledger_entries()? {
        let total = totals.entry(entry.product_id).or_insert((0, Decimal::ZERO));
        total.0 += 1;
        total.1 += entry.amount;
    }
    for (product_id, (count, amount)) in totals {
        println!("  product {product_id:>3}  {count:>4} entries  {amount:>12}");
    }

    let dead_letters = store.dead_letters()?;
    let quarantined = store.quarantined_accounts()?;
    if !dead_letters.is_empty() || !quarantined.is_empty() {
        println!();
        println!("=== HELD FOR OPERATORS ===");
        for q in quarantined {
            println!("  quarantined account {} since {}: {}", q.account_id, q.since, q.reason);
        }
        for d in dead_letters {
            println!(
                "  dead letter #{} account {} {} [{}{}] {}",
                d.id,
                d.account_id,
                d.business_date,
                d.error_kind,
                if d.retryable { ", retryable" } else { "" },
                d.message
            );
        }
    }
    Ok(())
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
