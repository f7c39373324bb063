/// rate adjustment - index-linked resets over several years
use arm_servicing_rs::{
    Address, Bps, Ledger, LedgerConfig, LedgerError, LoanTerms, MockPriceIndex, Money,
    SafeTimeProvider, TimeSource,
};
use chrono::{Duration, TimeZone, Utc};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    println!("=== rate adjustment ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();
    let servicer = Address::from_bytes([1u8; 32]);

    let config = LedgerConfig::new(Address::from_bytes([0xAA; 32]), servicer, Address::from_bytes([2u8; 32]));
    let mut ledger = Ledger::new(config, MockPriceIndex::new(2500, 2500))?;

    let year = 365 * 24 * 60 * 60;
    ledger.originate_loan(
        &servicer,
        1,
        LoanTerms {
            document_hash: "QmTest001".to_string(),
            principal: Money::from_minor(100_000),
            initial_rate: Bps::new(200),
            margin: Bps::new(50),
            lifetime_cap: Bps::new(1000),
            first_adjustment_date: time.now() + Duration::days(30),
            adjustment_interval_secs: year,
        },
        &time,
    )?;
    println!("ceiling: {}", ledger.rate_ceiling(1)?);

    // too early
    match ledger.adjust_interest_rate(&servicer, 1, &time) {
        Err(LedgerError::AdjustmentNotDue { next_adjustment, .. }) => {
            println!("not due until {}", next_adjustment.format("%Y-%m-%d"));
        }
        other => println!("unexpected: {:?}", other),
    }

    controller.advance(Duration::days(30));

    // cpi path: flat, up 4%, up 20%, down 10%, up 60%
    for cpi in [2500u64, 2600, 3000, 2250, 4000] {
        ledger.price_index_mut().set_current(cpi);
        let adj = ledger.adjust_interest_rate(&servicer, 1, &time)?;
        println!(
            "{}  cpi {:>5}  delta {:>5}bps  candidate {:>5}  -> {}{}",
            time.now().format("%Y-%m-%d"),
            cpi,
            adj.index_delta_bps,
            adj.candidate_rate,
            adj.new_rate,
            if adj.was_capped() { " (capped)" } else if adj.was_floored() { " (floored)" } else { "" },
        );
        controller.advance(Duration::seconds(year as i64));
    }

    Ok(())
}
