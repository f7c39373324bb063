/// json state - export, audit and restore a ledger
use arm_servicing_rs::{
    Address, Bps, InMemoryTreasury, Ledger, LedgerConfig, LedgerState, LoanTerms, MockPriceIndex,
    Money, PaymentRequest, SafeTimeProvider, TimeSource,
};
use chrono::{Duration, TimeZone, Utc};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== json state ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    ));
    let servicer = Address::from_bytes([1u8; 32]);
    let config = LedgerConfig::new(Address::from_bytes([0xAA; 32]), servicer, Address::from_bytes([2u8; 32]));
    let mut ledger = Ledger::new(config.clone(), MockPriceIndex::new(2500, 2500))?;

    for loan_id in 1..=3u64 {
        ledger.originate_loan(
            &servicer,
            loan_id,
            LoanTerms {
                document_hash: format!("QmDoc{:03}", loan_id),
                principal: Money::from_minor(100_000 * loan_id as u128),
                initial_rate: Bps::new(300),
                margin: Bps::new(75),
                lifetime_cap: Bps::new(500),
                first_adjustment_date: time.now() + Duration::days(365),
                adjustment_interval_secs: 365 * 24 * 60 * 60,
            },
            &time,
        )?;
    }

    let mut treasury = InMemoryTreasury::new();
    let owed = ledger.amount_owed(2)?;
    ledger.make_payment(
        PaymentRequest { loan_id: 2, payer: Address::from_bytes([4u8; 32]), amount: owed },
        &mut treasury,
        &time,
    )?;

    println!("ledger view");
    println!("-----------");
    println!("{}\n", ledger.to_json()?);

    println!("event log");
    println!("---------");
    println!("{}\n", ledger.events_to_json()?);

    // round trip through storage
    let stored = serde_json::to_string(&ledger.export_state())?;
    let state: LedgerState = serde_json::from_str(&stored)?;
    let restored = Ledger::restore(config, state, MockPriceIndex::new(2500, 2500))?;
    println!("restored {} loans, chain intact: {}", restored.loan_count(), restored.events().verify_chain());

    Ok(())
}
