/// quick start - originate, adjust and settle one loan
use arm_servicing_rs::{
    Address, Bps, FeeRate, InMemoryTreasury, Ledger, LedgerConfig, LoanTerms, MockPriceIndex,
    Money, PaymentRequest, SafeTimeProvider, TimeSource,
};
use chrono::{Duration, TimeZone, Utc};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();

    let servicer = Address::from_bytes([1u8; 32]);
    let originator = Address::from_bytes([2u8; 32]);
    let borrower = Address::from_bytes([4u8; 32]);

    let config = LedgerConfig::new(Address::from_bytes([0xAA; 32]), servicer, originator)
        .with_service_fee_rate(FeeRate::from_bps(100)?);
    let mut ledger = Ledger::new(config, MockPriceIndex::new(2500, 3000))?;

    // $100,000 at 2% + 0.5% margin, capped 25 points above the start
    ledger.originate_loan(
        &servicer,
        1,
        LoanTerms {
            document_hash: "QmTest001".to_string(),
            principal: Money::from_minor(100_000),
            initial_rate: Bps::new(200),
            margin: Bps::new(50),
            lifetime_cap: Bps::new(2500),
            first_adjustment_date: time.now() + Duration::days(30),
            adjustment_interval_secs: 365 * 24 * 60 * 60,
        },
        &time,
    )?;

    // first reset after 30 days
    controller.advance(Duration::days(30));
    let adjustment = ledger.adjust_interest_rate(&servicer, 1, &time)?;
    println!("rate reset to {} ({}%)", adjustment.new_rate, adjustment.new_rate.as_percentage());

    // settle
    let mut treasury = InMemoryTreasury::new();
    let owed = ledger.amount_owed(1)?;
    let receipt = ledger.make_payment(
        PaymentRequest { loan_id: 1, payer: borrower, amount: owed },
        &mut treasury,
        &time,
    )?;
    println!("paid {} (fee {}, holder {})", receipt.amount, receipt.split.fee, receipt.split.remainder);

    println!("{}", ledger.to_json()?);

    Ok(())
}
