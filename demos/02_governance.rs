/// governance - signed fee changes and servicing-rights transfers
use arm_servicing_rs::{
    sign_fee_rate_update, Address, FeeRate, Ledger, LedgerConfig, MockPriceIndex,
    SafeTimeProvider, SigningKey, TimeSource,
};
use chrono::{TimeZone, Utc};
use rand::rngs::OsRng;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    println!("=== governance ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    ));

    let originator_key = SigningKey::generate(&mut OsRng);
    let originator = Address::from_verifying_key(&originator_key.verifying_key());
    let servicer = Address::from_bytes([1u8; 32]);
    let first_holder = Address::from_bytes([3u8; 32]);
    let ledger_id = Address::from_bytes([0xAA; 32]);

    let config = LedgerConfig::new(ledger_id, servicer, originator).with_msr_holder(first_holder);
    let mut ledger = Ledger::new(config, MockPriceIndex::new(2500, 2500))?;

    // originator signs off-ledger, anyone relays
    let new_rate = FeeRate::new(10_000_000_000_000_000)?;
    let signature = sign_fee_rate_update(&originator_key, new_rate, &ledger_id);
    ledger.update_service_fee_rate(new_rate, &signature, &time)?;
    println!("service fee rate: {}", ledger.service_fee_rate());

    // a forged signature is rejected
    let forged = sign_fee_rate_update(&SigningKey::generate(&mut OsRng), FeeRate::from_bps(5000)?, &ledger_id);
    if let Err(err) = ledger.update_service_fee_rate(FeeRate::from_bps(5000)?, &forged, &time) {
        println!("forged update rejected: {}", err);
    }

    // servicing rights move only at the holder's request
    let buyer = Address::from_bytes([5u8; 32]);
    if let Err(err) = ledger.set_msr_holder(&servicer, buyer, &time) {
        println!("servicer cannot move rights: {}", err);
    }
    ledger.set_msr_holder(&first_holder, buyer, &time)?;
    println!("msr holder: {}", ledger.msr_holder());

    for entry in ledger.events().entries() {
        println!("#{} {} {}", entry.sequence, entry.event.name(), hex::encode(&entry.hash[..8]));
    }
    println!("chain intact: {}", ledger.events().verify_chain());

    Ok(())
}
