pub mod access;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod index;
pub mod interest;
pub mod ledger;
pub mod payments;
pub mod serialization;
pub mod state;
pub mod types;

// re-export key types
pub use access::{
    fee_rate_digest, sign_fee_rate_update, AccessController, Ed25519Verifier, SignatureVerifier,
};
pub use config::{LedgerConfig, LedgerPolicy, OwedAmountPolicy};
pub use decimal::{Bps, FeeRate, Money, BPS_DENOMINATOR, FEE_DENOMINATOR};
pub use errors::{LedgerError, Result};
pub use events::{Event, EventLog, LoggedEvent};
pub use index::{IndexReading, MockPriceIndex, PriceIndex};
pub use interest::{AdjustmentEngine, RateAdjustment};
pub use ledger::Ledger;
pub use payments::{
    FeeSplit, FundsTransfer, InMemoryTreasury, PaymentProcessor, PaymentReceipt, PaymentRequest,
    TransferRecord,
};
pub use serialization::{LedgerView, LoanView};
pub use state::{LedgerState, LoanRecord, LoanTerms, ServiceFeeConfig};
pub use types::{Address, LoanId, LoanStatus, Role};

// re-export external dependencies that users will need
pub use chrono;
pub use ed25519_dalek::{SigningKey, VerifyingKey};
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
