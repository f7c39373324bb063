use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::decimal::{Bps, FeeRate, Money};
use crate::errors::{LedgerError, Result};
use crate::events::EventLog;
use crate::types::{Address, LoanId, LoanStatus};

/// terms supplied by the servicer at origination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    /// off-ledger document pointer, e.g. an ipfs hash
    pub document_hash: String,
    pub principal: Money,
    pub initial_rate: Bps,
    pub margin: Bps,
    pub lifetime_cap: Bps,
    pub first_adjustment_date: DateTime<Utc>,
    pub adjustment_interval_secs: u64,
}

impl LoanTerms {
    pub fn validate(&self, loan_id: LoanId) -> Result<()> {
        if loan_id == 0 {
            return Err(LedgerError::InvalidLoanTerms {
                message: "loan id must be positive".to_string(),
            });
        }
        if self.principal.is_zero() {
            return Err(LedgerError::InvalidLoanTerms {
                message: "principal must be positive".to_string(),
            });
        }
        if self.adjustment_interval_secs == 0 {
            return Err(LedgerError::InvalidLoanTerms {
                message: "adjustment interval must be positive".to_string(),
            });
        }
        if i64::try_from(self.adjustment_interval_secs).is_err() {
            return Err(LedgerError::InvalidLoanTerms {
                message: "adjustment interval out of range".to_string(),
            });
        }
        // the ceiling has to be representable for the life of the loan
        self.initial_rate.checked_add(self.lifetime_cap)?;
        self.initial_rate.checked_add(self.margin)?;
        Ok(())
    }
}

/// one loan record, created once and then mutated in place
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
    // identification
    pub loan_id: LoanId,
    pub document_hash: String,

    // immutable terms
    pub principal_amount: Money,
    pub initial_interest_rate: Bps,
    pub margin: Bps,
    pub lifetime_cap: Bps,
    pub adjustment_interval_secs: u64,

    // rate schedule
    pub adjusted_interest_rate: Bps,
    pub next_adjustment_date: DateTime<Utc>,
    pub adjustment_count: u32,
    pub last_adjusted_at: Option<DateTime<Utc>>,

    // settlement
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_by: Option<Address>,
    pub amount_paid: Option<Money>,

    pub originated_at: DateTime<Utc>,
}

impl LoanRecord {
    /// create record from validated terms
    pub fn new(loan_id: LoanId, terms: LoanTerms, now: DateTime<Utc>) -> Self {
        Self {
            loan_id,
            document_hash: terms.document_hash,
            principal_amount: terms.principal,
            initial_interest_rate: terms.initial_rate,
            margin: terms.margin,
            lifetime_cap: terms.lifetime_cap,
            adjustment_interval_secs: terms.adjustment_interval_secs,
            adjusted_interest_rate: terms.initial_rate,
            next_adjustment_date: terms.first_adjustment_date,
            adjustment_count: 0,
            last_adjusted_at: None,
            is_paid: false,
            paid_at: None,
            paid_by: None,
            amount_paid: None,
            originated_at: now,
        }
    }

    /// highest rate the loan may ever carry
    pub fn rate_ceiling(&self) -> Result<Bps> {
        self.initial_interest_rate.checked_add(self.lifetime_cap)
    }

    /// re-check a record loaded from outside the ledger
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| -> Result<()> {
            Err(LedgerError::InvalidLoanTerms {
                message: format!("loan {}: {}", self.loan_id, message),
            })
        };
        if self.loan_id == 0 {
            return invalid("loan id must be positive");
        }
        if self.principal_amount.is_zero() {
            return invalid("principal must be positive");
        }
        if self.adjustment_interval_secs == 0 {
            return invalid("adjustment interval must be positive");
        }
        if i64::try_from(self.adjustment_interval_secs).is_err() {
            return invalid("adjustment interval out of range");
        }
        self.initial_interest_rate.checked_add(self.margin)?;
        if self.adjusted_interest_rate > self.rate_ceiling()? {
            return invalid("adjusted rate above lifetime ceiling");
        }
        if self.is_paid != self.paid_at.is_some() {
            return invalid("settlement fields disagree with paid flag");
        }
        Ok(())
    }

    pub fn adjustment_interval(&self) -> Duration {
        // validated at origination to fit in i64
        Duration::seconds(self.adjustment_interval_secs as i64)
    }

    pub fn is_adjustment_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_adjustment_date
    }

    pub fn status(&self) -> LoanStatus {
        if self.is_paid {
            LoanStatus::Paid
        } else if self.adjustment_count > 0 {
            LoanStatus::RateAdjusted
        } else {
            LoanStatus::Created
        }
    }

    /// record a new rate and the next date, bumping the counter
    pub(crate) fn record_adjustment(
        &mut self,
        new_rate: Bps,
        next_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        self.adjusted_interest_rate = new_rate;
        self.next_adjustment_date = next_date;
        self.adjustment_count += 1;
        self.last_adjusted_at = Some(now);
    }

    /// mark the loan settled
    pub(crate) fn record_payment(&mut self, payer: Address, amount: Money, now: DateTime<Utc>) {
        self.is_paid = true;
        self.paid_at = Some(now);
        self.paid_by = Some(payer);
        self.amount_paid = Some(amount);
    }
}

/// process-wide servicing fee settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFeeConfig {
    pub service_fee_rate: FeeRate,
    pub msr_holder: Address,
}

/// everything the ledger owns, in exportable form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerState {
    /// ledger that produced this state
    #[serde(default)]
    pub ledger_id: Option<Address>,
    pub loans: BTreeMap<LoanId, LoanRecord>,
    pub fee_config: Option<ServiceFeeConfig>,
    pub events: EventLog,
}
