/// serialization support for the ledger
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Bps, FeeRate, Money};
use crate::errors::{LedgerError, Result};
use crate::index::PriceIndex;
use crate::ledger::Ledger;
use crate::state::LoanRecord;
use crate::types::{Address, LoanId, LoanStatus};

/// serializable view of one loan
#[derive(Debug, Serialize, Deserialize)]
pub struct LoanView {
    pub loan_id: LoanId,
    pub document_hash: String,
    pub status: LoanStatus,
    pub principal: Money,
    pub rates: RateView,
    pub schedule: ScheduleView,
    pub settlement: SettlementView,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RateView {
    pub initial_bps: Bps,
    pub adjusted_bps: Bps,
    pub margin_bps: Bps,
    pub ceiling_bps: Bps,
    pub adjusted_percentage: Decimal,
    pub ceiling_percentage: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleView {
    pub originated_at: DateTime<Utc>,
    pub next_adjustment_date: DateTime<Utc>,
    pub adjustment_interval_secs: u64,
    pub adjustment_count: u32,
    pub last_adjusted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SettlementView {
    pub amount_owed: Money,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_by: Option<Address>,
    pub amount_paid: Option<Money>,
}

/// serializable view of the whole ledger
#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerView {
    pub ledger_id: Address,
    pub servicer: Address,
    pub originator: Address,
    pub msr_holder: Address,
    pub service_fee_rate: FeeRate,
    pub service_fee_percentage: Decimal,
    pub loans: Vec<LoanView>,
    pub event_count: usize,
    /// hex hash of the newest event log entry
    pub event_head: String,
}

impl LoanView {
    pub fn from_record(loan: &LoanRecord, amount_owed: Money) -> Result<Self> {
        let ceiling = loan.rate_ceiling()?;
        Ok(LoanView {
            loan_id: loan.loan_id,
            document_hash: loan.document_hash.clone(),
            status: loan.status(),
            principal: loan.principal_amount,
            rates: RateView {
                initial_bps: loan.initial_interest_rate,
                adjusted_bps: loan.adjusted_interest_rate,
                margin_bps: loan.margin,
                ceiling_bps: ceiling,
                adjusted_percentage: loan.adjusted_interest_rate.as_percentage(),
                ceiling_percentage: ceiling.as_percentage(),
            },
            schedule: ScheduleView {
                originated_at: loan.originated_at,
                next_adjustment_date: loan.next_adjustment_date,
                adjustment_interval_secs: loan.adjustment_interval_secs,
                adjustment_count: loan.adjustment_count,
                last_adjusted_at: loan.last_adjusted_at,
            },
            settlement: SettlementView {
                amount_owed,
                is_paid: loan.is_paid,
                paid_at: loan.paid_at,
                paid_by: loan.paid_by,
                amount_paid: loan.amount_paid,
            },
        })
    }
}

impl LedgerView {
    pub fn from_ledger<P: PriceIndex>(ledger: &Ledger<P>) -> Result<Self> {
        let loans = ledger
            .loans()
            .map(|loan| LoanView::from_record(loan, ledger.amount_owed(loan.loan_id)?))
            .collect::<Result<Vec<_>>>()?;

        Ok(LedgerView {
            ledger_id: ledger.ledger_id(),
            servicer: ledger.servicer(),
            originator: ledger.originator(),
            msr_holder: ledger.msr_holder(),
            service_fee_rate: ledger.service_fee_rate(),
            service_fee_percentage: ledger.service_fee_rate().as_percentage(),
            loans,
            event_count: ledger.events().len(),
            event_head: hex::encode(ledger.events().latest_hash()),
        })
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| LedgerError::Serialization {
            message: e.to_string(),
        })
    }
}

impl<P: PriceIndex> Ledger<P> {
    /// human-readable snapshot of every loan and the fee config
    pub fn to_json(&self) -> Result<String> {
        LedgerView::from_ledger(self)?.to_json_pretty()
    }

    /// event log with hashes, for external auditors
    pub fn events_to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self.events()).map_err(|e| LedgerError::Serialization {
            message: e.to_string(),
        })
    }
}
