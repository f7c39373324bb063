pub mod split;
pub mod transfer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OwedAmountPolicy;
use crate::decimal::{FeeRate, Money};
use crate::errors::{LedgerError, Result};
use crate::interest::amount_owed;
use crate::state::LoanRecord;
use crate::types::{Address, LoanId};

pub use split::FeeSplit;
pub use transfer::{FundsTransfer, InMemoryTreasury, TransferRecord};

/// incoming payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub loan_id: LoanId,
    pub payer: Address,
    pub amount: Money,
}

/// settled payment, returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub loan_id: LoanId,
    pub payer: Address,
    pub amount: Money,
    pub owed: Money,
    pub split: FeeSplit,
    pub servicer: Address,
    pub msr_holder: Address,
    pub paid_at: DateTime<Utc>,
}

/// payment sufficiency and fee split rules
#[derive(Debug, Clone, Copy)]
pub struct PaymentProcessor {
    policy: OwedAmountPolicy,
}

impl PaymentProcessor {
    pub fn new(policy: OwedAmountPolicy) -> Self {
        Self { policy }
    }

    /// check the payment can settle the loan, returns the amount owed
    pub fn validate(&self, loan: &LoanRecord, amount: Money) -> Result<Money> {
        if loan.is_paid {
            return Err(LedgerError::LoanAlreadyPaid {
                loan_id: loan.loan_id,
            });
        }

        let owed = amount_owed(loan, self.policy)?;
        if amount < owed {
            return Err(LedgerError::InsufficientPayment {
                loan_id: loan.loan_id,
                owed,
                provided: amount,
            });
        }
        Ok(owed)
    }

    pub fn split(&self, amount: Money, rate: FeeRate) -> Result<FeeSplit> {
        let split = FeeSplit::compute(amount, rate)?;
        debug!(%amount, fee = %split.fee, remainder = %split.remainder, "fee split computed");
        Ok(split)
    }

    /// pay out a committed settlement: fee to servicer, remainder to holder
    ///
    /// The loan must already be marked paid. That guard is checked right
    /// before the transfer call so a payout can never run ahead of the state
    /// commit. Zero-value legs are skipped.
    pub fn disburse(
        &self,
        loan: &LoanRecord,
        receipt: &PaymentReceipt,
        transfer: &mut dyn FundsTransfer,
    ) -> Result<()> {
        let legs: Vec<TransferRecord> = [
            (receipt.servicer, receipt.split.fee),
            (receipt.msr_holder, receipt.split.remainder),
        ]
        .into_iter()
        .filter(|(_, amount)| !amount.is_zero())
        .map(|(to, amount)| TransferRecord { to, amount })
        .collect();

        if !loan.is_paid {
            return Err(LedgerError::SettlementNotCommitted {
                loan_id: loan.loan_id,
            });
        }
        if legs.is_empty() {
            return Ok(());
        }
        transfer.transfer_all(&legs)
    }
}
