use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::Address;

/// outbound value transfer capability used at settlement
///
/// Implementations hand value to recipients and may run arbitrary code while
/// doing so. The ledger commits loan state before it calls `transfer_all`.
pub trait FundsTransfer {
    /// deliver every leg or none of them
    fn transfer_all(&mut self, legs: &[TransferRecord]) -> Result<()>;
}

/// one completed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub to: Address,
    pub amount: Money,
}

/// in-memory balances for tests and demos
#[derive(Debug, Clone, Default)]
pub struct InMemoryTreasury {
    balances: BTreeMap<Address, Money>,
    transfers: Vec<TransferRecord>,
    rejecting: BTreeSet<Address>,
}

impl InMemoryTreasury {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, address: &Address) -> Money {
        self.balances.get(address).copied().unwrap_or(Money::ZERO)
    }

    pub fn transfers(&self) -> &[TransferRecord] {
        &self.transfers
    }

    /// make every send to `address` fail, e.g. a recipient that reverts
    pub fn reject_transfers_to(&mut self, address: Address) {
        self.rejecting.insert(address);
    }

    pub fn accept_transfers_to(&mut self, address: &Address) {
        self.rejecting.remove(address);
    }
}

impl FundsTransfer for InMemoryTreasury {
    fn transfer_all(&mut self, legs: &[TransferRecord]) -> Result<()> {
        // stage on a copy so a failing leg leaves no trace
        let mut staged = self.balances.clone();
        for leg in legs {
            if self.rejecting.contains(&leg.to) {
                return Err(LedgerError::TransferFailed {
                    recipient: leg.to,
                    message: "recipient rejected transfer".to_string(),
                });
            }
            let current = staged.get(&leg.to).copied().unwrap_or(Money::ZERO);
            staged.insert(leg.to, current.checked_add(leg.amount)?);
        }
        self.balances = staged;
        self.transfers.extend_from_slice(legs);
        Ok(())
    }
}
