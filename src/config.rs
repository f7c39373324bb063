use serde::{Deserialize, Serialize};

use crate::decimal::FeeRate;
use crate::errors::{LedgerError, Result};
use crate::types::Address;

/// immutable bootstrap configuration for a ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// identity of the ledger itself, bound into signed governance messages
    pub ledger_id: Address,
    pub servicer: Address,
    pub originator: Address,
    /// initial mortgage-servicing-rights holder, defaults to the servicer
    #[serde(default)]
    pub msr_holder: Option<Address>,
    #[serde(default)]
    pub service_fee_rate: FeeRate,
    #[serde(default)]
    pub policy: LedgerPolicy,
}

/// choices the loan rules leave to the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPolicy {
    pub owed_amount: OwedAmountPolicy,
    /// keep adjusting rates on loans that are already paid
    pub allow_adjustment_after_paid: bool,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            owed_amount: OwedAmountPolicy::PrincipalPlusInterest,
            allow_adjustment_after_paid: false,
        }
    }
}

/// what a single settling payment has to cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwedAmountPolicy {
    /// principal + principal * adjusted rate / 10000
    PrincipalPlusInterest,
    /// principal only
    PrincipalOnly,
}

impl LedgerConfig {
    pub fn new(ledger_id: Address, servicer: Address, originator: Address) -> Self {
        Self {
            ledger_id,
            servicer,
            originator,
            msr_holder: None,
            service_fee_rate: FeeRate::ZERO,
            policy: LedgerPolicy::default(),
        }
    }

    pub fn with_msr_holder(mut self, holder: Address) -> Self {
        self.msr_holder = Some(holder);
        self
    }

    pub fn with_service_fee_rate(mut self, rate: FeeRate) -> Self {
        self.service_fee_rate = rate;
        self
    }

    pub fn with_policy(mut self, policy: LedgerPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// holder that receives payment remainders until the first transfer
    pub fn initial_msr_holder(&self) -> Address {
        self.msr_holder.unwrap_or(self.servicer)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: LedgerConfig = serde_json::from_str(json).map_err(|e| {
            LedgerError::InvalidConfiguration {
                message: e.to_string(),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let named = [
            ("ledger_id", self.ledger_id),
            ("servicer", self.servicer),
            ("originator", self.originator),
            ("msr_holder", self.initial_msr_holder()),
        ];
        for (name, address) in named {
            if address == Address::ZERO {
                return Err(LedgerError::InvalidConfiguration {
                    message: format!("{} must not be the zero address", name),
                });
            }
        }
        Ok(())
    }
}
