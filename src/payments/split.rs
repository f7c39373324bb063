use serde::{Deserialize, Serialize};

use crate::decimal::{FeeRate, Money};
use crate::errors::Result;

/// division of one payment between servicer fee and msr holder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub fee: Money,
    pub remainder: Money,
}

impl FeeSplit {
    /// fee = amount * rate / 10^18 truncated, remainder = amount - fee
    ///
    /// The remainder is derived by subtraction so fee + remainder always
    /// equals the amount; truncation dust goes to the holder.
    pub fn compute(amount: Money, rate: FeeRate) -> Result<Self> {
        let fee = rate.fee_on(amount)?;
        let remainder = amount.checked_sub(fee)?;
        Ok(Self { fee, remainder })
    }

    pub fn total(&self) -> Result<Money> {
        self.fee.checked_add(self.remainder)
    }
}
