pub mod adjustment;

use crate::config::OwedAmountPolicy;
use crate::decimal::{Bps, Money, BPS_DENOMINATOR};
use crate::errors::Result;
use crate::state::LoanRecord;

pub use adjustment::{AdjustmentEngine, RateAdjustment};

/// principal * rate / 10000, truncated
pub fn simple_interest(principal: Money, rate: Bps) -> Result<Money> {
    principal.mul_div(rate.value() as u128, BPS_DENOMINATOR)
}

/// amount a single settling payment must cover under the given policy
pub fn amount_owed(loan: &LoanRecord, policy: OwedAmountPolicy) -> Result<Money> {
    match policy {
        OwedAmountPolicy::PrincipalOnly => Ok(loan.principal_amount),
        OwedAmountPolicy::PrincipalPlusInterest => {
            let interest = simple_interest(loan.principal_amount, loan.adjusted_interest_rate)?;
            loan.principal_amount.checked_add(interest)
        }
    }
}
