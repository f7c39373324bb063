use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decimal::{Bps, BPS_DENOMINATOR};
use crate::errors::{LedgerError, Result};
use crate::index::IndexReading;
use crate::state::LoanRecord;

/// outcome of one rate reset, before it is committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateAdjustment {
    /// index movement since base, in bps; negative when the index fell
    pub index_delta_bps: i128,
    /// initial + margin + delta, before bounds
    pub candidate_rate: i128,
    pub floor: Bps,
    pub ceiling: Bps,
    pub new_rate: Bps,
    pub next_adjustment_date: DateTime<Utc>,
}

impl RateAdjustment {
    pub fn was_capped(&self) -> bool {
        self.candidate_rate > self.ceiling.value() as i128
    }

    pub fn was_floored(&self) -> bool {
        self.candidate_rate < self.floor.value() as i128
    }
}

/// index-linked rate reset
///
/// new rate = initial + margin + delta, bounded below by initial + margin and
/// above by initial + lifetime cap. When margin exceeds the cap the ceiling
/// wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdjustmentEngine;

impl AdjustmentEngine {
    pub fn new() -> Self {
        Self
    }

    /// ((current - base) * 10000) / base, truncated toward zero
    pub fn index_delta_bps(&self, reading: IndexReading) -> Result<i128> {
        reading.validate()?;
        let change = reading.current as i128 - reading.base as i128;
        let scaled = change
            .checked_mul(BPS_DENOMINATOR as i128)
            .ok_or(LedgerError::ArithmeticOverflow { operation: "index delta" })?;
        Ok(scaled / reading.base as i128)
    }

    /// compute the next rate and date for a loan without touching it
    pub fn compute(&self, loan: &LoanRecord, reading: IndexReading) -> Result<RateAdjustment> {
        let delta = self.index_delta_bps(reading)?;

        let ceiling = loan.rate_ceiling()?;
        let base_rate = loan.initial_interest_rate.checked_add(loan.margin)?;
        let floor = base_rate.min(ceiling);

        let candidate = base_rate.value() as i128 + delta;
        let bounded = candidate.clamp(floor.value() as i128, ceiling.value() as i128);
        let new_rate = u32::try_from(bounded)
            .map(Bps::new)
            .map_err(|_| LedgerError::ArithmeticOverflow { operation: "adjusted rate" })?;

        let next_adjustment_date = self.next_date(loan)?;

        debug!(
            loan_id = loan.loan_id,
            delta,
            candidate,
            %new_rate,
            "rate adjustment computed"
        );

        Ok(RateAdjustment {
            index_delta_bps: delta,
            candidate_rate: candidate,
            floor,
            ceiling,
            new_rate,
            next_adjustment_date,
        })
    }

    /// current next date pushed out by exactly one interval
    pub fn next_date(&self, loan: &LoanRecord) -> Result<DateTime<Utc>> {
        loan.next_adjustment_date
            .checked_add_signed(loan.adjustment_interval())
            .ok_or(LedgerError::ArithmeticOverflow { operation: "next adjustment date" })
    }
}
