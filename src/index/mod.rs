use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, Result};

/// client for the external consumer price index oracle
///
/// The ledger only reads from it. Both values are read inside the same
/// operation that commits the adjusted rate.
pub trait PriceIndex {
    /// latest published index value
    fn current_index(&self) -> Result<u64>;

    /// reference value the loan rates are indexed against
    fn base_index(&self) -> Result<u64>;

    /// both values in one step
    fn read(&self) -> Result<IndexReading> {
        let reading = IndexReading {
            current: self.current_index()?,
            base: self.base_index()?,
        };
        reading.validate()?;
        Ok(reading)
    }
}

/// a consistent pair of index values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReading {
    pub current: u64,
    pub base: u64,
}

impl IndexReading {
    pub fn validate(&self) -> Result<()> {
        if self.base == 0 {
            return Err(LedgerError::InvalidIndex {
                message: "base index is zero".to_string(),
            });
        }
        Ok(())
    }
}

/// mock index for tests and demos
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockPriceIndex {
    current: u64,
    base: u64,
    history: Vec<u64>,
}

impl MockPriceIndex {
    pub fn new(base: u64, current: u64) -> Self {
        Self {
            current,
            base,
            history: vec![current],
        }
    }

    /// publish a new current value
    pub fn set_current(&mut self, current: u64) {
        self.current = current;
        self.history.push(current);

        // keep only the last 100 publications
        if self.history.len() > 100 {
            self.history.remove(0);
        }
    }

    pub fn set_base(&mut self, base: u64) {
        self.base = base;
    }

    pub fn history(&self) -> &[u64] {
        &self.history
    }
}

impl PriceIndex for MockPriceIndex {
    fn current_index(&self) -> Result<u64> {
        Ok(self.current)
    }

    fn base_index(&self) -> Result<u64> {
        Ok(self.base)
    }
}
