use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::errors::{LedgerError, Result};

/// denominator for basis-point arithmetic
pub const BPS_DENOMINATOR: u128 = 10_000;

/// denominator for the service fee rate (18-decimal fixed point)
pub const FEE_DENOMINATOR: u128 = 1_000_000_000_000_000_000;

/// exact amount in minor units (wei, cents, satoshis)
///
/// All arithmetic is integer and checked. Division truncates toward zero and
/// overflow surfaces as `ArithmeticOverflow` instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(u128);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(amount: u128) -> Self {
        Money(amount)
    }

    pub const fn minor(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Money) -> Result<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or(LedgerError::ArithmeticOverflow { operation: "money add" })
    }

    pub fn checked_sub(self, other: Money) -> Result<Money> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or(LedgerError::ArithmeticOverflow { operation: "money sub" })
    }

    /// floor(self * numerator / denominator) without an intermediate overflow
    ///
    /// Splits self into quotient and remainder over the denominator so only
    /// `remainder * numerator` has to fit, which it does for any numerator up
    /// to the denominator.
    pub fn mul_div(self, numerator: u128, denominator: u128) -> Result<Money> {
        if denominator == 0 {
            return Err(LedgerError::ArithmeticOverflow { operation: "division by zero" });
        }
        let overflow = LedgerError::ArithmeticOverflow { operation: "money mul_div" };
        let quotient = self.0 / denominator;
        let remainder = self.0 % denominator;

        let whole = quotient.checked_mul(numerator).ok_or(overflow.clone())?;
        let fraction = remainder.checked_mul(numerator).ok_or(overflow.clone())? / denominator;

        whole.checked_add(fraction).map(Money).ok_or(overflow)
    }

    /// value in major units for reporting, e.g. `as_major(18)` for ether
    pub fn as_major(&self, scale: u32) -> Option<Decimal> {
        let raw = i128::try_from(self.0).ok()?;
        Decimal::try_from_i128_with_scale(raw, scale).ok().map(|d| d.normalize())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse::<u128>().map(Money)
    }
}

impl From<u64> for Money {
    fn from(amount: u64) -> Self {
        Money(amount as u128)
    }
}

impl From<u32> for Money {
    fn from(amount: u32) -> Self {
        Money(amount as u128)
    }
}

// amounts travel as strings so 18-decimal values survive json consumers
impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// interest rate in basis points (1 bps = 0.01%)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Bps(u32);

impl Bps {
    pub const ZERO: Bps = Bps(0);

    pub const fn new(bps: u32) -> Self {
        Bps(bps)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }

    pub fn checked_add(self, other: Bps) -> Result<Bps> {
        self.0
            .checked_add(other.0)
            .map(Bps)
            .ok_or(LedgerError::ArithmeticOverflow { operation: "bps add" })
    }

    /// as percentage, e.g. 250 bps -> 2.50
    pub fn as_percentage(&self) -> Decimal {
        Decimal::new(self.0 as i64, 2)
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

impl From<u32> for Bps {
    fn from(bps: u32) -> Self {
        Bps(bps)
    }
}

/// service fee rate as an 18-decimal fraction of each payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FeeRate(u128);

impl FeeRate {
    pub const ZERO: FeeRate = FeeRate(0);

    /// rejects rates above 100%
    pub fn new(raw: u128) -> Result<Self> {
        if raw > FEE_DENOMINATOR {
            return Err(LedgerError::InvalidFeeRate { rate: raw });
        }
        Ok(FeeRate(raw))
    }

    /// from basis points, e.g. 100 -> 1%
    pub fn from_bps(bps: u32) -> Result<Self> {
        let raw = (bps as u128)
            .checked_mul(FEE_DENOMINATOR / BPS_DENOMINATOR)
            .ok_or(LedgerError::ArithmeticOverflow { operation: "fee rate from bps" })?;
        FeeRate::new(raw)
    }

    pub const fn raw(&self) -> u128 {
        self.0
    }

    /// fee owed on an amount, truncated
    pub fn fee_on(&self, amount: Money) -> Result<Money> {
        amount.mul_div(self.0, FEE_DENOMINATOR)
    }

    /// as percentage, e.g. 10^16 -> 1
    pub fn as_percentage(&self) -> Decimal {
        // bounded by FEE_DENOMINATOR so this always fits in 96 bits
        Decimal::from_i128_with_scale(self.0 as i128, 16).normalize()
    }

    /// 32-byte big-endian encoding used in signed governance messages
    pub fn to_be_bytes32(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[16..].copy_from_slice(&self.0.to_be_bytes());
        out
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage())
    }
}

impl Serialize for FeeRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for FeeRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let value: u128 = raw.trim().parse().map_err(serde::de::Error::custom)?;
        FeeRate::new(value).map_err(serde::de::Error::custom)
    }
}
