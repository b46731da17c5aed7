//! # Transaction Fees
//!
//! Fees are carried as integer wei ([`Wei`]). Callers express a fee cap as a
//! decimal ether string (`"0.005"`), which is parsed exactly: no floating
//! point is involved anywhere between the request body and the comparison
//! against `gas × gasPrice`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Wei per ether.
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;
const ETHER_DECIMALS: usize = 18;

/// Safety margin applied to gas estimates, in percent.
pub const GAS_MARGIN_PERCENT: u64 = 110;

/// An amount of wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Wei(pub u128);

/// Errors parsing an ether amount or an RPC quantity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeeParseError {
    #[error("empty amount")]
    Empty,
    #[error("invalid character in amount {0:?}")]
    InvalidDigit(String),
    #[error("amount {0:?} has more than 18 decimal places")]
    TooPrecise(String),
    #[error("amount {0:?} is out of range")]
    Overflow(String),
}

impl Wei {
    pub const ZERO: Self = Self(0);

    /// Parse a decimal ether amount such as `"0.005"` or `"2"`.
    pub fn parse_ether(s: &str) -> Result<Self, FeeParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(FeeParseError::Empty);
        }
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(FeeParseError::InvalidDigit(s.to_string()));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(FeeParseError::InvalidDigit(s.to_string()));
        }
        if frac.len() > ETHER_DECIMALS {
            return Err(FeeParseError::TooPrecise(s.to_string()));
        }
        let overflow = || FeeParseError::Overflow(s.to_string());
        let whole_wei = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u128>()
                .map_err(|_| overflow())?
                .checked_mul(WEI_PER_ETHER)
                .ok_or_else(overflow)?
        };
        let frac_wei = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<width$}", width = ETHER_DECIMALS);
            padded.parse::<u128>().map_err(|_| overflow())?
        };
        whole_wei
            .checked_add(frac_wei)
            .map(Self)
            .ok_or_else(overflow)
    }

    /// Parse a JSON-RPC hex quantity (`"0x3b9aca00"`).
    pub fn from_quantity(s: &str) -> Result<Self, FeeParseError> {
        parse_quantity(s).map(Self)
    }

    /// Render as a JSON-RPC hex quantity.
    pub fn to_quantity(self) -> String {
        format!("{:#x}", self.0)
    }

    pub fn checked_mul(self, rhs: u128) -> Option<Self> {
        self.0.checked_mul(rhs).map(Self)
    }
}

/// Render as a decimal ether amount with trailing zeros trimmed.
impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / WEI_PER_ETHER;
        let frac = self.0 % WEI_PER_ETHER;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:0>width$}", width = ETHER_DECIMALS);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Wei {
    type Err = FeeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_ether(s)
    }
}

/// Parse a JSON-RPC hex quantity into an integer.
pub fn parse_quantity(s: &str) -> Result<u128, FeeParseError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| FeeParseError::InvalidDigit(s.to_string()))?;
    if digits.is_empty() {
        return Err(FeeParseError::Empty);
    }
    u128::from_str_radix(digits, 16).map_err(|e| match e.kind() {
        std::num::IntErrorKind::PosOverflow => FeeParseError::Overflow(s.to_string()),
        _ => FeeParseError::InvalidDigit(s.to_string()),
    })
}

/// Inflate a gas estimate by [`GAS_MARGIN_PERCENT`].
pub fn with_gas_margin(estimate: u64) -> u64 {
    let inflated = u128::from(estimate) * u128::from(GAS_MARGIN_PERCENT) / 100;
    u64::try_from(inflated).unwrap_or(u64::MAX)
}

/// `gas × price`, or `None` on overflow.
pub fn estimated_fee(gas: u64, price: Wei) -> Option<Wei> {
    price.checked_mul(u128::from(gas))
}
