use crate::errors::SwapError;
use alloy::primitives::U256;
use serde::{Serialize, Serializer};
use std::{cmp::Ordering, fmt};

/// Fractional digits used when rendering balances.
pub const BALANCE_DISPLAY_DIGITS: usize = 6;

/// Largest token precision whose scale `10^decimals` fits in a `U256`.
pub const MAX_DECIMALS: u8 = 77;

fn invalid(msg: impl Into<String>) -> SwapError {
    SwapError::InvalidAmount(msg.into())
}

fn scale_for(decimals: u8) -> Result<U256, SwapError> {
    U256::from(10_u64)
        .checked_pow(U256::from(decimals))
        .ok_or_else(|| invalid(format!("decimals too large ({decimals})")))
}

/// Parse a human decimal amount (e.g. `"1.5"`) into base units at `decimals` precision.
///
/// Fractional digits beyond the token precision are truncated, not rejected.
pub fn to_base_units(s: &str, decimals: u8) -> Result<U256, SwapError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(invalid("empty amount"));
    }
    if s.starts_with('-') {
        return Err(invalid("amount must be non-negative"));
    }

    let (whole, frac) = match s.split_once('.') {
        Some((a, b)) => (a, b),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid(format!("not a number: {s}")));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid(format!("not a number: {s}")));
    }

    let scale = scale_for(decimals)?;
    let whole_v = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10).map_err(|e| invalid(format!("parse whole: {e}")))?
    };

    let keep = frac.len().min(usize::from(decimals));
    let mut frac_s: String = frac.chars().take(keep).collect();
    while frac_s.len() < usize::from(decimals) {
        frac_s.push('0');
    }
    let frac_v = if frac_s.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(&frac_s, 10).map_err(|e| invalid(format!("parse fraction: {e}")))?
    };

    whole_v
        .checked_mul(scale)
        .and_then(|x| x.checked_add(frac_v))
        .ok_or_else(|| invalid("amount overflow"))
}

/// Split a base-unit integer into its whole part and a zero-padded fraction of `decimals` digits.
fn split_base(base: U256, decimals: u8) -> (String, String) {
    let digits = base.to_string();
    let d = usize::from(decimals);
    if d == 0 {
        return (digits, String::new());
    }
    let padded = if digits.len() <= d {
        format!("{}{digits}", "0".repeat(d + 1 - digits.len()))
    } else {
        digits
    };
    let split = padded.len() - d;
    let (whole, frac) = padded.split_at(split);
    (whole.to_owned(), frac.to_owned())
}

/// Render base units as a decimal string with trailing fractional zeros removed.
///
/// Examples:
/// - base=1500000, decimals=6 => "1.5"
/// - base=1, decimals=6 => "0.000001"
pub fn to_decimal_string(base: U256, decimals: u8) -> String {
    let (whole, frac) = split_base(base, decimals);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole
    } else {
        format!("{whole}.{frac}")
    }
}

/// Render base units with exactly `digits` fractional digits (truncating, never rounding up).
pub fn to_fixed_string(base: U256, decimals: u8, digits: usize) -> String {
    let (whole, frac) = split_base(base, decimals);
    if digits == 0 {
        return whole;
    }
    let mut frac: String = frac.chars().take(digits).collect();
    while frac.len() < digits {
        frac.push('0');
    }
    format!("{whole}.{frac}")
}

/// An on-chain quantity that carries its own decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenAmount {
    base: U256,
    decimals: u8,
}

impl TokenAmount {
    pub const fn from_base(base: U256, decimals: u8) -> Self {
        Self { base, decimals }
    }

    pub const fn zero(decimals: u8) -> Self {
        Self {
            base: U256::ZERO,
            decimals,
        }
    }

    pub fn parse(s: &str, decimals: u8) -> Result<Self, SwapError> {
        Ok(Self {
            base: to_base_units(s, decimals)?,
            decimals,
        })
    }

    pub const fn base(&self) -> U256 {
        self.base
    }

    pub const fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_zero(&self) -> bool {
        self.base.is_zero()
    }

    /// Fixed six-digit rendering used for balances.
    pub fn to_display(&self) -> String {
        to_fixed_string(self.base, self.decimals, BALANCE_DISPLAY_DIGITS)
    }

    /// Compare two amounts, rescaling to the finer precision when they differ.
    pub fn cmp_value(&self, other: &Self) -> Ordering {
        if self.decimals == other.decimals {
            return self.base.cmp(&other.base);
        }
        let (a, b) = if self.decimals < other.decimals {
            (
                rescale(self.base, other.decimals - self.decimals),
                Some(other.base),
            )
        } else {
            (
                Some(self.base),
                rescale(other.base, self.decimals - other.decimals),
            )
        };
        match (a, b) {
            (Some(a), Some(b)) => a.cmp(&b),
            // Overflow on rescale means that side is larger than anything representable.
            (None, _) => Ordering::Greater,
            (_, None) => Ordering::Less,
        }
    }
}

fn rescale(base: U256, extra_decimals: u8) -> Option<U256> {
    U256::from(10_u64)
        .checked_pow(U256::from(extra_decimals))
        .and_then(|s| base.checked_mul(s))
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_decimal_string(self.base, self.decimals))
    }
}

/// Serialized as its decimal string, the form callers display.
impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
