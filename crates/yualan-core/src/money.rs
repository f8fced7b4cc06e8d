//! # Money Module
//!
//! Provides the `Money` type for monetary values exchanged with payment
//! gateways.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  WHERE AMOUNTS COME FROM                                                │
//! │                                                                         │
//! │  sales.total_cents        INTEGER  ──┐                                  │
//! │  iPaymu Data.Amount       10000      ├──► Money(1_000_000)              │
//! │  Midtrans gross_amount    "10000.00" ┘                                  │
//! │                                                                         │
//! │  Gateways speak decimal text/JSON numbers. We parse the DIGITS, never  │
//! │  an f64, so "10000.10" cannot turn into 1000009 minor units.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use yualan_core::money::Money;
//!
//! let total = Money::from_major(10_000); // Rp 10.000
//! assert_eq!(total.cents(), 1_000_000);
//!
//! let paid = Money::parse_decimal("10000.00").unwrap();
//! assert!((paid - total).is_zero());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

/// Minor units per major unit (two decimal places, as stored by the POS).
const MINOR_PER_MAJOR: i64 = 100;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in minor units (1/100 of the currency unit).
///
/// The currency itself lives next to the amount (`payments.currency`); every
/// amount handled by the reconciliation core is IDR in practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole currency units.
    ///
    /// ```rust
    /// use yualan_core::money::Money;
    ///
    /// assert_eq!(Money::from_major(25_000).cents(), 2_500_000);
    /// ```
    #[inline]
    pub const fn from_major(major: i64) -> Self {
        Money(major * MINOR_PER_MAJOR)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / MINOR_PER_MAJOR
    }

    /// Returns the minor-unit portion (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % MINOR_PER_MAJOR).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Parses a decimal amount as sent by a gateway (`"10000"`, `"10000.5"`,
    /// `"10000.00"`, `"-250.75"`).
    ///
    /// Digits beyond the second decimal place are truncated. Returns `None`
    /// for anything that is not a plain decimal number.
    ///
    /// ## Example
    /// ```rust
    /// use yualan_core::money::Money;
    ///
    /// assert_eq!(Money::parse_decimal("10000").unwrap().cents(), 1_000_000);
    /// assert_eq!(Money::parse_decimal("12.5").unwrap().cents(), 1250);
    /// assert!(Money::parse_decimal("1e5").is_none());
    /// ```
    pub fn parse_decimal(text: &str) -> Option<Money> {
        let text = text.trim();
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let (whole, fraction) = match digits.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (digits, ""),
        };

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let whole: i64 = whole.parse().ok()?;
        let mut minor = 0i64;
        for (i, digit) in fraction.bytes().take(2).enumerate() {
            let value = i64::from(digit - b'0');
            minor += if i == 0 { value * 10 } else { value };
        }

        let cents = whole.checked_mul(MINOR_PER_MAJOR)?.checked_add(minor)?;
        Some(Money(if negative { -cents } else { cents }))
    }

    /// Parses an amount from a JSON value that may be a number or a string.
    ///
    /// Gateways are inconsistent here: iPaymu returns `"Amount": 10000`,
    /// Midtrans returns `"gross_amount": "10000.00"`. A gateway never reports
    /// a negative amount, so one is treated as unreadable.
    pub fn from_json(value: &serde_json::Value) -> Option<Money> {
        let amount = match value {
            serde_json::Value::Number(n) => Money::parse_decimal(&n.to_string()),
            serde_json::Value::String(s) => Money::parse_decimal(s),
            _ => None,
        }?;
        (!amount.is_negative()).then_some(amount)
    }

    /// Subtraction that returns `None` instead of overflowing.
    #[inline]
    pub const fn checked_sub(&self, other: Money) -> Option<Money> {
        match self.0.checked_sub(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Formats as a plain decimal string for gateway request bodies.
    ///
    /// ```rust
    /// use yualan_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(1_000_050).to_decimal_string(), "10000.50");
    /// ```
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{}.{:02}", sign, self.major().abs(), self.minor_part())
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display is for logs and notes; UI formatting happens in the dashboard.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rp{}", self.to_decimal_string())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
