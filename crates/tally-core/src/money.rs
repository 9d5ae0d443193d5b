//! # Money
//!
//! Every amount in the engine (prices, line totals, tenders, change) is a
//! signed count of cents. Two places need more than addition:
//!
//! ```text
//!  cost 1000¢ ── apply_markup(2500 bps) ──► 1250¢ unit price
//!  1299¢/kg   ── multiply_weight(500 g) ──►  650¢   (649.5 rounded half up)
//! ```
//!
//! Both round half away from zero on an `i128` intermediate, so a large
//! price times a large weight cannot overflow before rounding.
//!
//! ```rust
//! use tally_core::money::Money;
//!
//! let subtotal = Money::from_cents(10099);
//! let change = Money::from_cents(15000) - subtotal;
//! assert_eq!(change.cents(), 4901);
//! assert_eq!(change.to_string(), "$49.01");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

/// Grams per kilogram; weight-sold prices are quoted per kilogram.
pub const GRAMS_PER_KG: i64 = 1000;

/// Basis points in 100%.
const BPS_SCALE: i128 = 10_000;

/// Amount in cents. Negative for refunds and payouts.
///
/// ## Where Money Flows
/// ```text
/// Product.cost + markup ──► LineItem.unit_price ──► LineItem.line_total
///                                                        │
///                        Ledger.subtotal ◄───────────────┘
///                              │
///        TenderLedger.balance_due / change_due ──► SettledTransaction
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Dollars and cents. Only `major` carries the sign:
    /// `from_major_minor(-5, 50)` is -$5.50.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(100, 99).cents(), 10099);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Whole dollars, truncated toward zero.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Cents past the dollar, 0..=99 regardless of sign.
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Subtracts `other`, flooring the result at zero.
    ///
    /// Used for balance-due style derivations where a negative remainder is
    /// expressed elsewhere (as change due).
    #[inline]
    pub fn saturating_sub_zero(self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }

    /// Line total for `qty` units.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Prices a weighed quantity when `self` is the price per kilogram.
    ///
    /// Rounds half away from zero to the cent.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let per_kg = Money::from_cents(1299); // $12.99 / kg
    /// assert_eq!(per_kg.multiply_weight(500).cents(), 650); // 649.5 -> 650
    /// assert_eq!(per_kg.multiply_weight(1000).cents(), 1299);
    /// ```
    pub fn multiply_weight(&self, grams: i64) -> Self {
        let raw = self.0 as i128 * grams as i128;
        Money(round_div(raw, GRAMS_PER_KG as i128) as i64)
    }

    /// Applies a markup expressed in basis points: `self × (1 + bps/10000)`.
    ///
    /// This is how a product's selling price is derived from its cost.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let cost = Money::from_cents(1000);
    /// assert_eq!(cost.apply_markup(2500).cents(), 1250); // 25% markup
    /// ```
    pub fn apply_markup(&self, markup_bps: u32) -> Money {
        let markup = round_div(self.0 as i128 * markup_bps as i128, BPS_SCALE);
        Money(self.0 + markup as i64)
    }
}

/// Integer division rounding half away from zero.
fn round_div(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    }
}

// =============================================================================
// Formatting and Arithmetic
// =============================================================================

/// `-$5.50` style, as printed on receipts and in logs.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}${}.{:02}",
            sign,
            self.dollars().abs(),
            self.cents_part()
        )
    }
}

/// Parses a decimal amount such as `"150"`, `"100.99"` or `"$4.5"`.
///
/// Used by the terminal's operator feed; more than two decimals is rejected.
impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim().trim_start_matches('$');
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let (major, minor) = match digits.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (digits, ""),
        };

        if major.is_empty() && minor.is_empty() {
            return Err(invalid("must not be empty"));
        }
        if !major.bytes().chain(minor.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid("not a number"));
        }
        if minor.len() > 2 {
            return Err(invalid("at most two decimal places"));
        }

        let major: i64 = if major.is_empty() {
            0
        } else {
            major.parse().map_err(|_| invalid("too large"))?
        };
        let minor: i64 = match minor.len() {
            0 => 0,
            1 => minor.parse::<i64>().map_err(|_| invalid("not a number"))? * 10,
            _ => minor.parse().map_err(|_| invalid("not a number"))?,
        };

        let cents = major
            .checked_mul(100)
            .and_then(|c| c.checked_add(minor))
            .ok_or_else(|| invalid("too large"))?;
        Ok(Money(if negative { -cents } else { cents }))
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

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts() {
        let price = Money::from_cents(4999);
        assert_eq!(price.dollars(), 49);
        assert_eq!(price.cents_part(), 99);
        assert_eq!(Money::from_cents(-205).cents_part(), 5);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_receipt_format() {
        assert_eq!(Money::from_cents(4901).to_string(), "$49.01");
        assert_eq!(Money::from_cents(-1200).to_string(), "-$12.00");
        assert_eq!(Money::zero().to_string(), "$0.00");
        assert_eq!(Money::from_cents(-7).to_string(), "-$0.07");
    }

    #[test]
    fn test_change_due_is_exact() {
        let tendered = Money::from_major_minor(150, 0);
        let due = Money::from_major_minor(100, 99);
        assert_eq!((tendered - due).cents(), 4901);
    }

    #[test]
    fn test_saturating_sub_zero() {
        let a = Money::from_cents(500);
        let b = Money::from_cents(800);
        assert_eq!(a.saturating_sub_zero(b), Money::zero());
        assert_eq!(b.saturating_sub_zero(a).cents(), 300);
    }

    #[test]
    fn test_multiply_weight_rounds_half_up() {
        let per_kg = Money::from_cents(999);
        // 999 * 250 / 1000 = 249.75 -> 250
        assert_eq!(per_kg.multiply_weight(250).cents(), 250);
        // 999 * 1 / 1000 = 0.999 -> 1
        assert_eq!(per_kg.multiply_weight(1).cents(), 1);
        assert_eq!((-per_kg).multiply_weight(500).cents(), -500);
    }

    #[test]
    fn test_apply_markup() {
        assert_eq!(Money::from_cents(1000).apply_markup(0).cents(), 1000);
        assert_eq!(Money::from_cents(333).apply_markup(5000).cents(), 500); // 166.5 -> 167
        assert_eq!(Money::from_cents(80).apply_markup(2500).cents(), 100);
    }

    #[test]
    fn test_parse() {
        assert_eq!("150".parse::<Money>().unwrap().cents(), 15000);
        assert_eq!("100.99".parse::<Money>().unwrap().cents(), 10099);
        assert_eq!("$4.5".parse::<Money>().unwrap().cents(), 450);
        assert_eq!(".25".parse::<Money>().unwrap().cents(), 25);
        assert_eq!("-3.10".parse::<Money>().unwrap().cents(), -310);
        assert!("1.999".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!("".parse::<Money>().is_err());
    }

    #[test]
    fn test_parse_rejects_signs_inside_and_overflow() {
        assert!("1.-5".parse::<Money>().is_err());
        assert!("1.+5".parse::<Money>().is_err());
        assert!("+1".parse::<Money>().is_err());
        assert!("--1".parse::<Money>().is_err());

        // Fits i64 as dollars but not as cents
        assert!("92233720368547759".parse::<Money>().is_err());
        assert!("99999999999999999999".parse::<Money>().is_err());
        assert_eq!(
            "1000000000".parse::<Money>().unwrap().cents(),
            crate::MAX_AMOUNT_CENTS
        );
    }

    #[test]
    fn test_sum() {
        let total: Money = [100, 250, 5].iter().map(|c| Money::from_cents(*c)).sum();
        assert_eq!(total.cents(), 355);
    }
}
