//! Value Objects for the storefront

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};

/// Swiss franc amount.
///
/// Kept as an exact decimal; serialised as a plain JSON number because that is
/// what the shop backend speaks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Chf(Decimal);

impl Chf {
    pub const ZERO: Chf = Chf(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(amount) }

    /// Whole francs, e.g. `Chf::francs(50)`.
    pub fn francs(amount: i64) -> Self { Self(Decimal::from(amount)) }

    /// Rappen (hundredths), e.g. `Chf::rappen(4999)` is 49.99.
    pub fn rappen(amount: i64) -> Self { Self(Decimal::new(amount, 2)) }

    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }
    pub fn is_positive(&self) -> bool { self.0 > Decimal::ZERO }

    /// Difference clamped at zero.
    pub fn saturating_sub(self, other: Chf) -> Chf {
        if other >= self { Chf::ZERO } else { Chf(self.0 - other.0) }
    }

    /// Applies a percentage rate and rounds to the rappen.
    pub fn percent(self, rate: Decimal) -> Chf {
        let raw = self.0 * rate / Decimal::ONE_HUNDRED;
        Chf(raw.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }
}

impl Add for Chf {
    type Output = Chf;
    fn add(self, rhs: Chf) -> Chf { Chf(self.0 + rhs.0) }
}

impl AddAssign for Chf {
    fn add_assign(&mut self, rhs: Chf) { self.0 += rhs.0; }
}

impl Sub for Chf {
    type Output = Chf;
    fn sub(self, rhs: Chf) -> Chf { Chf(self.0 - rhs.0) }
}

impl Mul<u32> for Chf {
    type Output = Chf;
    fn mul(self, qty: u32) -> Chf { Chf(self.0 * Decimal::from(qty)) }
}

impl Sum for Chf {
    fn sum<I: Iterator<Item = Chf>>(iter: I) -> Chf { iter.fold(Chf::ZERO, Add::add) }
}

impl From<Decimal> for Chf {
    fn from(amount: Decimal) -> Self { Self(amount) }
}

impl fmt::Display for Chf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "CHF {:.2}", self.0) }
}
