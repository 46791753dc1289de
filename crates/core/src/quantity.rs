//! Non-negative exact-decimal quantity.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Amount of material held by a lot.
///
/// Backed by [`Decimal`] so split and merge arithmetic is exact; the only way
/// to build one is through [`Quantity::new`], which rejects negatives.
///
/// `Decimal` keeps at most 28 significant digits and silently rounds results
/// that need more. The checked operations here refuse such results instead,
/// so `a + b` and `a - b` either hold exactly or yield `None`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::validation(format!(
                "quantity cannot be negative (got {value})"
            )));
        }
        // Normalize -0 to 0.
        Ok(Self(if value.is_zero() { Decimal::ZERO } else { value }))
    }

    pub fn value(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        !self.is_zero()
    }

    /// `self + other`, `None` on overflow or if the sum would be rounded.
    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        let sum = self.0.checked_add(other.0)?;
        is_exact_sum(sum, self.0, other.0).then_some(Quantity(sum))
    }

    /// `self - other`, `None` if the result would be negative or rounded.
    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        if other.0 > self.0 {
            return None;
        }
        let difference = self.0.checked_sub(other.0)?;
        is_exact_sum(self.0, difference, other.0).then_some(Quantity(difference))
    }

    /// Sum of `items`, `None` on overflow or rounding.
    pub fn checked_sum<I>(items: I) -> Option<Quantity>
    where
        I: IntoIterator<Item = Quantity>,
    {
        items
            .into_iter()
            .try_fold(Quantity::ZERO, |acc, q| acc.checked_add(q))
    }
}

/// `total == a + b` with no rounding anywhere.
///
/// A rounded total differs from the exact sum by less than one unit in its
/// last place, so subtracting the addends back out cannot reproduce both of
/// them.
fn is_exact_sum(total: Decimal, a: Decimal, b: Decimal) -> bool {
    total.checked_sub(a) == Some(b) && total.checked_sub(b) == Some(a)
}

impl TryFrom<Decimal> for Quantity {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0.normalize(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_negative_values() {
        assert!(Quantity::new(dec!(-0.001)).is_err());
        assert!(Quantity::new(dec!(0)).is_ok());
    }

    #[test]
    fn subtraction_never_goes_negative() {
        let q = Quantity::new(dec!(10.5)).unwrap();
        assert_eq!(q.checked_sub(Quantity::new(dec!(10.5)).unwrap()), Some(Quantity::ZERO));
        assert_eq!(q.checked_sub(Quantity::new(dec!(10.51)).unwrap()), None);
    }

    #[test]
    fn sum_is_exact() {
        let parts = [dec!(0.1), dec!(0.2), dec!(0.7)]
            .into_iter()
            .map(|d| Quantity::new(d).unwrap());
        assert_eq!(Quantity::checked_sum(parts).unwrap().value(), dec!(1.0));
    }

    #[test]
    fn addition_refuses_to_round_away_a_tiny_addend() {
        let big = Quantity::new(dec!(10000000000)).unwrap();
        let tiny = Quantity::new(Decimal::new(1, 28)).unwrap();
        assert_eq!(big.checked_add(tiny), None);
        assert_eq!(Quantity::checked_sum([big, tiny]), None);
    }

    #[test]
    fn subtraction_refuses_to_round_the_difference() {
        let hundred = Quantity::new(dec!(100)).unwrap();
        let tiny = Quantity::new(Decimal::new(1, 28)).unwrap();
        assert_eq!(hundred.checked_sub(tiny), None);

        // 28 significant digits still fit.
        let small = Quantity::new(dec!(1)).unwrap();
        let fine = Quantity::new(Decimal::new(1, 27)).unwrap();
        let rest = small.checked_sub(fine).unwrap();
        assert_eq!(rest.value(), dec!(0.999999999999999999999999999));
    }

    #[test]
    fn differing_scales_add_exactly() {
        let a = Quantity::new(dec!(1.10)).unwrap();
        let b = Quantity::new(dec!(2.2)).unwrap();
        assert_eq!(a.checked_add(b).unwrap().value(), dec!(3.3));
    }

    #[test]
    fn deserialization_enforces_non_negative() {
        let ok: Quantity = serde_json::from_str("\"12.5\"").unwrap();
        assert_eq!(ok.value(), dec!(12.5));
        assert!(serde_json::from_str::<Quantity>("\"-1\"").is_err());
    }
}
