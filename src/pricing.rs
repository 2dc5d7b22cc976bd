//! Shipping and tax for a cart subtotal.

use rust_decimal::Decimal;
use serde::Serialize;
use crate::Chf;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricingPolicy {
    /// Subtotals at or above this ship for free.
    pub free_shipping_threshold: Chf,
    pub flat_shipping_fee: Chf,
    /// Percent applied to the subtotal; zero disables tax.
    pub tax_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self { free_shipping_threshold: Chf::francs(50), flat_shipping_fee: Chf::francs(8), tax_rate: Decimal::ZERO }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub subtotal: Chf,
    pub shipping: Chf,
    pub tax: Chf,
    pub total: Chf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    #[serde(flatten)]
    pub totals: Totals,
    pub remaining_for_free_shipping: Chf,
}

impl PricingPolicy {
    pub fn shipping_for(&self, subtotal: Chf) -> Chf {
        if subtotal >= self.free_shipping_threshold { Chf::ZERO } else { self.flat_shipping_fee }
    }

    pub fn tax_for(&self, subtotal: Chf) -> Chf {
        if self.tax_rate.is_zero() { Chf::ZERO } else { subtotal.percent(self.tax_rate) }
    }

    pub fn totals(&self, subtotal: Chf) -> Totals {
        let shipping = self.shipping_for(subtotal);
        let tax = self.tax_for(subtotal);
        Totals { subtotal, shipping, tax, total: subtotal + shipping + tax }
    }

    pub fn remaining_for_free_shipping(&self, subtotal: Chf) -> Chf {
        self.free_shipping_threshold.saturating_sub(subtotal)
    }

    pub fn quote(&self, subtotal: Chf) -> Quote {
        Quote { totals: self.totals(subtotal), remaining_for_free_shipping: self.remaining_for_free_shipping(subtotal) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_shipping_boundary() {
        let policy = PricingPolicy::default();
        assert_eq!(policy.shipping_for(Chf::rappen(4999)), Chf::francs(8));
        assert_eq!(policy.shipping_for(Chf::francs(50)), Chf::ZERO);
        assert_eq!(policy.remaining_for_free_shipping(Chf::rappen(4999)), Chf::rappen(1));
        assert_eq!(policy.remaining_for_free_shipping(Chf::francs(80)), Chf::ZERO);
    }

    #[test]
    fn test_totals_without_tax() {
        let t = PricingPolicy::default().totals(Chf::rappen(3990));
        assert_eq!(t.tax, Chf::ZERO);
        assert_eq!(t.total, Chf::rappen(4790));
        assert_eq!(t.total, t.subtotal + t.shipping + t.tax);
    }

    #[test]
    fn test_totals_with_mwst() {
        let policy = PricingPolicy { tax_rate: Decimal::new(77, 1), ..PricingPolicy::default() };
        let t = policy.totals(Chf::francs(100));
        assert_eq!(t.tax, Chf::rappen(770));
        assert_eq!(t.shipping, Chf::ZERO);
        assert_eq!(t.total, Chf::rappen(10770));
    }
}
