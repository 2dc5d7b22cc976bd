//! Cart Aggregate

use serde::{Deserialize, Serialize};
use crate::domain::value_objects::Chf;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: String,
    pub name: String,
    pub price: Chf,
    pub image: String,
    pub quantity: u32,
}

impl CartItem {
    pub fn line_total(&self) -> Chf { self.price * self.quantity }
}

/// A product as it enters the cart, before it has a quantity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewCartItem {
    pub id: String,
    pub name: String,
    pub price: Chf,
    #[serde(default)]
    pub image: String,
}

/// Line items keyed by product id. Every item present has a quantity of at least one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    /// Rebuilds a cart from stored lines, merging duplicates and dropping empty lines.
    pub fn from_items(items: impl IntoIterator<Item = CartItem>) -> Self {
        let mut cart = Self::new();
        for item in items.into_iter().filter(|i| i.quantity > 0) {
            match cart.items.iter_mut().find(|i| i.id == item.id) {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(item.quantity),
                None => cart.items.push(item),
            }
        }
        cart
    }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn item(&self, id: &str) -> Option<&CartItem> { self.items.iter().find(|i| i.id == id) }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn add(&mut self, item: NewCartItem) {
        if let Some(existing) = self.items.iter_mut().find(|i| i.id == item.id) {
            existing.quantity = existing.quantity.saturating_add(1);
        } else {
            self.items.push(CartItem { id: item.id, name: item.name, price: item.price, image: item.image, quantity: 1 });
        }
    }

    /// Sets the quantity of a line; zero or less removes it. Returns whether anything changed.
    pub fn update_quantity(&mut self, id: &str, quantity: i64) -> bool {
        if quantity <= 0 { return self.remove(id); }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        match self.items.iter_mut().find(|i| i.id == id) {
            Some(item) if item.quantity != quantity => { item.quantity = quantity; true }
            _ => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.id != id);
        self.items.len() != before
    }

    pub fn clear(&mut self) { self.items.clear(); }

    pub fn count(&self) -> u32 { self.items.iter().map(|i| i.quantity).sum() }
    pub fn total(&self) -> Chf { self.items.iter().map(CartItem::line_total).sum() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ski() -> NewCartItem { NewCartItem { id: "P1".into(), name: "Atomic Redster".into(), price: Chf::rappen(2450), image: String::new() } }
    fn wax() -> NewCartItem { NewCartItem { id: "P2".into(), name: "Wachs".into(), price: Chf::francs(12), image: "/wax.jpg".into() } }

    #[test]
    fn test_cart_operations() {
        let mut cart = Cart::new();
        cart.add(ski());
        cart.add(ski());
        cart.add(wax());
        assert_eq!(cart.items().len(), 2);
        assert_eq!(cart.item("P1").unwrap().quantity, 2); // Merged
        assert_eq!(cart.count(), 3);
        assert_eq!(cart.total(), Chf::francs(61));
    }

    #[test]
    fn test_zero_quantity_removes() {
        let mut a = Cart::new();
        a.add(ski());
        a.add(wax());
        let mut b = a.clone();
        assert!(a.update_quantity("P1", 0));
        assert!(b.remove("P1"));
        assert_eq!(a, b);
        assert!(a.update_quantity("P2", -3));
        assert!(a.is_empty());
        assert_eq!(a.total(), Chf::ZERO);
    }

    #[test]
    fn test_update_unknown_is_noop() {
        let mut cart = Cart::new();
        cart.add(wax());
        assert!(!cart.update_quantity("missing", 4));
        assert!(cart.update_quantity("P2", 4));
        assert!(!cart.update_quantity("P2", 4));
        assert_eq!(cart.count(), 4);
    }

    #[test]
    fn test_totals_follow_any_sequence() {
        let mut cart = Cart::new();
        let ops: [(&str, i64); 7] = [("P1", 3), ("P2", 2), ("P1", -1), ("P2", 5), ("P1", 1), ("P2", 0), ("P1", 7)];
        cart.add(ski());
        cart.add(wax());
        for (id, qty) in ops {
            cart.update_quantity(id, qty);
            let count: u32 = cart.items().iter().map(|i| i.quantity).sum();
            let total: Chf = cart.items().iter().map(|i| i.price * i.quantity).sum();
            assert_eq!(cart.count(), count);
            assert_eq!(cart.total(), total);
            assert!(cart.total() >= Chf::ZERO);
        }
    }

    #[test]
    fn test_from_items_merges() {
        let line = |q| CartItem { id: "P1".into(), name: "Ski".into(), price: Chf::francs(10), image: String::new(), quantity: q };
        let cart = Cart::from_items(vec![line(1), line(0), line(2)]);
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.count(), 3);
    }
}
