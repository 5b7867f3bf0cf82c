//! Canonical cart state.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::{Result, StorefrontError};

/// One product line within a user's cart.
///
/// `stock` is the quantity still available for purchase beyond what this
/// line already reserves: the catalog's current quantity plus `quantity`,
/// snapshotted at load time. Signed, so an oversold catalog is observable.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub price: Decimal,
    pub quantity: u32,
    pub total_sum: Decimal,
    pub stock: i64,
    pub image_url: Option<String>,
}

impl CartItem {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// A user's cart. Invariant: `total_sum` is the sum of all line totals and
/// each line's `total_sum` is `price * quantity`; both are restored by
/// [`Cart::recalculate`] after every change.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    id: i64,
    user_id: i64,
    items: Vec<CartItem>,
    total_sum: Decimal,
}

impl Cart {
    pub fn new(id: i64, user_id: i64, items: Vec<CartItem>) -> Self {
        let mut cart = Self {
            id,
            user_id,
            items,
            total_sum: Decimal::ZERO,
        };
        cart.recalculate();
        cart
    }

    pub fn id(&self) -> i64 {
        self.id
    }
    pub fn user_id(&self) -> i64 {
        self.user_id
    }
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }
    pub fn total_sum(&self) -> Decimal {
        self.total_sum
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, cart_item_id: i64) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == cart_item_id)
    }

    pub fn item_for_product(&self, product_id: i64) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    pub fn set_quantity(&mut self, cart_item_id: i64, quantity: u32) -> Result<()> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == cart_item_id)
            .ok_or(StorefrontError::ItemNotFound)?;
        item.quantity = quantity;
        self.recalculate();
        Ok(())
    }

    pub fn remove_item(&mut self, cart_item_id: i64) -> Result<()> {
        let before = self.items.len();
        self.items.retain(|i| i.id != cart_item_id);
        if self.items.len() == before {
            return Err(StorefrontError::ItemNotFound);
        }
        self.recalculate();
        Ok(())
    }

    pub fn recalculate(&mut self) {
        for item in &mut self.items {
            item.total_sum = item.line_total();
        }
        self.total_sum = self.items.iter().map(|i| i.total_sum).sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, product_id: i64, price: i64, quantity: u32) -> CartItem {
        CartItem {
            id,
            product_id,
            product_name: format!("Product {product_id}"),
            price: Decimal::new(price, 0),
            quantity,
            total_sum: Decimal::ZERO,
            stock: 100,
            image_url: None,
        }
    }

    #[test]
    fn test_new_restores_invariants() {
        let cart = Cart::new(1, 10, vec![item(1, 7, 10, 2), item(2, 8, 5, 3)]);
        assert_eq!(cart.items()[0].total_sum, Decimal::new(20, 0));
        assert_eq!(cart.items()[1].total_sum, Decimal::new(15, 0));
        assert_eq!(cart.total_sum(), Decimal::new(35, 0));
    }

    #[test]
    fn test_set_quantity_recalculates() {
        let mut cart = Cart::new(1, 10, vec![item(1, 7, 10, 2)]);
        cart.set_quantity(1, 5).unwrap();
        assert_eq!(cart.items()[0].total_sum, Decimal::new(50, 0));
        assert_eq!(cart.total_sum(), Decimal::new(50, 0));
    }

    #[test]
    fn test_remove_item_recalculates() {
        let mut cart = Cart::new(1, 10, vec![item(1, 7, 10, 2), item(2, 8, 5, 3)]);
        cart.remove_item(1).unwrap();
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.total_sum(), Decimal::new(15, 0));
    }

    #[test]
    fn test_unknown_item_is_an_error() {
        let mut cart = Cart::new(1, 10, vec![item(1, 7, 10, 2)]);
        assert!(cart.set_quantity(99, 1).is_err());
        assert!(cart.remove_item(99).is_err());
    }
}
