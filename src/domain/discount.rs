//! Discount campaigns and price resolution.

use rust_decimal::Decimal;
use serde::Serialize;

/// A named percentage price reduction applicable to a set of product ids.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Discount {
    pub id: i64,
    pub name: String,
    pub percentage: Decimal,
    pub product_ids: Vec<i64>,
    pub is_active: bool,
}

/// First active campaign covering `product_id`, in list order.
///
/// Overlapping campaigns never stack; list order is the only priority rule.
pub fn resolve(discounts: &[Discount], product_id: i64) -> Option<&Discount> {
    discounts
        .iter()
        .find(|d| d.is_active && d.product_ids.contains(&product_id))
}

/// Price after applying `percentage`, rounded to cents.
pub fn discounted_price(price: Decimal, percentage: Decimal) -> Decimal {
    (price * (Decimal::ONE_HUNDRED - percentage) / Decimal::ONE_HUNDRED).round_dp(2)
}

/// Display price for one product: discounted when an active campaign covers
/// it, the original price otherwise.
pub fn display_price(discounts: &[Discount], product_id: i64, price: Decimal) -> Decimal {
    match resolve(discounts, product_id) {
        Some(campaign) => discounted_price(price, campaign.percentage),
        None => price,
    }
}
