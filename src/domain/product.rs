//! Read-only projection of the backend catalog.

use rust_decimal::Decimal;
use serde::Serialize;

/// Catalog snapshot for one product. The backend owns this data; the
/// session layer only reads the stock number off it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    /// Current catalog quantity. Can go negative when oversold.
    pub quantity: i64,
    pub is_in_stock: bool,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub image: Option<String>,
}
