//! Normalization of the backend's heterogeneous payload shapes.
//!
//! The backend is inconsistent about casing and nesting (`id`/`Id`,
//! `productId`/`Product.Id`, numbers that sometimes arrive as strings).
//! Each canonical field is resolved from a prioritized list of candidate
//! paths. A required field missing from every candidate is a mapping error
//! to be logged by the caller, never a silent default; a present but
//! unparseable numeric value coerces to zero with a warning.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::warn;

use crate::domain::discount::Discount;
use crate::domain::order::{OrderStatus, OrderSummary};
use crate::domain::product::ProductSnapshot;
use crate::{Result, StorefrontError};

const CART_ID: &[&str] = &["id", "Id", "cartId", "CartId"];
const CART_ITEMS: &[&str] = &["items", "Items", "cartItems", "CartItems"];

const ITEM_ID: &[&str] = &["id", "Id", "cartItemId", "CartItemId"];
const ITEM_PRODUCT_ID: &[&str] = &["productId", "ProductId", "product.id", "Product.Id"];
const ITEM_NAME: &[&str] = &[
    "productName",
    "ProductName",
    "product.name",
    "Product.Name",
    "name",
    "Name",
];
const ITEM_PRICE: &[&str] = &["price", "Price", "product.price", "Product.Price"];
const ITEM_QUANTITY: &[&str] = &["quantity", "Quantity"];
const ITEM_IMAGE: &[&str] = &[
    "imageUrl",
    "ImageUrl",
    "product.image",
    "Product.Image",
    "image",
    "Image",
];

const PRODUCT_ID: &[&str] = &["id", "Id", "productId", "ProductId"];
const PRODUCT_NAME: &[&str] = &["name", "Name", "productName", "ProductName"];
const PRODUCT_PRICE: &[&str] = &["price", "Price"];
const PRODUCT_QUANTITY: &[&str] = &["quantity", "Quantity", "stock", "Stock"];
const PRODUCT_IN_STOCK: &[&str] = &["isInStock", "IsInStock", "inStock", "InStock"];
const PRODUCT_CATEGORY_ID: &[&str] = &["categoryId", "CategoryId", "category.id", "Category.Id"];
const PRODUCT_CATEGORY_NAME: &[&str] = &[
    "categoryName",
    "CategoryName",
    "category.name",
    "Category.Name",
];
const PRODUCT_IMAGE: &[&str] = &["image", "Image", "imageUrl", "ImageUrl"];

const DISCOUNT_LIST: &[&str] = &["items", "Items", "discounts", "Discounts"];
const DISCOUNT_ID: &[&str] = &["id", "Id"];
const DISCOUNT_NAME: &[&str] = &["name", "Name"];
const DISCOUNT_PERCENTAGE: &[&str] = &["percentage", "Percentage", "percent", "Percent"];
const DISCOUNT_PRODUCT_IDS: &[&str] = &["productIds", "ProductIds", "products", "Products"];
const DISCOUNT_IS_ACTIVE: &[&str] = &["isActive", "IsActive", "active", "Active"];

const ORDER_LIST: &[&str] = &["items", "Items", "orders", "Orders"];
const ORDER_ID: &[&str] = &["id", "Id", "orderId", "OrderId"];
const ORDER_STATUS: &[&str] = &["status", "Status", "orderStatus", "OrderStatus"];
const ORDER_TOTAL: &[&str] = &["totalSum", "TotalSum", "total", "Total"];
const ORDER_CREATED_AT: &[&str] = &["createdAt", "CreatedAt", "created_at", "date", "Date"];

/// Cart item as normalized from the backend, before the stock snapshot is
/// attached.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedItem {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub price: Decimal,
    pub quantity: u32,
    pub image_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NormalizedCart {
    pub id: i64,
    pub items: Vec<NormalizedItem>,
}

/// Resolves the first candidate path present and non-null on `value`.
/// Paths use `.` to descend into nested objects.
fn pick<'a>(value: &'a Value, candidates: &[&str]) -> Option<&'a Value> {
    candidates.iter().find_map(|path| {
        path.split('.')
            .try_fold(value, |v, key| v.get(key))
            .filter(|v| !v.is_null())
    })
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_decimal(value: &Value, field: &str) -> Decimal {
    let parsed = match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    };
    parsed.unwrap_or_else(|| {
        warn!(field, raw = %value, "value is not numeric, using 0");
        Decimal::ZERO
    })
}

fn coerce_u32(value: &Value, field: &str) -> u32 {
    let parsed = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.unwrap_or_else(|| {
        warn!(field, raw = %value, "value is not a quantity, using 0");
        0
    })
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Normalizes the cart response.
///
/// # Errors
///
/// Returns [`StorefrontError::Mapping`] when no usable item collection is
/// found under any known name. Individual unmappable items are logged and
/// skipped rather than failing the whole cart.
pub fn normalize_cart(raw: &Value) -> Result<NormalizedCart> {
    let items_value = pick(raw, CART_ITEMS).and_then(Value::as_array).ok_or_else(|| {
        StorefrontError::Mapping("cart response has no item collection".to_string())
    })?;
    let id = pick(raw, CART_ID).and_then(coerce_i64).unwrap_or_else(|| {
        warn!("cart response without id, using 0");
        0
    });
    let mut items = Vec::with_capacity(items_value.len());
    for raw_item in items_value {
        match normalize_cart_item(raw_item) {
            Ok(item) => items.push(item),
            Err(err) => warn!(%err, "skipping unmappable cart item"),
        }
    }
    Ok(NormalizedCart { id, items })
}

/// Normalizes one raw cart item.
///
/// # Errors
///
/// Returns [`StorefrontError::Mapping`] when the item id or product id is
/// missing from every known candidate path.
pub fn normalize_cart_item(raw: &Value) -> Result<NormalizedItem> {
    let id = pick(raw, ITEM_ID)
        .and_then(coerce_i64)
        .ok_or_else(|| StorefrontError::Mapping(format!("cart item without id: {raw}")))?;
    let product_id = pick(raw, ITEM_PRODUCT_ID)
        .and_then(coerce_i64)
        .ok_or_else(|| StorefrontError::Mapping(format!("cart item {id} without product id")))?;
    let product_name = pick(raw, ITEM_NAME).and_then(coerce_string).unwrap_or_default();
    let price = match pick(raw, ITEM_PRICE) {
        Some(value) => coerce_decimal(value, "price"),
        None => {
            warn!(item = id, "cart item without price, using 0");
            Decimal::ZERO
        }
    };
    let quantity = match pick(raw, ITEM_QUANTITY) {
        Some(value) => coerce_u32(value, "quantity"),
        None => {
            warn!(item = id, "cart item without quantity, using 0");
            0
        }
    };
    let image_url = pick(raw, ITEM_IMAGE).and_then(coerce_string);
    Ok(NormalizedItem {
        id,
        product_id,
        product_name,
        price,
        quantity,
        image_url,
    })
}

/// Normalizes a catalog product response.
///
/// # Errors
///
/// Returns [`StorefrontError::Mapping`] when the product id is missing.
pub fn normalize_product(raw: &Value) -> Result<ProductSnapshot> {
    let id = pick(raw, PRODUCT_ID)
        .and_then(coerce_i64)
        .ok_or_else(|| StorefrontError::Mapping(format!("product without id: {raw}")))?;
    let name = pick(raw, PRODUCT_NAME).and_then(coerce_string).unwrap_or_default();
    let price = pick(raw, PRODUCT_PRICE)
        .map(|v| coerce_decimal(v, "price"))
        .unwrap_or(Decimal::ZERO);
    let quantity = pick(raw, PRODUCT_QUANTITY).and_then(coerce_i64).unwrap_or(0);
    let is_in_stock = pick(raw, PRODUCT_IN_STOCK)
        .and_then(Value::as_bool)
        .unwrap_or(quantity > 0);
    Ok(ProductSnapshot {
        id,
        name,
        price,
        quantity,
        is_in_stock,
        category_id: pick(raw, PRODUCT_CATEGORY_ID).and_then(coerce_i64),
        category_name: pick(raw, PRODUCT_CATEGORY_NAME).and_then(coerce_string),
        image: pick(raw, PRODUCT_IMAGE).and_then(coerce_string),
    })
}

/// Normalizes the discount campaign list. The collection may be the body
/// itself or live under a wrapper key; campaigns without an id are skipped.
pub fn normalize_discounts(raw: &Value) -> Vec<Discount> {
    let list = raw
        .as_array()
        .or_else(|| pick(raw, DISCOUNT_LIST).and_then(Value::as_array));
    let Some(list) = list else {
        warn!("discount response has no campaign collection");
        return Vec::new();
    };
    list.iter()
        .filter_map(|raw| {
            let Some(id) = pick(raw, DISCOUNT_ID).and_then(coerce_i64) else {
                warn!("skipping discount campaign without id");
                return None;
            };
            let product_ids = pick(raw, DISCOUNT_PRODUCT_IDS)
                .and_then(Value::as_array)
                .map(|ids| ids.iter().filter_map(coerce_i64).collect())
                .unwrap_or_default();
            Some(Discount {
                id,
                name: pick(raw, DISCOUNT_NAME).and_then(coerce_string).unwrap_or_default(),
                percentage: pick(raw, DISCOUNT_PERCENTAGE)
                    .map(|v| coerce_decimal(v, "percentage"))
                    .unwrap_or(Decimal::ZERO),
                product_ids,
                is_active: pick(raw, DISCOUNT_IS_ACTIVE)
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            })
        })
        .collect()
}

/// Normalizes a user's order history into canonical summaries. Rows that
/// cannot be mapped are logged and skipped.
pub fn normalize_order_summaries(raw: &Value) -> Vec<OrderSummary> {
    let list = raw
        .as_array()
        .or_else(|| pick(raw, ORDER_LIST).and_then(Value::as_array));
    let Some(list) = list else {
        warn!("order response has no order collection");
        return Vec::new();
    };
    list.iter()
        .filter_map(|raw| {
            let Some(id) = pick(raw, ORDER_ID).and_then(coerce_i64) else {
                warn!("skipping order without id");
                return None;
            };
            let status = match pick(raw, ORDER_STATUS).and_then(OrderStatus::from_backend) {
                Some(status) => status,
                None => {
                    warn!(order = id, "unknown order status encoding, using pending");
                    OrderStatus::Pending
                }
            };
            let total_sum = pick(raw, ORDER_TOTAL)
                .map(|v| coerce_decimal(v, "totalSum"))
                .unwrap_or(Decimal::ZERO);
            let created_at = pick(raw, ORDER_CREATED_AT)
                .and_then(Value::as_str)
                .and_then(parse_timestamp);
            Some(OrderSummary {
                id,
                status,
                total_sum,
                created_at,
            })
        })
        .collect()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
