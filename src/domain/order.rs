//! Order status mapping.
//!
//! The backend encodes order status inconsistently across endpoints: a
//! string in several spellings on some, a numeric code on others.
//! Everything funnels into one canonical enum before it reaches a caller.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Maps the backend's status encoding. Strings match case-insensitively,
    /// numeric codes follow the backend's enum order.
    pub fn from_backend(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "pending" | "new" => Some(Self::Pending),
                "confirmed" => Some(Self::Confirmed),
                "processing" | "inprogress" | "in_progress" => Some(Self::Processing),
                "shipped" => Some(Self::Shipped),
                "delivered" | "completed" => Some(Self::Delivered),
                "cancelled" | "canceled" => Some(Self::Cancelled),
                "refunded" => Some(Self::Refunded),
                _ => None,
            },
            Value::Number(n) => match n.as_i64()? {
                0 => Some(Self::Pending),
                1 => Some(Self::Confirmed),
                2 => Some(Self::Processing),
                3 => Some(Self::Shipped),
                4 => Some(Self::Delivered),
                5 => Some(Self::Cancelled),
                6 => Some(Self::Refunded),
                _ => None,
            },
            _ => None,
        }
    }
}

/// One row of a user's order history, normalized.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: i64,
    pub status: OrderStatus,
    pub total_sum: Decimal,
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_encodings() {
        assert_eq!(
            OrderStatus::from_backend(&json!("Pending")),
            Some(OrderStatus::Pending)
        );
        assert_eq!(
            OrderStatus::from_backend(&json!("SHIPPED")),
            Some(OrderStatus::Shipped)
        );
        assert_eq!(
            OrderStatus::from_backend(&json!("canceled")),
            Some(OrderStatus::Cancelled)
        );
    }

    #[test]
    fn test_numeric_encodings() {
        assert_eq!(
            OrderStatus::from_backend(&json!(0)),
            Some(OrderStatus::Pending)
        );
        assert_eq!(
            OrderStatus::from_backend(&json!(4)),
            Some(OrderStatus::Delivered)
        );
    }

    #[test]
    fn test_unknown_encodings() {
        assert_eq!(OrderStatus::from_backend(&json!("mystery")), None);
        assert_eq!(OrderStatus::from_backend(&json!(42)), None);
        assert_eq!(OrderStatus::from_backend(&json!(null)), None);
    }
}
