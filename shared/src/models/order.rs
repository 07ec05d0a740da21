//! Order Model

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An order placed on the storefront, as reported by the order feed
///
/// Immutable once fetched; `order_number` is the unique identity and the
/// watcher cursor value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_number: u64,
    pub timestamp: DateTime<FixedOffset>,
    pub customer: Customer,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(default)]
    pub discount: Option<Discount>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Order line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub name: String,
    #[serde(default)]
    pub variant_name: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
}

/// Order-level discount (coupon)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discount {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_decode_feed_order() {
        let json = r#"{
            "orderNumber": 1042,
            "timestamp": "2024-05-01T19:30:00+03:00",
            "customer": {"name": "Ayse", "phone": "+90 555 000 0000"},
            "items": [
                {"name": "Burger", "variantName": "Double", "unitPrice": 75.0, "quantity": 2, "subtotal": 150}
            ],
            "subtotal": 150,
            "discount": {"amount": 20, "couponCode": "YENI20"},
            "total": 130.00
        }"#;

        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.order_number, 1042);
        assert_eq!(order.items[0].variant_name.as_deref(), Some("Double"));
        assert_eq!(order.items[0].subtotal, Decimal::from(150));
        assert_eq!(order.total, Decimal::from_str("130").unwrap());
        assert_eq!(
            order.discount.as_ref().and_then(|d| d.coupon_code.as_deref()),
            Some("YENI20")
        );
        assert_eq!(order.customer.address, None);
        assert_eq!(order.notes, None);
    }
}
