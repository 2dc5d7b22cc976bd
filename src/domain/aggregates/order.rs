//! Order Aggregate
//!
//! Orders are owned by the shop backend; these types mirror its JSON shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::Chf;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus { #[default] Pending, Processing, Shipped, Delivered, Cancelled }

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [Self::Pending, Self::Processing, Self::Shipped, Self::Delivered, Self::Cancelled];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Ausstehend",
            Self::Processing => "In Bearbeitung",
            Self::Shipped => "Versendet",
            Self::Delivered => "Geliefert",
            Self::Cancelled => "Storniert",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus { #[default] Pending, Paid, Failed, Refunded }

impl PaymentStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Ausstehend",
            Self::Paid => "Bezahlt",
            Self::Failed => "Fehlgeschlagen",
            Self::Refunded => "Erstattet",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod { #[default] Card, Twint }

impl PaymentMethod {
    /// Maps a provider charge type (`"twint"`, `"card"`) to a payment method.
    pub fn from_charge_type(kind: &str) -> Option<Self> {
        match kind {
            "twint" => Some(Self::Twint),
            "card" => Some(Self::Card),
            _ => None,
        }
    }
}

/// Delivery address stored on an order. The backend keeps it as loose JSON,
/// so every field tolerates being absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShippingAddress {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub city: String,
    pub zip_code: String,
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedProduct { pub id: String, pub name: String, #[serde(default)] pub image: Option<String> }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(default)]
    pub id: String,
    pub product_id: String,
    pub quantity: u32,
    pub price: Chf,
    #[serde(default)]
    pub product: Option<OrderedProduct>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCustomer { pub id: String, pub email: String, #[serde(default)] pub full_name: Option<String>, #[serde(default)] pub phone: Option<String> }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_number: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    pub subtotal: Chf,
    #[serde(default)]
    pub tax: Chf,
    #[serde(default)]
    pub shipping: Chf,
    pub total: Chf,
    #[serde(default, deserialize_with = "lenient_address")]
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<OrderCustomer>,
}

impl Order {
    pub fn is_paid(&self) -> bool { self.payment_status == PaymentStatus::Paid }
    pub fn is_owned_by(&self, user_id: &str) -> bool { self.user_id.as_deref() == Some(user_id) }
    pub fn tracking_number(&self) -> Option<&str> { self.shipping_address.tracking_number.as_deref() }

    /// `total = subtotal + shipping + tax`
    pub fn totals_consistent(&self) -> bool { self.total == self.subtotal + self.shipping + self.tax }
}

/// A null or non-object address becomes the empty address.
fn lenient_address<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<ShippingAddress, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_object() {
        serde_json::from_value(value).map_err(serde::de::Error::custom)
    } else {
        Ok(ShippingAddress::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_from_backend_json() {
        let order: Order = serde_json::from_value(serde_json::json!({
            "id": "o1", "orderNumber": "YS-1001", "userId": "u1",
            "status": "SHIPPED", "paymentStatus": "PAID", "paymentMethod": "TWINT",
            "subtotal": 42.5, "tax": 0, "shipping": 8, "total": 50.5,
            "shippingAddress": { "firstName": "Anna", "city": "Chur", "trackingNumber": "99.00.123" },
            "createdAt": "2025-01-10T10:00:00Z",
            "items": [{ "id": "i1", "productId": "p1", "quantity": 1, "price": 42.5, "product": { "id": "p1", "name": "Helm", "image": null } }]
        })).unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert!(order.is_paid());
        assert_eq!(order.payment_method, Some(PaymentMethod::Twint));
        assert_eq!(order.tracking_number(), Some("99.00.123"));
        assert_eq!(order.shipping_address.zip_code, "");
        assert!(order.totals_consistent());
        assert!(order.is_owned_by("u1"));
        assert!(!order.is_owned_by("u2"));
    }

    #[test]
    fn test_loose_address_tolerated() {
        let order: Order = serde_json::from_value(serde_json::json!({
            "id": "o2", "orderNumber": "YS-1002", "subtotal": 10, "total": 18, "shipping": 8, "shippingAddress": null
        })).unwrap();
        assert_eq!(order.shipping_address, ShippingAddress::default());
        assert_eq!(order.payment_status, PaymentStatus::Pending);
    }

    #[test]
    fn test_labels_and_methods() {
        assert_eq!(OrderStatus::Processing.label(), "In Bearbeitung");
        assert_eq!(PaymentStatus::Refunded.label(), "Erstattet");
        assert_eq!(PaymentMethod::from_charge_type("twint"), Some(PaymentMethod::Twint));
        assert_eq!(PaymentMethod::from_charge_type("sepa_debit"), None);
    }
}
