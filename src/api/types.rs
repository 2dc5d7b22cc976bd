//! Request and response shapes of the shop backend.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};
use crate::domain::aggregates::{Order, OrderStatus, PaymentMethod, PaymentStatus, Product, ProductType, ShippingAddress};
use crate::Chf;

#[derive(Debug, Deserialize)] pub(crate) struct OrderEnvelope { pub order: Order }
#[derive(Debug, Deserialize)] pub(crate) struct OrdersEnvelope { #[serde(default)] pub orders: Vec<Order> }
#[derive(Debug, Deserialize)] pub(crate) struct ProductEnvelope { pub product: Product }
#[derive(Debug, Deserialize)] pub(crate) struct ProductsEnvelope { #[serde(default)] pub products: Vec<Product> }
#[derive(Debug, Deserialize)] pub(crate) struct UploadEnvelope { pub url: String }
#[derive(Debug, Deserialize)] pub(crate) struct MessageEnvelope { #[serde(default)] pub message: Option<String> }
#[derive(Debug, Default, Deserialize)] pub(crate) struct ErrorEnvelope { #[serde(default)] pub error: Option<String>, #[serde(default)] pub message: Option<String> }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine { pub product_id: String, pub quantity: u32 }

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub user_id: String,
    pub items: Vec<OrderLine>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub subtotal: Chf,
    pub shipping: Chf,
    pub tax: Chf,
    pub total: Chf,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentUpdate {
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
}

impl PaymentUpdate {
    pub fn paid(intent_id: impl Into<String>, method: PaymentMethod) -> Self {
        Self { payment_status: PaymentStatus::Paid, stripe_payment_id: Some(intent_id.into()), payment_method: Some(method) }
    }

    pub fn failed() -> Self {
        Self { payment_status: PaymentStatus::Failed, stripe_payment_id: None, payment_method: None }
    }
}

/// Opaque client secret binding a checkout to one payment attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHandle { pub client_secret: String }

pub const PRODUCT_CATEGORIES: [&str; 4] = ["Skier", "Schuhe", "Technik", "Zubehör"];

/// Product fields an admin can create or edit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    #[validate(length(min = 1, message = "Name ist erforderlich"))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[validate(custom = "known_category")]
    pub category: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub purchase_price: Chf,
    #[validate(custom = "positive_price")]
    pub sell_price: Chf,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub min_stock: i32,
    #[serde(default = "active")]
    pub is_active: bool,
    #[serde(default)]
    pub product_type: Option<ProductType>,
}

fn active() -> bool { true }

fn known_category(category: &str) -> Result<(), ValidationError> {
    if PRODUCT_CATEGORIES.contains(&category) { Ok(()) } else { Err(ValidationError::new("unknown_category")) }
}

fn positive_price(price: &Chf) -> Result<(), ValidationError> {
    if price.is_positive() { Ok(()) } else { Err(ValidationError::new("price_not_positive")) }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FinanceStats {
    pub total_revenue: Chf,
    pub total_cost: Chf,
    pub total_profit: Chf,
    pub profit_margin: f64,
    pub total_orders: u32,
    pub total_products: u32,
    pub active_products: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductProfitability {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub purchase_price: Chf,
    #[serde(default)]
    pub sell_price: Chf,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub total_sold: u32,
    #[serde(default)]
    pub total_revenue: Chf,
    #[serde(default)]
    pub total_cost: Chf,
    #[serde(default)]
    pub profit: Chf,
    #[serde(default)]
    pub profit_margin: f64,
    #[serde(default)]
    pub profit_per_unit: Chf,
    #[serde(default)]
    pub profit_margin_per_unit: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestEmailKind { Success, Failed }

/// Image bytes headed for the backend's storage bucket.
#[derive(Clone, Debug)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ProductInput {
        serde_json::from_value(serde_json::json!({ "name": "Skischuh", "category": "Schuhe", "sellPrice": 199.9 })).unwrap()
    }

    #[test]
    fn test_product_input_validation() {
        assert!(input().validate().is_ok());
        assert!(input().is_active);
        let bad = ProductInput { name: String::new(), category: "Snowboard".into(), sell_price: Chf::ZERO, ..input() };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("category"));
        assert!(fields.contains_key("sell_price"));
    }

    #[test]
    fn test_payment_update_wire_shape() {
        assert_eq!(
            serde_json::to_value(PaymentUpdate::paid("pi_1", PaymentMethod::Twint)).unwrap(),
            serde_json::json!({ "paymentStatus": "PAID", "stripePaymentId": "pi_1", "paymentMethod": "TWINT" })
        );
        assert_eq!(serde_json::to_value(PaymentUpdate::failed()).unwrap(), serde_json::json!({ "paymentStatus": "FAILED" }));
    }
}
