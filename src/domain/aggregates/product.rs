//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::cart::NewCartItem;
use crate::domain::value_objects::Chf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType { New, Occasion }

impl ProductType {
    pub fn label(self) -> &'static str {
        match self { Self::New => "Neu", Self::Occasion => "Occasion" }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
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
    pub sell_price: Chf,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub min_stock: i32,
    #[serde(default = "active")]
    pub is_active: bool,
    #[serde(default)]
    pub product_type: Option<ProductType>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn active() -> bool { true }

impl Product {
    pub fn is_in_stock(&self) -> bool { self.stock > 0 }
    pub fn is_low_stock(&self) -> bool { self.stock > 0 && self.stock <= self.min_stock }

    pub fn to_cart_item(&self) -> NewCartItem {
        NewCartItem { id: self.id.clone(), name: self.name.clone(), price: self.sell_price, image: self.image.clone().unwrap_or_default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_from_backend_json() {
        let p: Product = serde_json::from_value(serde_json::json!({
            "id": "p1", "name": "Völkl Racetiger", "category": "Skier", "sellPrice": 549.0,
            "stock": 2, "minStock": 3, "productType": "OCCASION"
        })).unwrap();
        assert!(p.is_active);
        assert!(p.is_low_stock());
        assert_eq!(p.product_type.map(ProductType::label), Some("Occasion"));
        let item = p.to_cart_item();
        assert_eq!(item.price, Chf::francs(549));
        assert_eq!(item.image, "");
    }
}
