//! Clients for the shop backend REST API.
//!
//! The backend is split into narrow traits so each flow asks only for what it
//! uses and tests can fake exactly that surface.

mod http;
mod types;

use async_trait::async_trait;
use crate::auth::{Credentials, LoginResponse, PasswordChange, ProfileUpdate, Registration, User};
use crate::domain::aggregates::{Order, Product};
use crate::Result;

pub use http::HttpStoreApi;
pub use types::{
    CreateOrderRequest, FinanceStats, ImageUpload, OrderLine, OrderQuery, PaymentHandle, PaymentUpdate, ProductInput,
    ProductProfitability, StatusUpdate, TestEmailKind, PRODUCT_CATEGORIES,
};

#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Storefront listing.
    async fn list_products(&self) -> Result<Vec<Product>>;
    /// Every product including inactive ones.
    async fn list_all_products(&self) -> Result<Vec<Product>>;
    async fn get_product(&self, id: &str) -> Result<Product>;
    async fn create_product(&self, input: &ProductInput) -> Result<Product>;
    async fn update_product(&self, id: &str, input: &ProductInput) -> Result<Product>;
    async fn delete_product(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait OrderApi: Send + Sync {
    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>>;
    async fn get_order(&self, id: &str) -> Result<Order>;
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<Order>;
    async fn update_order_status(&self, id: &str, update: &StatusUpdate) -> Result<Order>;
    async fn update_payment(&self, id: &str, update: &PaymentUpdate) -> Result<()>;
}

#[async_trait]
pub trait PaymentApi: Send + Sync {
    async fn create_payment_intent(&self, order_id: &str) -> Result<PaymentHandle>;
}

#[async_trait]
pub trait FinanceApi: Send + Sync {
    async fn finance_stats(&self) -> Result<FinanceStats>;
    async fn product_profitability(&self) -> Result<Vec<ProductProfitability>>;
    /// Returns the backend's confirmation message.
    async fn send_test_email(&self, kind: TestEmailKind) -> Result<String>;
}

#[async_trait]
pub trait StorageApi: Send + Sync {
    /// Uploads an image and returns its public URL.
    async fn upload_image(&self, upload: ImageUpload) -> Result<String>;
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn register(&self, registration: &Registration) -> Result<()>;
    /// Returns whether the backend answered with a success status alongside its body.
    async fn login(&self, credentials: &Credentials) -> Result<(bool, LoginResponse)>;
    async fn logout(&self, token: &str) -> Result<()>;
    async fn me(&self, token: &str) -> Result<User>;
    async fn update_profile(&self, token: &str, update: &ProfileUpdate) -> Result<User>;
    async fn change_password(&self, token: &str, change: &PasswordChange) -> Result<()>;
    async fn check_verification(&self, token: &str) -> Result<bool>;
    async fn resend_verification(&self, token: &str) -> Result<()>;
}

/// The whole backend surface.
pub trait StoreApi: CatalogApi + OrderApi + PaymentApi + FinanceApi + StorageApi + AuthApi {}

impl<T> StoreApi for T where T: CatalogApi + OrderApi + PaymentApi + FinanceApi + StorageApi + AuthApi {}
