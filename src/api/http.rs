//! reqwest implementation of the backend traits.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use super::types::{
    ErrorEnvelope, MessageEnvelope, OrderEnvelope, OrdersEnvelope, ProductEnvelope, ProductsEnvelope, UploadEnvelope,
};
use super::{
    AuthApi, CatalogApi, CreateOrderRequest, FinanceApi, FinanceStats, ImageUpload, OrderApi, OrderQuery, PaymentApi,
    PaymentHandle, PaymentUpdate, ProductInput, ProductProfitability, StatusUpdate, StorageApi, TestEmailKind,
};
use crate::auth::{Credentials, LoginResponse, PasswordChange, ProfileUpdate, Registration, User};
use crate::domain::aggregates::{Order, Product};
use crate::{Result, StorefrontError};

#[derive(Clone, Debug)]
pub struct HttpStoreApi {
    base_url: String,
    http: Client,
}

impl HttpStoreApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http: Client) -> Self {
        Self { base_url: base_url.into().trim_end_matches('/').to_string(), http }
    }

    pub fn base_url(&self) -> &str { &self.base_url }

    fn url(&self, path: &str) -> String { format!("{}{}", self.base_url, path) }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = checked(request.send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send_unit(&self, request: RequestBuilder) -> Result<()> {
        checked(request.send().await?).await?;
        Ok(())
    }
}

/// Turns a non-success response into [`StorefrontError::Api`] using the backend's `{error}` body.
async fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() { return Ok(response); }
    let text = response.text().await.unwrap_or_default();
    let body: ErrorEnvelope = serde_json::from_str(&text).unwrap_or_default();
    let message = body.error.or(body.message).unwrap_or_else(|| if text.is_empty() { status.to_string() } else { text });
    tracing::debug!(status = status.as_u16(), %message, "backend request failed");
    Err(StorefrontError::Api { status: status.as_u16(), message })
}

#[async_trait]
impl CatalogApi for HttpStoreApi {
    async fn list_products(&self) -> Result<Vec<Product>> {
        let body: ProductsEnvelope = self.send(self.http.get(self.url("/api/products"))).await?;
        Ok(body.products)
    }

    async fn list_all_products(&self) -> Result<Vec<Product>> {
        let body: ProductsEnvelope = self.send(self.http.get(self.url("/api/products/admin/all"))).await?;
        Ok(body.products)
    }

    async fn get_product(&self, id: &str) -> Result<Product> {
        let body: ProductEnvelope = self.send(self.http.get(self.url(&format!("/api/products/{id}")))).await?;
        Ok(body.product)
    }

    async fn create_product(&self, input: &ProductInput) -> Result<Product> {
        let body: ProductEnvelope = self.send(self.http.post(self.url("/api/products")).json(input)).await?;
        Ok(body.product)
    }

    async fn update_product(&self, id: &str, input: &ProductInput) -> Result<Product> {
        let body: ProductEnvelope = self.send(self.http.put(self.url(&format!("/api/products/{id}"))).json(input)).await?;
        Ok(body.product)
    }

    async fn delete_product(&self, id: &str) -> Result<()> {
        self.send_unit(self.http.delete(self.url(&format!("/api/products/{id}")))).await
    }
}

#[async_trait]
impl OrderApi for HttpStoreApi {
    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let body: OrdersEnvelope = self.send(self.http.get(self.url("/api/orders")).query(query)).await?;
        Ok(body.orders)
    }

    async fn get_order(&self, id: &str) -> Result<Order> {
        let body: OrderEnvelope = self.send(self.http.get(self.url(&format!("/api/orders/{id}")))).await?;
        Ok(body.order)
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<Order> {
        let body: OrderEnvelope = self.send(self.http.post(self.url("/api/orders")).json(request)).await?;
        Ok(body.order)
    }

    async fn update_order_status(&self, id: &str, update: &StatusUpdate) -> Result<Order> {
        let body: OrderEnvelope = self.send(self.http.patch(self.url(&format!("/api/orders/{id}/status"))).json(update)).await?;
        Ok(body.order)
    }

    async fn update_payment(&self, id: &str, update: &PaymentUpdate) -> Result<()> {
        self.send_unit(self.http.patch(self.url(&format!("/api/orders/{id}/payment"))).json(update)).await
    }
}

#[async_trait]
impl PaymentApi for HttpStoreApi {
    async fn create_payment_intent(&self, order_id: &str) -> Result<PaymentHandle> {
        let body = serde_json::json!({ "orderId": order_id });
        self.send(self.http.post(self.url("/api/payments/create-intent")).json(&body)).await
    }
}

#[async_trait]
impl FinanceApi for HttpStoreApi {
    async fn finance_stats(&self) -> Result<FinanceStats> {
        self.send(self.http.get(self.url("/api/finance/stats"))).await
    }

    async fn product_profitability(&self) -> Result<Vec<ProductProfitability>> {
        #[derive(serde::Deserialize)]
        struct Envelope { #[serde(default)] products: Vec<ProductProfitability> }
        let body: Envelope = self.send(self.http.get(self.url("/api/finance/products"))).await?;
        Ok(body.products)
    }

    async fn send_test_email(&self, kind: TestEmailKind) -> Result<String> {
        let body: MessageEnvelope = self
            .send(self.http.post(self.url("/api/finance/test-email")).json(&serde_json::json!({ "type": kind })))
            .await?;
        Ok(body.message.unwrap_or_default())
    }
}

#[async_trait]
impl StorageApi for HttpStoreApi {
    async fn upload_image(&self, upload: ImageUpload) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.content_type)?;
        let form = reqwest::multipart::Form::new().part("image", part);
        let body: UploadEnvelope = self.send(self.http.post(self.url("/api/storage/upload")).multipart(form)).await?;
        Ok(body.url)
    }
}

#[async_trait]
impl AuthApi for HttpStoreApi {
    async fn register(&self, registration: &Registration) -> Result<()> {
        self.send_unit(self.http.post(self.url("/api/auth/register")).json(registration)).await
    }

    async fn login(&self, credentials: &Credentials) -> Result<(bool, LoginResponse)> {
        let response = self.http.post(self.url("/api/auth/login")).json(credentials).send().await?;
        let ok = response.status().is_success();
        let body = response.json::<LoginResponse>().await.unwrap_or_default();
        Ok((ok, body))
    }

    async fn logout(&self, token: &str) -> Result<()> {
        self.send_unit(self.http.post(self.url("/api/auth/logout")).bearer_auth(token)).await
    }

    async fn me(&self, token: &str) -> Result<User> {
        #[derive(serde::Deserialize)]
        struct Envelope { user: User }
        let body: Envelope = self.send(self.http.get(self.url("/api/auth/me")).bearer_auth(token)).await?;
        Ok(body.user)
    }

    async fn update_profile(&self, token: &str, update: &ProfileUpdate) -> Result<User> {
        #[derive(serde::Deserialize)]
        struct Envelope { user: User }
        let body: Envelope = self.send(self.http.put(self.url("/api/auth/profile")).bearer_auth(token).json(update)).await?;
        Ok(body.user)
    }

    async fn change_password(&self, token: &str, change: &PasswordChange) -> Result<()> {
        self.send_unit(self.http.post(self.url("/api/auth/change-password")).bearer_auth(token).json(change)).await
    }

    async fn check_verification(&self, token: &str) -> Result<bool> {
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Envelope { #[serde(default)] email_verified: bool }
        let body: Envelope = self.send(self.http.get(self.url("/api/auth/check-verification")).bearer_auth(token)).await?;
        Ok(body.email_verified)
    }

    async fn resend_verification(&self, token: &str) -> Result<()> {
        self.send_unit(self.http.post(self.url("/api/auth/resend-verification")).bearer_auth(token)).await
    }
}
