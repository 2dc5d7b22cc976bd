//! HTTP surface: the axum router and its handlers.

use std::sync::Arc;
use std::time::Duration;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;
use validator::Validate;
use crate::admin::{self, ProductFilter, ProfitSort, MAX_IMAGE_BYTES};
use crate::api::{
    AuthApi, CatalogApi, FinanceApi, FinanceStats, ImageUpload, OrderApi, ProductInput, ProductProfitability, StoreApi, TestEmailKind,
};
use crate::auth::{self, bearer_token, Credentials, LoggedIn, PasswordChange, ProfileUpdate, Registration, User};
use crate::cart_store::{CartSnapshot, SessionCarts};
use crate::catalog::{self, CatalogPage, CatalogQuery};
use crate::checkout::{CheckoutService, CheckoutSettings, CheckoutState, PaymentOutcome, PaymentSession, RetryView, ShippingForm};
use crate::config::StorefrontConfig;
use crate::domain::aggregates::{Order, OrderStatus, Product};
use crate::domain::events::CartEvent;
use crate::orders::{self, PaymentFailedView};
use crate::pricing::Quote;
use crate::publisher::EventPublisher;
use crate::reconcile::Reconciliation;
use crate::{Result, StorefrontError};

/// How long `GET /carts/:session/changes` waits for a mutation.
const LONG_POLL: Duration = Duration::from_secs(25);

#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn StoreApi>,
    pub carts: Arc<SessionCarts>,
    pub checkout: Arc<CheckoutService<dyn StoreApi>>,
    pub publisher: EventPublisher,
    pub config: Arc<StorefrontConfig>,
    /// Cancelled on shutdown; long-running requests stop with it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: StorefrontConfig, api: Arc<dyn StoreApi>, carts: Arc<SessionCarts>, publisher: EventPublisher) -> Self {
        let settings = CheckoutSettings {
            pricing: config.pricing.clone(),
            polling: config.polling,
            public_base_url: config.public_base_url.clone(),
            publishable_key: config.publishable_key.clone(),
        };
        let checkout = Arc::new(CheckoutService::new(api.clone(), carts.clone(), settings, publisher.clone()));
        Self { api, carts, checkout, publisher, config: Arc::new(config), shutdown: CancellationToken::new() }
    }
}

/// Evicts idle carts and checkout flows until shutdown.
pub fn spawn_housekeeping(state: &AppState) -> tokio::task::JoinHandle<()> {
    let idle = state.config.session_idle;
    let (carts, checkout, shutdown) = (state.carts.clone(), state.checkout.clone(), state.shutdown.clone());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval((idle / 4).max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let carts = carts.evict_idle(idle).await;
            let flows = checkout.evict_idle(idle);
            if carts + flows > 0 {
                tracing::debug!(carts, flows, "evicted idle sessions");
            }
        }
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "yanev-storefront"})) }))
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/:id", get(get_product))
        .route("/api/v1/carts", post(create_cart))
        .route("/api/v1/carts/:session", get(get_cart).delete(clear_cart))
        .route("/api/v1/carts/:session/items", post(add_to_cart))
        .route("/api/v1/carts/:session/items/:product_id", patch(update_quantity).delete(remove_from_cart))
        .route("/api/v1/carts/:session/quote", get(quote))
        .route("/api/v1/carts/:session/changes", get(cart_changes))
        .route("/api/v1/checkout/:session", get(checkout_state).post(submit_checkout))
        .route("/api/v1/checkout/:session/complete", post(complete_checkout))
        .route("/api/v1/checkout/:session/retry/:order_id", post(retry_checkout))
        .route("/order-success", get(order_success))
        .route("/payment-failed", get(payment_failed))
        .route("/api/v1/orders", get(my_orders))
        .route("/api/v1/orders/:id", get(my_order))
        .route("/api/v1/admin/products", get(admin_products).post(admin_create_product))
        .route("/api/v1/admin/products/:id", axum::routing::put(admin_update_product).delete(admin_delete_product))
        .route("/api/v1/admin/uploads", post(admin_upload).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 64 * 1024)))
        .route("/api/v1/admin/orders", get(admin_orders))
        .route("/api/v1/admin/orders/:id", get(admin_order))
        .route("/api/v1/admin/orders/:id/status", patch(admin_order_status))
        .route("/api/v1/admin/finance/stats", get(finance_stats))
        .route("/api/v1/admin/finance/products", get(finance_products))
        .route("/api/v1/admin/finance/test-email", post(test_email))
        .route("/api/v1/admin/dashboard", get(dashboard))
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/logout", post(logout))
        .route("/api/v1/auth/me", get(me))
        .route("/api/v1/auth/profile", axum::routing::put(update_profile))
        .route("/api/v1/auth/change-password", post(change_password))
        .route("/api/v1/auth/check-verification", get(check_verification))
        .route("/api/v1/auth/resend-verification", post(resend_verification))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl IntoResponse for StorefrontError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Api { status, .. } => StatusCode::from_u16(*status).ok().filter(StatusCode::is_client_error).unwrap_or(StatusCode::BAD_GATEWAY),
            Self::Http(_) | Self::Json(_) | Self::PaymentNotRecorded { .. } => StatusCode::BAD_GATEWAY,
            Self::Validation(_) | Self::EmptyCart => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Self::EmailNotVerified | Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::InvalidCheckoutState { .. } => StatusCode::CONFLICT,
            Self::ReconciliationCancelled => StatusCode::SERVICE_UNAVAILABLE,
            Self::Storage(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let message = match self {
            Self::Api { message, .. } => message,
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

fn token(headers: &HeaderMap) -> Result<&str> {
    bearer_token(headers).ok_or(StorefrontError::NotAuthenticated)
}

// =============================================================================
// Catalog
// =============================================================================

async fn list_products(State(s): State<AppState>, Query(q): Query<CatalogQuery>) -> Result<Json<CatalogPage>> {
    let products = s.api.list_products().await?;
    Ok(Json(catalog::browse(products, &q)))
}

async fn get_product(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Product>> {
    Ok(Json(s.api.get_product(&id).await?))
}

// =============================================================================
// Carts
// =============================================================================

async fn create_cart() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::CREATED, Json(serde_json::json!({ "session": Uuid::now_v7().to_string() })))
}

async fn get_cart(State(s): State<AppState>, Path(session): Path<String>) -> Result<Json<CartSnapshot>> {
    Ok(Json(s.carts.snapshot(&session).await?))
}

async fn clear_cart(State(s): State<AppState>, Path(session): Path<String>) -> Result<Json<CartSnapshot>> {
    let snapshot = s.carts.update(&session, |store| { store.clear_cart(); store.snapshot() }).await?;
    s.publisher.publish(CartEvent::Cleared { session }).await;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddItem { product_id: String }

/// Adds one unit; name, price and image come from the catalog, not the client.
async fn add_to_cart(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<AddItem>) -> Result<Json<CartSnapshot>> {
    let product = s.api.get_product(&r.product_id).await?;
    if !product.is_active || !product.is_in_stock() {
        return Err(StorefrontError::Validation(format!("{} is not available", product.name)));
    }
    let item = product.to_cart_item();
    let snapshot = s.carts.update(&session, |store| { store.add_to_cart(item); store.snapshot() }).await?;
    tracing::debug!(%session, product_id = %product.id, count = snapshot.cart_count, "item added");
    s.publisher.publish(CartEvent::ItemAdded { session, product_id: product.id }).await;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
struct QuantityChange { quantity: i64 }

async fn update_quantity(
    State(s): State<AppState>,
    Path((session, product_id)): Path<(String, String)>,
    Json(r): Json<QuantityChange>,
) -> Result<Json<CartSnapshot>> {
    let snapshot = s.carts.update(&session, |store| { store.update_quantity(&product_id, r.quantity); store.snapshot() }).await?;
    s.publisher.publish(CartEvent::QuantityChanged { session, product_id, quantity: r.quantity }).await;
    Ok(Json(snapshot))
}

async fn remove_from_cart(State(s): State<AppState>, Path((session, product_id)): Path<(String, String)>) -> Result<Json<CartSnapshot>> {
    let snapshot = s.carts.update(&session, |store| { store.remove_from_cart(&product_id); store.snapshot() }).await?;
    s.publisher.publish(CartEvent::ItemRemoved { session, product_id }).await;
    Ok(Json(snapshot))
}

#[derive(Debug, Serialize)]
struct QuoteView { cart: CartSnapshot, quote: Quote }

async fn quote(State(s): State<AppState>, Path(session): Path<String>) -> Result<Json<QuoteView>> {
    let cart = s.carts.snapshot(&session).await?;
    let quote = s.config.pricing.quote(cart.cart_total);
    Ok(Json(QuoteView { cart, quote }))
}

/// Long-poll: answers with the next snapshot, or the current one after [`LONG_POLL`].
async fn cart_changes(State(s): State<AppState>, Path(session): Path<String>) -> Result<Json<CartSnapshot>> {
    let mut rx = s.carts.subscribe(&session).await?;
    tokio::select! {
        _ = s.shutdown.cancelled() => {}
        _ = tokio::time::timeout(LONG_POLL, rx.changed()) => {}
    }
    let snapshot = rx.borrow().clone();
    Ok(Json(snapshot))
}

// =============================================================================
// Checkout
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutView { state: CheckoutState, form: ShippingForm, quote: Quote }

async fn checkout_state(State(s): State<AppState>, headers: HeaderMap, Path(session): Path<String>) -> Result<Json<CheckoutView>> {
    let user = auth::current_user(&*s.api, &headers).await?;
    let cart = s.carts.snapshot(&session).await?;
    Ok(Json(CheckoutView {
        state: s.checkout.state(&session).await,
        form: ShippingForm::for_user(user.as_ref()),
        quote: s.config.pricing.quote(cart.cart_total),
    }))
}

async fn submit_checkout(
    State(s): State<AppState>,
    headers: HeaderMap,
    Path(session): Path<String>,
    Json(form): Json<ShippingForm>,
) -> Result<(StatusCode, Json<PaymentSession>)> {
    let user = auth::current_user(&*s.api, &headers).await?;
    let payment = s.checkout.submit(&session, user.as_ref(), &form).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

async fn complete_checkout(
    State(s): State<AppState>,
    headers: HeaderMap,
    Path(session): Path<String>,
    Json(outcome): Json<PaymentOutcome>,
) -> Result<(StatusCode, Json<CheckoutState>)> {
    let user = auth::require_user(&*s.api, &headers).await?;
    let state = s.checkout.complete(&session, Some(&user), outcome).await?;
    let status = if matches!(state, CheckoutState::Failed { .. }) { StatusCode::PAYMENT_REQUIRED } else { StatusCode::OK };
    Ok((status, Json(state)))
}

async fn retry_checkout(
    State(s): State<AppState>,
    headers: HeaderMap,
    Path((session, order_id)): Path<(String, String)>,
) -> Result<Json<RetryView>> {
    let user = auth::require_user(&*s.api, &headers).await?;
    Ok(Json(s.checkout.restore(&session, &order_id, Some(&user)).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderRef { order_id: String }

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReconciliationView {
    status: &'static str,
    order: Order,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<String>,
}

impl From<Reconciliation> for ReconciliationView {
    fn from(outcome: Reconciliation) -> Self {
        let status = match outcome {
            Reconciliation::Paid(_) => "paid",
            Reconciliation::Failed(_) => "failed",
            Reconciliation::TimedOut(_) => "pending",
        };
        let redirect = outcome.redirect();
        Self { status, redirect, order: outcome.into_order() }
    }
}

/// Return URL target of redirect-based payments. Holds the request open while
/// the payment settles.
async fn order_success(State(s): State<AppState>, headers: HeaderMap, Query(r): Query<OrderRef>) -> Result<Json<ReconciliationView>> {
    let user = auth::require_user(&*s.api, &headers).await?;
    orders::order_for_customer(&*s.api, &user, &r.order_id).await?;
    let cancel = s.shutdown.child_token();
    let outcome = s.checkout.reconcile(&r.order_id, &cancel).await?;
    Ok(Json(outcome.into()))
}

async fn payment_failed(State(s): State<AppState>, headers: HeaderMap, Query(r): Query<OrderRef>) -> Result<Json<PaymentFailedView>> {
    let user = auth::current_user(&*s.api, &headers).await?;
    Ok(Json(orders::payment_failed_view(&*s.api, user.as_ref(), &r.order_id).await?))
}

// =============================================================================
// Customer orders
// =============================================================================

async fn my_orders(State(s): State<AppState>, headers: HeaderMap) -> Result<Json<Vec<Order>>> {
    let user = auth::require_user(&*s.api, &headers).await?;
    Ok(Json(orders::my_orders(&*s.api, &user).await?))
}

async fn my_order(State(s): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Result<Json<Order>> {
    let user = auth::require_user(&*s.api, &headers).await?;
    Ok(Json(orders::order_for_customer(&*s.api, &user, &id).await?))
}

// =============================================================================
// Admin
// =============================================================================

async fn admin_products(State(s): State<AppState>, Query(f): Query<ProductFilter>) -> Result<Json<Vec<Product>>> {
    Ok(Json(admin::list_products(&*s.api, &f).await?))
}

async fn admin_create_product(State(s): State<AppState>, Json(r): Json<ProductInput>) -> Result<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(admin::create_product(&*s.api, r).await?)))
}

async fn admin_update_product(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<ProductInput>) -> Result<Json<Product>> {
    Ok(Json(admin::update_product(&*s.api, &id, r).await?))
}

async fn admin_delete_product(State(s): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    admin::delete_product(&*s.api, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Raw image body; the file name travels in `X-File-Name`.
async fn admin_upload(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<serde_json::Value>> {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or_default().to_string();
    let upload = ImageUpload {
        content_type: header_str(header::CONTENT_TYPE.as_str()),
        file_name: Some(header_str("x-file-name")).filter(|n| !n.is_empty()).unwrap_or_else(|| "upload".into()),
        bytes: body.to_vec(),
    };
    let url = admin::upload_image(&*s.api, upload).await?;
    Ok(Json(serde_json::json!({ "url": url })))
}

#[derive(Debug, Deserialize)]
struct StatusFilter { status: Option<OrderStatus> }

async fn admin_orders(State(s): State<AppState>, Query(f): Query<StatusFilter>) -> Result<Json<Vec<Order>>> {
    Ok(Json(admin::list_orders(&*s.api, f.status).await?))
}

async fn admin_order(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Order>> {
    Ok(Json(s.api.get_order(&id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusChange { status: OrderStatus, #[serde(default)] tracking_number: Option<String> }

async fn admin_order_status(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<StatusChange>) -> Result<Json<Order>> {
    Ok(Json(admin::update_order_status(&*s.api, &s.publisher, &id, r.status, r.tracking_number.as_deref()).await?))
}

async fn finance_stats(State(s): State<AppState>) -> Result<Json<FinanceStats>> {
    Ok(Json(s.api.finance_stats().await?))
}

async fn finance_products(State(s): State<AppState>, Query(sort): Query<ProfitSort>) -> Result<Json<Vec<ProductProfitability>>> {
    Ok(Json(admin::profitability(&*s.api, sort).await?))
}

#[derive(Debug, Deserialize)]
struct TestEmail { #[serde(rename = "type")] kind: TestEmailKind }

async fn test_email(State(s): State<AppState>, Json(r): Json<TestEmail>) -> Result<Json<serde_json::Value>> {
    let message = admin::send_test_email(&*s.api, r.kind).await?;
    Ok(Json(serde_json::json!({ "message": message })))
}

async fn dashboard(State(s): State<AppState>) -> Json<admin::DashboardSummary> {
    Json(admin::dashboard(&*s.api).await)
}

// =============================================================================
// Auth passthrough
// =============================================================================

async fn register(State(s): State<AppState>, Json(r): Json<Registration>) -> Result<(StatusCode, Json<serde_json::Value>)> {
    r.validate()?;
    s.api.register(&r).await?;
    tracing::info!(email = %r.email, "account registered");
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "message": "Registrierung erfolgreich. Bitte bestätigen Sie Ihre E-Mail-Adresse." }))))
}

async fn login(State(s): State<AppState>, Json(r): Json<Credentials>) -> Result<Json<LoggedIn>> {
    r.validate()?;
    let (ok, response) = s.api.login(&r).await?;
    Ok(Json(auth::interpret_login(ok, response)?))
}

async fn logout(State(s): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    s.api.logout(token(&headers)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(State(s): State<AppState>, headers: HeaderMap) -> Result<Json<User>> {
    Ok(Json(auth::require_user(&*s.api, &headers).await?))
}

async fn update_profile(State(s): State<AppState>, headers: HeaderMap, Json(r): Json<ProfileUpdate>) -> Result<Json<User>> {
    Ok(Json(s.api.update_profile(token(&headers)?, &r).await?))
}

async fn change_password(State(s): State<AppState>, headers: HeaderMap, Json(r): Json<PasswordChange>) -> Result<StatusCode> {
    r.validate()?;
    s.api.change_password(token(&headers)?, &r).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn check_verification(State(s): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>> {
    let verified = s.api.check_verification(token(&headers)?).await?;
    Ok(Json(serde_json::json!({ "emailVerified": verified })))
}

async fn resend_verification(State(s): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    s.api.resend_verification(token(&headers)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_statuses() {
        let status = |e: StorefrontError| e.into_response().status();
        assert_eq!(status(StorefrontError::Api { status: 404, message: "Order not found".into() }), StatusCode::NOT_FOUND);
        assert_eq!(status(StorefrontError::Api { status: 500, message: "boom".into() }), StatusCode::BAD_GATEWAY);
        assert_eq!(status(StorefrontError::Validation("x".into())), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status(StorefrontError::AccessDenied), StatusCode::FORBIDDEN);
        assert_eq!(status(StorefrontError::EmailNotVerified), StatusCode::FORBIDDEN);
        assert_eq!(status(StorefrontError::NotAuthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(status(StorefrontError::PaymentNotRecorded { order_id: "o1".into() }), StatusCode::BAD_GATEWAY);
    }
}
