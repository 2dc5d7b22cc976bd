//! Checkout: shipping form, order creation, payment completion and retry.
//!
//! A checkout moves `Form → Payment → Success | Failed`. Payment methods that
//! leave the page (TWINT, 3-D Secure) end in `Redirected` instead, and the
//! outcome is settled later by [`crate::reconcile`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use validator::{Validate, ValidationError};
use crate::api::{CreateOrderRequest, OrderApi, OrderLine, PaymentApi, PaymentUpdate};
use crate::auth::User;
use crate::cart_store::{CartSnapshot, CartStore, SessionCarts};
use crate::domain::aggregates::{Cart, CartItem, Order, PaymentMethod, ShippingAddress};
use crate::domain::events::{CartEvent, OrderEvent};
use crate::pricing::{PricingPolicy, Totals};
use crate::publisher::EventPublisher;
use crate::reconcile::{reconcile_payment, PollPolicy, Reconciliation};
use crate::{Result, StorefrontError};

pub const DEFAULT_COUNTRY: &str = "Schweiz";
pub const PAYMENT_ERROR: &str = "Zahlung fehlgeschlagen";
pub const PAYMENT_INCOMPLETE: &str = "Die Zahlung konnte nicht abgeschlossen werden. Bitte versuchen Sie es erneut.";

// =============================================================================
// Shipping form
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingForm {
    #[validate(custom = "not_blank")]
    pub first_name: String,
    #[validate(custom = "not_blank")]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(custom = "not_blank")]
    pub phone: String,
    #[validate(custom = "not_blank")]
    pub address: String,
    #[validate(custom = "not_blank")]
    pub city: String,
    #[validate(custom = "not_blank")]
    pub zip_code: String,
    #[validate(custom = "not_blank")]
    pub country: String,
}

fn not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() { Err(ValidationError::new("required")) } else { Ok(()) }
}

impl Default for ShippingForm {
    fn default() -> Self {
        Self {
            first_name: String::new(), last_name: String::new(), email: String::new(), phone: String::new(),
            address: String::new(), city: String::new(), zip_code: String::new(), country: DEFAULT_COUNTRY.into(),
        }
    }
}

impl ShippingForm {
    /// Empty form with the contact fields taken from the account.
    pub fn for_user(user: Option<&User>) -> Self {
        Self {
            email: user.map(|u| u.email.clone()).unwrap_or_default(),
            phone: user.and_then(|u| u.phone.clone()).unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Form rehydrated from a stored address.
    pub fn from_address(address: &ShippingAddress, user: Option<&User>) -> Self {
        let country = if address.country.trim().is_empty() { DEFAULT_COUNTRY.to_string() } else { address.country.clone() };
        Self {
            first_name: address.first_name.clone(),
            last_name: address.last_name.clone(),
            address: address.address.clone(),
            city: address.city.clone(),
            zip_code: address.zip_code.clone(),
            country,
            ..Self::for_user(user)
        }
    }

    pub fn to_address(&self) -> ShippingAddress {
        ShippingAddress {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            address: self.address.trim().to_string(),
            city: self.city.trim().to_string(),
            zip_code: self.zip_code.trim().to_string(),
            country: self.country.trim().to_string(),
            tracking_number: None,
        }
    }
}

// =============================================================================
// Payment provider seam
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Succeeded,
    Processing,
    RequiresAction,
    RequiresPaymentMethod,
    RequiresConfirmation,
    Canceled,
    #[serde(other)]
    Other,
}

/// Intent as the provider SDK hands it back when confirmation resolved in-process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedIntent {
    pub id: String,
    pub status: IntentStatus,
    /// Charge type reported by the provider, e.g. `card` or `twint`.
    #[serde(default)]
    pub charge_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Resolved { intent: ConfirmedIntent },
    /// The SDK navigated the browser away; completion arrives via the return URL.
    Redirected,
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

/// The payment provider's client SDK. Confirmation always uses the redirect
/// policy with the session's return URL.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn confirm(&self, session: &PaymentSession) -> PaymentOutcome;
}

// =============================================================================
// State machine
// =============================================================================

#[derive(Clone, Debug)]
pub struct CheckoutSettings {
    pub pricing: PricingPolicy,
    pub polling: PollPolicy,
    pub public_base_url: String,
    pub publishable_key: String,
}

impl CheckoutSettings {
    /// `<base>/order-success?orderId=<id>`
    pub fn return_url(&self, order_id: &str) -> Result<String> {
        let base = Url::parse(&self.public_base_url)
            .map_err(|e| StorefrontError::Config(format!("PUBLIC_BASE_URL: {e}")))?;
        let mut url = base.join("/order-success").map_err(|e| StorefrontError::Config(e.to_string()))?;
        url.query_pairs_mut().append_pair("orderId", order_id);
        Ok(url.into())
    }
}

pub fn success_path(order_id: &str) -> String { format!("/order-success?orderId={order_id}") }
pub fn retry_path(order_id: &str) -> String { format!("/checkout?retry={order_id}") }

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub order_id: String,
    /// Account that submitted the checkout; only it may complete the payment.
    #[serde(skip)]
    pub user_id: String,
    pub order_number: String,
    pub client_secret: String,
    pub publishable_key: String,
    pub totals: Totals,
    pub return_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum CheckoutState {
    #[default]
    Form,
    Payment(PaymentSession),
    #[serde(rename_all = "camelCase")]
    Redirected { order_id: String, return_url: String },
    #[serde(rename_all = "camelCase")]
    Success { order_id: String, redirect: String },
    #[serde(rename_all = "camelCase")]
    Failed { order_id: String, message: String },
}

impl CheckoutState {
    pub fn order_id(&self) -> Option<&str> {
        match self {
            Self::Form => None,
            Self::Payment(s) => Some(&s.order_id),
            Self::Redirected { order_id, .. } | Self::Success { order_id, .. } | Self::Failed { order_id, .. } => Some(order_id),
        }
    }

    /// Order whose payment is still open on our side.
    fn open_order(&self) -> Option<&str> {
        match self {
            Self::Payment(_) | Self::Redirected { .. } => self.order_id(),
            _ => None,
        }
    }

    fn awaits(&self, id: &str) -> bool { self.open_order() == Some(id) }
}

#[derive(Clone, Debug, Default)]
pub struct CheckoutFlow {
    state: CheckoutState,
}

impl CheckoutFlow {
    pub fn new() -> Self { Self::default() }
    pub fn state(&self) -> &CheckoutState { &self.state }

    pub fn payment_session(&self) -> Option<&PaymentSession> {
        match &self.state { CheckoutState::Payment(s) => Some(s), _ => None }
    }

    pub fn reset(&mut self) { self.state = CheckoutState::Form; }

    /// Creates the order and obtains a payment handle for it.
    ///
    /// Starting over from any step abandons the previous payment handle; its
    /// order stays pending at the backend. If the handle request fails, the
    /// flow is left in `Form`.
    pub async fn submit<A: OrderApi + PaymentApi + ?Sized>(
        &mut self,
        api: &A,
        settings: &CheckoutSettings,
        publisher: &EventPublisher,
        user: Option<&User>,
        form: &ShippingForm,
        cart: &Cart,
    ) -> Result<PaymentSession> {
        let user = user.ok_or(StorefrontError::NotAuthenticated)?;
        if cart.is_empty() { return Err(StorefrontError::EmptyCart); }
        form.validate()?;
        self.state = CheckoutState::Form;

        let totals = settings.pricing.totals(cart.total());
        let request = CreateOrderRequest {
            user_id: user.id.clone(),
            items: cart.items().iter().map(|i| OrderLine { product_id: i.id.clone(), quantity: i.quantity }).collect(),
            shipping_address: form.to_address(),
            payment_method: PaymentMethod::Card,
            subtotal: totals.subtotal,
            shipping: totals.shipping,
            tax: totals.tax,
            total: totals.total,
        };
        let order = api.create_order(&request).await?;
        tracing::info!(order_id = %order.id, order_number = %order.order_number, total = %totals.total, "order created");
        publisher.publish(OrderEvent::Placed { order_id: order.id.clone(), total: totals.total }).await;

        let handle = api.create_payment_intent(&order.id).await.map_err(|err| {
            tracing::error!(order_id = %order.id, %err, "payment handle request failed");
            err
        })?;
        publisher.publish(OrderEvent::PaymentHandleIssued { order_id: order.id.clone() }).await;

        let session = PaymentSession {
            return_url: settings.return_url(&order.id)?,
            order_id: order.id,
            user_id: user.id.clone(),
            order_number: order.order_number,
            client_secret: handle.client_secret,
            publishable_key: settings.publishable_key.clone(),
            totals,
        };
        self.state = CheckoutState::Payment(session.clone());
        Ok(session)
    }

    /// Applies what the provider SDK reported for the open payment on behalf
    /// of `user`, who must be the one that submitted it.
    ///
    /// A succeeded intent is written back as `PAID`; if that write fails the
    /// flow stays in `Payment` and [`StorefrontError::PaymentNotRecorded`] is
    /// returned. Provider errors are written back as `FAILED` best-effort.
    pub async fn complete<A: OrderApi + ?Sized>(
        &mut self,
        api: &A,
        publisher: &EventPublisher,
        user: &User,
        outcome: PaymentOutcome,
    ) -> Result<&CheckoutState> {
        let session = self.payment_session().cloned().ok_or(StorefrontError::InvalidCheckoutState { expected: "payment" })?;
        if session.user_id != user.id {
            tracing::warn!(order_id = %session.order_id, user_id = %user.id, "payment completion by another account refused");
            return Err(StorefrontError::AccessDenied);
        }
        let order_id = session.order_id;

        let next = match outcome {
            PaymentOutcome::Redirected => CheckoutState::Redirected { order_id, return_url: session.return_url },
            PaymentOutcome::Error { message } => {
                mark_failed(api, publisher, order_id, message.unwrap_or_else(|| PAYMENT_ERROR.into())).await
            }
            PaymentOutcome::Resolved { intent } => match intent.status {
                IntentStatus::Succeeded => {
                    let method = intent.charge_type.as_deref().and_then(PaymentMethod::from_charge_type).unwrap_or_default();
                    if let Err(err) = api.update_payment(&order_id, &PaymentUpdate::paid(&intent.id, method)).await {
                        tracing::error!(%order_id, %err, "payment succeeded but order update failed");
                        return Err(StorefrontError::PaymentNotRecorded { order_id });
                    }
                    tracing::info!(%order_id, ?method, "payment confirmed in-process");
                    publisher.publish(OrderEvent::Paid { order_id: order_id.clone(), method }).await;
                    CheckoutState::Success { redirect: success_path(&order_id), order_id }
                }
                IntentStatus::RequiresPaymentMethod | IntentStatus::Canceled => {
                    mark_failed(api, publisher, order_id, PAYMENT_INCOMPLETE.into()).await
                }
                status => {
                    tracing::debug!(%order_id, ?status, "payment continues via redirect");
                    CheckoutState::Redirected { order_id, return_url: session.return_url }
                }
            },
        };
        self.state = next;
        Ok(&self.state)
    }

    /// Confirms through the provider SDK, then applies the outcome.
    pub async fn confirm_with<A: OrderApi + ?Sized, P: PaymentProvider + ?Sized>(
        &mut self,
        api: &A,
        publisher: &EventPublisher,
        user: &User,
        provider: &P,
    ) -> Result<&CheckoutState> {
        let session = self.payment_session().cloned().ok_or(StorefrontError::InvalidCheckoutState { expected: "payment" })?;
        if session.user_id != user.id { return Err(StorefrontError::AccessDenied); }
        let outcome = provider.confirm(&session).await;
        self.complete(api, publisher, user, outcome).await
    }
}

async fn mark_failed<A: OrderApi + ?Sized>(api: &A, publisher: &EventPublisher, order_id: String, message: String) -> CheckoutState {
    if let Err(err) = api.update_payment(&order_id, &PaymentUpdate::failed()).await {
        tracing::error!(%order_id, %err, "could not mark payment as failed");
    }
    tracing::warn!(%order_id, %message, "payment failed");
    publisher.publish(OrderEvent::PaymentFailed { order_id: order_id.clone(), reason: message.clone() }).await;
    CheckoutState::Failed { order_id, message }
}

// =============================================================================
// Retry
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct RestoredCheckout {
    pub order: Order,
    pub cart: Cart,
    pub form: ShippingForm,
}

/// Rebuilds cart and shipping form from an earlier order. Lines without
/// product data cannot be re-added and are skipped.
pub async fn restore_from_order<A: OrderApi + ?Sized>(api: &A, order_id: &str, user: Option<&User>) -> Result<RestoredCheckout> {
    let order = api.get_order(order_id).await?;
    if let (Some(user), Some(owner)) = (user, order.user_id.as_deref()) {
        if owner != user.id { return Err(StorefrontError::AccessDenied); }
    }
    let cart = Cart::from_items(order.items.iter().filter_map(|item| {
        let product = item.product.as_ref()?;
        Some(CartItem {
            id: product.id.clone(),
            name: product.name.clone(),
            price: item.price,
            image: product.image.clone().unwrap_or_default(),
            quantity: item.quantity,
        })
    }));
    let form = ShippingForm::from_address(&order.shipping_address, user);
    Ok(RestoredCheckout { order, cart, form })
}

// =============================================================================
// Service
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryView {
    pub form: ShippingForm,
    pub cart: CartSnapshot,
    pub restored: bool,
}

type FlowLock = tokio::sync::Mutex<CheckoutFlow>;

struct FlowSlot {
    flow: Arc<FlowLock>,
    touched: Instant,
    /// Order this flow waits on, mirrored here so reconciliation finds its
    /// sessions without locking every flow.
    awaiting: Option<String>,
}

/// Checkout flows per cart session, wired to the backend, the carts and the
/// event publisher.
///
/// A session without a slot is in `Form`. Slots are created by submitting,
/// dropped again when a flow falls back to `Form`, and otherwise live until
/// [`CheckoutService::evict_idle`] removes them.
pub struct CheckoutService<A: ?Sized> {
    api: Arc<A>,
    carts: Arc<SessionCarts>,
    settings: CheckoutSettings,
    publisher: EventPublisher,
    flows: parking_lot::Mutex<HashMap<String, FlowSlot>>,
}

impl<A: ?Sized> std::fmt::Debug for CheckoutService<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutService").field("settings", &self.settings).finish_non_exhaustive()
    }
}

impl<A: OrderApi + PaymentApi + ?Sized> CheckoutService<A> {
    pub fn new(api: Arc<A>, carts: Arc<SessionCarts>, settings: CheckoutSettings, publisher: EventPublisher) -> Self {
        Self { api, carts, settings, publisher, flows: parking_lot::Mutex::new(HashMap::new()) }
    }

    pub fn settings(&self) -> &CheckoutSettings { &self.settings }

    fn flow(&self, session: &str) -> Arc<FlowLock> {
        let mut flows = self.flows.lock();
        let slot = flows
            .entry(session.to_string())
            .or_insert_with(|| FlowSlot { flow: Arc::default(), touched: Instant::now(), awaiting: None });
        slot.touched = Instant::now();
        slot.flow.clone()
    }

    fn existing(&self, session: &str) -> Option<Arc<FlowLock>> {
        let mut flows = self.flows.lock();
        let slot = flows.get_mut(session)?;
        slot.touched = Instant::now();
        Some(slot.flow.clone())
    }

    /// Records where `flow` ended up. A flow back in `Form` is dropped unless
    /// another request holds it.
    fn track(&self, session: &str, flow: &Arc<FlowLock>, state: &CheckoutState) {
        let mut flows = self.flows.lock();
        let Some(slot) = flows.get_mut(session) else { return };
        if !Arc::ptr_eq(&slot.flow, flow) { return; }
        match state {
            CheckoutState::Form if Arc::strong_count(flow) == 2 => {
                flows.remove(session);
            }
            _ => slot.awaiting = state.open_order().map(str::to_string),
        }
    }

    pub async fn state(&self, session: &str) -> CheckoutState {
        match self.existing(session) {
            Some(flow) => flow.lock().await.state().clone(),
            None => CheckoutState::Form,
        }
    }

    pub async fn submit(&self, session: &str, user: Option<&User>, form: &ShippingForm) -> Result<PaymentSession> {
        let cart = self.carts.cart(session).await?;
        let flow = self.flow(session);
        let mut guard = flow.lock().await;
        let submitted = guard.submit(&*self.api, &self.settings, &self.publisher, user, form, &cart).await;
        let state = guard.state().clone();
        drop(guard);
        self.track(session, &flow, &state);
        submitted
    }

    /// Applies a provider outcome. Only the account that submitted the
    /// checkout may complete it.
    pub async fn complete(&self, session: &str, user: Option<&User>, outcome: PaymentOutcome) -> Result<CheckoutState> {
        let user = user.ok_or(StorefrontError::NotAuthenticated)?;
        let flow = self.existing(session).ok_or(StorefrontError::InvalidCheckoutState { expected: "payment" })?;
        let state = flow.lock().await.complete(&*self.api, &self.publisher, user, outcome).await?.clone();
        self.track(session, &flow, &state);
        self.after_completion(session, &state).await?;
        Ok(state)
    }

    pub async fn confirm_with<P: PaymentProvider + ?Sized>(&self, session: &str, user: &User, provider: &P) -> Result<CheckoutState> {
        let flow = self.existing(session).ok_or(StorefrontError::InvalidCheckoutState { expected: "payment" })?;
        let state = flow.lock().await.confirm_with(&*self.api, &self.publisher, user, provider).await?.clone();
        self.track(session, &flow, &state);
        self.after_completion(session, &state).await?;
        Ok(state)
    }

    async fn after_completion(&self, session: &str, state: &CheckoutState) -> Result<()> {
        if matches!(state, CheckoutState::Success { .. }) {
            self.carts.update(session, CartStore::clear_cart).await?;
            self.publisher.publish(CartEvent::Cleared { session: session.to_string() }).await;
        }
        Ok(())
    }

    /// Handles `retry=<order_id>`: an empty cart is refilled from the order,
    /// a non-empty one is kept. The form is rehydrated either way.
    pub async fn restore(&self, session: &str, order_id: &str, user: Option<&User>) -> Result<RetryView> {
        let restored = restore_from_order(&*self.api, order_id, user).await?;
        let RestoredCheckout { cart, form, .. } = restored;
        let (snapshot, refilled) = self
            .carts
            .update(session, move |store| {
                let refill = store.cart().is_empty();
                if refill { store.replace(cart); }
                (store.snapshot(), refill)
            })
            .await?;
        if let Some(flow) = self.existing(session) {
            flow.lock().await.reset();
            self.track(session, &flow, &CheckoutState::Form);
        }
        if refilled {
            tracing::info!(session, order_id, items = snapshot.items.len(), "cart restored from order");
            self.publisher.publish(CartEvent::Restored { session: session.to_string(), order_id: order_id.to_string() }).await;
        }
        Ok(RetryView { form, cart: snapshot, restored: refilled })
    }

    /// Reconciles a redirect-based payment and settles any checkout still
    /// waiting on that order.
    pub async fn reconcile(&self, order_id: &str, cancel: &CancellationToken) -> Result<Reconciliation> {
        let outcome = reconcile_payment(&*self.api, order_id, self.settings.polling, cancel).await?;

        let waiting: Vec<(String, Arc<FlowLock>)> = self
            .flows
            .lock()
            .iter()
            .filter(|(_, slot)| slot.awaiting.as_deref() == Some(order_id))
            .map(|(session, slot)| (session.clone(), slot.flow.clone()))
            .collect();
        for (session, flow) in waiting {
            let mut guard = flow.lock().await;
            if !guard.state().awaits(order_id) { continue; }
            match &outcome {
                Reconciliation::Paid(order) => {
                    guard.state = CheckoutState::Success { order_id: order_id.to_string(), redirect: success_path(order_id) };
                    let state = guard.state.clone();
                    drop(guard);
                    self.track(&session, &flow, &state);
                    self.carts.update(&session, CartStore::clear_cart).await?;
                    let method = order.payment_method.unwrap_or_default();
                    self.publisher.publish(OrderEvent::Paid { order_id: order_id.to_string(), method }).await;
                    self.publisher.publish(CartEvent::Cleared { session }).await;
                }
                Reconciliation::Failed(_) => {
                    guard.state = CheckoutState::Failed { order_id: order_id.to_string(), message: PAYMENT_INCOMPLETE.into() };
                    let state = guard.state.clone();
                    drop(guard);
                    self.track(&session, &flow, &state);
                }
                Reconciliation::TimedOut(_) => {
                    self.publisher.publish(OrderEvent::PaymentStillPending { order_id: order_id.to_string() }).await;
                }
            }
        }
        Ok(outcome)
    }

    /// Drops flows untouched for longer than `max_idle` that no request holds.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut flows = self.flows.lock();
        let before = flows.len();
        flows.retain(|_, slot| Arc::strong_count(&slot.flow) > 1 || slot.touched.elapsed() < max_idle);
        before - flows.len()
    }

    pub fn open_flows(&self) -> usize { self.flows.lock().len() }
}
