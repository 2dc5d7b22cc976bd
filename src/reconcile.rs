//! Payment reconciliation after redirect-based payments.
//!
//! When the provider sends the browser back (TWINT, 3-D Secure) all we have is
//! the order id. The real outcome arrives at the backend through the provider's
//! webhook, which may lag the redirect, so the order is re-read on a fixed
//! interval until it settles or the attempt budget runs out.

use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use crate::api::OrderApi;
use crate::domain::aggregates::{Order, PaymentStatus};
use crate::{Result, StorefrontError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Polls after the initial fetch.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self { Self { interval: Duration::from_secs(2), max_attempts: 15 } }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Reconciliation {
    Paid(Order),
    Failed(Order),
    /// Still unsettled when the budget ran out; the order is shown as pending.
    TimedOut(Order),
}

impl Reconciliation {
    pub fn order(&self) -> &Order {
        match self { Self::Paid(o) | Self::Failed(o) | Self::TimedOut(o) => o }
    }

    pub fn into_order(self) -> Order {
        match self { Self::Paid(o) | Self::Failed(o) | Self::TimedOut(o) => o }
    }

    /// Where the browser should go next, if anywhere.
    pub fn redirect(&self) -> Option<String> {
        match self {
            Self::Failed(order) => Some(payment_failed_path(&order.id)),
            Self::Paid(_) | Self::TimedOut(_) => None,
        }
    }
}

pub fn payment_failed_path(order_id: &str) -> String { format!("/payment-failed?orderId={order_id}") }

fn settle(order: Order) -> std::result::Result<Reconciliation, Order> {
    match order.payment_status {
        PaymentStatus::Paid => Ok(Reconciliation::Paid(order)),
        PaymentStatus::Failed => Ok(Reconciliation::Failed(order)),
        PaymentStatus::Pending | PaymentStatus::Refunded => Err(order),
    }
}

/// Reads the order until its payment settles.
///
/// The first fetch happens immediately and its error is returned as is. Later
/// polls that fail are logged and count against the budget. Cancelling `cancel`
/// stops the loop at the next await point, including mid-request.
pub async fn reconcile_payment<A: OrderApi + ?Sized>(
    api: &A,
    order_id: &str,
    policy: PollPolicy,
    cancel: &CancellationToken,
) -> Result<Reconciliation> {
    let first = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(StorefrontError::ReconciliationCancelled),
        fetched = api.get_order(order_id) => fetched?,
    };
    let mut order = match settle(first) {
        Ok(done) => return Ok(done),
        Err(pending) => pending,
    };
    tracing::info!(order_id, max_attempts = policy.max_attempts, "payment pending, polling order");

    let mut ticker = interval_at(Instant::now() + policy.interval, policy.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    for attempt in 1..=policy.max_attempts {
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StorefrontError::ReconciliationCancelled),
            fetched = async {
                ticker.tick().await;
                api.get_order(order_id).await
            } => fetched,
        };
        match fetched {
            Ok(fresh) => match settle(fresh) {
                Ok(done) => {
                    tracing::info!(order_id, attempt, status = ?done.order().payment_status, "payment settled");
                    return Ok(done);
                }
                Err(pending) => order = pending,
            },
            Err(err) => tracing::warn!(order_id, attempt, %err, "payment status poll failed"),
        }
    }

    tracing::info!(order_id, "payment still pending after polling budget");
    Ok(Reconciliation::TimedOut(order))
}
