//! Domain events
use serde::Serialize;
use crate::domain::aggregates::{OrderStatus, PaymentMethod};
use crate::domain::value_objects::Chf;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Cart(CartEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CartEvent {
    ItemAdded { session: String, product_id: String },
    QuantityChanged { session: String, product_id: String, quantity: i64 },
    ItemRemoved { session: String, product_id: String },
    Restored { session: String, order_id: String },
    Cleared { session: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: String, total: Chf },
    PaymentHandleIssued { order_id: String },
    Paid { order_id: String, method: PaymentMethod },
    PaymentFailed { order_id: String, reason: String },
    PaymentStillPending { order_id: String },
    StatusChanged { order_id: String, status: OrderStatus, tracking_number: Option<String> },
}

impl DomainEvent {
    /// NATS subject, e.g. `storefront.order.paid`.
    pub fn subject(&self) -> String {
        let (aggregate, name) = match self {
            Self::Cart(e) => ("cart", match e {
                CartEvent::ItemAdded { .. } => "item_added",
                CartEvent::QuantityChanged { .. } => "quantity_changed",
                CartEvent::ItemRemoved { .. } => "item_removed",
                CartEvent::Restored { .. } => "restored",
                CartEvent::Cleared { .. } => "cleared",
            }),
            Self::Order(e) => ("order", match e {
                OrderEvent::Placed { .. } => "placed",
                OrderEvent::PaymentHandleIssued { .. } => "payment_handle_issued",
                OrderEvent::Paid { .. } => "paid",
                OrderEvent::PaymentFailed { .. } => "payment_failed",
                OrderEvent::PaymentStillPending { .. } => "payment_still_pending",
                OrderEvent::StatusChanged { .. } => "status_changed",
            }),
        };
        format!("storefront.{aggregate}.{name}")
    }
}

impl From<CartEvent> for DomainEvent {
    fn from(e: CartEvent) -> Self { Self::Cart(e) }
}

impl From<OrderEvent> for DomainEvent {
    fn from(e: OrderEvent) -> Self { Self::Order(e) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_and_payload() {
        let event: DomainEvent = OrderEvent::Paid { order_id: "o1".into(), method: PaymentMethod::Twint }.into();
        assert_eq!(event.subject(), "storefront.order.paid");
        assert_eq!(serde_json::to_value(&event).unwrap(), serde_json::json!({ "event": "paid", "order_id": "o1", "method": "TWINT" }));
    }
}
