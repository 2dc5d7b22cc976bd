//! Customer-facing order views.

use serde::Serialize;
use crate::api::{OrderApi, OrderQuery};
use crate::auth::User;
use crate::checkout::retry_path;
use crate::domain::aggregates::Order;
use crate::{Result, StorefrontError};

/// The signed-in customer's orders, newest first.
pub async fn my_orders<A: OrderApi + ?Sized>(api: &A, user: &User) -> Result<Vec<Order>> {
    let query = OrderQuery { user_id: Some(user.id.clone()), ..Default::default() };
    let mut orders = api.list_orders(&query).await?;
    orders.retain(|o| o.is_owned_by(&user.id));
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(orders)
}

/// Fetches one order, refusing orders of other customers.
pub async fn order_for_customer<A: OrderApi + ?Sized>(api: &A, user: &User, order_id: &str) -> Result<Order> {
    let order = api.get_order(order_id).await?;
    if !order.is_owned_by(&user.id) {
        tracing::warn!(order_id, user_id = %user.id, "order requested by another customer");
        return Err(StorefrontError::AccessDenied);
    }
    Ok(order)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailedView {
    pub order: Order,
    pub retry_path: String,
}

pub async fn payment_failed_view<A: OrderApi + ?Sized>(api: &A, user: Option<&User>, order_id: &str) -> Result<PaymentFailedView> {
    let order = match user {
        Some(user) => order_for_customer(api, user, order_id).await?,
        None => return Err(StorefrontError::NotAuthenticated),
    };
    Ok(PaymentFailedView { retry_path: retry_path(&order.id), order })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CreateOrderRequest, PaymentUpdate, StatusUpdate};
    use async_trait::async_trait;

    struct Shelf(Vec<Order>);

    #[async_trait]
    impl OrderApi for Shelf {
        async fn list_orders(&self, _: &OrderQuery) -> Result<Vec<Order>> { Ok(self.0.clone()) }
        async fn get_order(&self, id: &str) -> Result<Order> {
            self.0.iter().find(|o| o.id == id).cloned().ok_or(StorefrontError::Api { status: 404, message: "Order not found".into() })
        }
        async fn create_order(&self, _: &CreateOrderRequest) -> Result<Order> { unimplemented!() }
        async fn update_order_status(&self, _: &str, _: &StatusUpdate) -> Result<Order> { unimplemented!() }
        async fn update_payment(&self, _: &str, _: &PaymentUpdate) -> Result<()> { unimplemented!() }
    }

    fn order(id: &str, owner: &str, created: &str) -> Order {
        serde_json::from_value(serde_json::json!({
            "id": id, "orderNumber": format!("YS-{id}"), "userId": owner, "subtotal": 10, "total": 18, "createdAt": created
        })).unwrap()
    }

    fn anna() -> User {
        serde_json::from_value(serde_json::json!({ "id": "u1", "email": "anna@example.ch" })).unwrap()
    }

    fn shelf() -> Shelf {
        Shelf(vec![
            order("o1", "u1", "2025-01-02T10:00:00Z"),
            order("o2", "u2", "2025-01-03T10:00:00Z"),
            order("o3", "u1", "2025-01-04T10:00:00Z"),
        ])
    }

    #[tokio::test]
    async fn test_my_orders_newest_first() {
        let orders = my_orders(&shelf(), &anna()).await.unwrap();
        assert_eq!(orders.iter().map(|o| o.id.as_str()).collect::<Vec<_>>(), ["o3", "o1"]);
    }

    #[tokio::test]
    async fn test_foreign_order_denied() {
        assert!(matches!(order_for_customer(&shelf(), &anna(), "o2").await, Err(StorefrontError::AccessDenied)));
        assert_eq!(order_for_customer(&shelf(), &anna(), "o1").await.unwrap().id, "o1");
    }

    #[tokio::test]
    async fn test_payment_failed_view_offers_retry() {
        let view = payment_failed_view(&shelf(), Some(&anna()), "o3").await.unwrap();
        assert_eq!(view.retry_path, "/checkout?retry=o3");
        assert!(matches!(payment_failed_view(&shelf(), None, "o3").await, Err(StorefrontError::NotAuthenticated)));
    }
}
