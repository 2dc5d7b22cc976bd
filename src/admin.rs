//! Admin operations: products, image uploads, orders, finance and the
//! dashboard summary. Everything is a single validated call to the backend.

use serde::{Deserialize, Serialize};
use validator::Validate;
use crate::api::{
    CatalogApi, FinanceApi, ImageUpload, OrderApi, OrderQuery, ProductInput, ProductProfitability, StatusUpdate, StorageApi,
    TestEmailKind,
};
use crate::domain::aggregates::{Order, OrderStatus, Product};
use crate::domain::events::OrderEvent;
use crate::publisher::EventPublisher;
use crate::{Chf, Result, StorefrontError};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

// =============================================================================
// Products
// =============================================================================

/// The first gallery image doubles as the main image.
fn with_main_image(mut input: ProductInput) -> ProductInput {
    input.images.retain(|url| !url.trim().is_empty());
    if let Some(first) = input.images.first() {
        input.image = Some(first.clone());
    }
    input
}

pub async fn create_product<A: CatalogApi + ?Sized>(api: &A, input: ProductInput) -> Result<Product> {
    input.validate()?;
    let product = api.create_product(&with_main_image(input)).await?;
    tracing::info!(product_id = %product.id, name = %product.name, "product created");
    Ok(product)
}

pub async fn update_product<A: CatalogApi + ?Sized>(api: &A, id: &str, input: ProductInput) -> Result<Product> {
    input.validate()?;
    let product = api.update_product(id, &with_main_image(input)).await?;
    tracing::info!(product_id = %product.id, "product updated");
    Ok(product)
}

pub async fn delete_product<A: CatalogApi + ?Sized>(api: &A, id: &str) -> Result<()> {
    api.delete_product(id).await?;
    tracing::info!(product_id = id, "product deleted");
    Ok(())
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProductFilter {
    #[serde(alias = "q")]
    pub search: Option<String>,
    pub category: Option<String>,
}

impl ProductFilter {
    /// Name, SKU or barcode contains the search term (case-insensitive).
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty() && *c != crate::catalog::ALL_CATEGORIES) {
            if product.category != category { return false; }
        }
        let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) else { return true };
        let term = term.to_lowercase();
        [Some(product.name.as_str()), product.sku.as_deref(), product.barcode.as_deref()]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&term))
    }
}

pub async fn list_products<A: CatalogApi + ?Sized>(api: &A, filter: &ProductFilter) -> Result<Vec<Product>> {
    let mut products = api.list_all_products().await?;
    products.retain(|p| filter.matches(p));
    Ok(products)
}

// =============================================================================
// Uploads
// =============================================================================

pub fn validate_upload(upload: &ImageUpload) -> Result<()> {
    if !upload.content_type.starts_with("image/") {
        return Err(StorefrontError::Validation(format!("{} is not an image", upload.content_type)));
    }
    if upload.bytes.len() > MAX_IMAGE_BYTES {
        return Err(StorefrontError::Validation("image exceeds 5 MB".into()));
    }
    if upload.bytes.is_empty() {
        return Err(StorefrontError::Validation("image is empty".into()));
    }
    Ok(())
}

pub async fn upload_image<A: StorageApi + ?Sized>(api: &A, upload: ImageUpload) -> Result<String> {
    validate_upload(&upload)?;
    let (name, size) = (upload.file_name.clone(), upload.bytes.len());
    let url = api.upload_image(upload).await?;
    tracing::info!(file = %name, size, %url, "image uploaded");
    Ok(url)
}

// =============================================================================
// Orders
// =============================================================================

pub async fn list_orders<A: OrderApi + ?Sized>(api: &A, status: Option<OrderStatus>) -> Result<Vec<Order>> {
    api.list_orders(&OrderQuery { status, user_id: None }).await
}

/// Moves an order to `status`. A blank tracking number is dropped.
pub async fn update_order_status<A: OrderApi + ?Sized>(
    api: &A,
    publisher: &EventPublisher,
    order_id: &str,
    status: OrderStatus,
    tracking_number: Option<&str>,
) -> Result<Order> {
    let tracking_number = tracking_number.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string);
    let update = StatusUpdate { status, tracking_number: tracking_number.clone() };
    let order = api.update_order_status(order_id, &update).await?;
    tracing::info!(order_id, status = status.as_str(), tracking = tracking_number.as_deref(), "order status changed");
    publisher.publish(OrderEvent::StatusChanged { order_id: order_id.to_string(), status, tracking_number }).await;
    Ok(order)
}

// =============================================================================
// Finance
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfitSortField { #[default] Profit, Revenue, Name }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection { Asc, #[default] Desc }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfitSort {
    pub field: ProfitSortField,
    pub direction: SortDirection,
}

impl ProfitSort {
    /// Clicking the active column flips the direction; a new column starts descending.
    pub fn toggle(self, field: ProfitSortField) -> Self {
        if field == self.field {
            let direction = match self.direction { SortDirection::Asc => SortDirection::Desc, SortDirection::Desc => SortDirection::Asc };
            Self { field, direction }
        } else {
            Self { field, direction: SortDirection::Desc }
        }
    }

    pub fn sort(self, rows: &mut [ProductProfitability]) {
        rows.sort_by(|a, b| {
            let ord = match self.field {
                ProfitSortField::Profit => a.profit.cmp(&b.profit),
                ProfitSortField::Revenue => a.total_revenue.cmp(&b.total_revenue),
                ProfitSortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            };
            if self.direction == SortDirection::Desc { ord.reverse() } else { ord }
        });
    }
}

pub async fn profitability<A: FinanceApi + ?Sized>(api: &A, sort: ProfitSort) -> Result<Vec<ProductProfitability>> {
    let mut rows = api.product_profitability().await?;
    sort.sort(&mut rows);
    Ok(rows)
}

pub async fn send_test_email<A: FinanceApi + ?Sized>(api: &A, kind: TestEmailKind) -> Result<String> {
    let message = api.send_test_email(kind).await?;
    tracing::info!(?kind, "test email sent");
    Ok(message)
}

// =============================================================================
// Dashboard
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_products: usize,
    pub low_stock_products: usize,
    pub out_of_stock_products: usize,
    pub pending_orders: usize,
    pub total_revenue: Chf,
}

/// Each figure comes from its own call; a failing call leaves its figures at zero.
pub async fn dashboard<A: CatalogApi + OrderApi + FinanceApi + ?Sized>(api: &A) -> DashboardSummary {
    let (products, pending, stats) = tokio::join!(
        api.list_all_products(),
        api.list_orders(&OrderQuery { status: Some(OrderStatus::Pending), user_id: None }),
        api.finance_stats(),
    );
    let mut summary = DashboardSummary::default();
    match products {
        Ok(products) => {
            summary.total_products = products.len();
            summary.low_stock_products = products.iter().filter(|p| p.is_low_stock()).count();
            summary.out_of_stock_products = products.iter().filter(|p| p.stock <= 0).count();
        }
        Err(err) => tracing::warn!(%err, "dashboard: products unavailable"),
    }
    match pending {
        Ok(orders) => summary.pending_orders = orders.len(),
        Err(err) => tracing::warn!(%err, "dashboard: orders unavailable"),
    }
    match stats {
        Ok(stats) => summary.total_revenue = stats.total_revenue,
        Err(err) => tracing::warn!(%err, "dashboard: finance stats unavailable"),
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CreateOrderRequest, FinanceStats, PaymentUpdate};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Backoffice {
        products: Vec<Product>,
        created: Mutex<Vec<ProductInput>>,
        status_updates: Mutex<Vec<StatusUpdate>>,
        orders_down: bool,
    }

    #[async_trait]
    impl CatalogApi for Backoffice {
        async fn list_products(&self) -> Result<Vec<Product>> { Ok(self.products.clone()) }
        async fn list_all_products(&self) -> Result<Vec<Product>> { Ok(self.products.clone()) }
        async fn get_product(&self, _: &str) -> Result<Product> { unimplemented!() }
        async fn create_product(&self, input: &ProductInput) -> Result<Product> {
            self.created.lock().push(input.clone());
            Ok(product("new", &input.name, 1, 0))
        }
        async fn update_product(&self, _: &str, _: &ProductInput) -> Result<Product> { unimplemented!() }
        async fn delete_product(&self, _: &str) -> Result<()> { Ok(()) }
    }

    #[async_trait]
    impl OrderApi for Backoffice {
        async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
            if self.orders_down { return Err(StorefrontError::Api { status: 503, message: "down".into() }); }
            assert_eq!(query.status, Some(OrderStatus::Pending));
            Ok(vec![order(), order()])
        }
        async fn get_order(&self, _: &str) -> Result<Order> { unimplemented!() }
        async fn create_order(&self, _: &CreateOrderRequest) -> Result<Order> { unimplemented!() }
        async fn update_order_status(&self, _: &str, update: &StatusUpdate) -> Result<Order> {
            self.status_updates.lock().push(update.clone());
            Ok(order())
        }
        async fn update_payment(&self, _: &str, _: &PaymentUpdate) -> Result<()> { unimplemented!() }
    }

    #[async_trait]
    impl FinanceApi for Backoffice {
        async fn finance_stats(&self) -> Result<FinanceStats> {
            Ok(FinanceStats { total_revenue: Chf::rappen(123_450), ..Default::default() })
        }
        async fn product_profitability(&self) -> Result<Vec<ProductProfitability>> { Ok(vec![]) }
        async fn send_test_email(&self, _: TestEmailKind) -> Result<String> { Ok("sent".into()) }
    }

    fn product(id: &str, name: &str, stock: i32, min_stock: i32) -> Product {
        serde_json::from_value(serde_json::json!({
            "id": id, "name": name, "category": "Skier", "sellPrice": 100, "stock": stock, "minStock": min_stock,
            "sku": format!("SKU-{id}"), "barcode": format!("7610{id}")
        })).unwrap()
    }

    fn order() -> Order {
        serde_json::from_value(serde_json::json!({ "id": "o1", "orderNumber": "YS-1", "subtotal": 10, "total": 18 })).unwrap()
    }

    fn input(images: Vec<&str>) -> ProductInput {
        serde_json::from_value(serde_json::json!({
            "name": "Atomic Redster", "category": "Skier", "sellPrice": 799, "image": "/old.jpg", "images": images
        })).unwrap()
    }

    #[tokio::test]
    async fn test_first_gallery_image_becomes_main() {
        let api = Backoffice::default();
        create_product(&api, input(vec!["", "/a.jpg", "/b.jpg"])).await.unwrap();
        create_product(&api, input(vec![])).await.unwrap();
        let created = api.created.lock();
        assert_eq!(created[0].image.as_deref(), Some("/a.jpg"));
        assert_eq!(created[0].images, ["/a.jpg", "/b.jpg"]);
        assert_eq!(created[1].image.as_deref(), Some("/old.jpg"));
    }

    #[tokio::test]
    async fn test_invalid_product_never_reaches_backend() {
        let api = Backoffice::default();
        let bad = ProductInput { sell_price: Chf::ZERO, ..input(vec![]) };
        assert!(matches!(create_product(&api, bad).await, Err(StorefrontError::Validation(_))));
        assert!(api.created.lock().is_empty());
    }

    #[test]
    fn test_admin_search() {
        let p = product("42", "Salomon QST", 1, 0);
        let by = |search: &str| ProductFilter { search: Some(search.into()), category: None }.matches(&p);
        assert!(by("qst"));
        assert!(by("sku-42"));
        assert!(by("761042"));
        assert!(!by("atomic"));
        assert!(!ProductFilter { search: None, category: Some("Schuhe".into()) }.matches(&p));
        assert!(ProductFilter { search: None, category: Some("Alle".into()) }.matches(&p));
    }

    #[test]
    fn test_upload_rules() {
        let upload = |content_type: &str, size: usize| ImageUpload { file_name: "x".into(), content_type: content_type.into(), bytes: vec![0; size] };
        assert!(validate_upload(&upload("image/png", 1024)).is_ok());
        assert!(validate_upload(&upload("image/jpeg", MAX_IMAGE_BYTES)).is_ok());
        assert!(validate_upload(&upload("image/jpeg", MAX_IMAGE_BYTES + 1)).is_err());
        assert!(validate_upload(&upload("application/pdf", 10)).is_err());
    }

    #[tokio::test]
    async fn test_blank_tracking_number_dropped() {
        let api = Backoffice::default();
        let publisher = EventPublisher::disabled();
        update_order_status(&api, &publisher, "o1", OrderStatus::Shipped, Some("  ")).await.unwrap();
        update_order_status(&api, &publisher, "o1", OrderStatus::Shipped, Some(" CH123 ")).await.unwrap();
        let updates = api.status_updates.lock();
        assert_eq!(updates[0].tracking_number, None);
        assert_eq!(updates[1].tracking_number.as_deref(), Some("CH123"));
    }

    #[test]
    fn test_profit_sort_toggle() {
        let sort = ProfitSort::default();
        assert_eq!(sort, ProfitSort { field: ProfitSortField::Profit, direction: SortDirection::Desc });
        let sort = sort.toggle(ProfitSortField::Profit);
        assert_eq!(sort.direction, SortDirection::Asc);
        let sort = sort.toggle(ProfitSortField::Name);
        assert_eq!(sort, ProfitSort { field: ProfitSortField::Name, direction: SortDirection::Desc });

        let row = |name: &str, profit: i64| -> ProductProfitability {
            serde_json::from_value(serde_json::json!({ "id": name, "name": name, "profit": profit })).unwrap()
        };
        let mut rows = vec![row("b", 5), row("a", 50), row("c", 20)];
        ProfitSort::default().sort(&mut rows);
        assert_eq!(rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), ["a", "c", "b"]);
        ProfitSort { field: ProfitSortField::Name, direction: SortDirection::Asc }.sort(&mut rows);
        assert_eq!(rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_dashboard_summary() {
        let api = Backoffice {
            products: vec![product("1", "a", 0, 2), product("2", "b", 2, 2), product("3", "c", 9, 2), product("4", "d", -1, 0)],
            ..Default::default()
        };
        let summary = dashboard(&api).await;
        assert_eq!(summary, DashboardSummary {
            total_products: 4, low_stock_products: 1, out_of_stock_products: 2, pending_orders: 2, total_revenue: Chf::rappen(123_450),
        });

        let degraded = dashboard(&Backoffice { orders_down: true, ..Default::default() }).await;
        assert_eq!(degraded.pending_orders, 0);
        assert_eq!(degraded.total_revenue, Chf::rappen(123_450));
    }
}
