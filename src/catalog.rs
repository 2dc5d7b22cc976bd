//! Catalog browsing: filtering and sorting over the fetched product set.

use std::cmp::Ordering;
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::{Product, ProductType};
use crate::Chf;

/// Category value meaning "no category filter".
pub const ALL_CATEGORIES: &str = "Alle";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CatalogSort { #[default] Default, PriceLow, PriceHigh, NameAsc, NameDesc }

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogQuery {
    pub category: Option<String>,
    pub product_type: Option<ProductType>,
    pub min_price: Option<Chf>,
    pub max_price: Option<Chf>,
    #[serde(alias = "q")]
    pub search: Option<String>,
    pub in_stock: bool,
    pub sort: CatalogSort,
}

impl CatalogQuery {
    pub fn matches(&self, product: &Product) -> bool {
        if !product.is_active { return false; }
        if let Some(category) = self.category.as_deref().filter(|c| *c != ALL_CATEGORIES) {
            if product.category != category { return false; }
        }
        if self.product_type.is_some() && product.product_type != self.product_type { return false; }
        if self.min_price.is_some_and(|min| product.sell_price < min) { return false; }
        if self.max_price.is_some_and(|max| product.sell_price > max) { return false; }
        if self.in_stock && !product.is_in_stock() { return false; }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => contains_ci(&product.name, term) || product.description.as_deref().is_some_and(|d| contains_ci(d, term)),
            None => true,
        }
    }

    fn compare(&self, a: &Product, b: &Product) -> Ordering {
        match self.sort {
            CatalogSort::Default => Ordering::Equal,
            CatalogSort::PriceLow => a.sell_price.cmp(&b.sell_price),
            CatalogSort::PriceHigh => b.sell_price.cmp(&a.sell_price),
            CatalogSort::NameAsc => name_key(a).cmp(&name_key(b)),
            CatalogSort::NameDesc => name_key(b).cmp(&name_key(a)),
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool { haystack.to_lowercase().contains(&needle.to_lowercase()) }
fn name_key(p: &Product) -> String { p.name.to_lowercase() }

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategoryCount { pub name: String, pub count: usize }

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPage {
    pub products: Vec<Product>,
    pub total: usize,
    pub categories: Vec<CategoryCount>,
    pub max_price: Option<Chf>,
}

/// Filters and sorts; the sort is stable so `Default` keeps backend order.
pub fn browse(products: Vec<Product>, query: &CatalogQuery) -> CatalogPage {
    let categories = category_counts(&products);
    let max_price = max_price(&products);
    let mut matching: Vec<Product> = products.into_iter().filter(|p| query.matches(p)).collect();
    matching.sort_by(|a, b| query.compare(a, b));
    CatalogPage { total: matching.len(), products: matching, categories, max_price }
}

/// Categories in order of first appearance with their product counts.
pub fn category_counts(products: &[Product]) -> Vec<CategoryCount> {
    let mut counts: Vec<CategoryCount> = Vec::new();
    for product in products {
        match counts.iter_mut().find(|c| c.name == product.category) {
            Some(entry) => entry.count += 1,
            None => counts.push(CategoryCount { name: product.category.clone(), count: 1 }),
        }
    }
    counts
}

pub fn max_price(products: &[Product]) -> Option<Chf> { products.iter().map(|p| p.sell_price).max() }

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, name: &str, category: &str, price: i64, stock: i32) -> Product {
        serde_json::from_value(serde_json::json!({
            "id": id, "name": name, "category": category, "sellPrice": price, "stock": stock,
            "description": format!("{name} für die Piste"), "productType": "NEW"
        })).unwrap()
    }

    fn shelf() -> Vec<Product> {
        let mut hidden = product("p4", "Alter Helm", "Zubehör", 20, 1);
        hidden.is_active = false;
        vec![product("p1", "Rossignol Hero", "Skier", 699, 2), product("p2", "atomic Hawx", "Schuhe", 349, 0), product("p3", "Bindung", "Technik", 120, 5), hidden]
    }

    #[test]
    fn test_inactive_products_hidden() {
        let page = browse(shelf(), &CatalogQuery::default());
        assert_eq!(page.total, 3);
        assert_eq!(page.products.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), ["p1", "p2", "p3"]);
        assert_eq!(page.max_price, Some(Chf::francs(699)));
        assert_eq!(page.categories.len(), 4);
    }

    #[test]
    fn test_filters_combine() {
        let query = CatalogQuery { min_price: Some(Chf::francs(100)), max_price: Some(Chf::francs(400)), in_stock: true, ..Default::default() };
        let page = browse(shelf(), &query);
        assert_eq!(page.products.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), ["p3"]);

        let query = CatalogQuery { category: Some(ALL_CATEGORIES.into()), search: Some("PISTE".into()), ..Default::default() };
        assert_eq!(browse(shelf(), &query).total, 3);

        let query = CatalogQuery { category: Some("Schuhe".into()), product_type: Some(ProductType::Occasion), ..Default::default() };
        assert_eq!(browse(shelf(), &query).total, 0);
    }

    #[test]
    fn test_sorting() {
        let by = |sort| browse(shelf(), &CatalogQuery { sort, ..Default::default() }).products.into_iter().map(|p| p.id).collect::<Vec<_>>();
        assert_eq!(by(CatalogSort::PriceLow), ["p3", "p2", "p1"]);
        assert_eq!(by(CatalogSort::PriceHigh), ["p1", "p2", "p3"]);
        assert_eq!(by(CatalogSort::NameAsc), ["p2", "p3", "p1"]);
        assert_eq!(by(CatalogSort::NameDesc), ["p1", "p3", "p2"]);
    }

    #[test]
    fn test_query_string_shape() {
        let query: CatalogQuery = serde_json::from_value(serde_json::json!({ "q": "ski", "sort": "price-high", "inStock": true })).unwrap();
        assert_eq!(query.search.as_deref(), Some("ski"));
        assert_eq!(query.sort, CatalogSort::PriceHigh);
        assert!(query.in_stock);
    }
}
