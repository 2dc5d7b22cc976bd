//! Cart store: the mutable cart behind a session, with change notification
//! and persistence.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::time::Instant;
use crate::domain::aggregates::{Cart, CartItem, NewCartItem};
use crate::{Chf, Result};

/// What subscribers see after every mutation.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    pub items: Vec<CartItem>,
    pub cart_count: u32,
    pub cart_total: Chf,
}

impl From<&Cart> for CartSnapshot {
    fn from(cart: &Cart) -> Self {
        Self { items: cart.items().to_vec(), cart_count: cart.count(), cart_total: cart.total() }
    }
}

#[derive(Debug)]
pub struct CartStore {
    cart: Cart,
    changes: watch::Sender<CartSnapshot>,
}

impl CartStore {
    pub fn new(cart: Cart) -> Self {
        let (changes, _) = watch::channel(CartSnapshot::from(&cart));
        Self { cart, changes }
    }

    pub fn cart(&self) -> &Cart { &self.cart }
    pub fn cart_count(&self) -> u32 { self.cart.count() }
    pub fn cart_total(&self) -> Chf { self.cart.total() }
    pub fn snapshot(&self) -> CartSnapshot { CartSnapshot::from(&self.cart) }

    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> { self.changes.subscribe() }

    pub fn add_to_cart(&mut self, item: NewCartItem) {
        self.cart.add(item);
        self.notify();
    }

    pub fn update_quantity(&mut self, id: &str, quantity: i64) {
        if self.cart.update_quantity(id, quantity) { self.notify(); }
    }

    pub fn remove_from_cart(&mut self, id: &str) {
        if self.cart.remove(id) { self.notify(); }
    }

    pub fn clear_cart(&mut self) {
        if !self.cart.is_empty() {
            self.cart.clear();
            self.notify();
        }
    }

    /// Swaps in a whole cart at once, notifying once.
    pub fn replace(&mut self, cart: Cart) {
        self.cart = cart;
        self.notify();
    }

    /// Number of live subscribers.
    pub fn watchers(&self) -> usize { self.changes.receiver_count() }

    pub fn into_cart(self) -> Cart { self.cart }

    fn notify(&self) { self.changes.send_replace(self.snapshot()); }
}

// =============================================================================
// Persistence
// =============================================================================

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn load(&self, session: &str) -> Result<Cart>;
    async fn save(&self, session: &str, cart: &Cart) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryCartRepository {
    carts: Mutex<HashMap<String, Cart>>,
}

#[async_trait]
impl CartRepository for MemoryCartRepository {
    async fn load(&self, session: &str) -> Result<Cart> {
        Ok(self.carts.lock().get(session).cloned().unwrap_or_default())
    }

    async fn save(&self, session: &str, cart: &Cart) -> Result<()> {
        let mut carts = self.carts.lock();
        if cart.is_empty() { carts.remove(session); } else { carts.insert(session.to_string(), cart.clone()); }
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartItemRow { product_id: String, name: String, price: rust_decimal::Decimal, image: String, quantity: i32 }

/// Carts in the `cart_items` table, one row per line.
#[derive(Clone, Debug)]
pub struct PgCartRepository {
    db: PgPool,
}

impl PgCartRepository {
    pub fn new(db: PgPool) -> Self { Self { db } }
}

#[async_trait]
impl CartRepository for PgCartRepository {
    async fn load(&self, session: &str) -> Result<Cart> {
        let rows = sqlx::query_as::<_, CartItemRow>("SELECT product_id, name, price, image, quantity FROM cart_items WHERE session_id = $1 ORDER BY position")
            .bind(session).fetch_all(&self.db).await?;
        Ok(Cart::from_items(rows.into_iter().map(|r| CartItem {
            id: r.product_id, name: r.name, price: Chf::new(r.price), image: r.image, quantity: u32::try_from(r.quantity).unwrap_or(0),
        })))
    }

    async fn save(&self, session: &str, cart: &Cart) -> Result<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM cart_items WHERE session_id = $1").bind(session).execute(&mut *tx).await?;
        for (position, item) in cart.items().iter().enumerate() {
            sqlx::query("INSERT INTO cart_items (session_id, product_id, name, price, image, quantity, position, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())")
                .bind(session).bind(&item.id).bind(&item.name).bind(item.price.amount()).bind(&item.image)
                .bind(i32::try_from(item.quantity).unwrap_or(i32::MAX)).bind(position as i32)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Session carts
// =============================================================================

struct LiveCart {
    store: CartStore,
    touched: Instant,
}

/// Live cart stores per session, written back after every mutation.
///
/// Only sessions that were mutated or are being watched are cached; reads of
/// anything else go straight to the repository.
pub struct SessionCarts {
    repo: Arc<dyn CartRepository>,
    stores: tokio::sync::Mutex<HashMap<String, LiveCart>>,
}

impl std::fmt::Debug for SessionCarts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCarts").finish_non_exhaustive()
    }
}

impl SessionCarts {
    pub fn new(repo: Arc<dyn CartRepository>) -> Self {
        Self { repo, stores: tokio::sync::Mutex::new(HashMap::new()) }
    }

    pub fn in_memory() -> Self { Self::new(Arc::new(MemoryCartRepository::default())) }

    pub async fn snapshot(&self, session: &str) -> Result<CartSnapshot> {
        self.read(session, CartStore::snapshot).await
    }

    pub async fn cart(&self, session: &str) -> Result<Cart> {
        self.read(session, |store| store.cart().clone()).await
    }

    /// Watches the session's cart. The store stays cached while the receiver lives.
    pub async fn subscribe(&self, session: &str) -> Result<watch::Receiver<CartSnapshot>> {
        let mut stores = self.stores.lock().await;
        let live = self.loaded(&mut stores, session).await?;
        Ok(live.store.subscribe())
    }

    pub async fn read<T>(&self, session: &str, f: impl FnOnce(&CartStore) -> T) -> Result<T> {
        let mut stores = self.stores.lock().await;
        if let Some(live) = stores.get_mut(session) {
            live.touched = Instant::now();
            return Ok(f(&live.store));
        }
        drop(stores);
        let cart = self.repo.load(session).await?;
        Ok(f(&CartStore::new(cart)))
    }

    /// Applies `f` to a draft of the session's cart. The draft is persisted
    /// first and only then installed and broadcast; a failed save leaves the
    /// live cart as it was.
    pub async fn update<T>(&self, session: &str, f: impl FnOnce(&mut CartStore) -> T) -> Result<T> {
        let mut stores = self.stores.lock().await;
        let live = self.loaded(&mut stores, session).await?;

        let mut draft = CartStore::new(live.store.cart().clone());
        let changed = draft.subscribe();
        let out = f(&mut draft);
        if changed.has_changed().unwrap_or(false) {
            self.repo.save(session, draft.cart()).await?;
            live.store.replace(draft.into_cart());
        }

        if live.store.cart().is_empty() && live.store.watchers() == 0 {
            stores.remove(session);
        }
        Ok(out)
    }

    async fn loaded<'a>(&self, stores: &'a mut HashMap<String, LiveCart>, session: &str) -> Result<&'a mut LiveCart> {
        let live = match stores.entry(session.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let cart = self.repo.load(session).await?;
                tracing::debug!(session, items = cart.items().len(), "cart loaded");
                entry.insert(LiveCart { store: CartStore::new(cart), touched: Instant::now() })
            }
        };
        live.touched = Instant::now();
        Ok(live)
    }

    /// Drops cached stores idle for longer than `max_idle` that nobody watches.
    /// Their carts remain in the repository.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut stores = self.stores.lock().await;
        let before = stores.len();
        stores.retain(|_, live| live.store.watchers() > 0 || live.touched.elapsed() < max_idle);
        before - stores.len()
    }

    pub async fn cached(&self) -> usize { self.stores.lock().await.len() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boots() -> NewCartItem { NewCartItem { id: "B1".into(), name: "Lange RX".into(), price: Chf::francs(30), image: String::new() } }

    #[test]
    fn test_subscribers_see_every_mutation() {
        let mut store = CartStore::new(Cart::new());
        let mut rx = store.subscribe();
        store.add_to_cart(boots());
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().cart_count, 1);
        store.update_quantity("B1", 3);
        assert_eq!(rx.borrow_and_update().cart_total, Chf::francs(90));
        store.update_quantity("missing", 3);
        assert!(!rx.has_changed().unwrap());
        store.clear_cart();
        assert_eq!(*rx.borrow_and_update(), CartSnapshot::default());
    }

    #[tokio::test]
    async fn test_session_carts_persist() {
        let repo = Arc::new(MemoryCartRepository::default());
        let carts = SessionCarts::new(repo.clone());
        carts.update("s1", |store| store.add_to_cart(boots())).await.unwrap();
        carts.update("s1", |store| store.add_to_cart(boots())).await.unwrap();
        assert_eq!(repo.load("s1").await.unwrap().count(), 2);
        assert!(repo.load("s2").await.unwrap().is_empty());

        // a fresh cache over the same repository sees the stored cart
        let reopened = SessionCarts::new(repo.clone());
        assert_eq!(reopened.snapshot("s1").await.unwrap().cart_total, Chf::francs(60));

        reopened.update("s1", CartStore::clear_cart).await.unwrap();
        assert!(repo.load("s1").await.unwrap().is_empty());
    }

    /// Loads empty carts and refuses every write.
    struct ReadOnlyRepository;

    #[async_trait]
    impl CartRepository for ReadOnlyRepository {
        async fn load(&self, _: &str) -> Result<Cart> { Ok(Cart::new()) }
        async fn save(&self, _: &str, _: &Cart) -> Result<()> { Err(sqlx::Error::PoolTimedOut.into()) }
    }

    #[tokio::test]
    async fn test_failed_save_leaves_cart_untouched() {
        let carts = SessionCarts::new(Arc::new(ReadOnlyRepository));
        let mut rx = carts.subscribe("s1").await.unwrap();
        let result = carts.update("s1", |store| store.add_to_cart(boots())).await;
        assert!(matches!(result, Err(crate::StorefrontError::Storage(_))));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(carts.snapshot("s1").await.unwrap().cart_count, 0);
    }

    #[tokio::test]
    async fn test_reads_cache_nothing() {
        let repo = Arc::new(MemoryCartRepository::default());
        let carts = SessionCarts::new(repo.clone());
        for i in 0..100 {
            assert_eq!(carts.snapshot(&format!("drive-by-{i}")).await.unwrap(), CartSnapshot::default());
        }
        assert_eq!(carts.cached().await, 0);

        // stored carts are read through without being cached either
        repo.save("stored", &Cart::from_items([CartItem { id: "B1".into(), name: "Lange RX".into(), price: Chf::francs(30), image: String::new(), quantity: 2 }])).await.unwrap();
        assert_eq!(carts.snapshot("stored").await.unwrap().cart_count, 2);
        assert_eq!(carts.cached().await, 0);
    }

    #[tokio::test]
    async fn test_emptied_cart_is_dropped_from_cache() {
        let carts = SessionCarts::in_memory();
        carts.update("s1", |store| store.add_to_cart(boots())).await.unwrap();
        assert_eq!(carts.cached().await, 1);
        carts.update("s1", CartStore::clear_cart).await.unwrap();
        assert_eq!(carts.cached().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_stores_evicted_unless_watched() {
        let carts = SessionCarts::in_memory();
        carts.update("idle", |store| store.add_to_cart(boots())).await.unwrap();
        carts.update("watched", |store| store.add_to_cart(boots())).await.unwrap();
        let _rx = carts.subscribe("watched").await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(carts.evict_idle(Duration::from_secs(120)).await, 0);
        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(carts.evict_idle(Duration::from_secs(120)).await, 1);
        assert_eq!(carts.cached().await, 1);

        // the evicted cart comes back from the repository
        assert_eq!(carts.snapshot("idle").await.unwrap().cart_count, 1);
    }

    #[tokio::test]
    async fn test_subscription_outlives_request() {
        let carts = SessionCarts::in_memory();
        let mut rx = carts.subscribe("s1").await.unwrap();
        carts.update("s1", |store| store.add_to_cart(boots())).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().cart_count, 1);
    }
}
