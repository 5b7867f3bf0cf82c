//! Session-scoped cart state.
//!
//! The backend is the sole source of truth: every mutation is followed by
//! an authoritative reload rather than write serialization, and a stale
//! overwrite loses to the later reload. Overlapping mutations on the same
//! cart are refused while one is in flight.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::backend::{payload, BackendApi};
use crate::domain::cart::{Cart, CartItem};
use crate::session::txn::OptimisticTxn;

pub mod refresh;
pub mod registry;
pub mod txn;

const CART_LOAD_FAILED: &str = "Could not load your cart. Please try again.";
const CART_UPDATE_FAILED: &str = "The cart could not be updated. Please try again.";

pub struct CartStore<B> {
    backend: B,
    user_id: Option<i64>,
    cart: Option<Cart>,
    items_loading: bool,
    reconciled: bool,
    loaded_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl<B: BackendApi> CartStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            user_id: None,
            cart: None,
            items_loading: false,
            reconciled: false,
            loaded_at: None,
            last_error: None,
        }
    }

    pub fn cart(&self) -> Option<&Cart> {
        self.cart.as_ref()
    }

    pub fn items_loading(&self) -> bool {
        self.items_loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    /// Switches the authenticated user. Any cart belonging to the previous
    /// user is discarded before the next load so one session never shows
    /// another user's items.
    pub fn set_user(&mut self, user_id: Option<i64>) {
        if self.user_id == user_id {
            return;
        }
        if self.user_id.is_some() {
            debug!(prev = ?self.user_id, next = ?user_id, "user changed, discarding cart state");
        }
        self.user_id = user_id;
        self.cart = None;
        self.loaded_at = None;
        self.reconciled = false;
        self.last_error = None;
    }

    /// Loads the cart from the backend, then reconciles quantities once per
    /// session. Returns the loaded cart, or `None` on failure (a previously
    /// loaded cart is kept in memory).
    pub async fn load_cart(&mut self) -> Option<&Cart> {
        if !self.reload().await {
            return None;
        }
        if !self.reconciled {
            self.reconciled = true;
            self.fix_cart_quantities().await;
        }
        self.cart.as_ref()
    }

    /// Unconditional authoritative reload, without a reconciliation pass.
    pub async fn force_reload_cart(&mut self) -> bool {
        self.reload().await
    }

    /// Corrects lines whose quantity exceeds the current stock snapshot:
    /// gone-from-catalog lines are removed, the rest are clamped down.
    /// Failed corrective calls are logged and not retried within the pass;
    /// the next full reload re-evaluates. If anything changed, a full
    /// reload follows so the cart reflects authoritative state.
    pub async fn fix_cart_quantities(&mut self) -> bool {
        let corrections: Vec<(i64, u32, i64)> = match &self.cart {
            Some(cart) => cart
                .items()
                .iter()
                .filter(|item| i64::from(item.quantity) > item.stock)
                .map(|item| (item.id, item.quantity, item.stock))
                .collect(),
            None => return false,
        };
        if corrections.is_empty() {
            return false;
        }

        let mut changed = false;
        for (item_id, quantity, stock) in corrections {
            if stock <= 0 {
                info!(item_id, quantity, stock, "stock exhausted, removing cart item");
                match self.backend.delete_cart_item(item_id).await {
                    Ok(()) => changed = true,
                    Err(err) => warn!(%err, item_id, "could not remove over-subscribed item"),
                }
            } else {
                let clamped = u32::try_from(stock).unwrap_or(u32::MAX);
                info!(item_id, quantity, clamped, "stock shrank, clamping quantity");
                match self.backend.update_cart_item(item_id, clamped).await {
                    Ok(()) => changed = true,
                    Err(err) => warn!(%err, item_id, "could not clamp over-subscribed item"),
                }
            }
        }
        if changed {
            self.reload().await;
        }
        changed
    }

    /// Adds `quantity` units of a product, clamped so the line never
    /// exceeds its stock snapshot. Returns `false` when the line is already
    /// at its ceiling, the store is busy, or the backend rejects the write.
    pub async fn add_product_to_cart(&mut self, product_id: i64, quantity: u32) -> bool {
        if self.items_loading {
            warn!(product_id, "mutation refused while another is in flight");
            return false;
        }
        let existing = self
            .cart
            .as_ref()
            .and_then(|c| c.item_for_product(product_id))
            .map(|i| (i.id, i.quantity, i.stock));
        match existing {
            Some((item_id, current, stock)) => {
                let ceiling = u64::try_from(stock.max(0)).unwrap_or(0);
                let target = (u64::from(current) + u64::from(quantity)).min(ceiling);
                let target = u32::try_from(target).unwrap_or(u32::MAX);
                if target <= current {
                    debug!(product_id, current, stock, "line already at its stock ceiling");
                    return false;
                }
                self.update_cart_item_quantity(item_id, target).await
            }
            None => {
                let Some(user_id) = self.user_id.filter(|id| *id > 0) else {
                    warn!(product_id, "add to cart without an authenticated user");
                    return false;
                };
                self.items_loading = true;
                let created = self
                    .backend
                    .create_cart_item(user_id, product_id, quantity)
                    .await;
                self.items_loading = false;
                match created {
                    Ok(()) => {
                        // No optimistic insert: resynchronize from the backend.
                        self.reload().await;
                        true
                    }
                    Err(err) => {
                        warn!(%err, product_id, "add to cart failed");
                        self.last_error = Some(CART_UPDATE_FAILED.to_string());
                        false
                    }
                }
            }
        }
    }

    /// Sets a line's quantity. Equal-to-current is a successful no-op with
    /// no network call; zero is refused, removal must go through
    /// [`CartStore::remove_cart_item`].
    pub async fn update_cart_item_quantity(&mut self, cart_item_id: i64, quantity: u32) -> bool {
        let Some(current) = self
            .cart
            .as_ref()
            .and_then(|c| c.item(cart_item_id))
            .map(|i| i.quantity)
        else {
            warn!(cart_item_id, "quantity update for unknown cart item");
            return false;
        };
        if quantity == current {
            return true;
        }
        if quantity == 0 {
            warn!(cart_item_id, "refusing quantity 0, removal must be explicit");
            return false;
        }
        if self.items_loading {
            warn!(cart_item_id, "mutation refused while another is in flight");
            return false;
        }
        self.items_loading = true;
        let updated = self.backend.update_cart_item(cart_item_id, quantity).await;
        self.items_loading = false;
        match updated {
            Ok(()) => {
                self.reload().await;
                true
            }
            Err(err) => {
                warn!(%err, cart_item_id, "quantity update failed");
                self.last_error = Some(CART_UPDATE_FAILED.to_string());
                false
            }
        }
    }

    /// Removes a line optimistically: local state drops the item before the
    /// network call resolves, and is restored from the snapshot if the call
    /// fails.
    pub async fn remove_cart_item(&mut self, cart_item_id: i64) -> bool {
        if self.items_loading {
            warn!(cart_item_id, "mutation refused while another is in flight");
            return false;
        }
        let Some(snapshot) = self.cart.clone() else {
            warn!(cart_item_id, "removal with no cart loaded");
            return false;
        };
        if snapshot.item(cart_item_id).is_none() {
            warn!(cart_item_id, "removal of unknown cart item");
            return false;
        }

        let mut txn = OptimisticTxn::new();
        txn.begin(snapshot);
        if let Some(cart) = self.cart.as_mut() {
            if let Err(err) = cart.remove_item(cart_item_id) {
                warn!(%err, cart_item_id, "optimistic removal failed");
            }
        }

        self.items_loading = true;
        let deleted = self.backend.delete_cart_item(cart_item_id).await;
        self.items_loading = false;
        match deleted {
            Ok(()) => {
                txn.commit();
                self.reload().await;
                true
            }
            Err(err) => {
                warn!(%err, cart_item_id, "removal failed, rolling back");
                if let Some(snapshot) = txn.rollback() {
                    self.cart = Some(snapshot);
                }
                self.last_error = Some(CART_UPDATE_FAILED.to_string());
                false
            }
        }
    }

    /// Empties the cart via the backend reset, then reloads.
    pub async fn clear_cart(&mut self) -> bool {
        if self.items_loading {
            warn!("mutation refused while another is in flight");
            return false;
        }
        let Some(user_id) = self.user_id.filter(|id| *id > 0) else {
            warn!("cart reset without an authenticated user");
            return false;
        };
        self.items_loading = true;
        let reset = self.backend.reset_cart(user_id).await;
        self.items_loading = false;
        match reset {
            Ok(()) => {
                self.reload().await;
                true
            }
            Err(err) => {
                warn!(%err, "cart reset failed");
                self.last_error = Some(CART_UPDATE_FAILED.to_string());
                false
            }
        }
    }

    async fn reload(&mut self) -> bool {
        let Some(user_id) = self.user_id.filter(|id| *id > 0) else {
            warn!("cart load without an authenticated user");
            return false;
        };
        self.items_loading = true;
        let loaded = self.fetch_cart(user_id).await;
        self.items_loading = false;
        match loaded {
            Some(cart) => {
                self.cart = Some(cart);
                self.loaded_at = Some(Utc::now());
                self.last_error = None;
                true
            }
            None => false,
        }
    }

    async fn fetch_cart(&mut self, user_id: i64) -> Option<Cart> {
        let raw = match self.backend.fetch_cart(user_id).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%err, user_id, "cart fetch failed");
                self.last_error = Some(CART_LOAD_FAILED.to_string());
                return None;
            }
        };
        let normalized = match payload::normalize_cart(&raw) {
            Ok(cart) => cart,
            Err(err) => {
                warn!(%err, user_id, "cart response not usable");
                self.last_error = Some(CART_LOAD_FAILED.to_string());
                return None;
            }
        };
        let mut items = Vec::with_capacity(normalized.items.len());
        for item in normalized.items {
            let catalog_quantity = self.catalog_quantity(item.product_id).await;
            // Available-to-add plus what this line already reserves.
            let stock = catalog_quantity + i64::from(item.quantity);
            items.push(CartItem {
                id: item.id,
                product_id: item.product_id,
                product_name: item.product_name,
                price: item.price,
                quantity: item.quantity,
                total_sum: Decimal::ZERO,
                stock,
                image_url: item.image_url,
            });
        }
        Some(Cart::new(normalized.id, user_id, items))
    }

    /// Authoritative stock for one product. A failed lookup counts as 0 so
    /// a transient catalog error never clamps or drops the line.
    async fn catalog_quantity(&self, product_id: i64) -> i64 {
        match self.backend.fetch_product(product_id).await {
            Ok(raw) => match payload::normalize_product(&raw) {
                Ok(product) => product.quantity,
                Err(err) => {
                    warn!(%err, product_id, "product response not usable");
                    0
                }
            },
            Err(err) => {
                warn!(%err, product_id, "stock lookup failed");
                0
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::backend::BackendApi;
    use crate::{Result, StorefrontError};

    #[derive(Clone, Debug)]
    pub struct FakeItem {
        pub id: i64,
        pub product_id: i64,
        pub name: String,
        pub price: f64,
        pub quantity: u32,
    }

    pub fn fake_item(id: i64, product_id: i64, quantity: u32) -> FakeItem {
        FakeItem {
            id,
            product_id,
            name: format!("Product {product_id}"),
            price: 10.0,
            quantity,
        }
    }

    /// In-memory backend speaking the same irregular payload shapes the
    /// real one does: items alternate between camelCase-flat and
    /// PascalCase-nested, with numbers rendered as strings here and there.
    #[derive(Default)]
    pub struct FakeBackend {
        pub items: Mutex<Vec<FakeItem>>,
        pub catalog: Mutex<HashMap<i64, i64>>,
        pub fail_create: AtomicBool,
        pub fail_update: AtomicBool,
        pub fail_delete: AtomicBool,
        pub cart_fetches: AtomicUsize,
        pub product_fetches: AtomicUsize,
        pub creates: AtomicUsize,
        pub updates: AtomicUsize,
        pub deletes: AtomicUsize,
        pub resets: AtomicUsize,
    }

    impl FakeBackend {
        pub fn with_items(items: Vec<FakeItem>, catalog: &[(i64, i64)]) -> Arc<Self> {
            let backend = Self::default();
            *backend.items.lock().unwrap() = items;
            *backend.catalog.lock().unwrap() = catalog.iter().copied().collect();
            Arc::new(backend)
        }
    }

    fn unavailable(endpoint: &str) -> StorefrontError {
        StorefrontError::BackendStatus {
            status: 500,
            endpoint: endpoint.to_string(),
        }
    }

    fn render_item(item: &FakeItem, index: usize) -> Value {
        if index % 2 == 0 {
            json!({
                "id": item.id,
                "productId": item.product_id,
                "productName": item.name,
                "price": item.price.to_string(),
                "quantity": item.quantity,
            })
        } else {
            json!({
                "Id": item.id,
                "Product": { "Id": item.product_id, "Name": item.name, "Price": item.price },
                "Quantity": item.quantity.to_string(),
            })
        }
    }

    #[async_trait]
    impl BackendApi for FakeBackend {
        async fn fetch_cart(&self, user_id: i64) -> Result<Value> {
            self.cart_fetches.fetch_add(1, Ordering::SeqCst);
            let items = self.items.lock().unwrap();
            let rendered: Vec<Value> = items
                .iter()
                .enumerate()
                .map(|(i, item)| render_item(item, i))
                .collect();
            Ok(json!({ "Id": 1, "UserId": user_id, "CartItems": rendered }))
        }

        async fn fetch_product(&self, product_id: i64) -> Result<Value> {
            self.product_fetches.fetch_add(1, Ordering::SeqCst);
            let quantity = self
                .catalog
                .lock()
                .unwrap()
                .get(&product_id)
                .copied()
                .unwrap_or(0);
            Ok(json!({
                "Id": product_id,
                "Name": format!("Product {product_id}"),
                "Price": 10,
                "Quantity": quantity,
            }))
        }

        async fn fetch_discounts(&self) -> Result<Value> {
            Ok(json!([]))
        }

        async fn create_cart_item(&self, _user_id: i64, product_id: i64, quantity: u32) -> Result<()> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(unavailable("create"));
            }
            let mut items = self.items.lock().unwrap();
            let id = items.iter().map(|i| i.id).max().unwrap_or(0) + 1;
            items.push(fake_item(id, product_id, quantity));
            Ok(())
        }

        async fn update_cart_item(&self, cart_item_id: i64, quantity: u32) -> Result<()> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            if self.fail_update.load(Ordering::SeqCst) {
                return Err(unavailable("update"));
            }
            let mut items = self.items.lock().unwrap();
            match items.iter_mut().find(|i| i.id == cart_item_id) {
                Some(item) => {
                    item.quantity = quantity;
                    Ok(())
                }
                None => Err(unavailable("update")),
            }
        }

        async fn delete_cart_item(&self, cart_item_id: i64) -> Result<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(unavailable("delete"));
            }
            self.items.lock().unwrap().retain(|i| i.id != cart_item_id);
            Ok(())
        }

        async fn reset_cart(&self, _user_id: i64) -> Result<()> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            self.items.lock().unwrap().clear();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use super::testing::{fake_item, FakeBackend};
    use super::CartStore;

    fn store_for(backend: &Arc<FakeBackend>, user_id: i64) -> CartStore<Arc<FakeBackend>> {
        let mut store = CartStore::new(Arc::clone(backend));
        store.set_user(Some(user_id));
        store
    }

    #[tokio::test]
    async fn test_load_computes_stock_and_totals() {
        let backend = FakeBackend::with_items(vec![fake_item(1, 7, 2)], &[(7, 3)]);
        let mut store = store_for(&backend, 10);

        let cart = store.load_cart().await.expect("cart should load");
        assert_eq!(cart.items().len(), 1);
        let item = &cart.items()[0];
        // Catalog has 3 left, this line reserves 2 more.
        assert_eq!(item.stock, 5);
        assert_eq!(item.total_sum, Decimal::new(20, 0));
        assert_eq!(cart.total_sum(), Decimal::new(20, 0));
    }

    #[tokio::test]
    async fn test_load_without_user_fails() {
        let backend = FakeBackend::with_items(vec![], &[]);
        let mut store = CartStore::new(Arc::clone(&backend));
        assert!(store.load_cart().await.is_none());
        assert_eq!(backend.cart_fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reconciliation_clamps_when_stock_remains() {
        // Oversold: catalog is 2 short, so the loaded snapshot is
        // stock = -2 + 5 = 3 against quantity 5.
        let backend = FakeBackend::with_items(vec![fake_item(1, 7, 5)], &[(7, -2)]);
        let mut store = store_for(&backend, 10);

        store.load_cart().await;
        assert_eq!(backend.updates.load(Ordering::SeqCst), 1);
        assert_eq!(backend.deletes.load(Ordering::SeqCst), 0);
        assert_eq!(backend.items.lock().unwrap()[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_reconciliation_removes_when_stock_exhausted() {
        // stock = -5 + 5 = 0: the line is no longer purchasable at all.
        let backend = FakeBackend::with_items(vec![fake_item(1, 7, 5)], &[(7, -5)]);
        let mut store = store_for(&backend, 10);

        store.load_cart().await;
        assert_eq!(backend.deletes.load(Ordering::SeqCst), 1);
        assert!(backend.items.lock().unwrap().is_empty());
        assert!(store.cart().map(|c| c.is_empty()).unwrap_or(false));
    }

    #[tokio::test]
    async fn test_add_to_existing_line_clamps_to_stock() {
        // quantity 3, catalog 1 => stock snapshot 4.
        let backend = FakeBackend::with_items(vec![fake_item(1, 7, 3)], &[(7, 1)]);
        let mut store = store_for(&backend, 10);
        store.load_cart().await;

        assert!(store.add_product_to_cart(7, 2).await);
        assert_eq!(backend.items.lock().unwrap()[0].quantity, 4);
    }

    #[tokio::test]
    async fn test_add_at_ceiling_is_a_refused_no_op() {
        // quantity 3, catalog 0 => stock snapshot 3, already at max.
        let backend = FakeBackend::with_items(vec![fake_item(1, 7, 3)], &[(7, 0)]);
        let mut store = store_for(&backend, 10);
        store.load_cart().await;

        assert!(!store.add_product_to_cart(7, 2).await);
        assert_eq!(backend.updates.load(Ordering::SeqCst), 0);
        assert_eq!(backend.items.lock().unwrap()[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_add_new_product_creates_and_resynchronizes() {
        let backend = FakeBackend::with_items(vec![], &[(9, 10)]);
        let mut store = store_for(&backend, 10);
        store.load_cart().await;

        assert!(store.add_product_to_cart(9, 1).await);
        assert_eq!(backend.creates.load(Ordering::SeqCst), 1);
        let cart = store.cart().expect("cart present after resync");
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].product_id, 9);
    }

    #[tokio::test]
    async fn test_update_to_equal_quantity_skips_the_network() {
        let backend = FakeBackend::with_items(vec![fake_item(1, 7, 2)], &[(7, 10)]);
        let mut store = store_for(&backend, 10);
        store.load_cart().await;
        let fetches_before = backend.cart_fetches.load(Ordering::SeqCst);

        assert!(store.update_cart_item_quantity(1, 2).await);
        assert_eq!(backend.updates.load(Ordering::SeqCst), 0);
        assert_eq!(backend.cart_fetches.load(Ordering::SeqCst), fetches_before);
    }

    #[tokio::test]
    async fn test_update_to_zero_is_refused() {
        let backend = FakeBackend::with_items(vec![fake_item(1, 7, 2)], &[(7, 10)]);
        let mut store = store_for(&backend, 10);
        store.load_cart().await;

        assert!(!store.update_cart_item_quantity(1, 0).await);
        assert_eq!(backend.updates.load(Ordering::SeqCst), 0);
        assert_eq!(backend.items.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_rolls_back_on_failure() {
        let backend = FakeBackend::with_items(vec![fake_item(1, 7, 2)], &[(7, 10)]);
        let mut store = store_for(&backend, 10);
        store.load_cart().await;
        let before = store.cart().cloned().expect("loaded");

        backend.fail_delete.store(true, Ordering::SeqCst);
        assert!(!store.remove_cart_item(1).await);
        assert_eq!(store.cart(), Some(&before));
        assert!(store.last_error().is_some());

        backend.fail_delete.store(false, Ordering::SeqCst);
        assert!(store.remove_cart_item(1).await);
        assert!(store.cart().map(|c| c.is_empty()).unwrap_or(false));
    }

    #[tokio::test]
    async fn test_clear_cart_resets_and_reloads() {
        let backend = FakeBackend::with_items(vec![fake_item(1, 7, 2), fake_item(2, 8, 1)], &[]);
        let mut store = store_for(&backend, 10);
        store.load_cart().await;

        assert!(store.clear_cart().await);
        assert_eq!(backend.resets.load(Ordering::SeqCst), 1);
        assert!(store.cart().map(|c| c.is_empty()).unwrap_or(false));
    }

    #[tokio::test]
    async fn test_user_switch_discards_previous_cart() {
        let backend = FakeBackend::with_items(vec![fake_item(1, 7, 2)], &[(7, 10)]);
        let mut store = store_for(&backend, 10);
        store.load_cart().await;
        assert!(store.cart().is_some());

        store.set_user(Some(11));
        // Discarded immediately, before any load for the next user.
        assert!(store.cart().is_none());
        assert!(store.loaded_at().is_none());
    }

    #[tokio::test]
    async fn test_mixed_payload_shapes_normalize() {
        let backend = FakeBackend::with_items(
            vec![fake_item(1, 7, 2), fake_item(2, 8, 1)],
            &[(7, 5), (8, 5)],
        );
        let mut store = store_for(&backend, 10);

        let cart = store.load_cart().await.expect("cart should load");
        // The fake renders item 2 PascalCase-nested with string quantities.
        assert_eq!(cart.items().len(), 2);
        assert_eq!(cart.items()[1].product_id, 8);
        assert_eq!(cart.items()[1].quantity, 1);
        assert_eq!(cart.total_sum(), Decimal::new(30, 0));
    }
}
