//! # Catalog Cache
//!
//! Read-through in-memory mirror of the product table.
//!
//! ## Snapshot Swapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   CatalogCache                                                          │
//! │   ┌────────────────────────────┐                                        │
//! │   │ RwLock<Arc<Snapshot v1>>   │──► readers clone the Arc and keep v1   │
//! │   └─────────────┬──────────────┘                                        │
//! │                 │ reload / stock decrement / replace_product            │
//! │                 ▼                                                       │
//! │   build Snapshot v2 off to the side, then swap under the write lock     │
//! │                                                                         │
//! │   A reader sees either v1 or v2 in full, never a half-updated product.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Inactive products are excluded from snapshots, so they scan as not found.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::types::Product;

// =============================================================================
// Snapshot
// =============================================================================

/// Immutable view of the catalog at one point in time.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    by_barcode: HashMap<String, Product>,
    barcode_by_id: HashMap<String, String>,
    loaded_at: Option<DateTime<Utc>>,
}

impl CatalogSnapshot {
    /// Builds a snapshot from products, skipping inactive entries.
    pub fn from_products(products: impl IntoIterator<Item = Product>) -> Self {
        let mut snapshot = CatalogSnapshot {
            loaded_at: Some(Utc::now()),
            ..Default::default()
        };
        for product in products.into_iter().filter(|p| p.is_active) {
            snapshot.insert(product);
        }
        snapshot
    }

    fn insert(&mut self, product: Product) {
        if let Some(previous) = self.by_barcode.get(&product.barcode) {
            self.barcode_by_id.remove(&previous.id);
        }
        if let Some(old_barcode) = self.barcode_by_id.get(&product.id).cloned() {
            self.by_barcode.remove(&old_barcode);
        }
        self.barcode_by_id
            .insert(product.id.clone(), product.barcode.clone());
        self.by_barcode.insert(product.barcode.clone(), product);
    }

    /// Looks a product up by barcode first, then by product id.
    pub fn get(&self, code: &str) -> Option<&Product> {
        let code = code.trim();
        self.by_barcode.get(code).or_else(|| self.by_id(code))
    }

    pub fn by_barcode(&self, barcode: &str) -> Option<&Product> {
        self.by_barcode.get(barcode)
    }

    pub fn by_id(&self, product_id: &str) -> Option<&Product> {
        self.barcode_by_id
            .get(product_id)
            .and_then(|barcode| self.by_barcode.get(barcode))
    }

    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.by_barcode.values()
    }

    pub fn len(&self) -> usize {
        self.by_barcode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_barcode.is_empty()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }
}

// =============================================================================
// Cache
// =============================================================================

/// Shared handle to the current catalog snapshot.
#[derive(Debug, Default)]
pub struct CatalogCache {
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl CatalogCache {
    pub fn new(products: impl IntoIterator<Item = Product>) -> Self {
        CatalogCache {
            current: RwLock::new(Arc::new(CatalogSnapshot::from_products(products))),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    // A poisoned lock still guards a whole snapshot, so the inner value is
    // always safe to use.
    fn read(&self) -> RwLockReadGuard<'_, Arc<CatalogSnapshot>> {
        self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arc<CatalogSnapshot>> {
        self.current.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.read())
    }

    /// Looks a product up by barcode or product id.
    pub fn lookup(&self, code: &str) -> Option<Product> {
        self.read().get(code).cloned()
    }

    /// Replaces the whole catalog.
    ///
    /// Lines already in a sale keep their snapshotted prices.
    pub fn reload(&self, products: impl IntoIterator<Item = Product>) -> usize {
        let next = Arc::new(CatalogSnapshot::from_products(products));
        let count = next.len();
        *self.write() = next;
        debug!(products = count, "Catalog reloaded");
        count
    }

    /// Inserts or replaces one product (copy-on-write). An inactive product
    /// is removed from the snapshot.
    pub fn replace_product(&self, product: Product) {
        let mut guard = self.write();
        let mut next = CatalogSnapshot::clone(&guard);
        if product.is_active {
            next.insert(product);
        } else if let Some(barcode) = next.barcode_by_id.remove(&product.id) {
            next.by_barcode.remove(&barcode);
        }
        *guard = Arc::new(next);
    }

    /// Applies stock deltas (keyed by product id) in a single swap.
    ///
    /// Returns the updated products. Ids no longer in the catalog are skipped.
    pub fn apply_stock_deltas<'a>(
        &self,
        deltas: impl IntoIterator<Item = (&'a String, &'a i64)>,
    ) -> Vec<Product> {
        let mut guard = self.write();
        let mut next = CatalogSnapshot::clone(&guard);
        let now = Utc::now();
        let mut updated = Vec::new();

        for (product_id, delta) in deltas {
            let Some(barcode) = next.barcode_by_id.get(product_id).cloned() else {
                continue;
            };
            if let Some(product) = next.by_barcode.get_mut(&barcode) {
                product.stock_quantity += delta;
                product.updated_at = now;
                updated.push(product.clone());
            }
        }

        *guard = Arc::new(next);
        updated
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample() -> CatalogCache {
        let mut hidden = Product::new("999", "Discontinued", 100, 0);
        hidden.is_active = false;
        CatalogCache::new(vec![
            Product::new("111", "Tea", 400, 2500).with_stock(10, 2),
            Product::new("222", "Apples", 500, 2000).by_weight(),
            hidden,
        ])
    }

    #[test]
    fn test_lookup_by_barcode_and_id() {
        let cache = sample();
        let tea = cache.lookup("111").unwrap();
        assert_eq!(tea.name, "Tea");
        assert_eq!(cache.lookup(&tea.id).unwrap().barcode, "111");
        assert!(cache.lookup("999").is_none());
        assert!(cache.lookup("nope").is_none());
    }

    #[test]
    fn test_readers_keep_old_snapshot_across_reload() {
        let cache = sample();
        let before = cache.snapshot();

        cache.reload(vec![Product::new("333", "Milk", 200, 1000)]);

        assert!(before.by_barcode("111").is_some());
        assert!(cache.lookup("111").is_none());
        assert!(cache.lookup("333").is_some());
    }

    #[test]
    fn test_replace_product_changes_barcode() {
        let cache = sample();
        let mut tea = cache.lookup("111").unwrap();
        tea.barcode = "112".into();
        cache.replace_product(tea.clone());

        assert!(cache.lookup("111").is_none());
        assert_eq!(cache.lookup(&tea.id).unwrap().barcode, "112");
        assert_eq!(cache.snapshot().len(), 2);
    }

    #[test]
    fn test_apply_stock_deltas() {
        let cache = sample();
        let tea = cache.lookup("111").unwrap();
        let mut deltas = BTreeMap::new();
        deltas.insert(tea.id.clone(), -12);
        deltas.insert("ghost".to_string(), -1);

        let updated = cache.apply_stock_deltas(&deltas);

        assert_eq!(updated.len(), 1);
        assert_eq!(cache.lookup("111").unwrap().stock_quantity, -2);
    }
}
