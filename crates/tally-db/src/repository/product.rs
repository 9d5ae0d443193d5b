//! # Product Repository
//!
//! Catalog rows and stock levels.
//!
//! The terminal loads the whole active catalog once into a `CatalogCache`;
//! per-scan lookups never reach this repository. What does reach it during
//! trading is [`ProductRepository::update_stock`], one delta per product per
//! settlement.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::validation::validate_product;
use tally_core::Product;

const PRODUCT_COLUMNS: &str = r#"
    id, barcode, name, cost_cents, markup_bps, stock_quantity,
    min_stock_threshold, sold_by_weight, is_active, created_at, updated_at
"#;

/// Raw `products` row.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    barcode: String,
    name: String,
    cost_cents: i64,
    markup_bps: i64,
    stock_quantity: i64,
    min_stock_threshold: i64,
    sold_by_weight: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = DbError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let markup_bps = u32::try_from(row.markup_bps).map_err(|_| {
            DbError::invalid_data(format!(
                "product {} has markup_bps {}",
                row.id, row.markup_bps
            ))
        })?;

        Ok(Product {
            id: row.id,
            barcode: row.barcode,
            name: row.name,
            cost_cents: row.cost_cents,
            markup_bps,
            stock_quantity: row.stock_quantity,
            min_stock_threshold: row.min_stock_threshold,
            sold_by_weight: row.sold_by_weight,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = ProductRepository::new(pool);
///
/// let catalog = repo.load_catalog().await?;
/// repo.update_stock(&product.id, -2).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Every active product, ordered by name.
    ///
    /// Feeds `CatalogCache::reload` at start-up and on catalog refresh.
    pub async fn load_catalog(&self) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE is_active = 1 ORDER BY name",
            PRODUCT_COLUMNS
        );

        let rows: Vec<ProductRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        let products = rows
            .into_iter()
            .map(Product::try_from)
            .collect::<DbResult<Vec<_>>>()?;

        debug!(count = products.len(), "Catalog loaded");
        Ok(products)
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);

        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Product::try_from).transpose()
    }

    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE barcode = ?1", PRODUCT_COLUMNS);

        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Product::try_from).transpose()
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Err(DbError::Validation)` - Empty name, bad barcode, negative cost
    /// * `Err(DbError::UniqueViolation)` - Barcode already exists
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        validate_product(product)?;
        debug!(barcode = %product.barcode, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, barcode, name, cost_cents, markup_bps, stock_quantity,
                min_stock_threshold, sold_by_weight, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&product.id)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(product.cost_cents)
        .bind(i64::from(product.markup_bps))
        .bind(product.stock_quantity)
        .bind(product.min_stock_threshold)
        .bind(product.sold_by_weight)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates the editable fields of a product. Stock is left alone: it only
    /// moves through [`update_stock`](Self::update_stock).
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - Product doesn't exist
    pub async fn update(&self, product: &Product) -> DbResult<()> {
        validate_product(product)?;
        debug!(id = %product.id, "Updating product");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                barcode = ?2,
                name = ?3,
                cost_cents = ?4,
                markup_bps = ?5,
                min_stock_threshold = ?6,
                sold_by_weight = ?7,
                is_active = ?8,
                updated_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(product.cost_cents)
        .bind(i64::from(product.markup_bps))
        .bind(product.min_stock_threshold)
        .bind(product.sold_by_weight)
        .bind(product.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        Ok(())
    }

    /// Applies a stock delta (units or grams).
    ///
    /// ## Delta, not absolute
    /// ```text
    ///   UPDATE products SET stock_quantity = stock_quantity - 3
    /// ```
    /// Two writers can never clobber each other, and a compensating write is
    /// just the negated delta. Stock may go negative; the shelf count wins
    /// over the database and is reconciled later.
    pub async fn update_stock(&self, id: &str, delta: i64) -> DbResult<()> {
        debug!(id = %id, delta = %delta, "Updating stock");

        let result = sqlx::query(
            r#"
            UPDATE products
            SET
                stock_quantity = stock_quantity + ?2,
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
