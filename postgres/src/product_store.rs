//! Versioned product rows.

use sqlx::PgPool;
use std::future::Future;
use std::pin::Pin;
use stockroom_core::product::{NewProduct, Product, ProductId};
use stockroom_core::store::{ProductStore, StoreError};

const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    description: String,
    price: f64,
    stock: i64,
    version: i64,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::new(row.id),
            name: row.name,
            description: row.description,
            price: row.price,
            stock: row.stock,
            version: row.version,
        }
    }
}

fn database_error(id: Option<ProductId>, err: &sqlx::Error) -> StoreError {
    let code = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned());

    match (code.as_deref(), id) {
        (Some(UNIQUE_VIOLATION), Some(id)) => StoreError::Duplicate(id),
        (Some(CHECK_VIOLATION), _) => StoreError::Constraint(err.to_string()),
        _ => StoreError::Database(err.to_string()),
    }
}

/// `PostgreSQL`-backed [`ProductStore`].
///
/// Every update increments `version`. A conditional update carries the
/// version the caller read in its `WHERE` clause, so two processes racing on
/// the same row cannot both win.
#[derive(Clone, Debug)]
pub struct PostgresProductStore {
    pool: PgPool,
}

impl PostgresProductStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_row(&self, product: NewProduct) -> Result<Product, StoreError> {
        let row: ProductRow = match product.id {
            Some(id) => {
                let row = sqlx::query_as(
                    r"
                    INSERT INTO products (id, name, description, price, stock)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING id, name, description, price, stock, version
                    ",
                )
                .bind(id.get())
                .bind(&product.name)
                .bind(&product.description)
                .bind(product.price)
                .bind(product.stock)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| database_error(Some(id), &e))?;

                // Keep the serial ahead of explicitly chosen ids.
                sqlx::query(
                    "SELECT setval(pg_get_serial_sequence('products', 'id'), GREATEST((SELECT MAX(id) FROM products), 1))",
                )
                .execute(&self.pool)
                .await
                .map_err(|e| database_error(None, &e))?;

                row
            }
            None => sqlx::query_as(
                r"
                INSERT INTO products (name, description, price, stock)
                VALUES ($1, $2, $3, $4)
                RETURNING id, name, description, price, stock, version
                ",
            )
            .bind(&product.name)
            .bind(&product.description)
            .bind(product.price)
            .bind(product.stock)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| database_error(None, &e))?,
        };

        tracing::debug!(product_id = row.id, "Product row inserted");
        Ok(row.into())
    }

    async fn update_row(&self, product: Product, expected_version: Option<i64>) -> Result<Product, StoreError> {
        let updated: Option<ProductRow> = sqlx::query_as(
            r"
            UPDATE products
            SET name = $2, description = $3, price = $4, stock = $5,
                version = version + 1, updated_at = now()
            WHERE id = $1 AND ($6::BIGINT IS NULL OR version = $6)
            RETURNING id, name, description, price, stock, version
            ",
        )
        .bind(product.id.get())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.stock)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error(None, &e))?;

        if let Some(row) = updated {
            return Ok(row.into());
        }

        // Nothing matched: either the row is gone or its version moved on.
        let exists: Option<(i64,)> = sqlx::query_as("SELECT version FROM products WHERE id = $1")
            .bind(product.id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| database_error(None, &e))?;

        match (exists, expected_version) {
            (Some((current,)), Some(expected)) => {
                tracing::debug!(
                    product_id = %product.id,
                    expected,
                    current,
                    "Version conflict on product update"
                );
                Err(StoreError::VersionConflict {
                    id: product.id,
                    expected,
                })
            }
            _ => Err(StoreError::Missing(product.id)),
        }
    }
}

impl ProductStore for PostgresProductStore {
    fn find(
        &self,
        id: ProductId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Product>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let row: Option<ProductRow> = sqlx::query_as(
                "SELECT id, name, description, price, stock, version FROM products WHERE id = $1",
            )
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| database_error(None, &e))?;

            Ok(row.map(Product::from))
        })
    }

    fn insert(
        &self,
        product: NewProduct,
    ) -> Pin<Box<dyn Future<Output = Result<Product, StoreError>> + Send + '_>> {
        Box::pin(self.insert_row(product))
    }

    fn update(
        &self,
        product: &Product,
        expected_version: Option<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<Product, StoreError>> + Send + '_>> {
        Box::pin(self.update_row(product.clone(), expected_version))
    }

    fn delete(&self, id: ProductId) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM products WHERE id = $1")
                .bind(id.get())
                .execute(&self.pool)
                .await
                .map_err(|e| database_error(None, &e))?;
            Ok(())
        })
    }
}
