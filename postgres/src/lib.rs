//! `PostgreSQL` persistence for the Stockroom inventory core.
//!
//! This crate provides the production implementations of two core traits:
//!
//! - [`PostgresProductStore`]: [`ProductStore`](stockroom_core::ProductStore) over
//!   the `products` table, with version-checked updates
//! - [`PostgresReservationLedger`]: [`ReservationLedger`](stockroom_core::ReservationLedger)
//!   over the `reservation_holds` table
//!
//! Schema lives in `migrations/` and is applied with [`run_migrations`].
//!
//! # Example
//!
//! ```no_run
//! use stockroom_postgres::{PostgresProductStore, run_migrations};
//! use sqlx::postgres::PgPoolOptions;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PgPoolOptions::new()
//!     .max_connections(10)
//!     .connect("postgres://localhost/stockroom")
//!     .await?;
//! run_migrations(&pool).await?;
//!
//! let store = PostgresProductStore::new(pool);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod ledger;
mod product_store;

pub use ledger::PostgresReservationLedger;
pub use product_store::PostgresProductStore;

use sqlx::PgPool;
use stockroom_core::StoreError;

/// Apply the embedded schema migrations.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if a migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
    tracing::info!("Database migrations applied");
    Ok(())
}
