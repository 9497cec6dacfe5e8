//! Reservation holds.

use sqlx::PgPool;
use std::future::Future;
use std::pin::Pin;
use stockroom_core::ledger::{HoldState, LedgerError, LineKey, ReservationLedger};

/// `PostgreSQL`-backed [`ReservationLedger`].
///
/// `hold` is an `INSERT ... ON CONFLICT DO NOTHING`, and `release` flips
/// `released` only while it is still false, so concurrent or repeated calls for
/// the same [`LineKey`] cannot double count.
#[derive(Clone, Debug)]
pub struct PostgresReservationLedger {
    pool: PgPool,
}

impl PostgresReservationLedger {
    /// Create a ledger over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn ledger_error(err: &sqlx::Error) -> LedgerError {
    LedgerError::Database(err.to_string())
}

// Postgres has no unsigned integers.
fn occurrence(line: LineKey) -> i64 {
    i64::from(line.occurrence)
}

impl ReservationLedger for PostgresReservationLedger {
    fn get(&self, line: LineKey) -> Pin<Box<dyn Future<Output = Result<Option<HoldState>, LedgerError>> + Send + '_>> {
        Box::pin(async move {
            let row: Option<(i64, bool)> = sqlx::query_as(
                r"
                SELECT quantity, released FROM reservation_holds
                WHERE order_id = $1 AND product_id = $2 AND occurrence = $3
                ",
            )
            .bind(line.order_id.get())
            .bind(line.product_id.get())
            .bind(occurrence(line))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ledger_error(&e))?;

            Ok(row.map(|(quantity, released)| {
                if released {
                    HoldState::Released { quantity }
                } else {
                    HoldState::Held { quantity }
                }
            }))
        })
    }

    fn hold(
        &self,
        line: LineKey,
        quantity: i64,
    ) -> Pin<Box<dyn Future<Output = Result<bool, LedgerError>> + Send + '_>> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                INSERT INTO reservation_holds (order_id, product_id, occurrence, quantity)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (order_id, product_id, occurrence) DO NOTHING
                ",
            )
            .bind(line.order_id.get())
            .bind(line.product_id.get())
            .bind(occurrence(line))
            .bind(quantity)
            .execute(&self.pool)
            .await
            .map_err(|e| ledger_error(&e))?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn release(&self, line: LineKey) -> Pin<Box<dyn Future<Output = Result<Option<i64>, LedgerError>> + Send + '_>> {
        Box::pin(async move {
            let row: Option<(i64,)> = sqlx::query_as(
                r"
                UPDATE reservation_holds
                SET released = TRUE, released_at = now()
                WHERE order_id = $1 AND product_id = $2 AND occurrence = $3 AND NOT released
                RETURNING quantity
                ",
            )
            .bind(line.order_id.get())
            .bind(line.product_id.get())
            .bind(occurrence(line))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ledger_error(&e))?;

            Ok(row.map(|(quantity,)| quantity))
        })
    }
}
