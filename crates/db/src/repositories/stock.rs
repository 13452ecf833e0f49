//! Stock movements for checkout and cancellation.
//!
//! A reservation is a single conditional decrement, so the guard and the
//! write are one atomic statement and two concurrent checkouts can never
//! drive stock below zero. The `_on` variants run on a caller-supplied
//! connection so checkout can enlist them in its transaction. Stock
//! movements deliberately leave `updated_at` alone; that column tracks
//! catalog edits.

use sqlx::sqlite::SqliteConnection;

use storefront_core::domain::product::ProductId;

use super::RepositoryError;
use crate::DbPool;

/// Remaining stock of an active product, `None` when the product is missing
/// or retired.
pub async fn available(
    pool: &DbPool,
    product_id: &ProductId,
) -> Result<Option<u32>, RepositoryError> {
    let stock: Option<i64> =
        sqlx::query_scalar("SELECT stock FROM product WHERE id = ? AND active = 1")
            .bind(&product_id.0)
            .fetch_optional(pool)
            .await?;

    stock.map(|value| super::parse_u32("stock", value)).transpose()
}

/// Attempts to take `quantity` units. Returns `false` without changing
/// anything when the product is missing, inactive, or short on stock.
pub async fn reserve(
    pool: &DbPool,
    product_id: &ProductId,
    quantity: u32,
) -> Result<bool, RepositoryError> {
    let mut conn = pool.acquire().await?;
    reserve_on(&mut conn, product_id, quantity).await
}

pub async fn reserve_on(
    conn: &mut SqliteConnection,
    product_id: &ProductId,
    quantity: u32,
) -> Result<bool, RepositoryError> {
    if quantity == 0 {
        return Err(RepositoryError::InvalidArgument("cannot reserve zero units".to_string()));
    }

    let result = sqlx::query(
        "UPDATE product
         SET stock = stock - ?2
         WHERE id = ?1 AND active = 1 AND stock >= ?2",
    )
    .bind(&product_id.0)
    .bind(i64::from(quantity))
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Returns `quantity` units to the shelf. Unlike [`reserve`], releasing is
/// unconditional; a missing product is an error because it means the order
/// being cancelled references a row that no longer exists.
pub async fn release(
    pool: &DbPool,
    product_id: &ProductId,
    quantity: u32,
) -> Result<(), RepositoryError> {
    let mut conn = pool.acquire().await?;
    release_on(&mut conn, product_id, quantity).await
}

pub async fn release_on(
    conn: &mut SqliteConnection,
    product_id: &ProductId,
    quantity: u32,
) -> Result<(), RepositoryError> {
    if quantity == 0 {
        return Err(RepositoryError::InvalidArgument("cannot release zero units".to_string()));
    }

    let result = sqlx::query(
        "UPDATE product
         SET stock = stock + ?2
         WHERE id = ?1",
    )
    .bind(&product_id.0)
    .bind(i64::from(quantity))
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound(format!("product `{}`", product_id.0)));
    }
    Ok(())
}
