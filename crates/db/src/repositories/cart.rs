use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use storefront_core::domain::cart::{Cart, CartId, CartItem, CartStatus};
use storefront_core::domain::product::ProductId;
use storefront_core::domain::user::UserId;
use storefront_core::pricing::{PricingConfig, Totals};

use super::{parse_decimal, parse_timestamp, parse_u32, CartRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCartRepository {
    pool: DbPool,
}

impl SqlCartRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, cart_id: &CartId) -> Result<Vec<CartItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                product_id,
                quantity,
                CAST(unit_price AS TEXT) AS unit_price,
                added_at
             FROM cart_item
             WHERE cart_id = ?
             ORDER BY added_at ASC, product_id ASC",
        )
        .bind(&cart_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(cart_item_from_row).collect()
    }
}

pub(crate) const CART_COLUMNS: &str = "id,
                user_id,
                status,
                CAST(subtotal AS TEXT) AS subtotal,
                CAST(tax AS TEXT) AS tax,
                CAST(shipping AS TEXT) AS shipping,
                CAST(total AS TEXT) AS total,
                created_at,
                last_updated";

#[async_trait::async_trait]
impl CartRepository for SqlCartRepository {
    async fn find_by_id(&self, id: &CartId) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CART_COLUMNS}
             FROM cart
             WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let items = self.load_items(id).await?;
        cart_from_row(row, items).map(Some)
    }

    async fn find_active_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CART_COLUMNS}
             FROM cart
             WHERE user_id = ? AND status = 'active'"
        ))
        .bind(&user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id = CartId(row.try_get::<String, _>("id")?);
        let items = self.load_items(&id).await?;
        cart_from_row(row, items).map(Some)
    }

    async fn get_or_create_active(
        &self,
        user_id: &UserId,
        pricing: &PricingConfig,
        now: DateTime<Utc>,
    ) -> Result<Cart, RepositoryError> {
        if let Some(cart) = self.find_active_for_user(user_id).await? {
            return Ok(cart);
        }

        let cart = Cart::new(Some(user_id.clone()), pricing, now);
        match self.save(&cart).await {
            Ok(()) => Ok(cart),
            // Lost the creation race: the partial unique index on active
            // carts fired, so another writer got there first. Use theirs.
            Err(RepositoryError::Database(sqlx::Error::Database(db_error)))
                if db_error.is_unique_violation() =>
            {
                self.find_active_for_user(user_id).await?.ok_or_else(|| {
                    RepositoryError::Decode(format!(
                        "active cart for user `{}` vanished after unique conflict",
                        user_id.0
                    ))
                })
            }
            Err(error) => Err(error),
        }
    }

    async fn save(&self, cart: &Cart) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO cart (
                id,
                user_id,
                status,
                subtotal,
                tax,
                shipping,
                total,
                created_at,
                last_updated
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                status = excluded.status,
                subtotal = excluded.subtotal,
                tax = excluded.tax,
                shipping = excluded.shipping,
                total = excluded.total,
                last_updated = excluded.last_updated",
        )
        .bind(&cart.id.0)
        .bind(cart.owner.as_ref().map(|owner| owner.0.as_str()))
        .bind(cart.status.as_str())
        .bind(cart.totals.subtotal.to_string())
        .bind(cart.totals.tax.to_string())
        .bind(cart.totals.shipping.to_string())
        .bind(cart.totals.total.to_string())
        .bind(cart.created_at.to_rfc3339())
        .bind(cart.last_updated.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        // Lines are replaced wholesale; the cart aggregate is the source of
        // truth for what remains in it.
        sqlx::query("DELETE FROM cart_item WHERE cart_id = ?")
            .bind(&cart.id.0)
            .execute(&mut *tx)
            .await?;

        for item in &cart.items {
            sqlx::query(
                "INSERT INTO cart_item (cart_id, product_id, quantity, unit_price, added_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&cart.id.0)
            .bind(&item.product_id.0)
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.to_string())
            .bind(item.added_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &CartId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM cart WHERE id = ?").bind(&id.0).execute(&self.pool).await?;

        Ok(result.rows_affected() > 0)
    }
}

pub(crate) fn cart_from_row(row: SqliteRow, items: Vec<CartItem>) -> Result<Cart, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = CartStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown cart status `{status_raw}`")))?;

    Ok(Cart {
        id: CartId(row.try_get("id")?),
        owner: row.try_get::<Option<String>, _>("user_id")?.map(UserId),
        status,
        items,
        totals: Totals {
            subtotal: parse_decimal("subtotal", &row.try_get::<String, _>("subtotal")?)?,
            tax: parse_decimal("tax", &row.try_get::<String, _>("tax")?)?,
            shipping: parse_decimal("shipping", &row.try_get::<String, _>("shipping")?)?,
            total: parse_decimal("total", &row.try_get::<String, _>("total")?)?,
        },
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        last_updated: parse_timestamp("last_updated", row.try_get("last_updated")?)?,
    })
}

pub(crate) fn cart_item_from_row(row: SqliteRow) -> Result<CartItem, RepositoryError> {
    Ok(CartItem {
        product_id: ProductId(row.try_get("product_id")?),
        quantity: parse_u32("quantity", row.try_get("quantity")?)?,
        unit_price: parse_decimal("unit_price", &row.try_get::<String, _>("unit_price")?)?,
        added_at: parse_timestamp("added_at", row.try_get("added_at")?)?,
    })
}
