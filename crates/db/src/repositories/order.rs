use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};

use storefront_core::domain::order::{
    Address, Order, OrderId, OrderItem, OrderStatus, PaymentInfo, PaymentMethod, PaymentStatus,
};
use storefront_core::domain::product::ProductId;
use storefront_core::domain::user::UserId;
use storefront_core::pricing::{round_cents, Totals};

use super::{
    parse_decimal, parse_optional_timestamp, parse_timestamp, parse_u32, OrderRepository,
    RepositoryError,
};
use crate::DbPool;

const MAX_PAGE_SIZE: u32 = 100;
const TOP_PRODUCT_LIMIT: usize = 10;

/// Admin-side order filters. `page` is 1-based; `per_page` is clamped to
/// [1, 100].
#[derive(Clone, Debug)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: u32,
    pub per_page: u32,
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self { status: None, from: None, to: None, page: 1, per_page: 20 }
    }
}

#[derive(Debug)]
pub struct OrderPage {
    pub items: Vec<Order>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopProduct {
    pub product_id: ProductId,
    pub name: String,
    pub units_sold: u64,
    pub revenue: Decimal,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: u64,
}

/// One UTC day of sales; `day` is the `YYYY-MM-DD` prefix of `created_at`.
#[derive(Clone, Debug, PartialEq)]
pub struct DailySales {
    pub day: String,
    pub order_count: u64,
    pub revenue: Decimal,
}

/// Sales rollup for the admin dashboard. Cancelled orders are excluded from
/// counts, revenue, daily buckets, and top products; the status breakdown
/// covers every order in range so cancellations stay visible.
#[derive(Debug)]
pub struct AnalyticsSummary {
    pub order_count: u64,
    pub gross_revenue: Decimal,
    pub average_order_value: Decimal,
    pub daily: Vec<DailySales>,
    pub top_products: Vec<TopProduct>,
    pub status_breakdown: Vec<StatusCount>,
}

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, order_id: &OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                product_id,
                name,
                quantity,
                CAST(unit_price AS TEXT) AS unit_price
             FROM order_item
             WHERE order_id = ?
             ORDER BY rowid ASC",
        )
        .bind(&order_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(order_item_from_row).collect()
    }

    async fn page_from_rows(
        &self,
        rows: Vec<SqliteRow>,
        total: u64,
        page: u32,
        per_page: u32,
    ) -> Result<OrderPage, RepositoryError> {
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let id = OrderId(row.try_get::<String, _>("id")?);
            let lines = self.load_items(&id).await?;
            items.push(order_from_row(row, lines)?);
        }
        Ok(OrderPage { items, total, page, per_page })
    }
}

pub(crate) const ORDER_COLUMNS: &str = "id,
                user_id,
                status,
                CAST(subtotal AS TEXT) AS subtotal,
                CAST(tax AS TEXT) AS tax,
                CAST(shipping AS TEXT) AS shipping,
                CAST(total AS TEXT) AS total,
                shipping_street,
                shipping_city,
                shipping_state,
                shipping_country,
                shipping_zip_code,
                billing_street,
                billing_city,
                billing_state,
                billing_country,
                billing_zip_code,
                payment_method,
                payment_status,
                payment_transaction_id,
                notes,
                tracking_number,
                estimated_delivery,
                created_at,
                updated_at";

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS}
             FROM shop_order
             WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let items = self.load_items(id).await?;
        order_from_row(row, items).map(Some)
    }

    async fn find_for_user(
        &self,
        id: &OrderId,
        user_id: &UserId,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS}
             FROM shop_order
             WHERE id = ? AND user_id = ?"
        ))
        .bind(&id.0)
        .bind(&user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let items = self.load_items(id).await?;
        order_from_row(row, items).map(Some)
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        page: u32,
        per_page: u32,
    ) -> Result<OrderPage, RepositoryError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PAGE_SIZE);
        let offset = i64::from(page - 1) * i64::from(per_page);

        let total = sqlx::query("SELECT COUNT(*) AS count FROM shop_order WHERE user_id = ?")
            .bind(&user_id.0)
            .fetch_one(&self.pool)
            .await?
            .get::<i64, _>("count")
            .max(0) as u64;

        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS}
             FROM shop_order
             WHERE user_id = ?
             ORDER BY created_at DESC, id ASC
             LIMIT ? OFFSET ?"
        ))
        .bind(&user_id.0)
        .bind(i64::from(per_page))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        self.page_from_rows(rows, total, page, per_page).await
    }

    async fn list_all(&self, query: &OrderQuery) -> Result<OrderPage, RepositoryError> {
        let page = query.page.max(1);
        let per_page = query.per_page.clamp(1, MAX_PAGE_SIZE);
        let offset = i64::from(page - 1) * i64::from(per_page);

        let mut count_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) AS count FROM shop_order WHERE 1=1");
        push_filters(&mut count_builder, query);
        let total = count_builder
            .build()
            .fetch_one(&self.pool)
            .await?
            .get::<i64, _>("count")
            .max(0) as u64;

        let mut page_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM shop_order WHERE 1=1"));
        push_filters(&mut page_builder, query);
        page_builder.push(" ORDER BY created_at DESC, id ASC LIMIT ");
        page_builder.push_bind(i64::from(per_page));
        page_builder.push(" OFFSET ");
        page_builder.push_bind(offset);

        let rows = page_builder.build().fetch_all(&self.pool).await?;
        self.page_from_rows(rows, total, page, per_page).await
    }

    async fn save_workflow_fields(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        if update_workflow_fields_on(&mut conn, order).await? == 0 {
            return Err(RepositoryError::NotFound(format!("order `{}`", order.id.0)));
        }
        Ok(())
    }

    async fn analytics(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<AnalyticsSummary, RepositoryError> {
        // Money is folded in Rust so the decimal sums stay exact; SQLite
        // would coerce the TEXT columns to floats.
        let mut totals_builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT substr(created_at, 1, 10) AS day, CAST(total AS TEXT) AS total
             FROM shop_order
             WHERE status != 'cancelled'",
        );
        push_range(&mut totals_builder, "created_at", from, to);
        let rows = totals_builder.build().fetch_all(&self.pool).await?;

        let order_count = rows.len() as u64;
        let mut gross_revenue = Decimal::ZERO;
        let mut buckets: BTreeMap<String, (u64, Decimal)> = BTreeMap::new();
        for row in rows {
            let total = parse_decimal("total", &row.try_get::<String, _>("total")?)?;
            gross_revenue += total;
            let bucket = buckets
                .entry(row.try_get::<String, _>("day")?)
                .or_insert((0, Decimal::ZERO));
            bucket.0 += 1;
            bucket.1 += total;
        }
        let daily = buckets
            .into_iter()
            .map(|(day, (orders, revenue))| DailySales { day, order_count: orders, revenue })
            .collect();
        let average_order_value = if order_count == 0 {
            Decimal::ZERO
        } else {
            round_cents(gross_revenue / Decimal::from(order_count))
        };

        let mut lines_builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT oi.product_id AS product_id,
                    oi.name AS name,
                    oi.quantity AS quantity,
                    CAST(oi.unit_price AS TEXT) AS unit_price
             FROM order_item oi
             JOIN shop_order o ON o.id = oi.order_id
             WHERE o.status != 'cancelled'",
        );
        push_range(&mut lines_builder, "o.created_at", from, to);
        let mut by_product: BTreeMap<(String, String), (u64, Decimal)> = BTreeMap::new();
        for row in lines_builder.build().fetch_all(&self.pool).await? {
            let quantity = parse_u32("quantity", row.try_get("quantity")?)?;
            let unit_price =
                parse_decimal("unit_price", &row.try_get::<String, _>("unit_price")?)?;
            let entry = by_product
                .entry((row.try_get("product_id")?, row.try_get("name")?))
                .or_insert((0, Decimal::ZERO));
            entry.0 += u64::from(quantity);
            entry.1 += unit_price * Decimal::from(quantity);
        }
        let mut top_products: Vec<TopProduct> = by_product
            .into_iter()
            .map(|((product_id, name), (units_sold, revenue))| TopProduct {
                product_id: ProductId(product_id),
                name,
                units_sold,
                revenue,
            })
            .collect();
        top_products.sort_by(|a, b| {
            b.units_sold
                .cmp(&a.units_sold)
                .then_with(|| a.product_id.0.cmp(&b.product_id.0))
        });
        top_products.truncate(TOP_PRODUCT_LIMIT);

        let mut status_builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT status, COUNT(*) AS count
             FROM shop_order
             WHERE 1=1",
        );
        push_range(&mut status_builder, "created_at", from, to);
        status_builder.push(" GROUP BY status ORDER BY status ASC");
        let status_breakdown = status_builder
            .build()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(status_count_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AnalyticsSummary {
            order_count,
            gross_revenue,
            average_order_value,
            daily,
            top_products,
            status_breakdown,
        })
    }
}

/// Writes an order and its lines on the caller's connection, so checkout can
/// bundle the insert with its stock reservations in one transaction.
pub(crate) async fn insert_order_on(
    conn: &mut SqliteConnection,
    order: &Order,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO shop_order (
            id,
            user_id,
            status,
            subtotal,
            tax,
            shipping,
            total,
            shipping_street,
            shipping_city,
            shipping_state,
            shipping_country,
            shipping_zip_code,
            billing_street,
            billing_city,
            billing_state,
            billing_country,
            billing_zip_code,
            payment_method,
            payment_status,
            payment_transaction_id,
            notes,
            tracking_number,
            estimated_delivery,
            created_at,
            updated_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&order.id.0)
    .bind(&order.user_id.0)
    .bind(order.status.as_str())
    .bind(order.totals.subtotal.to_string())
    .bind(order.totals.tax.to_string())
    .bind(order.totals.shipping.to_string())
    .bind(order.totals.total.to_string())
    .bind(&order.shipping_address.street)
    .bind(&order.shipping_address.city)
    .bind(&order.shipping_address.state)
    .bind(&order.shipping_address.country)
    .bind(&order.shipping_address.zip_code)
    .bind(&order.billing_address.street)
    .bind(&order.billing_address.city)
    .bind(&order.billing_address.state)
    .bind(&order.billing_address.country)
    .bind(&order.billing_address.zip_code)
    .bind(order.payment.method.as_str())
    .bind(order.payment.status.as_str())
    .bind(order.payment.transaction_id.as_deref())
    .bind(order.notes.as_deref())
    .bind(order.tracking_number.as_deref())
    .bind(order.estimated_delivery.map(|eta| eta.to_rfc3339()))
    .bind(order.created_at.to_rfc3339())
    .bind(order.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    for item in &order.items {
        sqlx::query(
            "INSERT INTO order_item (order_id, product_id, name, quantity, unit_price)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&order.id.0)
        .bind(&item.product_id.0)
        .bind(&item.name)
        .bind(i64::from(item.quantity))
        .bind(item.unit_price.to_string())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Rewrites the mutable fulfilment columns of an order on the caller's
/// connection. Returns the number of matched rows.
pub(crate) async fn update_workflow_fields_on(
    conn: &mut SqliteConnection,
    order: &Order,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        "UPDATE shop_order
         SET status = ?2,
             payment_status = ?3,
             payment_transaction_id = ?4,
             notes = ?5,
             tracking_number = ?6,
             estimated_delivery = ?7,
             updated_at = ?8
         WHERE id = ?1",
    )
    .bind(&order.id.0)
    .bind(order.status.as_str())
    .bind(order.payment.status.as_str())
    .bind(order.payment.transaction_id.as_deref())
    .bind(order.notes.as_deref())
    .bind(order.tracking_number.as_deref())
    .bind(order.estimated_delivery.map(|eta| eta.to_rfc3339()))
    .bind(order.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

fn push_filters(builder: &mut QueryBuilder<Sqlite>, query: &OrderQuery) {
    if let Some(status) = &query.status {
        builder.push(" AND status = ");
        builder.push_bind(status.as_str());
    }
    push_range(builder, "created_at", query.from, query.to);
}

fn push_range(
    builder: &mut QueryBuilder<Sqlite>,
    column: &str,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) {
    if let Some(from) = from {
        builder.push(format!(" AND {column} >= "));
        builder.push_bind(from.to_rfc3339());
    }
    if let Some(to) = to {
        builder.push(format!(" AND {column} <= "));
        builder.push_bind(to.to_rfc3339());
    }
}

pub(crate) fn order_from_row(
    row: SqliteRow,
    items: Vec<OrderItem>,
) -> Result<Order, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = OrderStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown order status `{status_raw}`")))?;

    let method_raw = row.try_get::<String, _>("payment_method")?;
    let method = PaymentMethod::parse(&method_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown payment method `{method_raw}`")))?;
    let payment_raw = row.try_get::<String, _>("payment_status")?;
    let payment_status = PaymentStatus::parse(&payment_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown payment status `{payment_raw}`")))?;

    Ok(Order {
        id: OrderId(row.try_get("id")?),
        user_id: UserId(row.try_get("user_id")?),
        status,
        items,
        totals: Totals {
            subtotal: parse_decimal("subtotal", &row.try_get::<String, _>("subtotal")?)?,
            tax: parse_decimal("tax", &row.try_get::<String, _>("tax")?)?,
            shipping: parse_decimal("shipping", &row.try_get::<String, _>("shipping")?)?,
            total: parse_decimal("total", &row.try_get::<String, _>("total")?)?,
        },
        shipping_address: Address {
            street: row.try_get("shipping_street")?,
            city: row.try_get("shipping_city")?,
            state: row.try_get("shipping_state")?,
            country: row.try_get("shipping_country")?,
            zip_code: row.try_get("shipping_zip_code")?,
        },
        billing_address: Address {
            street: row.try_get("billing_street")?,
            city: row.try_get("billing_city")?,
            state: row.try_get("billing_state")?,
            country: row.try_get("billing_country")?,
            zip_code: row.try_get("billing_zip_code")?,
        },
        payment: PaymentInfo {
            method,
            status: payment_status,
            transaction_id: row.try_get("payment_transaction_id")?,
        },
        notes: row.try_get("notes")?,
        tracking_number: row.try_get("tracking_number")?,
        estimated_delivery: parse_optional_timestamp(
            "estimated_delivery",
            row.try_get("estimated_delivery")?,
        )?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

pub(crate) fn order_item_from_row(row: SqliteRow) -> Result<OrderItem, RepositoryError> {
    Ok(OrderItem {
        product_id: ProductId(row.try_get("product_id")?),
        name: row.try_get("name")?,
        quantity: parse_u32("quantity", row.try_get("quantity")?)?,
        unit_price: parse_decimal("unit_price", &row.try_get::<String, _>("unit_price")?)?,
    })
}

fn status_count_from_row(row: SqliteRow) -> Result<StatusCount, RepositoryError> {
    let raw = row.try_get::<String, _>("status")?;
    Ok(StatusCount {
        status: OrderStatus::parse(&raw)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown order status `{raw}`")))?,
        count: row.try_get::<i64, _>("count")?.max(0) as u64,
    })
}
