//! Checkout and cancellation.
//!
//! Both operations run as one transaction. Checkout reserves stock line by
//! line with conditional decrements, snapshots the catalog names, writes the
//! order, and converts the cart; if any line cannot be reserved the whole
//! transaction rolls back. Cancellation is the mirror image: it releases the
//! reserved units and flips the payment to refunded.

use chrono::{DateTime, Utc};
use sqlx::Row;
use thiserror::Error;

use storefront_core::domain::order::{
    Address, Order, OrderId, OrderItem, OrderStatus, PaymentInfo, PaymentMethod, PaymentStatus,
};
use storefront_core::domain::user::UserId;

use crate::repositories::cart::{cart_from_row, cart_item_from_row, CART_COLUMNS};
use crate::repositories::order::{
    insert_order_on, order_from_row, order_item_from_row, update_workflow_fields_on, ORDER_COLUMNS,
};
use crate::repositories::{stock, RepositoryError};
use crate::DbPool;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("no active cart to check out")]
    CartNotFound,
    #[error("cart is empty")]
    EmptyCart,
    #[error("insufficient stock for `{name}`")]
    InsufficientStock { name: String },
    #[error("order not found")]
    OrderNotFound,
    #[error("order is past the point of cancellation")]
    NotCancellable,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for CheckoutError {
    fn from(error: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(error))
    }
}

pub struct CheckoutService {
    pool: DbPool,
}

impl CheckoutService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Turns the user's active cart into a pending order.
    ///
    /// Line prices and totals come from the cart as saved; product names are
    /// snapshotted from the catalog at this moment. Payment settles through
    /// the built-in simulator. The cart is marked converted rather than
    /// deleted, so a fresh active cart starts empty.
    pub async fn create_order(
        &self,
        user_id: &UserId,
        shipping_address: Address,
        billing_address: Address,
        payment_method: PaymentMethod,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Order, CheckoutError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {CART_COLUMNS}
             FROM cart
             WHERE user_id = ? AND status = 'active'"
        ))
        .bind(&user_id.0)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Err(CheckoutError::CartNotFound);
        };
        let cart_id: String = row.try_get("id")?;

        let item_rows = sqlx::query(
            "SELECT
                product_id,
                quantity,
                CAST(unit_price AS TEXT) AS unit_price,
                added_at
             FROM cart_item
             WHERE cart_id = ?
             ORDER BY added_at ASC, product_id ASC",
        )
        .bind(&cart_id)
        .fetch_all(&mut *tx)
        .await?;
        let items = item_rows
            .into_iter()
            .map(cart_item_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let cart = cart_from_row(row, items)?;

        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let mut lines = Vec::with_capacity(cart.items.len());
        for item in &cart.items {
            let name = sqlx::query_scalar::<_, String>("SELECT name FROM product WHERE id = ?")
                .bind(&item.product_id.0)
                .fetch_optional(&mut *tx)
                .await?
                .unwrap_or_else(|| item.product_id.0.clone());

            // Failing here drops the transaction, which rolls back every
            // reservation made for earlier lines.
            if !stock::reserve_on(&mut tx, &item.product_id, item.quantity).await? {
                return Err(CheckoutError::InsufficientStock { name });
            }

            lines.push(OrderItem {
                product_id: item.product_id.clone(),
                name,
                quantity: item.quantity,
                unit_price: item.unit_price,
            });
        }

        let order = Order {
            id: OrderId::generate(),
            user_id: user_id.clone(),
            status: OrderStatus::Pending,
            items: lines,
            totals: cart.totals.clone(),
            shipping_address,
            billing_address,
            payment: PaymentInfo::simulated(payment_method),
            notes,
            tracking_number: None,
            estimated_delivery: None,
            created_at: now,
            updated_at: now,
        };
        insert_order_on(&mut tx, &order).await?;

        sqlx::query(
            "UPDATE cart
             SET status = 'converted', last_updated = ?2
             WHERE id = ?1",
        )
        .bind(&cart.id.0)
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(order)
    }

    /// Cancels an order that has not shipped, restoring its reserved stock.
    ///
    /// With `requester` set the lookup is scoped to that user and foreign
    /// orders read as not found; `None` is the admin path. A completed
    /// payment flips to refunded, a pending one stays as it was.
    pub async fn cancel_order(
        &self,
        order_id: &OrderId,
        requester: Option<&UserId>,
        now: DateTime<Utc>,
    ) -> Result<Order, CheckoutError> {
        let mut tx = self.pool.begin().await?;

        let row = match requester {
            Some(user_id) => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS}
                     FROM shop_order
                     WHERE id = ? AND user_id = ?"
                ))
                .bind(&order_id.0)
                .bind(&user_id.0)
                .fetch_optional(&mut *tx)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS}
                     FROM shop_order
                     WHERE id = ?"
                ))
                .bind(&order_id.0)
                .fetch_optional(&mut *tx)
                .await?
            }
        };
        let Some(row) = row else {
            return Err(CheckoutError::OrderNotFound);
        };

        let item_rows = sqlx::query(
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
        .fetch_all(&mut *tx)
        .await?;
        let items = item_rows
            .into_iter()
            .map(order_item_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let mut order = order_from_row(row, items)?;

        if !order.is_cancellable() {
            return Err(CheckoutError::NotCancellable);
        }

        for item in &order.items {
            stock::release_on(&mut tx, &item.product_id, item.quantity).await?;
        }

        order.status = OrderStatus::Cancelled;
        if order.payment.status == PaymentStatus::Completed {
            order.payment.status = PaymentStatus::Refunded;
        }
        order.updated_at = now;
        update_workflow_fields_on(&mut tx, &order).await?;

        tx.commit().await?;
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;

    use storefront_core::domain::order::{Address, OrderStatus, PaymentMethod, PaymentStatus};
    use storefront_core::domain::product::{Product, ProductId};
    use storefront_core::domain::user::UserId;
    use storefront_core::pricing::PricingConfig;

    use super::{CheckoutError, CheckoutService};
    use crate::migrations;
    use crate::repositories::{
        CartRepository, OrderRepository, ProductRepository, SqlCartRepository, SqlOrderRepository,
        SqlProductRepository,
    };
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn checkout_converts_the_cart_and_decrements_stock() {
        let pool = setup_pool().await;
        let products = SqlProductRepository::new(pool.clone());
        let carts = SqlCartRepository::new(pool.clone());
        let orders = SqlOrderRepository::new(pool.clone());
        let service = CheckoutService::new(pool.clone());
        let config = PricingConfig::default();
        let user = UserId("u-chk-001".to_string());

        seed_user(&pool, "u-chk-001").await;
        let tote = sample_product("p-chk-001", "CHK-001", "Canvas Tote", Decimal::new(6000, 2), 10);
        let mug = sample_product("p-chk-002", "CHK-002", "Stoneware Mug", Decimal::new(2500, 2), 5);
        products.save(&tote).await.expect("seed tote");
        products.save(&mug).await.expect("seed mug");

        let t0 = parse_ts("2026-05-01T09:00:00Z");
        let mut cart = carts.get_or_create_active(&user, &config, t0).await.expect("cart");
        cart.add_line(tote.id.clone(), tote.price, 2, &config, t0).expect("add tote");
        cart.add_line(mug.id.clone(), mug.price, 1, &config, t0).expect("add mug");
        carts.save(&cart).await.expect("save cart");

        let t1 = parse_ts("2026-05-01T09:05:00Z");
        let order = service
            .create_order(
                &user,
                sample_address(),
                sample_address(),
                PaymentMethod::CreditCard,
                Some("ring twice".to_string()),
                t1,
            )
            .await
            .expect("checkout");

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment.status, PaymentStatus::Completed);
        assert!(order
            .payment
            .transaction_id
            .as_deref()
            .is_some_and(|txn| txn.starts_with("txn-")));
        assert_eq!(order.totals, cart.totals);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].name, "Canvas Tote");
        assert_eq!(order.items[0].unit_price, Decimal::new(6000, 2));

        // Stock came down by the ordered quantities.
        let tote_after = products.find_by_id(&tote.id).await.expect("reload").expect("present");
        let mug_after = products.find_by_id(&mug.id).await.expect("reload").expect("present");
        assert_eq!(tote_after.stock, 8);
        assert_eq!(mug_after.stock, 4);

        // The cart converted, and the next call starts a fresh empty one.
        let converted = carts.find_by_id(&cart.id).await.expect("reload").expect("present");
        assert_eq!(converted.status, storefront_core::domain::cart::CartStatus::Converted);
        let fresh = carts.get_or_create_active(&user, &config, t1).await.expect("fresh cart");
        assert_ne!(fresh.id, cart.id);
        assert!(fresh.is_empty());

        assert_eq!(orders.find_for_user(&order.id, &user).await.expect("find"), Some(order));

        pool.close().await;
    }

    #[tokio::test]
    async fn checkout_rolls_back_every_reservation_when_one_line_is_short() {
        let pool = setup_pool().await;
        let products = SqlProductRepository::new(pool.clone());
        let carts = SqlCartRepository::new(pool.clone());
        let orders = SqlOrderRepository::new(pool.clone());
        let service = CheckoutService::new(pool.clone());
        let config = PricingConfig::default();
        let user = UserId("u-atm-001".to_string());

        seed_user(&pool, "u-atm-001").await;
        let plenty =
            sample_product("p-atm-001", "ATM-001", "Field Journal", Decimal::new(2000, 2), 10);
        let scarce = sample_product("p-atm-002", "ATM-002", "Satchel", Decimal::new(1500, 2), 1);
        products.save(&plenty).await.expect("seed plenty");
        products.save(&scarce).await.expect("seed scarce");

        let t0 = parse_ts("2026-05-02T09:00:00Z");
        let mut cart = carts.get_or_create_active(&user, &config, t0).await.expect("cart");
        cart.add_line(plenty.id.clone(), plenty.price, 2, &config, t0).expect("add plenty");
        cart.add_line(scarce.id.clone(), scarce.price, 3, &config, t0).expect("add scarce");
        carts.save(&cart).await.expect("save cart");

        let result = service
            .create_order(
                &user,
                sample_address(),
                sample_address(),
                PaymentMethod::Paypal,
                None,
                parse_ts("2026-05-02T09:05:00Z"),
            )
            .await;
        match result {
            Err(CheckoutError::InsufficientStock { name }) => assert_eq!(name, "Satchel"),
            other => panic!("expected insufficient stock, got {other:?}"),
        }

        // The first line's reservation was rolled back with the rest.
        let plenty_after = products.find_by_id(&plenty.id).await.expect("reload").expect("present");
        let scarce_after = products.find_by_id(&scarce.id).await.expect("reload").expect("present");
        assert_eq!(plenty_after.stock, 10);
        assert_eq!(scarce_after.stock, 1);

        let cart_after = carts.find_by_id(&cart.id).await.expect("reload").expect("present");
        assert_eq!(cart_after.status, storefront_core::domain::cart::CartStatus::Active);
        assert_eq!(orders.list_for_user(&user, 1, 10).await.expect("list").total, 0);

        pool.close().await;
    }

    #[tokio::test]
    async fn checkout_rejects_missing_and_empty_carts() {
        let pool = setup_pool().await;
        let carts = SqlCartRepository::new(pool.clone());
        let service = CheckoutService::new(pool.clone());
        let config = PricingConfig::default();
        let user = UserId("u-mty-001".to_string());

        seed_user(&pool, "u-mty-001").await;
        let now = parse_ts("2026-05-03T09:00:00Z");

        let no_cart = service
            .create_order(
                &user,
                sample_address(),
                sample_address(),
                PaymentMethod::Stripe,
                None,
                now,
            )
            .await;
        assert!(matches!(no_cart, Err(CheckoutError::CartNotFound)));

        carts.get_or_create_active(&user, &config, now).await.expect("empty cart");
        let empty = service
            .create_order(
                &user,
                sample_address(),
                sample_address(),
                PaymentMethod::Stripe,
                None,
                now,
            )
            .await;
        assert!(matches!(empty, Err(CheckoutError::EmptyCart)));

        pool.close().await;
    }

    #[tokio::test]
    async fn cancel_restores_stock_and_refunds_the_payment() {
        let pool = setup_pool().await;
        let products = SqlProductRepository::new(pool.clone());
        let carts = SqlCartRepository::new(pool.clone());
        let orders = SqlOrderRepository::new(pool.clone());
        let service = CheckoutService::new(pool.clone());
        let config = PricingConfig::default();
        let user = UserId("u-cnl-001".to_string());

        seed_user(&pool, "u-cnl-001").await;
        let lamp = sample_product("p-cnl-001", "CNL-001", "Arc Lamp", Decimal::new(12000, 2), 10);
        products.save(&lamp).await.expect("seed lamp");

        let t0 = parse_ts("2026-05-04T09:00:00Z");
        let mut cart = carts.get_or_create_active(&user, &config, t0).await.expect("cart");
        cart.add_line(lamp.id.clone(), lamp.price, 2, &config, t0).expect("add lamp");
        carts.save(&cart).await.expect("save cart");

        let order = service
            .create_order(
                &user,
                sample_address(),
                sample_address(),
                PaymentMethod::CreditCard,
                None,
                parse_ts("2026-05-04T09:05:00Z"),
            )
            .await
            .expect("checkout");
        let reserved = products.find_by_id(&lamp.id).await.expect("reload").expect("present");
        assert_eq!(reserved.stock, 8);

        let t2 = parse_ts("2026-05-04T10:00:00Z");
        let cancelled =
            service.cancel_order(&order.id, Some(&user), t2).await.expect("cancel");
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.payment.status, PaymentStatus::Refunded);
        assert_eq!(cancelled.payment.transaction_id, order.payment.transaction_id);
        assert_eq!(cancelled.updated_at, t2);

        let restored = products.find_by_id(&lamp.id).await.expect("reload").expect("present");
        assert_eq!(restored.stock, 10);
        let reloaded = orders.find_by_id(&order.id).await.expect("find").expect("present");
        assert_eq!(reloaded.status, OrderStatus::Cancelled);

        // A cancelled order cannot be cancelled again.
        let again = service.cancel_order(&order.id, Some(&user), t2).await;
        assert!(matches!(again, Err(CheckoutError::NotCancellable)));

        pool.close().await;
    }

    #[tokio::test]
    async fn cancel_is_scoped_to_the_owner_unless_admin() {
        let pool = setup_pool().await;
        let products = SqlProductRepository::new(pool.clone());
        let carts = SqlCartRepository::new(pool.clone());
        let orders = SqlOrderRepository::new(pool.clone());
        let service = CheckoutService::new(pool.clone());
        let config = PricingConfig::default();
        let owner = UserId("u-scp-001".to_string());
        let stranger = UserId("u-scp-002".to_string());

        seed_user(&pool, "u-scp-001").await;
        seed_user(&pool, "u-scp-002").await;
        let chair = sample_product("p-scp-001", "SCP-001", "Deck Chair", Decimal::new(8000, 2), 6);
        products.save(&chair).await.expect("seed chair");

        let t0 = parse_ts("2026-05-05T09:00:00Z");
        let mut cart = carts.get_or_create_active(&owner, &config, t0).await.expect("cart");
        cart.add_line(chair.id.clone(), chair.price, 1, &config, t0).expect("add chair");
        carts.save(&cart).await.expect("save cart");
        let order = service
            .create_order(
                &owner,
                sample_address(),
                sample_address(),
                PaymentMethod::CreditCard,
                None,
                t0,
            )
            .await
            .expect("checkout");

        // Another customer sees someone else's order as missing.
        let foreign = service.cancel_order(&order.id, Some(&stranger), t0).await;
        assert!(matches!(foreign, Err(CheckoutError::OrderNotFound)));

        // Once shipped, even the admin path cannot cancel.
        let mut shipped = orders.find_by_id(&order.id).await.expect("find").expect("present");
        shipped.transition_to(OrderStatus::Processing).expect("advance");
        shipped.transition_to(OrderStatus::Shipped).expect("ship");
        orders.save_workflow_fields(&shipped).await.expect("save workflow");
        let too_late = service.cancel_order(&order.id, None, t0).await;
        assert!(matches!(too_late, Err(CheckoutError::NotCancellable)));

        // A second, still-pending order cancels fine through the admin path.
        let mut second_cart =
            carts.get_or_create_active(&owner, &config, t0).await.expect("second cart");
        second_cart.add_line(chair.id.clone(), chair.price, 1, &config, t0).expect("add chair");
        carts.save(&second_cart).await.expect("save second cart");
        let second = service
            .create_order(
                &owner,
                sample_address(),
                sample_address(),
                PaymentMethod::CreditCard,
                None,
                t0,
            )
            .await
            .expect("second checkout");
        service.cancel_order(&second.id, None, t0).await.expect("admin cancel");

        pool.close().await;
    }

    #[tokio::test]
    async fn checkout_refuses_lines_for_retired_products() {
        let pool = setup_pool().await;
        let products = SqlProductRepository::new(pool.clone());
        let carts = SqlCartRepository::new(pool.clone());
        let service = CheckoutService::new(pool.clone());
        let config = PricingConfig::default();
        let user = UserId("u-ret-001".to_string());

        seed_user(&pool, "u-ret-001").await;
        let visor = sample_product("p-ret-001", "RET-001", "Sun Visor", Decimal::new(1800, 2), 9);
        products.save(&visor).await.expect("seed visor");

        let t0 = parse_ts("2026-05-06T09:00:00Z");
        let mut cart = carts.get_or_create_active(&user, &config, t0).await.expect("cart");
        cart.add_line(visor.id.clone(), visor.price, 1, &config, t0).expect("add visor");
        carts.save(&cart).await.expect("save cart");

        // Retired after it went into the cart.
        products.deactivate(&visor.id, t0).await.expect("deactivate");

        let result = service
            .create_order(
                &user,
                sample_address(),
                sample_address(),
                PaymentMethod::CreditCard,
                None,
                t0,
            )
            .await;
        match result {
            Err(CheckoutError::InsufficientStock { name }) => assert_eq!(name, "Sun Visor"),
            other => panic!("expected insufficient stock, got {other:?}"),
        }

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn seed_user(pool: &DbPool, id: &str) {
        sqlx::query(
            "INSERT INTO shop_user (id, name, email, password_hash, role, created_at)
             VALUES (?1, 'Test User', ?2, 'hash', 'customer', '2026-02-01T08:00:00Z')",
        )
        .bind(id)
        .bind(format!("{id}@example.com"))
        .execute(pool)
        .await
        .expect("seed user");
    }

    fn sample_product(id: &str, sku: &str, name: &str, price: Decimal, stock: u32) -> Product {
        let created = parse_ts("2026-02-01T08:00:00Z");
        Product {
            id: ProductId(id.to_string()),
            sku: sku.to_string(),
            name: name.to_string(),
            description: "test article".to_string(),
            category: "checkout-test".to_string(),
            price,
            stock,
            active: true,
            discount: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn sample_address() -> Address {
        Address {
            street: "12 Harbor Lane".to_string(),
            city: "Portsmouth".to_string(),
            state: "NH".to_string(),
            country: "US".to_string(),
            zip_code: "03801".to_string(),
        }
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
