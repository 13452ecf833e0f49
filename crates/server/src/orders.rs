//! Order routes: checkout, the customer's order history, cancellation, and
//! the admin fulfilment surface.
//!
//! Endpoints:
//! - `POST /orders`                    — check out the active cart
//! - `GET  /orders`                    — the caller's orders, newest first
//! - `GET  /orders/{order_id}`         — one order (owner, or any order for admins)
//! - `POST /orders/{order_id}/cancel`  — cancel before shipment, restoring stock
//! - `GET  /orders/admin/orders`       — every order, filterable (admin)
//! - `PUT  /orders/admin/orders/{order_id}/status` — advance fulfilment (admin)
//! - `GET  /orders/admin/orders/analytics` — sales rollup (admin)

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use storefront_core::domain::order::{Address, Order, OrderId, OrderStatus, PaymentMethod};
use storefront_db::repositories::{
    AnalyticsSummary, OrderPage, OrderQuery, OrderRepository, SqlOrderRepository,
};
use storefront_db::{CheckoutService, DbPool};

use crate::audit;
use crate::auth::{authenticate, require_admin};
use crate::error::{
    bad_request, checkout_error, domain_error, not_found, repository_error, ApiError,
};

#[derive(Clone)]
pub struct OrdersState {
    db_pool: DbPool,
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub shipping_address: Address,
    pub billing_address: Address,
    pub payment_method: String,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminOrdersQuery {
    pub status: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<Order>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total_orders: u64,
}

impl OrderListResponse {
    fn from_page(page: OrderPage) -> Self {
        Self {
            current_page: page.page,
            total_pages: page.total.div_ceil(u64::from(page.per_page)) as u32,
            total_orders: page.total,
            orders: page.items,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DailySalesResponse {
    pub day: String,
    pub order_count: u64,
    pub revenue: Decimal,
}

#[derive(Debug, Serialize)]
pub struct TopProductResponse {
    pub product_id: String,
    pub name: String,
    pub units_sold: u64,
    pub revenue: Decimal,
}

#[derive(Debug, Serialize)]
pub struct StatusCountResponse {
    pub status: OrderStatus,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub order_count: u64,
    pub gross_revenue: Decimal,
    pub average_order_value: Decimal,
    pub daily: Vec<DailySalesResponse>,
    pub top_products: Vec<TopProductResponse>,
    pub status_breakdown: Vec<StatusCountResponse>,
}

impl AnalyticsResponse {
    fn from_summary(summary: AnalyticsSummary) -> Self {
        Self {
            order_count: summary.order_count,
            gross_revenue: summary.gross_revenue,
            average_order_value: summary.average_order_value,
            daily: summary
                .daily
                .into_iter()
                .map(|bucket| DailySalesResponse {
                    day: bucket.day,
                    order_count: bucket.order_count,
                    revenue: bucket.revenue,
                })
                .collect(),
            top_products: summary
                .top_products
                .into_iter()
                .map(|product| TopProductResponse {
                    product_id: product.product_id.0,
                    name: product.name,
                    units_sold: product.units_sold,
                    revenue: product.revenue,
                })
                .collect(),
            status_breakdown: summary
                .status_breakdown
                .into_iter()
                .map(|entry| StatusCountResponse { status: entry.status, count: entry.count })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(db_pool: DbPool) -> Router {
    Router::new()
        .route("/orders", post(checkout).get(list_orders))
        .route("/orders/{order_id}", get(get_order))
        .route("/orders/{order_id}/cancel", post(cancel_order))
        .route("/orders/admin/orders", get(admin_list_orders))
        .route("/orders/admin/orders/analytics", get(admin_analytics))
        .route("/orders/admin/orders/{order_id}/status", put(admin_update_status))
        .with_state(OrdersState { db_pool })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn checkout(
    headers: HeaderMap,
    State(state): State<OrdersState>,
    Json(body): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    let method = PaymentMethod::parse(&body.payment_method).ok_or_else(|| {
        bad_request(format!("unknown payment method `{}`", body.payment_method))
    })?;
    let notes = body.notes.map(|notes| notes.trim().to_string()).filter(|notes| !notes.is_empty());

    let service = CheckoutService::new(state.db_pool.clone());
    let order = service
        .create_order(
            &session.user.id,
            body.shipping_address,
            body.billing_address,
            method,
            notes,
            Utc::now(),
        )
        .await
        .map_err(checkout_error)?;

    info!(
        event_name = "orders.placed",
        order_id = %order.id.0,
        user_id = %order.user_id.0,
        total = %order.totals.total,
        "order placed"
    );
    audit::record_event(
        &state.db_pool,
        &session.user.id.0,
        "customer",
        &order.id.0,
        "orders.placed",
        "orders",
        &format!("order placed, total {}", order.totals.total),
    )
    .await;

    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_orders(
    headers: HeaderMap,
    State(state): State<OrdersState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<OrderListResponse>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    let repo = SqlOrderRepository::new(state.db_pool.clone());
    let page = repo
        .list_for_user(&session.user.id, params.page.unwrap_or(1), params.limit.unwrap_or(20))
        .await
        .map_err(repository_error)?;
    Ok(Json(OrderListResponse::from_page(page)))
}

async fn get_order(
    headers: HeaderMap,
    State(state): State<OrdersState>,
    Path(order_id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    let id = OrderId(order_id);
    let repo = SqlOrderRepository::new(state.db_pool.clone());

    // Admins see any order; everyone else only their own, with foreign
    // orders reading as missing.
    let order = if session.user.is_admin() {
        repo.find_by_id(&id).await.map_err(repository_error)?
    } else {
        repo.find_for_user(&id, &session.user.id).await.map_err(repository_error)?
    };
    let order = order.ok_or_else(|| not_found("order not found"))?;
    Ok(Json(order))
}

async fn cancel_order(
    headers: HeaderMap,
    State(state): State<OrdersState>,
    Path(order_id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    let id = OrderId(order_id);
    let requester = if session.user.is_admin() { None } else { Some(&session.user.id) };

    let service = CheckoutService::new(state.db_pool.clone());
    let order = service.cancel_order(&id, requester, Utc::now()).await.map_err(checkout_error)?;

    info!(
        event_name = "orders.cancelled",
        order_id = %order.id.0,
        user_id = %order.user_id.0,
        payment_status = order.payment.status.as_str(),
        "order cancelled"
    );
    audit::record_event(
        &state.db_pool,
        &session.user.id.0,
        if session.user.is_admin() { "admin" } else { "customer" },
        &order.id.0,
        "orders.cancelled",
        "orders",
        &format!("order cancelled, payment {}", order.payment.status.as_str()),
    )
    .await;

    Ok(Json(order))
}

async fn admin_list_orders(
    headers: HeaderMap,
    State(state): State<OrdersState>,
    Query(params): Query<AdminOrdersQuery>,
) -> Result<Json<OrderListResponse>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    require_admin(&session.user)?;

    let status = match params.status.as_deref() {
        Some(value) => Some(
            OrderStatus::parse(value)
                .ok_or_else(|| bad_request(format!("unknown order status `{value}`")))?,
        ),
        None => None,
    };
    let query = OrderQuery {
        status,
        from: parse_window_bound("from", params.from.as_deref())?,
        to: parse_window_bound("to", params.to.as_deref())?,
        page: params.page.unwrap_or(1),
        per_page: params.limit.unwrap_or(20),
    };

    let repo = SqlOrderRepository::new(state.db_pool.clone());
    let page = repo.list_all(&query).await.map_err(repository_error)?;
    Ok(Json(OrderListResponse::from_page(page)))
}

async fn admin_update_status(
    headers: HeaderMap,
    State(state): State<OrdersState>,
    Path(order_id): Path<String>,
    Json(body): Json<StatusUpdateRequest>,
) -> Result<Json<Order>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    require_admin(&session.user)?;

    let next = OrderStatus::parse(&body.status)
        .ok_or_else(|| bad_request(format!("unknown order status `{}`", body.status)))?;

    let repo = SqlOrderRepository::new(state.db_pool.clone());
    let mut order = repo
        .find_by_id(&OrderId(order_id))
        .await
        .map_err(repository_error)?
        .ok_or_else(|| not_found("order not found"))?;

    let previous = order.status.clone();
    order.transition_to(next).map_err(domain_error)?;

    let now = Utc::now();
    if let Some(tracking) = body.tracking_number {
        order.tracking_number = Some(tracking);
    }
    if let Some(estimate) = body.estimated_delivery {
        order.estimated_delivery = Some(estimate);
    }
    if let Some(notes) = body.notes {
        order.notes = Some(notes);
    }
    // An order that ships without an estimate gets the stock one week.
    if order.status == OrderStatus::Shipped && order.estimated_delivery.is_none() {
        order.estimated_delivery = Some(Order::default_delivery_estimate(now));
    }
    order.updated_at = now;
    repo.save_workflow_fields(&order).await.map_err(repository_error)?;

    info!(
        event_name = "orders.status_changed",
        order_id = %order.id.0,
        from = previous.as_str(),
        to = order.status.as_str(),
        "order status changed"
    );
    audit::record_event(
        &state.db_pool,
        &session.user.id.0,
        "admin",
        &order.id.0,
        "orders.status_changed",
        "orders",
        &format!("status {} -> {}", previous.as_str(), order.status.as_str()),
    )
    .await;

    Ok(Json(order))
}

async fn admin_analytics(
    headers: HeaderMap,
    State(state): State<OrdersState>,
    Query(params): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsResponse>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    require_admin(&session.user)?;

    let from = parse_window_bound("from", params.from.as_deref())?;
    let to = parse_window_bound("to", params.to.as_deref())?;

    let repo = SqlOrderRepository::new(state.db_pool.clone());
    let summary = repo.analytics(from, to).await.map_err(repository_error)?;
    Ok(Json(AnalyticsResponse::from_summary(summary)))
}

fn parse_window_bound(
    label: &str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, ApiError> {
    match value {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|at| Some(at.with_timezone(&Utc)))
            .map_err(|_| bad_request(format!("`{label}` is not an RFC 3339 timestamp"))),
    }
}
