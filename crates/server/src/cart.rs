//! Cart routes. Every endpoint works on the caller's single active cart,
//! creating it on first touch.
//!
//! Endpoints:
//! - `GET    /cart`                      — the active cart, lines and totals
//! - `POST   /cart/add`                  — add quantity of a product at today's price
//! - `PUT    /cart/update/{product_id}`  — set a line to an absolute quantity
//! - `DELETE /cart/remove/{product_id}`  — drop a line
//! - `DELETE /cart/clear`                — drop every line
//! - `GET    /cart/total`                — totals only
//! - `POST   /cart/merge`                — absorb a guest cart into the active cart

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use storefront_core::domain::cart::{Cart, CartId, CartStatus};
use storefront_core::domain::product::{Product, ProductId};
use storefront_core::pricing::{PricingConfig, Totals};
use storefront_db::repositories::{
    CartRepository, ProductRepository, SqlCartRepository, SqlProductRepository,
};
use storefront_db::DbPool;

use crate::auth::authenticate;
use crate::error::{bad_request, domain_error, not_found, repository_error, ApiError};

#[derive(Clone)]
pub struct CartState {
    db_pool: DbPool,
    pricing: PricingConfig,
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct MergeCartRequest {
    pub guest_cart_id: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(db_pool: DbPool, pricing: &PricingConfig) -> Router {
    Router::new()
        .route("/cart", get(get_cart))
        .route("/cart/add", post(add_item))
        .route("/cart/update/{product_id}", put(update_item))
        .route("/cart/remove/{product_id}", delete(remove_item))
        .route("/cart/clear", delete(clear_cart))
        .route("/cart/total", get(cart_total))
        .route("/cart/merge", post(merge_cart))
        .with_state(CartState { db_pool, pricing: pricing.clone() })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_cart(
    headers: HeaderMap,
    State(state): State<CartState>,
) -> Result<Json<Cart>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    let carts = SqlCartRepository::new(state.db_pool.clone());
    let cart = carts
        .get_or_create_active(&session.user.id, &state.pricing, Utc::now())
        .await
        .map_err(repository_error)?;
    Ok(Json(cart))
}

async fn add_item(
    headers: HeaderMap,
    State(state): State<CartState>,
    Json(body): Json<AddItemRequest>,
) -> Result<Json<Cart>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    let now = Utc::now();

    let products = SqlProductRepository::new(state.db_pool.clone());
    let product = products
        .find_by_id(&ProductId(body.product_id))
        .await
        .map_err(repository_error)?
        .filter(|product| product.active)
        .ok_or_else(|| not_found("product not found"))?;

    let carts = SqlCartRepository::new(state.db_pool.clone());
    let mut cart = carts
        .get_or_create_active(&session.user.id, &state.pricing, now)
        .await
        .map_err(repository_error)?;

    // The line already in the cart counts against stock too.
    let requested = cart.quantity_of(&product.id).saturating_add(body.quantity);
    ensure_stock(&product, requested)?;

    cart.add_line(
        product.id.clone(),
        product.effective_price(now),
        body.quantity,
        &state.pricing,
        now,
    )
    .map_err(domain_error)?;
    carts.save(&cart).await.map_err(repository_error)?;

    info!(
        event_name = "cart.item_added",
        cart_id = %cart.id.0,
        product_id = %product.id.0,
        quantity = requested,
        "cart line added"
    );

    Ok(Json(cart))
}

async fn update_item(
    headers: HeaderMap,
    State(state): State<CartState>,
    Path(product_id): Path<String>,
    Json(body): Json<UpdateItemRequest>,
) -> Result<Json<Cart>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    let now = Utc::now();
    let product_id = ProductId(product_id);

    let products = SqlProductRepository::new(state.db_pool.clone());
    let product = products
        .find_by_id(&product_id)
        .await
        .map_err(repository_error)?
        .ok_or_else(|| not_found("product not found"))?;
    ensure_stock(&product, body.quantity)?;

    let carts = SqlCartRepository::new(state.db_pool.clone());
    let mut cart = carts
        .get_or_create_active(&session.user.id, &state.pricing, now)
        .await
        .map_err(repository_error)?;
    cart.set_line_quantity(&product_id, body.quantity, &state.pricing, now)
        .map_err(domain_error)?;
    carts.save(&cart).await.map_err(repository_error)?;

    Ok(Json(cart))
}

async fn remove_item(
    headers: HeaderMap,
    State(state): State<CartState>,
    Path(product_id): Path<String>,
) -> Result<Json<Cart>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    let now = Utc::now();

    let carts = SqlCartRepository::new(state.db_pool.clone());
    let mut cart = carts
        .get_or_create_active(&session.user.id, &state.pricing, now)
        .await
        .map_err(repository_error)?;
    cart.remove_line(&ProductId(product_id), &state.pricing, now).map_err(domain_error)?;
    carts.save(&cart).await.map_err(repository_error)?;

    Ok(Json(cart))
}

async fn clear_cart(
    headers: HeaderMap,
    State(state): State<CartState>,
) -> Result<Json<Cart>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    let now = Utc::now();

    let carts = SqlCartRepository::new(state.db_pool.clone());
    let mut cart = carts
        .get_or_create_active(&session.user.id, &state.pricing, now)
        .await
        .map_err(repository_error)?;
    cart.clear(&state.pricing, now);
    carts.save(&cart).await.map_err(repository_error)?;

    Ok(Json(cart))
}

async fn cart_total(
    headers: HeaderMap,
    State(state): State<CartState>,
) -> Result<Json<Totals>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    let carts = SqlCartRepository::new(state.db_pool.clone());
    let cart = carts
        .get_or_create_active(&session.user.id, &state.pricing, Utc::now())
        .await
        .map_err(repository_error)?;
    Ok(Json(cart.totals))
}

async fn merge_cart(
    headers: HeaderMap,
    State(state): State<CartState>,
    Json(body): Json<MergeCartRequest>,
) -> Result<Json<Cart>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    let now = Utc::now();

    let carts = SqlCartRepository::new(state.db_pool.clone());
    // Only anonymous active carts are eligible; anything else reads as
    // missing so the endpoint cannot probe other users' carts.
    let source = carts
        .find_by_id(&CartId(body.guest_cart_id))
        .await
        .map_err(repository_error)?
        .filter(|cart| cart.owner.is_none() && cart.status == CartStatus::Active)
        .ok_or_else(|| not_found("guest cart not found"))?;
    let source_id = source.id.clone();
    let line_count = source.items.len();

    let mut cart = carts
        .get_or_create_active(&session.user.id, &state.pricing, now)
        .await
        .map_err(repository_error)?;
    // Stock is not revalidated here; checkout re-checks every line anyway.
    cart.merge_lines_from(source, &state.pricing, now);
    carts.save(&cart).await.map_err(repository_error)?;
    carts.delete(&source_id).await.map_err(repository_error)?;

    info!(
        event_name = "cart.merged",
        cart_id = %cart.id.0,
        source_cart_id = %source_id.0,
        merged_lines = line_count,
        "guest cart absorbed"
    );

    Ok(Json(cart))
}

fn ensure_stock(product: &Product, quantity: u32) -> Result<(), ApiError> {
    if product.stock < quantity {
        return Err(bad_request(format!("insufficient stock for `{}`", product.name)));
    }
    Ok(())
}
