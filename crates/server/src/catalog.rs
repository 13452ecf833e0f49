//! Catalog routes.
//!
//! Endpoints:
//! - `GET    /products`              — browse with filters, search, sort and paging
//! - `GET    /products/categories`   — distinct categories across active products
//! - `GET    /products/{product_id}` — detail for one active product
//! - `POST   /products`              — create a product (admin)
//! - `PUT    /products/{product_id}` — typed patch, including discounts (admin)
//! - `DELETE /products/{product_id}` — retire a product, keeping order history (admin)
//! - `PUT    /products/{product_id}/stock` — overwrite the stock level (admin)

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use storefront_core::domain::product::{Product, ProductId, ProductPatch};
use storefront_db::repositories::{
    ProductQuery, ProductRepository, ProductSort, RepositoryError, SqlProductRepository,
};
use storefront_db::DbPool;

use crate::audit;
use crate::auth::{authenticate, require_admin};
use crate::error::{
    bad_request, domain_error, invalid_fields, not_found, repository_error, ApiError, FieldError,
};

#[derive(Clone)]
pub struct CatalogState {
    db_pool: DbPool,
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: Decimal,
    pub stock: u32,
}

/// Stock arrives as a signed number so a negative value gets a proper
/// validation error instead of a deserialization failure.
#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    pub stock: i64,
}

#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub products: Vec<Product>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total_products: u64,
}

#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    pub categories: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(db_pool: DbPool) -> Router {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/categories", get(list_categories))
        .route(
            "/products/{product_id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/products/{product_id}/stock", put(set_product_stock))
        .with_state(CatalogState { db_pool })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_products(
    State(state): State<CatalogState>,
    Query(params): Query<CatalogQuery>,
) -> Result<Json<ProductListResponse>, ApiError> {
    let sort = match params.sort.as_deref() {
        Some(value) => ProductSort::parse(value)
            .ok_or_else(|| bad_request(format!("unknown sort `{value}`")))?,
        None => ProductSort::Newest,
    };
    let query = ProductQuery {
        category: trimmed(params.category),
        search: trimmed(params.search),
        min_price: params.min_price,
        max_price: params.max_price,
        sort,
        page: params.page.unwrap_or(1),
        per_page: params.limit.unwrap_or(20),
        ..ProductQuery::default()
    };

    let repo = SqlProductRepository::new(state.db_pool.clone());
    let page = repo.list(&query).await.map_err(repository_error)?;

    Ok(Json(ProductListResponse {
        current_page: page.page,
        total_pages: page.total.div_ceil(u64::from(page.per_page)) as u32,
        total_products: page.total,
        products: page.items,
    }))
}

async fn list_categories(
    State(state): State<CatalogState>,
) -> Result<Json<CategoriesResponse>, ApiError> {
    let repo = SqlProductRepository::new(state.db_pool.clone());
    let categories = repo.categories().await.map_err(repository_error)?;
    Ok(Json(CategoriesResponse { categories }))
}

async fn get_product(
    State(state): State<CatalogState>,
    Path(product_id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let repo = SqlProductRepository::new(state.db_pool.clone());
    let product = repo
        .find_by_id(&ProductId(product_id))
        .await
        .map_err(repository_error)?
        .filter(|product| product.active)
        .ok_or_else(|| not_found("product not found"))?;
    Ok(Json(product))
}

async fn create_product(
    headers: HeaderMap,
    State(state): State<CatalogState>,
    Json(body): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    require_admin(&session.user)?;

    let mut details = Vec::new();
    let sku = body.sku.trim();
    if sku.is_empty() {
        details.push(FieldError::new("sku", "sku is required"));
    }
    let name = body.name.trim();
    if name.is_empty() {
        details.push(FieldError::new("name", "name is required"));
    }
    let category = body.category.trim();
    if category.is_empty() {
        details.push(FieldError::new("category", "category is required"));
    }
    if body.price < Decimal::ZERO {
        details.push(FieldError::new("price", "price cannot be negative"));
    }
    if !details.is_empty() {
        return Err(invalid_fields("validation failed", details));
    }

    let repo = SqlProductRepository::new(state.db_pool.clone());
    if repo.find_by_sku(sku).await.map_err(repository_error)?.is_some() {
        return Err(bad_request("SKU already exists"));
    }

    let now = Utc::now();
    let product = Product {
        id: ProductId::generate(),
        sku: sku.to_string(),
        name: name.to_string(),
        description: body.description,
        category: category.to_string(),
        price: body.price,
        stock: body.stock,
        active: true,
        discount: None,
        created_at: now,
        updated_at: now,
    };
    // The pre-check races with concurrent creates; the unique index on sku is
    // what actually holds the line.
    if let Err(error) = repo.save(&product).await {
        return Err(match error {
            RepositoryError::Database(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                bad_request("SKU already exists")
            }
            other => repository_error(other),
        });
    }

    info!(
        event_name = "catalog.product_created",
        product_id = %product.id.0,
        sku = %product.sku,
        "product created"
    );
    audit::record_event(
        &state.db_pool,
        &session.user.id.0,
        "admin",
        &product.id.0,
        "catalog.product.created",
        "catalog",
        &format!("created `{}` ({})", product.name, product.sku),
    )
    .await;

    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    headers: HeaderMap,
    State(state): State<CatalogState>,
    Path(product_id): Path<String>,
    Json(patch): Json<ProductPatch>,
) -> Result<Json<Product>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    require_admin(&session.user)?;
    if patch.is_empty() {
        return Err(bad_request("no product fields to update"));
    }

    let repo = SqlProductRepository::new(state.db_pool.clone());
    let mut product = repo
        .find_by_id(&ProductId(product_id))
        .await
        .map_err(repository_error)?
        .ok_or_else(|| not_found("product not found"))?;

    patch.apply(&mut product, Utc::now()).map_err(domain_error)?;
    repo.save(&product).await.map_err(repository_error)?;

    info!(
        event_name = "catalog.product_updated",
        product_id = %product.id.0,
        "product updated"
    );
    audit::record_event(
        &state.db_pool,
        &session.user.id.0,
        "admin",
        &product.id.0,
        "catalog.product.updated",
        "catalog",
        &format!("updated `{}`", product.name),
    )
    .await;

    Ok(Json(product))
}

async fn delete_product(
    headers: HeaderMap,
    State(state): State<CatalogState>,
    Path(product_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    require_admin(&session.user)?;

    let id = ProductId(product_id);
    let repo = SqlProductRepository::new(state.db_pool.clone());
    // Deactivation rather than deletion, so existing orders keep a valid
    // product reference.
    repo.deactivate(&id, Utc::now()).await.map_err(repository_error)?;

    info!(event_name = "catalog.product_deactivated", product_id = %id.0, "product deactivated");
    audit::record_event(
        &state.db_pool,
        &session.user.id.0,
        "admin",
        &id.0,
        "catalog.product.deactivated",
        "catalog",
        "product deactivated",
    )
    .await;

    Ok(Json(MessageResponse { message: "product deactivated".to_string() }))
}

async fn set_product_stock(
    headers: HeaderMap,
    State(state): State<CatalogState>,
    Path(product_id): Path<String>,
    Json(body): Json<SetStockRequest>,
) -> Result<Json<Product>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    require_admin(&session.user)?;

    let Ok(stock) = u32::try_from(body.stock) else {
        return Err(invalid_fields(
            "validation failed",
            vec![FieldError::new("stock", "invalid stock value")],
        ));
    };

    let id = ProductId(product_id);
    let repo = SqlProductRepository::new(state.db_pool.clone());
    repo.set_stock(&id, stock, Utc::now()).await.map_err(repository_error)?;
    let product = repo
        .find_by_id(&id)
        .await
        .map_err(repository_error)?
        .ok_or_else(|| not_found("product not found"))?;

    info!(
        event_name = "catalog.stock_set",
        product_id = %id.0,
        stock,
        "stock level overwritten"
    );
    audit::record_event(
        &state.db_pool,
        &session.user.id.0,
        "admin",
        &id.0,
        "catalog.stock.set",
        "catalog",
        &format!("stock set to {stock}"),
    )
    .await;

    Ok(Json(product))
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}
