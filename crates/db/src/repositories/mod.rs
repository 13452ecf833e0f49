use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use storefront_core::domain::cart::{Cart, CartId};
use storefront_core::domain::order::{Order, OrderId};
use storefront_core::domain::product::{Product, ProductId};
use storefront_core::domain::user::{User, UserId};
use storefront_core::pricing::PricingConfig;

pub mod cart;
pub mod order;
pub mod product;
pub mod stock;
pub mod user;

pub use cart::SqlCartRepository;
pub use order::{
    AnalyticsSummary, DailySales, OrderPage, OrderQuery, SqlOrderRepository, StatusCount,
    TopProduct,
};
pub use product::{ProductPage, ProductQuery, ProductSort, SqlProductRepository};
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError>;
    async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, RepositoryError>;
    async fn list(&self, query: &ProductQuery) -> Result<ProductPage, RepositoryError>;
    async fn categories(&self) -> Result<Vec<String>, RepositoryError>;
    async fn save(&self, product: &Product) -> Result<(), RepositoryError>;
    async fn deactivate(&self, id: &ProductId, at: DateTime<Utc>) -> Result<(), RepositoryError>;
    async fn set_stock(
        &self,
        id: &ProductId,
        stock: u32,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn find_by_id(&self, id: &CartId) -> Result<Option<Cart>, RepositoryError>;

    async fn find_active_for_user(&self, user_id: &UserId)
        -> Result<Option<Cart>, RepositoryError>;

    /// Returns the user's active cart, creating an empty one when none
    /// exists. A concurrent creation race resolves by re-reading.
    async fn get_or_create_active(
        &self,
        user_id: &UserId,
        pricing: &PricingConfig,
        now: DateTime<Utc>,
    ) -> Result<Cart, RepositoryError>;

    async fn save(&self, cart: &Cart) -> Result<(), RepositoryError>;

    async fn delete(&self, id: &CartId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Scoped lookup: only returns the order when it belongs to `user_id`.
    async fn find_for_user(
        &self,
        id: &OrderId,
        user_id: &UserId,
    ) -> Result<Option<Order>, RepositoryError>;

    async fn list_for_user(
        &self,
        user_id: &UserId,
        page: u32,
        per_page: u32,
    ) -> Result<OrderPage, RepositoryError>;

    async fn list_all(&self, query: &OrderQuery) -> Result<OrderPage, RepositoryError>;

    /// Persists the mutable fulfilment fields of an existing order: status,
    /// payment, notes, tracking number, delivery estimate, and `updated_at`.
    async fn save_workflow_fields(&self, order: &Order) -> Result<(), RepositoryError>;

    async fn analytics(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<AnalyticsSummary, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: &User) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn update_profile(&self, user: &User) -> Result<(), RepositoryError>;
    async fn update_password(
        &self,
        id: &UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError>;
    async fn record_login(&self, id: &UserId, at: DateTime<Utc>) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn insert_token(
        &self,
        token_digest: &str,
        user_id: &UserId,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Resolves a token digest to its user, ignoring expired tokens.
    async fn find_user_by_token(
        &self,
        token_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError>;

    async fn revoke_token(&self, token_digest: &str) -> Result<bool, RepositoryError>;

    /// Revokes every token the user holds except `keep_digest`. Used after a
    /// password change so only the session that made it stays signed in.
    async fn revoke_other_tokens(
        &self,
        user_id: &UserId,
        keep_digest: &str,
    ) -> Result<u64, RepositoryError>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    value.parse::<Decimal>().map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}
