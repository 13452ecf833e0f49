use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use storefront_core::domain::user::{Role, User, UserId};

use super::{
    parse_optional_timestamp, parse_timestamp, RepositoryError, TokenRepository, UserRepository,
};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id,
                name,
                email,
                password_hash,
                role,
                phone_number,
                created_at,
                last_login";

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn insert(&self, user: &User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO shop_user (
                id,
                name,
                email,
                password_hash,
                role,
                phone_number,
                created_at,
                last_login
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id.0)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.phone_number.as_deref())
        .bind(user.created_at.to_rfc3339())
        .bind(user.last_login.map(|value| value.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS}
             FROM shop_user
             WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS}
             FROM shop_user
             WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row).transpose()
    }

    async fn update_profile(&self, user: &User) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop_user
             SET name = ?2, email = ?3, phone_number = ?4
             WHERE id = ?1",
        )
        .bind(&user.id.0)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.phone_number.as_deref())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("user `{}`", user.id.0)));
        }
        Ok(())
    }

    async fn update_password(
        &self,
        id: &UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop_user
             SET password_hash = ?2
             WHERE id = ?1",
        )
        .bind(&id.0)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("user `{}`", id.0)));
        }
        Ok(())
    }

    async fn record_login(&self, id: &UserId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop_user
             SET last_login = ?2
             WHERE id = ?1",
        )
        .bind(&id.0)
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("user `{}`", id.0)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl TokenRepository for SqlUserRepository {
    async fn insert_token(
        &self,
        token_digest: &str,
        user_id: &UserId,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO auth_token (token_hash, user_id, created_at, expires_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(token_digest)
        .bind(&user_id.0)
        .bind(created_at.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_user_by_token(
        &self,
        token_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                u.id,
                u.name,
                u.email,
                u.password_hash,
                u.role,
                u.phone_number,
                u.created_at,
                u.last_login
             FROM auth_token t
             JOIN shop_user u ON u.id = t.user_id
             WHERE t.token_hash = ? AND t.expires_at > ?",
        )
        .bind(token_digest)
        .bind(now.to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row).transpose()
    }

    async fn revoke_token(&self, token_digest: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM auth_token WHERE token_hash = ?")
            .bind(token_digest)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_other_tokens(
        &self,
        user_id: &UserId,
        keep_digest: &str,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM auth_token WHERE user_id = ? AND token_hash != ?")
            .bind(&user_id.0)
            .bind(keep_digest)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM auth_token WHERE expires_at <= ?")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn user_from_row(row: SqliteRow) -> Result<User, RepositoryError> {
    let role_raw = row.try_get::<String, _>("role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown user role `{role_raw}`")))?;

    Ok(User {
        id: UserId(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role,
        phone_number: row.try_get("phone_number")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        last_login: parse_optional_timestamp("last_login", row.try_get("last_login")?)?,
    })
}
