use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use storefront_core::domain::product::{Discount, Product, ProductId};

use super::{
    parse_decimal, parse_optional_timestamp, parse_timestamp, parse_u32, ProductRepository,
    RepositoryError,
};
use crate::DbPool;

const MAX_PAGE_SIZE: u32 = 100;

/// Catalog filters for the browse endpoints. `page` is 1-based; `per_page`
/// is clamped to [1, 100].
#[derive(Clone, Debug)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub in_stock_only: bool,
    pub include_inactive: bool,
    pub sort: ProductSort,
    pub page: u32,
    pub per_page: u32,
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            category: None,
            search: None,
            min_price: None,
            max_price: None,
            in_stock_only: false,
            include_inactive: false,
            sort: ProductSort::Newest,
            page: 1,
            per_page: 20,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    NameAsc,
}

impl ProductSort {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "newest" => Some(Self::Newest),
            "price_asc" => Some(Self::PriceAsc),
            "price_desc" => Some(Self::PriceDesc),
            "name_asc" => Some(Self::NameAsc),
            _ => None,
        }
    }

    fn order_by(self) -> &'static str {
        match self {
            Self::Newest => "created_at DESC, id ASC",
            Self::PriceAsc => "CAST(price AS REAL) ASC, id ASC",
            Self::PriceDesc => "CAST(price AS REAL) DESC, id ASC",
            Self::NameAsc => "LOWER(name) ASC, id ASC",
        }
    }
}

#[derive(Debug)]
pub struct ProductPage {
    pub items: Vec<Product>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

pub struct SqlProductRepository {
    pool: DbPool,
}

impl SqlProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const PRODUCT_COLUMNS: &str = "id,
                sku,
                name,
                description,
                category,
                CAST(price AS TEXT) AS price,
                stock,
                active,
                CAST(discount_percent AS TEXT) AS discount_percent,
                discount_expires_at,
                created_at,
                updated_at";

#[async_trait::async_trait]
impl ProductRepository for SqlProductRepository {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS}
             FROM product
             WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(product_from_row).transpose()
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS}
             FROM product
             WHERE sku = ?"
        ))
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        row.map(product_from_row).transpose()
    }

    async fn list(&self, query: &ProductQuery) -> Result<ProductPage, RepositoryError> {
        let page = query.page.max(1);
        let per_page = query.per_page.clamp(1, MAX_PAGE_SIZE);
        let offset = i64::from(page - 1) * i64::from(per_page);

        let mut count_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) AS count FROM product");
        push_filters(&mut count_builder, query);
        let total = count_builder
            .build()
            .fetch_one(&self.pool)
            .await?
            .get::<i64, _>("count")
            .max(0) as u64;

        let mut page_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM product"));
        push_filters(&mut page_builder, query);
        page_builder.push(format!(" ORDER BY {} LIMIT ", query.sort.order_by()));
        page_builder.push_bind(i64::from(per_page));
        page_builder.push(" OFFSET ");
        page_builder.push_bind(offset);

        let rows = page_builder.build().fetch_all(&self.pool).await?;
        let items = rows.into_iter().map(product_from_row).collect::<Result<Vec<_>, _>>()?;

        Ok(ProductPage { items, total, page, per_page })
    }

    async fn categories(&self) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT DISTINCT category
             FROM product
             WHERE active = 1
             ORDER BY category ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("category").map_err(RepositoryError::from))
            .collect()
    }

    async fn save(&self, product: &Product) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO product (
                id,
                sku,
                name,
                description,
                category,
                price,
                stock,
                active,
                discount_percent,
                discount_expires_at,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                sku = excluded.sku,
                name = excluded.name,
                description = excluded.description,
                category = excluded.category,
                price = excluded.price,
                stock = excluded.stock,
                active = excluded.active,
                discount_percent = excluded.discount_percent,
                discount_expires_at = excluded.discount_expires_at,
                updated_at = excluded.updated_at",
        )
        .bind(&product.id.0)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category)
        .bind(product.price.to_string())
        .bind(i64::from(product.stock))
        .bind(product.active)
        .bind(product.discount.as_ref().map(|discount| discount.percentage.to_string()))
        .bind(product.discount.as_ref().map(|discount| discount.valid_until.to_rfc3339()))
        .bind(product.created_at.to_rfc3339())
        .bind(product.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn deactivate(&self, id: &ProductId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE product
             SET active = 0, updated_at = ?2
             WHERE id = ?1",
        )
        .bind(&id.0)
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("product `{}`", id.0)));
        }
        Ok(())
    }

    async fn set_stock(
        &self,
        id: &ProductId,
        stock: u32,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE product
             SET stock = ?2, updated_at = ?3
             WHERE id = ?1",
        )
        .bind(&id.0)
        .bind(i64::from(stock))
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("product `{}`", id.0)));
        }
        Ok(())
    }
}

fn push_filters(builder: &mut QueryBuilder<Sqlite>, query: &ProductQuery) {
    builder.push(" WHERE 1=1");

    if !query.include_inactive {
        builder.push(" AND active = 1");
    }
    if query.in_stock_only {
        builder.push(" AND stock > 0");
    }
    if let Some(category) = &query.category {
        builder.push(" AND category = ");
        builder.push_bind(category.clone());
    }
    if let Some(search) = &query.search {
        let pattern = format!("%{}%", search.trim().to_ascii_lowercase());
        builder.push(" AND (LOWER(name) LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR LOWER(description) LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR LOWER(sku) LIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
    if let Some(min_price) = query.min_price {
        builder.push(" AND CAST(price AS REAL) >= CAST(");
        builder.push_bind(min_price.to_string());
        builder.push(" AS REAL)");
    }
    if let Some(max_price) = query.max_price {
        builder.push(" AND CAST(price AS REAL) <= CAST(");
        builder.push_bind(max_price.to_string());
        builder.push(" AS REAL)");
    }
}

pub(crate) fn product_from_row(row: SqliteRow) -> Result<Product, RepositoryError> {
    let discount_percent = row.try_get::<Option<String>, _>("discount_percent")?;
    let discount_expires_at =
        parse_optional_timestamp("discount_expires_at", row.try_get("discount_expires_at")?)?;
    let discount = match (discount_percent, discount_expires_at) {
        (Some(percent), Some(valid_until)) => {
            let percentage = parse_decimal("discount_percent", &percent)?;
            Some(
                Discount::new(percentage, valid_until)
                    .map_err(|error| RepositoryError::Decode(error.to_string()))?,
            )
        }
        (None, None) => None,
        _ => {
            return Err(RepositoryError::Decode(
                "discount_percent and discount_expires_at must be set together".to_string(),
            ))
        }
    };

    Ok(Product {
        id: ProductId(row.try_get("id")?),
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        price: parse_decimal("price", &row.try_get::<String, _>("price")?)?,
        stock: parse_u32("stock", row.try_get("stock")?)?,
        active: row.try_get("active")?,
        discount,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use rust_decimal::Decimal;

    use storefront_core::domain::product::{Discount, Product, ProductId};

    use super::{ProductQuery, ProductSort, SqlProductRepository};
    use crate::migrations;
    use crate::repositories::{ProductRepository, RepositoryError};
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn sql_product_repo_round_trips_with_and_without_discount() {
        let pool = setup_pool().await;
        let repo = SqlProductRepository::new(pool.clone());

        let mut plain = sample_product("p-cat-001", "CAT-001", "catalog-a");
        repo.save(&plain).await.expect("save plain");

        let mut discounted = sample_product("p-cat-002", "CAT-002", "catalog-a");
        discounted.discount = Some(
            Discount::new(Decimal::from(15), parse_ts("2027-01-01T00:00:00Z"))
                .expect("valid discount"),
        );
        repo.save(&discounted).await.expect("save discounted");

        assert_eq!(repo.find_by_id(&plain.id).await.expect("find plain"), Some(plain.clone()));
        assert_eq!(
            repo.find_by_id(&discounted.id).await.expect("find discounted"),
            Some(discounted.clone())
        );
        assert_eq!(
            repo.find_by_sku("CAT-002").await.expect("find by sku"),
            Some(discounted.clone())
        );
        assert_eq!(repo.find_by_id(&ProductId("p-missing".to_string())).await.expect("miss"), None);

        // Upsert: a later save replaces mutable fields in place.
        plain.price = Decimal::new(1500, 2);
        plain.stock = 3;
        repo.save(&plain).await.expect("resave");
        assert_eq!(repo.find_by_id(&plain.id).await.expect("find resaved"), Some(plain));

        pool.close().await;
    }

    #[tokio::test]
    async fn sql_product_repo_list_filters_and_paginates() {
        let pool = setup_pool().await;
        let repo = SqlProductRepository::new(pool.clone());

        let mut cheap = sample_product("p-lst-001", "LST-001", "list-books");
        cheap.name = "Paper Atlas".to_string();
        cheap.price = Decimal::new(500, 2);
        let mut mid = sample_product("p-lst-002", "LST-002", "list-books");
        mid.name = "Hardcover Atlas".to_string();
        mid.price = Decimal::new(2000, 2);
        mid.stock = 0;
        let mut dear = sample_product("p-lst-003", "LST-003", "list-tools");
        dear.name = "Torque Wrench".to_string();
        dear.price = Decimal::new(9900, 2);
        let mut retired = sample_product("p-lst-004", "LST-004", "list-tools");
        retired.active = false;

        for product in [&cheap, &mid, &dear, &retired] {
            repo.save(product).await.expect("save");
        }

        let books = repo
            .list(&ProductQuery {
                category: Some("list-books".to_string()),
                ..ProductQuery::default()
            })
            .await
            .expect("list books");
        assert_eq!(books.total, 2);

        // Inactive products are hidden unless explicitly included.
        let tools = repo
            .list(&ProductQuery {
                category: Some("list-tools".to_string()),
                ..ProductQuery::default()
            })
            .await
            .expect("list tools");
        assert_eq!(tools.total, 1);
        let all_tools = repo
            .list(&ProductQuery {
                category: Some("list-tools".to_string()),
                include_inactive: true,
                ..ProductQuery::default()
            })
            .await
            .expect("list all tools");
        assert_eq!(all_tools.total, 2);

        let in_stock_books = repo
            .list(&ProductQuery {
                category: Some("list-books".to_string()),
                in_stock_only: true,
                ..ProductQuery::default()
            })
            .await
            .expect("list in-stock books");
        assert_eq!(in_stock_books.total, 1);
        assert_eq!(in_stock_books.items[0].id, cheap.id);

        let searched = repo
            .list(&ProductQuery { search: Some("atlas".to_string()), ..ProductQuery::default() })
            .await
            .expect("search");
        assert_eq!(searched.total, 2);

        let priced = repo
            .list(&ProductQuery {
                min_price: Some(Decimal::new(1000, 2)),
                max_price: Some(Decimal::new(5000, 2)),
                category: Some("list-books".to_string()),
                ..ProductQuery::default()
            })
            .await
            .expect("price band");
        assert_eq!(priced.total, 1);
        assert_eq!(priced.items[0].id, mid.id);

        let by_price = repo
            .list(&ProductQuery {
                category: Some("list-books".to_string()),
                sort: ProductSort::PriceDesc,
                ..ProductQuery::default()
            })
            .await
            .expect("sorted");
        assert_eq!(by_price.items[0].id, mid.id);
        assert_eq!(by_price.items[1].id, cheap.id);

        let paged = repo
            .list(&ProductQuery {
                category: Some("list-books".to_string()),
                sort: ProductSort::PriceAsc,
                page: 2,
                per_page: 1,
                ..ProductQuery::default()
            })
            .await
            .expect("paged");
        assert_eq!(paged.total, 2);
        assert_eq!(paged.items.len(), 1);
        assert_eq!(paged.items[0].id, mid.id);

        pool.close().await;
    }

    #[tokio::test]
    async fn sql_product_repo_categories_deactivate_and_set_stock() {
        let pool = setup_pool().await;
        let repo = SqlProductRepository::new(pool.clone());

        let garden = sample_product("p-adm-001", "ADM-001", "admin-garden");
        let kitchen = sample_product("p-adm-002", "ADM-002", "admin-kitchen");
        repo.save(&garden).await.expect("save garden");
        repo.save(&kitchen).await.expect("save kitchen");

        let categories = repo.categories().await.expect("categories");
        assert!(categories.contains(&"admin-garden".to_string()));
        assert!(categories.contains(&"admin-kitchen".to_string()));

        let later = garden.created_at + Duration::hours(1);
        repo.deactivate(&garden.id, later).await.expect("deactivate");
        let deactivated = repo.find_by_id(&garden.id).await.expect("reload").expect("present");
        assert!(!deactivated.active);
        assert_eq!(deactivated.updated_at, later);
        assert!(!repo.categories().await.expect("categories").contains(&"admin-garden".to_string()));

        repo.set_stock(&kitchen.id, 42, later).await.expect("set stock");
        let restocked = repo.find_by_id(&kitchen.id).await.expect("reload").expect("present");
        assert_eq!(restocked.stock, 42);

        let missing = ProductId("p-adm-missing".to_string());
        assert!(matches!(
            repo.deactivate(&missing, later).await,
            Err(RepositoryError::NotFound(_))
        ));
        assert!(matches!(
            repo.set_stock(&missing, 1, later).await,
            Err(RepositoryError::NotFound(_))
        ));

        pool.close().await;
    }

    #[tokio::test]
    async fn sql_product_repo_rejects_duplicate_sku() {
        let pool = setup_pool().await;
        let repo = SqlProductRepository::new(pool.clone());

        let first = sample_product("p-sku-001", "SKU-DUP-001", "sku-test");
        let mut second = sample_product("p-sku-002", "SKU-DUP-001", "sku-test");
        repo.save(&first).await.expect("save first");

        let clash = repo.save(&second).await;
        assert!(matches!(clash, Err(RepositoryError::Database(_))));

        second.sku = "SKU-DUP-002".to_string();
        repo.save(&second).await.expect("save with fresh sku");

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn sample_product(id: &str, sku: &str, category: &str) -> Product {
        let created = parse_ts("2026-02-01T08:00:00Z");
        Product {
            id: ProductId(id.to_string()),
            sku: sku.to_string(),
            name: format!("Product {id}"),
            description: "test article".to_string(),
            category: category.to_string(),
            price: Decimal::new(1999, 2),
            stock: 10,
            active: true,
            discount: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
