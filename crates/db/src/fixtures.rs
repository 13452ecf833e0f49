use sqlx::Executor;

use storefront_core::auth;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Canonical demo catalog and the verification contract it must satisfy.
const SEED_PRODUCTS: &[SeedProductContract] = &[
    SeedProductContract {
        id: "prod-demo-laptop",
        sku: "ELEC-1001",
        name: "Aurora 14 Laptop",
        category: "electronics",
        price: "1299.00",
        stock: 12,
        active: true,
        discounted: false,
    },
    SeedProductContract {
        id: "prod-demo-headphones",
        sku: "ELEC-1002",
        name: "Drift Wireless Headphones",
        category: "electronics",
        price: "199.99",
        stock: 40,
        active: true,
        discounted: true,
    },
    SeedProductContract {
        id: "prod-demo-keyboard",
        sku: "ELEC-1003",
        name: "Tactile Pro Keyboard",
        category: "electronics",
        price: "89.50",
        stock: 25,
        active: true,
        discounted: false,
    },
    SeedProductContract {
        id: "prod-demo-novel",
        sku: "BOOK-2001",
        name: "The Glass Harbor",
        category: "books",
        price: "18.75",
        stock: 60,
        active: true,
        discounted: false,
    },
    SeedProductContract {
        id: "prod-demo-cookbook",
        sku: "BOOK-2002",
        name: "Weeknight Kitchen",
        category: "books",
        price: "32.00",
        stock: 35,
        active: true,
        discounted: false,
    },
    SeedProductContract {
        id: "prod-demo-hoodie",
        sku: "APRL-3001",
        name: "Harbor Hoodie",
        category: "apparel",
        price: "54.00",
        stock: 50,
        active: true,
        discounted: true,
    },
    SeedProductContract {
        id: "prod-demo-bottle",
        sku: "HOME-4001",
        name: "Summit Steel Bottle",
        category: "home",
        price: "24.95",
        stock: 80,
        active: true,
        discounted: false,
    },
    // Out of stock on purpose: exercises the sold-out browse and checkout
    // paths.
    SeedProductContract {
        id: "prod-demo-lamp",
        sku: "HOME-4002",
        name: "Dimmable Desk Lamp",
        category: "home",
        price: "46.20",
        stock: 0,
        active: true,
        discounted: false,
    },
    // Retired: hidden from the catalog but kept for order history.
    SeedProductContract {
        id: "prod-demo-poster",
        sku: "HOME-4003",
        name: "Retired Print",
        category: "home",
        price: "12.00",
        stock: 5,
        active: false,
        discounted: false,
    },
];

const SEED_ACCOUNTS: &[SeedAccountContract] = &[
    SeedAccountContract {
        id: "user-demo-admin",
        email: "admin@storefront.test",
        role: "admin",
        password: "admin-demo-pass",
    },
    SeedAccountContract {
        id: "user-demo-customer",
        email: "demo@storefront.test",
        role: "customer",
        password: "customer-demo-pass",
    },
];

const SEED_PRODUCT_IDS: &[&str] = &[
    "prod-demo-laptop",
    "prod-demo-headphones",
    "prod-demo-keyboard",
    "prod-demo-novel",
    "prod-demo-cookbook",
    "prod-demo-hoodie",
    "prod-demo-bottle",
    "prod-demo-lamp",
    "prod-demo-poster",
];

const SEED_USER_IDS: &[&str] = &["user-demo-admin", "user-demo-customer"];

/// Demo dataset for local development and E2E runs.
///
/// Provides a deterministic catalog across four categories, including a
/// discounted, an out-of-stock, and a retired product, plus one admin and
/// one customer account with known passwords.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// SQL fixture content for the demo dataset.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_catalog.sql");

    /// Load the demo dataset into the database. Safe to run repeatedly;
    /// every statement in the fixture is an upsert.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let products_seeded = SEED_PRODUCTS
            .iter()
            .map(|product| ProductSeedInfo {
                product_id: product.id,
                sku: product.sku,
                name: product.name,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { products_seeded, accounts_seeded: SEED_ACCOUNTS.len() })
    }

    /// Verify that the seeded rows exist and match the contract, including
    /// that the documented demo passwords verify against the stored hashes.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let quoted_products = sql_array_from_ids(SEED_PRODUCT_IDS);
        let expected_product_total = SEED_PRODUCT_IDS.len() as i64;
        let existing_product_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM product WHERE id IN {quoted_products}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("catalog-products", existing_product_count == expected_product_total));

        for product in SEED_PRODUCTS {
            let product_matches: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM product
                    WHERE id = ?1
                      AND sku = ?2
                      AND name = ?3
                      AND category = ?4
                      AND CAST(price AS TEXT) = ?5
                      AND stock = ?6
                      AND active = ?7
                      AND (discount_percent IS NOT NULL) = ?8
                      AND (discount_expires_at IS NOT NULL) = ?8
                )",
            )
            .bind(product.id)
            .bind(product.sku)
            .bind(product.name)
            .bind(product.category)
            .bind(product.price)
            .bind(product.stock)
            .bind(product.active)
            .bind(product.discounted)
            .fetch_one(pool)
            .await?;
            checks.push((product.id, product_matches == 1));
        }

        for account in SEED_ACCOUNTS {
            let account_matches: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM shop_user WHERE id = ?1 AND email = ?2 AND role = ?3)",
            )
            .bind(account.id)
            .bind(account.email)
            .bind(account.role)
            .fetch_one(pool)
            .await?;
            checks.push((account.id, account_matches == 1));

            let stored_hash: Option<String> =
                sqlx::query_scalar("SELECT password_hash FROM shop_user WHERE id = ?1")
                    .bind(account.id)
                    .fetch_optional(pool)
                    .await?;
            let password_verifies = stored_hash
                .map(|hash| auth::verify_password(account.password, &hash))
                .unwrap_or(false);
            checks.push((account.credentials_label(), password_verifies));
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    /// Clean up seeded fixtures from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let quoted_users = sql_array_from_ids(SEED_USER_IDS);
        let quoted_products = sql_array_from_ids(SEED_PRODUCT_IDS);

        // Users first: their carts cascade away before the product rows
        // those carts reference are removed.
        sqlx::query(&format!("DELETE FROM shop_user WHERE id IN {quoted_users}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM product WHERE id IN {quoted_products}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedProductContract {
    id: &'static str,
    sku: &'static str,
    name: &'static str,
    category: &'static str,
    price: &'static str,
    stock: i64,
    active: bool,
    discounted: bool,
}

#[derive(Debug, Clone, Copy)]
struct SeedAccountContract {
    id: &'static str,
    email: &'static str,
    role: &'static str,
    password: &'static str,
}

impl SeedAccountContract {
    fn credentials_label(&self) -> &'static str {
        match self.role {
            "admin" => "admin-credentials",
            _ => "customer-credentials",
        }
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub products_seeded: Vec<ProductSeedInfo>,
    pub accounts_seeded: usize,
}

#[derive(Debug)]
pub struct ProductSeedInfo {
    pub product_id: &'static str,
    pub sku: &'static str,
    pub name: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
