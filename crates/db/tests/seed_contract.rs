use std::collections::HashSet;

use storefront_db::DemoSeedDataset;

type SeedContractTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
    ($left:expr, $right:expr, $($arg:tt)*) => {
        if $left != $right {
            return Err(format!($($arg)*));
        }
    };
}

#[derive(Debug)]
struct ExpectedProduct {
    id: &'static str,
    sku: &'static str,
    name: &'static str,
    price: &'static str,
}

const EXPECTED_PRODUCTS: &[ExpectedProduct] = &[
    ExpectedProduct {
        id: "prod-demo-laptop",
        sku: "ELEC-1001",
        name: "Aurora 14 Laptop",
        price: "1299.00",
    },
    ExpectedProduct {
        id: "prod-demo-headphones",
        sku: "ELEC-1002",
        name: "Drift Wireless Headphones",
        price: "199.99",
    },
    ExpectedProduct {
        id: "prod-demo-keyboard",
        sku: "ELEC-1003",
        name: "Tactile Pro Keyboard",
        price: "89.50",
    },
    ExpectedProduct {
        id: "prod-demo-novel",
        sku: "BOOK-2001",
        name: "The Glass Harbor",
        price: "18.75",
    },
    ExpectedProduct {
        id: "prod-demo-cookbook",
        sku: "BOOK-2002",
        name: "Weeknight Kitchen",
        price: "32.00",
    },
    ExpectedProduct {
        id: "prod-demo-hoodie",
        sku: "APRL-3001",
        name: "Harbor Hoodie",
        price: "54.00",
    },
    ExpectedProduct {
        id: "prod-demo-bottle",
        sku: "HOME-4001",
        name: "Summit Steel Bottle",
        price: "24.95",
    },
    ExpectedProduct {
        id: "prod-demo-lamp",
        sku: "HOME-4002",
        name: "Dimmable Desk Lamp",
        price: "46.20",
    },
    ExpectedProduct {
        id: "prod-demo-poster",
        sku: "HOME-4003",
        name: "Retired Print",
        price: "12.00",
    },
];

const EXPECTED_CATEGORIES: &[&str] = &["electronics", "books", "apparel", "home"];

const EXPECTED_EMAILS: &[&str] = &["admin@storefront.test", "demo@storefront.test"];

#[test]
fn demo_catalog_fixture_covers_the_documented_contract() -> SeedContractTestResult {
    let fixture_sql = DemoSeedDataset::SQL;
    let mut skus_seen = HashSet::new();

    for product in EXPECTED_PRODUCTS {
        require!(
            skus_seen.insert(product.sku),
            "duplicate sku in expected contract: {}",
            product.sku
        );
        require!(
            fixture_sql.contains(&format!("'{}'", product.id)),
            "fixture should seed product id {}",
            product.id
        );
        require!(
            fixture_sql.contains(&format!("'{}'", product.sku)),
            "fixture should seed sku {} for {}",
            product.sku,
            product.id
        );
        require!(
            fixture_sql.contains(&format!("'{}'", product.name)),
            "fixture should seed product name {} for {}",
            product.name,
            product.id
        );
        require!(
            fixture_sql.contains(&format!("'{}'", product.price)),
            "fixture should seed price {} for {}",
            product.price,
            product.id
        );
    }

    for category in EXPECTED_CATEGORIES {
        require!(
            fixture_sql.contains(&format!("'{category}'")),
            "fixture should cover category {category}"
        );
    }

    for email in EXPECTED_EMAILS {
        require!(
            fixture_sql.contains(&format!("'{email}'")),
            "fixture should seed account {email}"
        );
    }

    Ok(())
}

#[test]
fn demo_catalog_fixture_statements_are_all_upserts() -> SeedContractTestResult {
    let fixture_sql = DemoSeedDataset::SQL;

    let insert_count = fixture_sql.matches("INSERT INTO").count();
    let upsert_count = fixture_sql.matches("ON CONFLICT(id) DO UPDATE").count();
    require!(insert_count > 0, "fixture should contain insert statements");
    require_eq!(
        insert_count,
        upsert_count,
        "every fixture insert must carry an upsert clause ({insert_count} inserts, {upsert_count} upserts)"
    );

    Ok(())
}

#[test]
fn demo_catalog_fixture_hashes_use_the_supported_scheme() -> SeedContractTestResult {
    let fixture_sql = DemoSeedDataset::SQL;

    require_eq!(
        fixture_sql.matches("pbkdf2-sha256$50000$").count(),
        EXPECTED_EMAILS.len(),
        "each seeded account needs a pbkdf2-sha256 hash at the default iteration count"
    );

    Ok(())
}
