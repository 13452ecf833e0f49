use crate::commands::CommandResult;
use storefront_core::config::{AppConfig, LoadOptions};
use storefront_db::{connect, migrations, DemoSeedDataset, ProductSeedInfo};

pub fn run(force: bool) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        // The guard keeps a stray `seed` from mixing demo rows into a live
        // database; `--force` is the explicit opt-out.
        let product_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM product")
            .fetch_one(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let account_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM shop_user")
            .fetch_one(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let run_result: Result<SeedOutput, (&'static str, String, u8)> =
            if !force && (product_count > 0 || account_count > 0) {
                Err((
                    "seed_guard",
                    format!(
                        "database already holds {product_count} products and {account_count} accounts; pass --force to load the demo fixtures anyway"
                    ),
                    6u8,
                ))
            } else {
                load_and_verify(&pool).await
            };

        pool.close().await;
        run_result
    });

    match result {
        Ok(output) => {
            let product_lines: Vec<String> = output
                .products
                .iter()
                .map(|product| {
                    format!("  - {}: {} ({})", product.product_id, product.sku, product.name)
                })
                .collect();
            let message = format!(
                "demo dataset loaded: {} products and {} accounts:\n{}",
                output.products.len(),
                output.accounts,
                product_lines.join("\n")
            );
            CommandResult::success("seed", message)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

async fn load_and_verify(
    pool: &storefront_db::DbPool,
) -> Result<SeedOutput, (&'static str, String, u8)> {
    let seed_result = DemoSeedDataset::load(pool)
        .await
        .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

    let verification = DemoSeedDataset::verify(pool)
        .await
        .map_err(|error| ("seed_verification", error.to_string(), 7u8))?;

    if !verification.all_present {
        let failed_checks = verification
            .checks
            .iter()
            .filter_map(|(check, passed)| (!passed).then_some(*check))
            .collect::<Vec<_>>();
        let message = if failed_checks.is_empty() {
            "some fixture rows failed to load".to_string()
        } else {
            format!("fixture verification failed for checks: {}", failed_checks.join(", "))
        };
        return Err(("seed_verification", message, 7u8));
    }

    Ok(SeedOutput {
        accounts: seed_result.accounts_seeded,
        products: seed_result.products_seeded,
    })
}

struct SeedOutput {
    products: Vec<ProductSeedInfo>,
    accounts: usize,
}

#[cfg(test)]
mod tests {
    #[test]
    fn verification_error_message_targets_failed_checks() {
        let checks =
            [("catalog-products", true), ("prod-demo-lamp", false), ("admin-credentials", false)];

        let failed_checks = checks
            .iter()
            .filter_map(|(check, passed)| (!passed).then_some(*check))
            .collect::<Vec<_>>();

        let message = if failed_checks.is_empty() {
            "some fixture rows failed to load".to_string()
        } else {
            format!("fixture verification failed for checks: {}", failed_checks.join(", "))
        };

        assert_eq!(
            message,
            "fixture verification failed for checks: prod-demo-lamp, admin-credentials"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        let checks = [("catalog-products", true), ("customer-credentials", true)];

        let failed_checks = checks
            .iter()
            .filter_map(|(check, passed)| (!passed).then_some(*check))
            .collect::<Vec<_>>();
        let message = if failed_checks.is_empty() {
            "some fixture rows failed to load".to_string()
        } else {
            format!("fixture verification failed for checks: {}", failed_checks.join(", "))
        };

        assert_eq!(message, "some fixture rows failed to load");
    }
}
