use serde::Serialize;
use storefront_core::config::{AppConfig, LoadOptions};
use storefront_db::{connect, migrations, DbPool};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.extend(database_checks(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(skipped(
                "database_connectivity",
                "skipped because configuration did not load",
            ));
            checks.push(skipped("migrations_current", "skipped because configuration did not load"));
            checks.push(skipped("write_round_trip", "skipped because configuration did not load"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn database_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                },
                skipped("migrations_current", "skipped because the database was not reachable"),
                skipped("write_round_trip", "skipped because the database was not reachable"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    skipped("migrations_current", "skipped because the database was not reachable"),
                    skipped("write_round_trip", "skipped because the database was not reachable"),
                ];
            }
        };

        let mut checks = vec![DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        }];
        checks.push(check_migrations_current(&pool).await);
        checks.push(check_write_round_trip(&pool).await);

        pool.close().await;
        checks
    })
}

async fn check_migrations_current(pool: &DbPool) -> DoctorCheck {
    let known_versions: Vec<i64> = migrations::MIGRATOR
        .iter()
        .filter(|migration| !migration.migration_type.is_down_migration())
        .map(|migration| migration.version)
        .collect();

    // A missing ledger table reads as nothing applied.
    let applied_versions: Vec<i64> =
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations ORDER BY version")
            .fetch_all(pool)
            .await
            .unwrap_or_default();

    let pending =
        known_versions.iter().filter(|version| !applied_versions.contains(version)).count();

    if pending == 0 {
        DoctorCheck {
            name: "migrations_current",
            status: CheckStatus::Pass,
            details: "no pending migrations".to_string(),
        }
    } else {
        DoctorCheck {
            name: "migrations_current",
            status: CheckStatus::Fail,
            details: format!("pending migrations: {pending}; run `storefront migrate`"),
        }
    }
}

async fn check_write_round_trip(pool: &DbPool) -> DoctorCheck {
    match write_probe(pool).await {
        Ok(()) => DoctorCheck {
            name: "write_round_trip",
            status: CheckStatus::Pass,
            details: "audit probe row written and rolled back".to_string(),
        },
        Err(details) => {
            DoctorCheck { name: "write_round_trip", status: CheckStatus::Fail, details }
        }
    }
}

async fn write_probe(pool: &DbPool) -> Result<(), String> {
    let mut tx =
        pool.begin().await.map_err(|error| format!("failed to open transaction: {error}"))?;

    sqlx::query(
        "INSERT INTO audit_event (id, timestamp, actor, actor_type, event_type, event_category)
         VALUES ('AUD-doctor-probe', strftime('%Y-%m-%dT%H:%M:%SZ', 'now'),
                 'doctor', 'system', 'system.write_probe', 'system')",
    )
    .execute(&mut *tx)
    .await
    .map_err(|error| format!("probe insert failed: {error}"))?;

    tx.rollback().await.map_err(|error| format!("probe rollback failed: {error}"))?;
    Ok(())
}

fn skipped(name: &'static str, details: &str) -> DoctorCheck {
    DoctorCheck { name, status: CheckStatus::Skipped, details: details.to_string() }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
