//! Fire-and-forget audit trail.
//!
//! Admin catalog edits, stock writes, checkouts, cancellations, and status
//! changes leave a row in `audit_event`. The write must never fail the
//! request it describes; errors are logged and swallowed.

use chrono::Utc;
use tracing::error;
use uuid::Uuid;

use storefront_db::DbPool;

pub async fn record_event(
    pool: &DbPool,
    actor: &str,
    actor_type: &str,
    subject_id: &str,
    event_type: &str,
    event_category: &str,
    detail: &str,
) {
    let audit_id = format!("AUD-{}", &Uuid::new_v4().simple().to_string()[..12]);
    let payload = serde_json::json!({ "detail": detail }).to_string();

    let result = sqlx::query(
        "INSERT INTO audit_event
            (id, timestamp, actor, actor_type, subject_id, event_type, event_category, payload_json)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&audit_id)
    .bind(Utc::now().to_rfc3339())
    .bind(actor)
    .bind(actor_type)
    .bind(subject_id)
    .bind(event_type)
    .bind(event_category)
    .bind(&payload)
    .execute(pool)
    .await;

    if let Err(error) = result {
        error!(
            event_name = "audit.write_failed",
            subject_id = %subject_id,
            event_type = %event_type,
            error = %error,
            "failed to write audit event"
        );
    }
}
