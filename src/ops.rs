//! Ops Alerts
//!
//! Machine-readable operational alerts persisted for the on-call surface.
//! The core raises them; presentation belongs to external collaborators.

use crate::store::{collections, SharedStore};
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

pub const ALERT_MAPPING_DRIFT: &str = "MAPPING_DRIFT";
pub const ALERT_QUOTA_EXHAUSTED: &str = "ODDS_QUOTA_EXHAUSTED";

pub async fn record_ops_alert(
    store: &SharedStore,
    alert_type: &str,
    details: Value,
) -> Result<String> {
    let alert_id = format!("ops_{}", &Uuid::new_v4().simple().to_string()[..12]);
    warn!(alert_type, alert_id, "🚨 ops alert");
    store
        .insert(
            collections::OPS_ALERTS,
            &alert_id,
            json!({
                "alert_id": alert_id,
                "alert_type": alert_type,
                "details": details,
                "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
                "acknowledged": false,
            }),
        )
        .await?;
    Ok(alert_id)
}
