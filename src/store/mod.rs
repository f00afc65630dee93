//! Document Store Adapter
//!
//! Named collections of JSON documents with indexed queries and atomic
//! upserts. The SQLite implementation is the authoritative store; the
//! in-memory implementation backs unit tests and local tooling.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Collection names used by the decision engine.
pub mod collections {
    pub const EVENTS: &str = "events";
    pub const SIGNALS: &str = "signals";
    pub const MARKET_SNAPSHOTS: &str = "market_snapshots";
    pub const SIMULATION_RUNS: &str = "monte_carlo_simulations";
    pub const SIGNAL_DELTAS: &str = "signal_deltas";
    pub const SIGNAL_EVENTS: &str = "signal_events";
    pub const PARLAY_AUDIT: &str = "parlay_generation_audit";
    pub const GRADING_RECORDS: &str = "grading_records";
    pub const OPS_ALERTS: &str = "ops_alerts";
    pub const RISK_ALERTS: &str = "risk_alerts";
    pub const USERS: &str = "users";
}

/// Fields that must be queryable without a full scan.
/// (collection, json field path, unique)
pub const INDEXED_FIELDS: &[(&str, &str, bool)] = &[
    (collections::EVENTS, "event_id", true),
    (collections::EVENTS, "commence_time", false),
    (collections::SIGNALS, "game_id", false),
    (collections::SIGNALS, "market_key", false),
    (collections::SIGNALS, "created_at", false),
    (collections::SIGNALS, "state", false),
    (collections::MARKET_SNAPSHOTS, "snapshot_hash", false),
    (collections::MARKET_SNAPSHOTS, "game_id", false),
    (collections::SIMULATION_RUNS, "event_id", false),
    (collections::SIMULATION_RUNS, "created_at", false),
    (collections::PARLAY_AUDIT, "timestamp", false),
    (collections::OPS_ALERTS, "timestamp", false),
    (collections::RISK_ALERTS, "user_id", false),
    (collections::GRADING_RECORDS, "grading_idempotency_key", true),
    (collections::USERS, "user_id", true),
];

/// Abstract document store: named collections, JSON documents keyed by id.
///
/// All operations may suspend; callers must treat them as potentially slow.
/// Writes are upserts by primary key; list fields inside a document are
/// updated by atomic append.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document. Fails if the id already exists.
    async fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<()>;

    /// Insert or fully replace the document with this id.
    async fn upsert(&self, collection: &str, id: &str, doc: Value) -> Result<()>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Equality query on an indexed field, newest first.
    async fn find_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        limit: usize,
    ) -> Result<Vec<Value>>;

    /// Inclusive range query on an indexed field (ISO-8601 strings compare
    /// lexicographically), newest first.
    async fn find_range(
        &self,
        collection: &str,
        field: &str,
        min: &Value,
        max: &Value,
        limit: usize,
    ) -> Result<Vec<Value>>;

    /// Most recently inserted documents.
    async fn find_recent(&self, collection: &str, limit: usize) -> Result<Vec<Value>>;

    /// Atomically append `item` to the array at `field` inside the document.
    /// Returns false if the document does not exist.
    async fn append_to_list(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        item: Value,
    ) -> Result<bool>;

    /// Atomically set the given top-level fields ($set semantics).
    /// Returns false if the document does not exist.
    async fn set_fields(&self, collection: &str, id: &str, fields: Value) -> Result<bool>;

    async fn count(&self, collection: &str) -> Result<u64>;

    /// Liveness probe ("ping" command).
    async fn ping(&self) -> Result<()>;
}

pub type SharedStore = Arc<dyn DocumentStore>;

/// Resolve a dotted JSON path against a document.
pub fn json_lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

/// Ordering-aware comparison of two JSON scalars (numbers numerically,
/// strings lexicographically). Non-comparable kinds sort as equal.
pub fn json_cmp(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_resolves_nested_paths() {
        let doc = json!({"spread": {"line": -5.5}, "game_id": "g1"});
        assert_eq!(json_lookup(&doc, "game_id"), Some(&json!("g1")));
        assert_eq!(json_lookup(&doc, "spread.line"), Some(&json!(-5.5)));
        assert_eq!(json_lookup(&doc, "spread.missing"), None);
    }

    #[test]
    fn cmp_orders_numbers_and_strings() {
        assert_eq!(
            json_cmp(&json!(1.5), &json!(2)),
            std::cmp::Ordering::Less
        );
        assert_eq!(
            json_cmp(&json!("2025-01-02"), &json!("2025-01-01")),
            std::cmp::Ordering::Greater
        );
    }
}
