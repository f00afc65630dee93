//! SQLite-backed Document Store
//!
//! One table per collection, JSON documents, `json_extract` expression
//! indexes for the query paths the engine needs.
//!
//! Key choices:
//! - WAL mode for concurrent reads during writes
//! - Single connection guarded by parking_lot::Mutex (short critical
//!   sections, no await while held)
//! - List appends use the `$.field[#]` JSON path so they are a single
//!   atomic UPDATE

use super::{DocumentStore, INDEXED_FIELDS};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

const PRAGMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -32000;
PRAGMA temp_store = MEMORY;
"#;

pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
    known_collections: Mutex<HashSet<String>>,
}

impl SqliteDocumentStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .with_context(|| format!("open document store at {:?}", path.as_ref()))?;
        conn.execute_batch(PRAGMA_SQL).context("apply pragmas")?;

        let store = Self {
            conn: Mutex::new(conn),
            known_collections: Mutex::new(HashSet::new()),
        };
        store.ensure_indexes()?;
        info!("📦 Document store open at {:?}", path.as_ref());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory store")?;
        let store = Self {
            conn: Mutex::new(conn),
            known_collections: Mutex::new(HashSet::new()),
        };
        store.ensure_indexes()?;
        Ok(store)
    }

    /// Create every collection that carries a declared index up front.
    fn ensure_indexes(&self) -> Result<()> {
        for (collection, _, _) in INDEXED_FIELDS {
            self.ensure_collection(collection)?;
        }
        Ok(())
    }

    fn ensure_collection(&self, collection: &str) -> Result<()> {
        validate_name(collection)?;
        {
            let known = self.known_collections.lock();
            if known.contains(collection) {
                return Ok(());
            }
        }

        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {collection} (
                    id TEXT PRIMARY KEY,
                    doc TEXT NOT NULL,
                    seq INTEGER NOT NULL
                )"
            ),
            [],
        )?;
        conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS idx_{collection}_seq ON {collection}(seq DESC)"),
            [],
        )?;
        for (c, field, unique) in INDEXED_FIELDS {
            if *c != collection {
                continue;
            }
            let uniq = if *unique { "UNIQUE " } else { "" };
            let idx_name = format!("idx_{}_{}", collection, field.replace('.', "_"));
            conn.execute(
                &format!(
                    "CREATE {uniq}INDEX IF NOT EXISTS {idx_name}
                     ON {collection}(json_extract(doc, '$.{field}'))"
                ),
                [],
            )?;
        }
        debug!(collection, "collection ready");

        self.known_collections.lock().insert(collection.to_string());
        Ok(())
    }

    fn next_seq(conn: &Connection, collection: &str) -> Result<i64> {
        let seq: i64 = conn.query_row(
            &format!("SELECT COALESCE(MAX(seq), 0) + 1 FROM {collection}"),
            [],
            |row| row.get(0),
        )?;
        Ok(seq)
    }

    fn rows_to_docs(rows: Vec<String>) -> Result<Vec<Value>> {
        rows.into_iter()
            .map(|raw| serde_json::from_str(&raw).context("decode stored document"))
            .collect()
    }
}

/// Collection and field names are interpolated into SQL; restrict them to
/// identifier characters.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return Err(anyhow!("invalid collection or field name: {name}"));
    }
    Ok(())
}

fn bind_value(value: &Value) -> Result<rusqlite::types::Value> {
    use rusqlite::types::Value as Sv;
    Ok(match value {
        Value::String(s) => Sv::Text(s.clone()),
        Value::Bool(b) => Sv::Integer(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Sv::Integer(i)
            } else {
                Sv::Real(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::Null => Sv::Null,
        other => return Err(anyhow!("unsupported query value: {other}")),
    })
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        self.ensure_collection(collection)?;
        let conn = self.conn.lock();
        let seq = Self::next_seq(&conn, collection)?;
        let inserted = conn.execute(
            &format!("INSERT OR IGNORE INTO {collection} (id, doc, seq) VALUES (?1, ?2, ?3)"),
            params![id, doc.to_string(), seq],
        )?;
        if inserted == 0 {
            return Err(anyhow!("duplicate id {id} in {collection}"));
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        self.ensure_collection(collection)?;
        let conn = self.conn.lock();
        let seq = Self::next_seq(&conn, collection)?;
        conn.execute(
            &format!(
                "INSERT INTO {collection} (id, doc, seq) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET doc = excluded.doc"
            ),
            params![id, doc.to_string(), seq],
        )?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        self.ensure_collection(collection)?;
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                &format!("SELECT doc FROM {collection} WHERE id = ?1"),
                params![id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        raw.map(|r| serde_json::from_str(&r).context("decode stored document"))
            .transpose()
    }

    async fn find_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        limit: usize,
    ) -> Result<Vec<Value>> {
        self.ensure_collection(collection)?;
        validate_name(field)?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT doc FROM {collection}
             WHERE json_extract(doc, '$.{field}') = ?1
             ORDER BY seq DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![bind_value(value)?, limit as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::rows_to_docs(rows)
    }

    async fn find_range(
        &self,
        collection: &str,
        field: &str,
        min: &Value,
        max: &Value,
        limit: usize,
    ) -> Result<Vec<Value>> {
        self.ensure_collection(collection)?;
        validate_name(field)?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT doc FROM {collection}
             WHERE json_extract(doc, '$.{field}') >= ?1
               AND json_extract(doc, '$.{field}') <= ?2
             ORDER BY seq DESC LIMIT ?3"
        ))?;
        let rows = stmt
            .query_map(
                params![bind_value(min)?, bind_value(max)?, limit as i64],
                |row| row.get::<_, String>(0),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::rows_to_docs(rows)
    }

    async fn find_recent(&self, collection: &str, limit: usize) -> Result<Vec<Value>> {
        self.ensure_collection(collection)?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT doc FROM {collection} ORDER BY seq DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::rows_to_docs(rows)
    }

    async fn append_to_list(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        item: Value,
    ) -> Result<bool> {
        self.ensure_collection(collection)?;
        validate_name(field)?;
        let conn = self.conn.lock();
        let updated = conn.execute(
            &format!(
                "UPDATE {collection}
                 SET doc = json_set(doc, '$.{field}[#]', json(?2))
                 WHERE id = ?1"
            ),
            params![id, item.to_string()],
        )?;
        Ok(updated > 0)
    }

    async fn set_fields(&self, collection: &str, id: &str, fields: Value) -> Result<bool> {
        self.ensure_collection(collection)?;
        if !fields.is_object() {
            return Err(anyhow!("set_fields expects an object"));
        }
        let conn = self.conn.lock();
        // json_patch gives $set semantics for top-level fields in a single
        // atomic UPDATE; null values clear the field.
        let updated = conn.execute(
            &format!(
                "UPDATE {collection}
                 SET doc = json_patch(doc, json(?2))
                 WHERE id = ?1"
            ),
            params![id, fields.to_string()],
        )?;
        Ok(updated > 0)
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        self.ensure_collection(collection)?;
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {collection}"), [], |row| {
                row.get(0)
            })?;
        Ok(count as u64)
    }

    async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}
