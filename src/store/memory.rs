//! In-memory Document Store
//!
//! Same contract as the SQLite store, kept behind the trait so tests and
//! ephemeral tooling can run without a database file.

use super::{json_cmp, json_lookup, DocumentStore};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Default)]
struct Collection {
    docs: HashMap<String, (Value, u64)>,
    next_seq: u64,
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_newest_first(collection: &Collection) -> Vec<(&Value, u64)> {
        let mut rows: Vec<(&Value, u64)> =
            collection.docs.values().map(|(doc, seq)| (doc, *seq)).collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1));
        rows
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        let mut collections = self.collections.write();
        let entry = collections.entry(collection.to_string()).or_default();
        if entry.docs.contains_key(id) {
            return Err(anyhow!("duplicate id {id} in {collection}"));
        }
        entry.next_seq += 1;
        let seq = entry.next_seq;
        entry.docs.insert(id.to_string(), (doc, seq));
        Ok(())
    }

    async fn upsert(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        let mut collections = self.collections.write();
        let entry = collections.entry(collection.to_string()).or_default();
        entry.next_seq += 1;
        let seq = entry.next_seq;
        // Preserve original insertion order for replaced documents.
        let seq = entry
            .docs
            .get(id)
            .map(|(_, existing)| *existing)
            .unwrap_or(seq);
        entry.docs.insert(id.to_string(), (doc, seq));
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|c| c.docs.get(id))
            .map(|(doc, _)| doc.clone()))
    }

    async fn find_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        limit: usize,
    ) -> Result<Vec<Value>> {
        let collections = self.collections.read();
        let Some(entry) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(Self::sorted_newest_first(entry)
            .into_iter()
            .filter(|(doc, _)| json_lookup(doc, field) == Some(value))
            .take(limit)
            .map(|(doc, _)| doc.clone())
            .collect())
    }

    async fn find_range(
        &self,
        collection: &str,
        field: &str,
        min: &Value,
        max: &Value,
        limit: usize,
    ) -> Result<Vec<Value>> {
        let collections = self.collections.read();
        let Some(entry) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(Self::sorted_newest_first(entry)
            .into_iter()
            .filter(|(doc, _)| match json_lookup(doc, field) {
                Some(v) => {
                    json_cmp(v, min) != Ordering::Less && json_cmp(v, max) != Ordering::Greater
                }
                None => false,
            })
            .take(limit)
            .map(|(doc, _)| doc.clone())
            .collect())
    }

    async fn find_recent(&self, collection: &str, limit: usize) -> Result<Vec<Value>> {
        let collections = self.collections.read();
        let Some(entry) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(Self::sorted_newest_first(entry)
            .into_iter()
            .take(limit)
            .map(|(doc, _)| doc.clone())
            .collect())
    }

    async fn append_to_list(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        item: Value,
    ) -> Result<bool> {
        let mut collections = self.collections.write();
        let Some(entry) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let Some((doc, _)) = entry.docs.get_mut(id) else {
            return Ok(false);
        };
        match doc.get_mut(field) {
            Some(Value::Array(list)) => list.push(item),
            Some(_) => return Err(anyhow!("field {field} is not a list")),
            None => {
                doc[field] = Value::Array(vec![item]);
            }
        }
        Ok(true)
    }

    async fn set_fields(&self, collection: &str, id: &str, fields: Value) -> Result<bool> {
        let object = fields
            .as_object()
            .ok_or_else(|| anyhow!("set_fields expects an object"))?;
        let mut collections = self.collections.write();
        let Some(entry) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let Some((doc, _)) = entry.docs.get_mut(id) else {
            return Ok(false);
        };
        for (key, value) in object {
            doc[key.as_str()] = value.clone();
        }
        Ok(true)
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map(|c| c.docs.len() as u64)
            .unwrap_or(0))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn behaves_like_a_document_store() {
        let s = MemoryDocumentStore::new();
        s.insert("signals", "a", json!({"game_id": "g1", "runs": []}))
            .await
            .unwrap();
        s.insert("signals", "b", json!({"game_id": "g1"})).await.unwrap();
        assert!(s.insert("signals", "a", json!({})).await.is_err());

        let found = s.find_eq("signals", "game_id", &json!("g1"), 10).await.unwrap();
        assert_eq!(found.len(), 2);

        assert!(s
            .append_to_list("signals", "a", "runs", json!({"run": 1}))
            .await
            .unwrap());
        let doc = s.get("signals", "a").await.unwrap().unwrap();
        assert_eq!(doc["runs"].as_array().unwrap().len(), 1);

        s.set_fields("signals", "a", json!({"state": "PUBLISHED"}))
            .await
            .unwrap();
        assert_eq!(
            s.get("signals", "a").await.unwrap().unwrap()["state"],
            "PUBLISHED"
        );
        assert_eq!(s.count("signals").await.unwrap(), 2);
    }
}
