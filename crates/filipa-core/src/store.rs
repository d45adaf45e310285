//! Open store handle and the collection access layer
//!
//! Every collection is one JSONL file, one record per line, sorted by id.
//! A write rewrites the collection file through a temp file and rename, then
//! commits to memory. If the file write fails the in-memory image is left as
//! it was.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::index::{IndexSpec, SecondaryIndex};
use crate::{Error, Result};

/// A stored record before it is given an entity type
pub type Record = serde_json::Map<String, Value>;

const RECORD_FILE_EXT: &str = "jsonl";

pub(crate) struct Collection {
    records: BTreeMap<String, Record>,
    indexes: BTreeMap<String, SecondaryIndex>,
}

impl Collection {
    pub(crate) fn new(records: BTreeMap<String, Record>, specs: &[IndexSpec]) -> Self {
        let indexes = specs
            .iter()
            .map(|spec| {
                let mut index = SecondaryIndex::new(spec.clone());
                index.rebuild(&records);
                (spec.name.clone(), index)
            })
            .collect();
        Self { records, indexes }
    }

    fn reindex(&mut self, id: &str, old: Option<&Record>, new: Option<&Record>) {
        for index in self.indexes.values_mut() {
            if let Some(old) = old {
                index.remove(id, old);
            }
            if let Some(new) = new {
                index.insert(id, new);
            }
        }
    }
}

/// Open store handle
///
/// Obtained from [`crate::Database::open`]; by the time a `Store` exists
/// its schema is current.
pub struct Store {
    dir: PathBuf,
    version: u32,
    collections: BTreeMap<String, RwLock<Collection>>,
}

impl Store {
    pub(crate) fn new(
        dir: PathBuf,
        version: u32,
        collections: BTreeMap<String, Collection>,
    ) -> Self {
        Self {
            dir,
            version,
            collections: collections
                .into_iter()
                .map(|(name, c)| (name, RwLock::new(c)))
                .collect(),
        }
    }

    /// Directory holding this store's files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Schema version the store was opened at
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Add a record; fails if its id is taken
    pub async fn insert(&self, collection: &str, record: Record) -> Result<()> {
        self.write(collection, record, false).await
    }

    /// Create or replace a record
    pub async fn put(&self, collection: &str, record: Record) -> Result<()> {
        self.write(collection, record, true).await
    }

    /// Upsert many records as one write to the collection
    pub async fn put_many(&self, collection: &str, records: Vec<Record>) -> Result<usize> {
        // last record wins when an id repeats
        let keyed = records
            .into_iter()
            .map(|r| Ok((record_id(collection, &r)?.to_string(), r)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let count = keyed.len();

        let mut state = self.collection(collection)?.write().await;
        let mut next = state.records.clone();
        for (id, record) in &keyed {
            next.insert(id.clone(), record.clone());
        }
        write_records(&self.records_path(collection), &next).await?;

        let previous = std::mem::replace(&mut state.records, next);
        for (id, record) in &keyed {
            let old = previous.get(id);
            state.reindex(id, old, Some(record));
        }
        Ok(count)
    }

    /// Fetch a record by id
    pub async fn get(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        let state = self.collection(collection)?.read().await;
        Ok(state.records.get(id).cloned())
    }

    /// Remove a record; absent ids are ignored
    pub async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut state = self.collection(collection)?.write().await;
        if !state.records.contains_key(id) {
            return Ok(());
        }

        let mut next = state.records.clone();
        let old = next.remove(id);
        write_records(&self.records_path(collection), &next).await?;

        state.records = next;
        state.reindex(id, old.as_ref(), None);
        Ok(())
    }

    /// All records in id order
    pub async fn list(&self, collection: &str) -> Result<Vec<Record>> {
        let state = self.collection(collection)?.read().await;
        Ok(state.records.values().cloned().collect())
    }

    /// Records whose indexed field matches `value`
    pub async fn query_by_index(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> Result<Vec<Record>> {
        let state = self.collection(collection)?.read().await;
        let idx = state
            .indexes
            .get(index)
            .ok_or_else(|| Error::UnknownIndex {
                collection: collection.to_string(),
                index: index.to_string(),
            })?;

        Ok(idx
            .lookup(value)
            .iter()
            .filter_map(|id| state.records.get(id).cloned())
            .collect())
    }

    /// Remove every record in one collection
    pub async fn clear(&self, collection: &str) -> Result<()> {
        let mut state = self.collection(collection)?.write().await;
        if state.records.is_empty() {
            return Ok(());
        }

        write_records(&self.records_path(collection), &BTreeMap::new()).await?;
        state.records.clear();
        for index in state.indexes.values_mut() {
            index.clear();
        }
        Ok(())
    }

    pub async fn count(&self, collection: &str) -> Result<usize> {
        let state = self.collection(collection)?.read().await;
        Ok(state.records.len())
    }

    /// Names of the indexes declared on a collection
    pub async fn index_names(&self, collection: &str) -> Result<Vec<String>> {
        let state = self.collection(collection)?.read().await;
        Ok(state.indexes.keys().cloned().collect())
    }

    async fn write(&self, collection: &str, record: Record, replace: bool) -> Result<()> {
        let id = record_id(collection, &record)?.to_string();
        let mut state = self.collection(collection)?.write().await;

        if !replace && state.records.contains_key(&id) {
            return Err(Error::DuplicateKey {
                collection: collection.to_string(),
                id,
            });
        }

        // memory changes only once the file is written, so a write that is
        // dropped mid-flight leaves records and indexes untouched
        let mut next = state.records.clone();
        let previous = next.insert(id.clone(), record.clone());
        write_records(&self.records_path(collection), &next).await?;

        state.records = next;
        state.reindex(&id, previous.as_ref(), Some(&record));
        Ok(())
    }

    fn collection(&self, name: &str) -> Result<&RwLock<Collection>> {
        self.collections
            .get(name)
            .ok_or_else(|| Error::UnknownCollection(name.to_string()))
    }

    fn records_path(&self, collection: &str) -> PathBuf {
        records_path(&self.dir, collection)
    }
}

pub(crate) fn records_path(dir: &Path, collection: &str) -> PathBuf {
    dir.join(format!("{collection}.{RECORD_FILE_EXT}"))
}

/// The string `id` of a record
pub fn record_id<'a>(collection: &str, record: &'a Record) -> Result<&'a str> {
    record
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::invalid_record(collection, "missing string id"))
}

/// Load a collection file; a missing file is an empty collection
pub(crate) async fn read_records(
    path: &Path,
    collection: &str,
) -> Result<BTreeMap<String, Record>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = BTreeMap::new();
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let Value::Object(record) = serde_json::from_str::<Value>(line)? else {
            return Err(Error::invalid_record(
                collection,
                format!("line {} is not an object", n + 1),
            ));
        };
        let id = record_id(collection, &record)?.to_string();
        records.insert(id, record);
    }
    Ok(records)
}

/// Replace a collection file with the given records
pub(crate) async fn write_records(path: &Path, records: &BTreeMap<String, Record>) -> Result<()> {
    let mut buf = Vec::new();
    for record in records.values() {
        serde_json::to_writer(&mut buf, record)?;
        buf.push(b'\n');
    }
    write_atomic(path, &buf).await
}

pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::schema::collections::{QUESTIONS, SESSIONS, SESSION_QUESTIONS};
    use serde_json::json;
    use tempfile::TempDir;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    async fn open_temp() -> (TempDir, std::sync::Arc<Store>) {
        let dir = TempDir::new().unwrap();
        let store = Database::new(dir.path().join("db")).open().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_then_get_roundtrip() {
        let (_dir, store) = open_temp().await;
        let rec = record(json!({
            "id": "s1",
            "candidateId": "c1",
            "interviewers": ["ann", "bob"],
            "currentQuestionIndex": 2,
            "date": "2024-05-01T10:00:00Z"
        }));

        store.put(SESSIONS, rec.clone()).await.unwrap();
        assert_eq!(store.get(SESSIONS, "s1").await.unwrap(), Some(rec));
        assert_eq!(store.get(SESSIONS, "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_id() {
        let (_dir, store) = open_temp().await;
        let rec = record(json!({"id": "s1", "candidateId": "c1"}));

        store.insert(SESSIONS, rec.clone()).await.unwrap();
        let err = store.insert(SESSIONS, rec).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { ref id, .. } if id == "s1"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, store) = open_temp().await;
        store
            .put(SESSIONS, record(json!({"id": "s1", "candidateId": "c1"})))
            .await
            .unwrap();

        store.delete(SESSIONS, "s1").await.unwrap();
        assert_eq!(store.get(SESSIONS, "s1").await.unwrap(), None);
        store.delete(SESSIONS, "s1").await.unwrap();
        assert!(store
            .query_by_index(SESSIONS, "candidateId", &json!("c1"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_put_replaces_and_reindexes() {
        let (_dir, store) = open_temp().await;
        store
            .put(SESSIONS, record(json!({"id": "s1", "candidateId": "c1"})))
            .await
            .unwrap();
        store
            .put(SESSIONS, record(json!({"id": "s1", "candidateId": "c2"})))
            .await
            .unwrap();

        let by_c1 = store
            .query_by_index(SESSIONS, "candidateId", &json!("c1"))
            .await
            .unwrap();
        let by_c2 = store
            .query_by_index(SESSIONS, "candidateId", &json!("c2"))
            .await
            .unwrap();
        assert!(by_c1.is_empty());
        assert_eq!(by_c2.len(), 1);
    }

    #[tokio::test]
    async fn test_multi_entry_tag_query() {
        let (_dir, store) = open_temp().await;
        store
            .put(QUESTIONS, record(json!({"id": "q1", "tags": ["js", "scope"]})))
            .await
            .unwrap();
        store
            .put(QUESTIONS, record(json!({"id": "q2", "tags": ["rust"]})))
            .await
            .unwrap();

        let js = store
            .query_by_index(QUESTIONS, "tags", &json!("js"))
            .await
            .unwrap();
        assert_eq!(js.len(), 1);
        assert_eq!(js[0]["id"], "q1");
    }

    #[tokio::test]
    async fn test_clear_only_touches_one_collection() {
        let (_dir, store) = open_temp().await;
        store
            .put(SESSIONS, record(json!({"id": "s1", "candidateId": "c1"})))
            .await
            .unwrap();
        store
            .put(SESSION_QUESTIONS, record(json!({"id": "sq1", "sessionId": "s1"})))
            .await
            .unwrap();

        store.clear(SESSIONS).await.unwrap();
        assert_eq!(store.count(SESSIONS).await.unwrap(), 0);
        assert_eq!(store.count(SESSION_QUESTIONS).await.unwrap(), 1);
        assert!(store
            .query_by_index(SESSIONS, "candidateId", &json!("c1"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unknown_collection_and_index() {
        let (_dir, store) = open_temp().await;
        assert!(matches!(
            store.list("nope").await,
            Err(Error::UnknownCollection(_))
        ));
        assert!(matches!(
            store.query_by_index(SESSIONS, "nope", &json!("x")).await,
            Err(Error::UnknownIndex { .. })
        ));
    }

    #[tokio::test]
    async fn test_record_without_id_is_rejected() {
        let (_dir, store) = open_temp().await;
        let err = store
            .put(SESSIONS, record(json!({"candidateId": "c1"})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { .. }));
    }

    #[tokio::test]
    async fn test_writes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("db"));
        let store = db.open().await.unwrap();
        store
            .put(QUESTIONS, record(json!({"id": "q1", "tags": ["js"], "difficulty": []})))
            .await
            .unwrap();
        drop(store);
        db.close().await;

        let store = db.open().await.unwrap();
        assert!(store.get(QUESTIONS, "q1").await.unwrap().is_some());
        let js = store
            .query_by_index(QUESTIONS, "tags", &json!("js"))
            .await
            .unwrap();
        assert_eq!(js.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dropped_put_leaves_memory_consistent() {
        let (_dir, store) = open_temp().await;
        store
            .put(SESSIONS, record(json!({"id": "s0", "candidateId": "c0"})))
            .await
            .unwrap();

        let big = "x".repeat(4 * 1024 * 1024);
        let pending = store.put(
            SESSIONS,
            record(json!({"id": "s1", "candidateId": "c1", "notes": big})),
        );
        let _ = tokio::time::timeout(std::time::Duration::ZERO, pending).await;

        // the record is either fully in (row and index) or not at all
        let row = store.get(SESSIONS, "s1").await.unwrap();
        let hits = store
            .query_by_index(SESSIONS, "candidateId", &json!("c1"))
            .await
            .unwrap();
        assert_eq!(row.is_some(), hits.len() == 1);

        store.delete(SESSIONS, "s0").await.unwrap();
        assert!(store.get(SESSIONS, "s0").await.unwrap().is_none());
        assert!(store
            .query_by_index(SESSIONS, "candidateId", &json!("c0"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_dropped_delete_keeps_record_and_index() {
        let (_dir, store) = open_temp().await;
        let big = "x".repeat(4 * 1024 * 1024);
        store
            .put(SESSIONS, record(json!({"id": "s1", "candidateId": "c1", "notes": big})))
            .await
            .unwrap();

        let pending = store.delete(SESSIONS, "s1");
        let _ = tokio::time::timeout(std::time::Duration::ZERO, pending).await;

        let row = store.get(SESSIONS, "s1").await.unwrap();
        let hits = store
            .query_by_index(SESSIONS, "candidateId", &json!("c1"))
            .await
            .unwrap();
        assert_eq!(row.is_some(), hits.len() == 1);
    }

    #[tokio::test]
    async fn test_put_many_is_one_write() {
        let (_dir, store) = open_temp().await;
        let records = vec![
            record(json!({"id": "s1", "candidateId": "c1"})),
            record(json!({"id": "s2", "candidateId": "c1"})),
        ];
        assert_eq!(store.put_many(SESSIONS, records).await.unwrap(), 2);

        let bad = vec![record(json!({"id": "s3"})), record(json!({"name": "no id"}))];
        assert!(store.put_many(SESSIONS, bad).await.is_err());
        assert_eq!(store.count(SESSIONS).await.unwrap(), 2);
    }
}
