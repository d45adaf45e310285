//! Secondary indexes
//!
//! Each index maps an encoded field value to the set of record ids carrying
//! it. Indexes live in memory, are rebuilt when a store opens, and are
//! updated under the same collection lock as the primary write.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::store::Record;

/// Declared index on a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSpec {
    pub name: String,
    /// Field to index, dotted for nested fields
    pub key_path: String,
    /// Index each element of an array field separately
    #[serde(default)]
    pub multi_entry: bool,
}

impl IndexSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            key_path: name.to_string(),
            multi_entry: false,
        }
    }

    pub fn multi_entry(name: &str) -> Self {
        Self {
            multi_entry: true,
            ..Self::new(name)
        }
    }
}

/// Encode a value as an index key
///
/// Keys are tagged by JSON type so `"1"` and `1` never collide. Null is
/// not indexed.
pub fn index_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(format!("s:{s}")),
        Value::Number(n) => Some(format!("n:{n}")),
        Value::Bool(b) => Some(format!("b:{b}")),
        other => Some(format!("j:{other}")),
    }
}

#[derive(Debug, Clone)]
pub struct SecondaryIndex {
    spec: IndexSpec,
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl SecondaryIndex {
    pub fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            entries: BTreeMap::new(),
        }
    }

    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    /// Rebuild from scratch over `(id, record)` pairs
    pub fn rebuild<'a, I>(&mut self, records: I)
    where
        I: IntoIterator<Item = (&'a String, &'a Record)>,
    {
        self.entries.clear();
        for (id, record) in records {
            self.insert(id, record);
        }
    }

    pub fn insert(&mut self, id: &str, record: &Record) {
        for key in self.keys_for(record) {
            self.entries.entry(key).or_default().insert(id.to_string());
        }
    }

    pub fn remove(&mut self, id: &str, record: &Record) {
        for key in self.keys_for(record) {
            if let Some(ids) = self.entries.get_mut(&key) {
                ids.remove(id);
                if ids.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Ids whose indexed field equals `value` (or contains it, for
    /// multi-entry indexes)
    pub fn lookup(&self, value: &Value) -> Vec<String> {
        index_key(value)
            .and_then(|key| self.entries.get(&key))
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn keys_for(&self, record: &Record) -> BTreeSet<String> {
        let Some(value) = lookup_path(record, &self.spec.key_path) else {
            return BTreeSet::new();
        };

        match value {
            Value::Array(items) if self.spec.multi_entry => {
                items.iter().filter_map(index_key).collect()
            }
            other => index_key(other).into_iter().collect(),
        }
    }
}

fn lookup_path<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_single_value_lookup() {
        let mut index = SecondaryIndex::new(IndexSpec::new("candidateId"));
        index.insert("s1", &record(json!({"id": "s1", "candidateId": "c1"})));
        index.insert("s2", &record(json!({"id": "s2", "candidateId": "c1"})));
        index.insert("s3", &record(json!({"id": "s3", "candidateId": "c2"})));
        index.insert("s4", &record(json!({"id": "s4"})));

        assert_eq!(index.lookup(&json!("c1")), vec!["s1", "s2"]);
        assert_eq!(index.lookup(&json!("c2")), vec!["s3"]);
        assert!(index.lookup(&json!("c3")).is_empty());
        assert!(index.lookup(&Value::Null).is_empty());
    }

    #[test]
    fn test_multi_entry_membership() {
        let mut index = SecondaryIndex::new(IndexSpec::multi_entry("tags"));
        let q = record(json!({"id": "q1", "tags": ["js", "scope", "js"]}));
        index.insert("q1", &q);

        assert_eq!(index.lookup(&json!("js")), vec!["q1"]);
        assert_eq!(index.lookup(&json!("scope")), vec!["q1"]);

        index.remove("q1", &q);
        assert!(index.lookup(&json!("js")).is_empty());
    }

    #[test]
    fn test_keys_are_type_tagged() {
        let mut index = SecondaryIndex::new(IndexSpec::new("order"));
        index.insert("a", &record(json!({"order": 1})));
        index.insert("b", &record(json!({"order": "1"})));

        assert_eq!(index.lookup(&json!(1)), vec!["a"]);
        assert_eq!(index.lookup(&json!("1")), vec!["b"]);
    }

    #[test]
    fn test_nested_key_path() {
        let spec = IndexSpec {
            name: "questionHash".into(),
            key_path: "questionObj.hash".into(),
            multi_entry: false,
        };
        let mut index = SecondaryIndex::new(spec);
        index.insert("sq1", &record(json!({"questionObj": {"hash": "abc"}})));
        assert_eq!(index.lookup(&json!("abc")), vec!["sq1"]);
    }
}
