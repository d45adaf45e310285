//! Schema declaration, versioning and forward migration
//!
//! A store directory holds `meta.json` (schema version plus the index
//! declarations of every collection) next to one JSONL file per collection.
//! Opening a store:
//!
//! 1. reads `meta.json` (absent means version 0, a brand new store)
//! 2. refuses stores written by a newer build ([`MigrationError::VersionConflict`])
//! 3. creates any declared collection that does not exist yet, with its
//!    full index set
//! 4. runs every migration newer than the persisted version, in order
//! 5. runs the question repair sweep
//! 6. writes changed collections, then raises the persisted version
//!
//! Migrations work on untyped records so they can see legacy fields that the
//! typed model no longer has.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::MigrationError;
use crate::index::IndexSpec;
use crate::store::{self, Collection, Record, Store};
use crate::{Error, Result};

/// Schema version this build writes
pub const SCHEMA_VERSION: u32 = 3;

const META_FILE: &str = "meta.json";

pub mod collections {
    pub const CANDIDATES: &str = "candidates";
    pub const SESSIONS: &str = "sessions";
    pub const QUESTION_SETS: &str = "questionSets";
    pub const QUESTIONS: &str = "questions";
    pub const SESSION_QUESTIONS: &str = "sessionQuestions";
    pub const CONFIG: &str = "config";

    /// Every collection the current schema declares
    pub const ALL: [&str; 6] = [
        CANDIDATES,
        SESSIONS,
        QUESTION_SETS,
        QUESTIONS,
        SESSION_QUESTIONS,
        CONFIG,
    ];

    /// Collections that count as user content when deciding whether to seed
    pub const CONTENT: [&str; 4] = [CANDIDATES, QUESTIONS, QUESTION_SETS, SESSIONS];
}

use collections::{CANDIDATES, QUESTION_SETS, QUESTIONS, SESSIONS, SESSION_QUESTIONS};

/// Indexes a collection gets when it is created
pub fn declared_indexes(collection: &str) -> Vec<IndexSpec> {
    match collection {
        CANDIDATES => vec![IndexSpec::new("createdAt"), IndexSpec::new("displayName")],
        SESSIONS => vec![IndexSpec::new("candidateId"), IndexSpec::new("date")],
        QUESTION_SETS => vec![IndexSpec::new("name")],
        QUESTIONS => vec![
            IndexSpec::multi_entry("tags"),
            IndexSpec::new("questionType"),
            IndexSpec::new("hash"),
        ],
        SESSION_QUESTIONS => vec![IndexSpec::new("sessionId"), IndexSpec::new("order")],
        _ => Vec::new(),
    }
}

/// Contents of `meta.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub version: u32,
    #[serde(default)]
    pub collections: BTreeMap<String, Vec<IndexSpec>>,
}

impl Meta {
    pub async fn load(dir: &Path) -> Result<Option<Self>> {
        match tokio::fs::read_to_string(dir.join(META_FILE)).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, dir: &Path) -> Result<()> {
        let mut content = serde_json::to_vec_pretty(self)?;
        content.push(b'\n');
        store::write_atomic(&dir.join(META_FILE), &content).await
    }
}

/// Everything a migration may read or change
#[derive(Debug, Default)]
pub struct SchemaState {
    pub meta: Meta,
    pub records: BTreeMap<String, BTreeMap<String, Record>>,
    /// Collections whose records changed and must be written back
    pub dirty: BTreeSet<String>,
}

impl SchemaState {
    /// Mutable access to every record of a collection
    pub fn records_mut(&mut self, collection: &str) -> impl Iterator<Item = &mut Record> {
        self.records
            .get_mut(collection)
            .into_iter()
            .flat_map(|records| records.values_mut())
    }

    pub fn mark_dirty(&mut self, collection: &str) {
        self.dirty.insert(collection.to_string());
    }

    /// Add an index declaration unless one with that name exists
    pub fn ensure_index(&mut self, collection: &str, spec: IndexSpec) -> bool {
        let Some(specs) = self.meta.collections.get_mut(collection) else {
            return false;
        };
        if specs.iter().any(|s| s.name == spec.name) {
            return false;
        }
        specs.push(spec);
        true
    }

    /// Create declared collections that are missing
    pub fn ensure_collections(&mut self) -> Vec<&'static str> {
        let mut created = Vec::new();
        for name in collections::ALL {
            if self.meta.collections.contains_key(name) {
                continue;
            }
            self.meta
                .collections
                .insert(name.to_string(), declared_indexes(name));
            self.records.entry(name.to_string()).or_default();
            self.mark_dirty(name);
            created.push(name);
        }
        created
    }
}

/// A versioned, forward-only schema step
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    up: fn(&mut SchemaState) -> std::result::Result<(), String>,
}

/// Declared migrations, ascending by version
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 2,
        name: "add_question_hash_index",
        up: add_question_hash_index,
    },
    Migration {
        version: 3,
        name: "rename_rating_to_difficulty",
        up: rename_rating_to_difficulty,
    },
];

fn add_question_hash_index(state: &mut SchemaState) -> std::result::Result<(), String> {
    state.ensure_index(QUESTIONS, IndexSpec::new("hash"));
    Ok(())
}

fn rename_rating_to_difficulty(state: &mut SchemaState) -> std::result::Result<(), String> {
    let mut changed = false;
    for question in state.records_mut(QUESTIONS) {
        if let Some(rating) = question.remove("rating") {
            question.insert("difficulty".to_string(), rating);
            changed = true;
        }
    }
    if changed {
        state.mark_dirty(QUESTIONS);
    }
    Ok(())
}

/// Run every migration newer than `from`, returning the versions applied
pub fn run_migrations(
    state: &mut SchemaState,
    from: u32,
) -> std::result::Result<Vec<u32>, MigrationError> {
    apply_steps(MIGRATIONS, state, from)
}

fn apply_steps(
    steps: &[Migration],
    state: &mut SchemaState,
    from: u32,
) -> std::result::Result<Vec<u32>, MigrationError> {
    let mut applied = Vec::new();
    for migration in steps.iter().filter(|m| m.version > from) {
        (migration.up)(state).map_err(|reason| MigrationError::Step {
            version: migration.version,
            name: migration.name,
            reason,
        })?;
        tracing::info!(version = migration.version, name = migration.name, "applied migration");
        applied.push(migration.version);
    }
    Ok(applied)
}

/// Give every question a `difficulty` array and no `rating`
///
/// Runs on every open. Records written by another build between versions can
/// still carry `rating` or lack both fields; versioned steps never revisit
/// them. Returns the number of questions changed.
pub fn repair_questions(state: &mut SchemaState) -> usize {
    let repaired = state
        .records_mut(QUESTIONS)
        .map(repair_question)
        .filter(|changed| *changed)
        .count();
    if repaired > 0 {
        state.mark_dirty(QUESTIONS);
        tracing::info!(repaired, "repaired questions without difficulty");
    }
    repaired
}

/// Move a legacy `rating` into `difficulty`, or add an empty one
///
/// A stale rating next to difficulty is dropped. Returns whether the record
/// changed.
pub(crate) fn repair_question(question: &mut Record) -> bool {
    let rating = question.remove("rating");
    if question.contains_key("difficulty") {
        return rating.is_some();
    }
    let value = rating.unwrap_or_else(|| Value::Array(Vec::new()));
    question.insert("difficulty".to_string(), value);
    true
}

/// Open (creating if needed) and upgrade the store at `dir`
pub(crate) async fn open(dir: &Path) -> Result<Store> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::open(dir, e))?;

    let meta = Meta::load(dir)
        .await
        .map_err(|e| Error::open(dir, e))?
        .unwrap_or_default();
    let persisted = meta.version;

    if persisted > SCHEMA_VERSION {
        return Err(MigrationError::VersionConflict {
            found: persisted,
            expected: SCHEMA_VERSION,
        }
        .into());
    }

    let mut state = SchemaState {
        meta,
        ..SchemaState::default()
    };
    // declared collections are read even when meta.json does not list them,
    // a lost or older meta must not hide records already on disk
    let names: BTreeSet<String> = state
        .meta
        .collections
        .keys()
        .cloned()
        .chain(collections::ALL.iter().map(|name| name.to_string()))
        .collect();
    for name in names {
        let records = store::read_records(&store::records_path(dir, &name), &name)
            .await
            .map_err(|e| Error::open(dir, e))?;
        state.records.insert(name, records);
    }

    let created = state.ensure_collections();
    if !created.is_empty() {
        tracing::debug!(?created, "created collections");
    }

    run_migrations(&mut state, persisted)?;
    repair_questions(&mut state);

    for name in &state.dirty {
        if let Some(records) = state.records.get(name) {
            store::write_records(&store::records_path(dir, name), records).await?;
        }
    }

    state.meta.version = SCHEMA_VERSION;
    state.meta.save(dir).await?;

    if persisted != SCHEMA_VERSION {
        tracing::info!(
            from = persisted,
            to = SCHEMA_VERSION,
            dir = %dir.display(),
            "upgraded store schema"
        );
    }

    let SchemaState { meta, mut records, .. } = state;
    let collections = meta
        .collections
        .iter()
        .map(|(name, specs)| {
            let data = records.remove(name).unwrap_or_default();
            (name.clone(), Collection::new(data, specs))
        })
        .collect();

    Ok(Store::new(dir.to_path_buf(), SCHEMA_VERSION, collections))
}
