//! Typed access to the stored collections
//!
//! [`Table`] is the generic typed front over the collection access layer.
//! Entity specific behaviour hangs off the [`Entity`] hooks (legacy field
//! normalization on read, derived fields on write) and a few inherent
//! methods per entity for foreign-key lookups.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

use crate::app_config::AppConfig;
use crate::model::{Candidate, Question, QuestionSet, QuestionType, Session, SessionQuestion};
use crate::schema::collections;
use crate::store::Record;
use crate::{Database, Error, Result};

/// A record type stored in its own collection
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;

    /// Adjust a raw record before it is decoded
    fn normalize_record(_record: &mut Record) {}

    /// Refresh derived fields before the entity is written
    fn prepare(&mut self) {}
}

impl Entity for Candidate {
    const COLLECTION: &'static str = collections::CANDIDATES;

    fn id(&self) -> &str {
        &self.id
    }

    /// Older records carry `firstName`/`lastName` instead of `displayName`
    fn normalize_record(record: &mut Record) {
        let has_name = record
            .get("displayName")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());
        if has_name {
            return;
        }

        let joined = ["firstName", "lastName"]
            .iter()
            .filter_map(|k| record.get(*k).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let name = match joined.trim() {
            "" => "Unknown".to_string(),
            name => name.to_string(),
        };
        record.insert("displayName".to_string(), Value::String(name));
    }
}

impl Entity for Session {
    const COLLECTION: &'static str = collections::SESSIONS;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for QuestionSet {
    const COLLECTION: &'static str = collections::QUESTION_SETS;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Question {
    const COLLECTION: &'static str = collections::QUESTIONS;

    fn id(&self) -> &str {
        &self.id
    }

    fn prepare(&mut self) {
        self.rehash();
    }
}

impl Entity for SessionQuestion {
    const COLLECTION: &'static str = collections::SESSION_QUESTIONS;

    fn id(&self) -> &str {
        &self.id
    }
}

pub type CandidateRepo = Table<Candidate>;
pub type SessionRepo = Table<Session>;
pub type QuestionSetRepo = Table<QuestionSet>;
pub type QuestionRepo = Table<Question>;
pub type SessionQuestionRepo = Table<SessionQuestion>;

/// Typed CRUD over one collection
pub struct Table<T> {
    db: Database,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Table<T> {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            _entity: PhantomData,
        }
    }

    /// Store a new entity; fails with `DuplicateKey` if the id is taken
    pub async fn create(&self, mut entity: T) -> Result<T> {
        entity.prepare();
        let record = encode(T::COLLECTION, &entity)?;
        self.db.open().await?.insert(T::COLLECTION, record).await?;
        Ok(entity)
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>> {
        let record = self.db.open().await?.get(T::COLLECTION, id).await?;
        record.map(decode).transpose()
    }

    /// Replace the stored entity (created if absent)
    pub async fn update(&self, mut entity: T) -> Result<T> {
        entity.prepare();
        let record = encode(T::COLLECTION, &entity)?;
        self.db.open().await?.put(T::COLLECTION, record).await?;
        Ok(entity)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.db.open().await?.delete(T::COLLECTION, id).await
    }

    pub async fn list(&self) -> Result<Vec<T>> {
        let records = self.db.open().await?.list(T::COLLECTION).await?;
        records.into_iter().map(decode).collect()
    }

    /// Entities whose `index` field equals (or contains) `value`
    pub async fn query<V: Serialize>(&self, index: &str, value: V) -> Result<Vec<T>> {
        let value = serde_json::to_value(value)?;
        let records = self
            .db
            .open()
            .await?
            .query_by_index(T::COLLECTION, index, &value)
            .await?;
        records.into_iter().map(decode).collect()
    }

    pub async fn clear(&self) -> Result<()> {
        self.db.open().await?.clear(T::COLLECTION).await
    }

    pub async fn count(&self) -> Result<usize> {
        self.db.open().await?.count(T::COLLECTION).await
    }
}

impl Table<Session> {
    pub async fn list_by_candidate(&self, candidate_id: &str) -> Result<Vec<Session>> {
        self.query("candidateId", candidate_id).await
    }
}

impl Table<Question> {
    pub async fn list_by_tag(&self, tag: &str) -> Result<Vec<Question>> {
        self.query("tags", tag).await
    }

    pub async fn list_by_type(&self, question_type: QuestionType) -> Result<Vec<Question>> {
        self.query("questionType", question_type).await
    }

    pub async fn list_by_hash(&self, hash: &str) -> Result<Vec<Question>> {
        self.query("hash", hash).await
    }

    /// Stored questions with the same content hash, excluding `question` itself
    pub async fn find_duplicates(&self, question: &Question) -> Result<Vec<Question>> {
        let mut matches = self.list_by_hash(&question.compute_hash()).await?;
        matches.retain(|q| q.id != question.id);
        Ok(matches)
    }
}

impl Table<SessionQuestion> {
    /// Questions of one session in presentation order
    pub async fn list_by_session(&self, session_id: &str) -> Result<Vec<SessionQuestion>> {
        let mut questions = self.query("sessionId", session_id).await?;
        questions.sort_by_key(|q| q.order);
        Ok(questions)
    }
}

/// Fixed key of the single configuration record
pub const CONFIG_KEY: &str = "app-config";

/// The stored application configuration
#[derive(Clone)]
pub struct ConfigRepo {
    db: Database,
}

impl ConfigRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn read(&self) -> Result<Option<AppConfig>> {
        let record = self
            .db
            .open()
            .await?
            .get(collections::CONFIG, CONFIG_KEY)
            .await?;
        let Some(mut record) = record else {
            return Ok(None);
        };
        record.remove("id");
        Ok(Some(serde_json::from_value(Value::Object(record))?))
    }

    /// Overwrite the stored configuration
    pub async fn save(&self, config: &AppConfig) -> Result<()> {
        let mut record = encode(collections::CONFIG, config)?;
        record.insert("id".to_string(), Value::String(CONFIG_KEY.to_string()));
        self.db.open().await?.put(collections::CONFIG, record).await
    }
}

impl Database {
    pub fn candidates(&self) -> CandidateRepo {
        Table::new(self.clone())
    }

    pub fn sessions(&self) -> SessionRepo {
        Table::new(self.clone())
    }

    pub fn question_sets(&self) -> QuestionSetRepo {
        Table::new(self.clone())
    }

    pub fn questions(&self) -> QuestionRepo {
        Table::new(self.clone())
    }

    pub fn session_questions(&self) -> SessionQuestionRepo {
        Table::new(self.clone())
    }

    pub fn config(&self) -> ConfigRepo {
        ConfigRepo::new(self.clone())
    }
}

fn encode<T: Serialize>(collection: &str, entity: &T) -> Result<Record> {
    match serde_json::to_value(entity)? {
        Value::Object(record) => Ok(record),
        _ => Err(Error::invalid_record(collection, "entity is not an object")),
    }
}

pub(crate) fn decode<T: Entity>(mut record: Record) -> Result<T> {
    T::normalize_record(&mut record);
    Ok(serde_json::from_value(Value::Object(record))?)
}
