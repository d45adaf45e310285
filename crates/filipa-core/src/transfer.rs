//! Bulk export and import
//!
//! A [`Snapshot`] is the whole store as `{collection: [records]}`, the same
//! JSON shape the app writes for backups. Imports upsert record by record
//! and never delete, so importing into a populated store merges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Candidate, Question, QuestionSet, Session, SessionQuestion};
use crate::schema::{collections, repair_question};
use crate::store::Record;
use crate::{Database, Result};

/// Every collection's records keyed by collection name
pub type Snapshot = BTreeMap<String, Vec<Record>>;

/// Part of a snapshot that was skipped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportWarning {
    pub collection: String,
    pub message: String,
}

/// Outcome of [`Database::import_merge`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    /// Records written per collection
    pub imported: BTreeMap<String, usize>,
    pub warnings: Vec<ImportWarning>,
}

impl ImportReport {
    pub fn total(&self) -> usize {
        self.imported.values().sum()
    }
}

/// One candidate with their full interview history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateExport {
    pub candidate: Candidate,
    pub sessions: Vec<Session>,
    pub session_questions: Vec<SessionQuestion>,
    pub exported_at: DateTime<Utc>,
    pub version: String,
}

/// Shareable bundle of question sets and the questions they reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSetExport {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub question_sets: Vec<QuestionSet>,
    pub questions: Vec<Question>,
}

const QUESTION_SETS_KIND: &str = "questionSets";
const FORMAT_VERSION: &str = env!("CARGO_PKG_VERSION");

impl Database {
    /// Dump every collection
    pub async fn export_all(&self) -> Result<Snapshot> {
        let store = self.open().await?;
        let names: Vec<String> = store.collection_names().map(str::to_string).collect();

        let mut snapshot = Snapshot::new();
        for name in names {
            let records = store.list(&name).await?;
            snapshot.insert(name, records);
        }
        Ok(snapshot)
    }

    /// Upsert every record of every known collection in `snapshot`
    ///
    /// Collections this build does not know are skipped with a warning.
    /// Questions get the same `rating` to `difficulty` repair as at open.
    /// A record without an id fails the import of its collection; earlier
    /// collections stay written.
    pub async fn import_merge(&self, snapshot: Snapshot) -> Result<ImportReport> {
        let store = self.open().await?;
        let mut report = ImportReport::default();

        for (collection, mut records) in snapshot {
            if !store.has_collection(&collection) {
                tracing::warn!(
                    %collection,
                    records = records.len(),
                    "skipping unknown collection"
                );
                report.warnings.push(ImportWarning {
                    message: format!("unknown collection, {} records skipped", records.len()),
                    collection,
                });
                continue;
            }

            if collection == collections::QUESTIONS {
                // snapshots from older clients still carry `rating`
                let repaired = records
                    .iter_mut()
                    .map(repair_question)
                    .filter(|changed| *changed)
                    .count();
                if repaired > 0 {
                    tracing::debug!(repaired, "repaired imported questions");
                }
            }

            let count = store.put_many(&collection, records).await?;
            tracing::debug!(%collection, count, "imported records");
            report.imported.insert(collection, count);
        }

        tracing::info!(records = report.total(), "import finished");
        Ok(report)
    }

    /// True when there are no candidates, sessions, questions or question sets
    ///
    /// Session questions and the config record do not count.
    pub async fn is_empty(&self) -> Result<bool> {
        let store = self.open().await?;
        for collection in collections::CONTENT {
            if store.count(collection).await? > 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Delete all interview data, keeping the configuration
    pub async fn clear_all(&self) -> Result<()> {
        let store = self.open().await?;
        for collection in collections::ALL {
            if collection != collections::CONFIG {
                store.clear(collection).await?;
            }
        }
        tracing::info!("cleared all collections except config");
        Ok(())
    }

    /// Import `snapshot` only into an empty store
    ///
    /// Returns `None` when the store already had data.
    pub async fn seed_if_empty(&self, snapshot: Snapshot) -> Result<Option<ImportReport>> {
        if !self.is_empty().await? {
            tracing::debug!("store has data, not seeding");
            return Ok(None);
        }
        self.import_merge(snapshot).await.map(Some)
    }

    /// A candidate with their sessions and asked questions
    pub async fn export_candidate(&self, candidate_id: &str) -> Result<Option<CandidateExport>> {
        let Some(candidate) = self.candidates().get(candidate_id).await? else {
            return Ok(None);
        };

        let sessions = self.sessions().list_by_candidate(candidate_id).await?;
        let mut session_questions = Vec::new();
        for session in &sessions {
            session_questions.extend(self.session_questions().list_by_session(&session.id).await?);
        }

        Ok(Some(CandidateExport {
            candidate,
            sessions,
            session_questions,
            exported_at: Utc::now(),
            version: FORMAT_VERSION.to_string(),
        }))
    }

    /// Question sets by id, or all of them when `ids` is empty
    ///
    /// Unknown ids are ignored, as are question ids that no longer resolve.
    pub async fn export_question_sets(&self, ids: &[String]) -> Result<QuestionSetExport> {
        let sets = if ids.is_empty() {
            self.question_sets().list().await?
        } else {
            let repo = self.question_sets();
            let mut sets = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(set) = repo.get(id).await? {
                    sets.push(set);
                }
            }
            sets
        };

        let referenced: BTreeSet<&str> = sets
            .iter()
            .flat_map(|s| s.question_ids.iter().map(String::as_str))
            .collect();
        let repo = self.questions();
        let mut questions = Vec::with_capacity(referenced.len());
        for id in referenced {
            if let Some(question) = repo.get(id).await? {
                questions.push(question);
            }
        }

        Ok(QuestionSetExport {
            kind: QUESTION_SETS_KIND.to_string(),
            version: FORMAT_VERSION.to_string(),
            exported_at: Utc::now(),
            question_sets: sets,
            questions,
        })
    }

    /// Store the questions and sets of an export, replacing same-id records
    ///
    /// Question hashes are recomputed rather than trusted.
    pub async fn import_question_sets(&self, export: QuestionSetExport) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        if export.kind != QUESTION_SETS_KIND {
            tracing::warn!(
                kind = %export.kind,
                "importing question sets from unexpected export type"
            );
            report.warnings.push(ImportWarning {
                collection: collections::QUESTION_SETS.to_string(),
                message: format!("export type is {:?}", export.kind),
            });
        }

        let questions = self.questions();
        let count = export.questions.len();
        for question in export.questions {
            questions.update(question).await?;
        }
        report.imported.insert(collections::QUESTIONS.to_string(), count);

        let sets = self.question_sets();
        let count = export.question_sets.len();
        for set in export.question_sets {
            sets.update(set).await?;
        }
        report.imported.insert(collections::QUESTION_SETS.to_string(), count);

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::AppConfig;
    use crate::model::QuestionType;
    use crate::Error;
    use serde_json::json;
    use tempfile::TempDir;

    fn temp_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("db"));
        (dir, db)
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    async fn populate(db: &Database) -> (Candidate, Question) {
        let candidate = db.candidates().create(Candidate::new("Ada")).await.unwrap();
        let session = db
            .sessions()
            .create(Session::new(&candidate.id, "Round 1", Utc::now()))
            .await
            .unwrap();
        let question = db
            .questions()
            .create(Question::new("What is a closure?", QuestionType::Text, vec!["js".into()]))
            .await
            .unwrap();
        db.session_questions()
            .create(SessionQuestion::from_question(&session.id, &question, 0))
            .await
            .unwrap();
        let mut set = QuestionSet::new("JavaScript");
        set.question_ids = vec![question.id.clone()];
        db.question_sets().create(set).await.unwrap();
        db.config().save(&AppConfig::default()).await.unwrap();
        (candidate, question)
    }

    #[tokio::test]
    async fn test_export_import_round_trip() {
        let (_a, source) = temp_db();
        populate(&source).await;
        let snapshot = source.export_all().await.unwrap();
        assert_eq!(snapshot.len(), collections::ALL.len());
        assert_eq!(snapshot[collections::QUESTIONS].len(), 1);

        let (_b, target) = temp_db();
        let report = target.import_merge(snapshot.clone()).await.unwrap();
        assert!(report.warnings.is_empty());
        assert_eq!(report.total(), 6);
        assert_eq!(target.export_all().await.unwrap(), snapshot);

        // importing again replaces by id instead of duplicating
        target.import_merge(snapshot.clone()).await.unwrap();
        assert_eq!(target.export_all().await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_import_merges_with_existing_records() {
        let (_dir, db) = temp_db();
        let store = db.open().await.unwrap();
        store
            .put(collections::CANDIDATES, record(json!({"id": "keep", "displayName": "Keep"})))
            .await
            .unwrap();

        let snapshot = Snapshot::from([(
            collections::CANDIDATES.to_string(),
            vec![record(json!({"id": "new", "displayName": "New"}))],
        )]);
        db.import_merge(snapshot).await.unwrap();
        assert_eq!(store.count(collections::CANDIDATES).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unknown_collection_is_skipped_with_one_warning() {
        let (_dir, db) = temp_db();
        let snapshot = Snapshot::from([
            (
                "legacyStuff".to_string(),
                vec![record(json!({"id": "x1"})), record(json!({"id": "x2"}))],
            ),
            (
                collections::CANDIDATES.to_string(),
                vec![record(json!({"id": "c1", "displayName": "Ada"}))],
            ),
        ]);

        let report = db.import_merge(snapshot).await.unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].collection, "legacyStuff");
        assert_eq!(report.imported[collections::CANDIDATES], 1);
        assert!(!report.imported.contains_key("legacyStuff"));

        let store = db.open().await.unwrap();
        assert!(!store.has_collection("legacyStuff"));
        assert_eq!(store.count(collections::CANDIDATES).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_import_record_without_id_fails() {
        let (_dir, db) = temp_db();
        let snapshot = Snapshot::from([(
            collections::SESSIONS.to_string(),
            vec![record(json!({"id": "s1"})), record(json!({"name": "no id"}))],
        )]);

        let err = db.import_merge(snapshot).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { .. }));
        let store = db.open().await.unwrap();
        assert_eq!(store.count(collections::SESSIONS).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_is_empty_ignores_session_questions_and_config() {
        let (_dir, db) = temp_db();
        assert!(db.is_empty().await.unwrap());

        let store = db.open().await.unwrap();
        store
            .put(collections::SESSION_QUESTIONS, record(json!({"id": "sq1"})))
            .await
            .unwrap();
        db.config().save(&AppConfig::default()).await.unwrap();
        assert!(db.is_empty().await.unwrap());

        store
            .put(collections::QUESTION_SETS, record(json!({"id": "qs1", "name": "Set"})))
            .await
            .unwrap();
        assert!(!db.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_any_content_record_makes_store_non_empty() {
        for collection in collections::CONTENT {
            let (_dir, db) = temp_db();
            let store = db.open().await.unwrap();
            store
                .put(collection, record(json!({"id": "only"})))
                .await
                .unwrap();
            assert!(!db.is_empty().await.unwrap(), "{collection}");

            store.delete(collection, "only").await.unwrap();
            assert!(db.is_empty().await.unwrap(), "{collection}");
        }
    }

    #[tokio::test]
    async fn test_imported_questions_get_difficulty() {
        let (_dir, db) = temp_db();
        let snapshot = Snapshot::from([(
            collections::QUESTIONS.to_string(),
            vec![
                record(json!({"id": "q1", "rating": [3, 4]})),
                record(json!({"id": "q2"})),
                record(json!({"id": "q3", "difficulty": [1], "rating": [5]})),
            ],
        )]);
        db.import_merge(snapshot).await.unwrap();

        let store = db.open().await.unwrap();
        for q in store.list(collections::QUESTIONS).await.unwrap() {
            assert!(q["difficulty"].is_array(), "{q:?}");
            assert!(!q.contains_key("rating"), "{q:?}");
        }
        let q1 = store.get(collections::QUESTIONS, "q1").await.unwrap().unwrap();
        assert_eq!(q1["difficulty"], json!([3, 4]));
        let q3 = store.get(collections::QUESTIONS, "q3").await.unwrap().unwrap();
        assert_eq!(q3["difficulty"], json!([1]));
    }

    #[tokio::test]
    async fn test_clear_all_keeps_config() {
        let (_dir, db) = temp_db();
        populate(&db).await;
        db.clear_all().await.unwrap();

        assert!(db.is_empty().await.unwrap());
        let store = db.open().await.unwrap();
        assert_eq!(store.count(collections::SESSION_QUESTIONS).await.unwrap(), 0);
        assert_eq!(db.config().read().await.unwrap(), Some(AppConfig::default()));
    }

    #[tokio::test]
    async fn test_seed_only_into_empty_store() {
        let (_dir, db) = temp_db();
        let seed = Snapshot::from([(
            collections::QUESTIONS.to_string(),
            vec![record(json!({"id": "q1", "question": "Seeded"}))],
        )]);

        let report = db.seed_if_empty(seed.clone()).await.unwrap();
        assert_eq!(report.map(|r| r.total()), Some(1));
        assert!(db.seed_if_empty(seed).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_export_candidate_history() {
        let (_dir, db) = temp_db();
        let (candidate, question) = populate(&db).await;
        db.candidates().create(Candidate::new("Other")).await.unwrap();

        let export = db.export_candidate(&candidate.id).await.unwrap().unwrap();
        assert_eq!(export.candidate, candidate);
        assert_eq!(export.sessions.len(), 1);
        assert_eq!(export.session_questions.len(), 1);
        assert_eq!(export.session_questions[0].question_obj, question);
        assert_eq!(export.version, FORMAT_VERSION);

        assert!(db.export_candidate("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_question_set_export_and_import() {
        let (_a, source) = temp_db();
        let (_, question) = populate(&source).await;
        let mut second = QuestionSet::new("Shared");
        second.question_ids = vec![question.id.clone(), "gone".into()];
        source.question_sets().create(second).await.unwrap();

        let export = source.export_question_sets(&[]).await.unwrap();
        assert_eq!(export.kind, "questionSets");
        assert_eq!(export.question_sets.len(), 2);
        assert_eq!(export.questions.len(), 1);

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["type"], "questionSets");
        assert!(json.get("exportedAt").is_some());

        // a tampered hash is recomputed on import
        let mut export = export;
        export.questions[0].hash = "bogus".into();

        let (_b, target) = temp_db();
        let report = target.import_question_sets(export).await.unwrap();
        assert!(report.warnings.is_empty());
        assert_eq!(report.imported[collections::QUESTION_SETS], 2);
        let stored = target.questions().get(&question.id).await.unwrap().unwrap();
        assert_eq!(stored.hash, question.hash);
        assert_eq!(target.question_sets().count().await.unwrap(), 2);
    }
}
