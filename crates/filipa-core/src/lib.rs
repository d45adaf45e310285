//! filipa-core: Storage engine for the Filipa interview tool
//!
//! Keeps candidates, interview sessions, the question catalog and the app
//! configuration in a directory of JSONL files with in-memory secondary
//! indexes, versioned schema migrations and whole-store export/import.

pub mod app_config;
pub mod config;
pub mod database;
pub mod error;
pub mod id;
pub mod index;
pub mod model;
pub mod repo;
pub mod schema;
pub mod store;
pub mod transfer;

pub use app_config::{AppConfig, ConfigService};
pub use config::Settings;
pub use database::Database;
pub use error::{Error, MigrationError};
pub use id::{content_hash, generate_id};
pub use model::{Candidate, Question, QuestionSet, QuestionType, Session, SessionQuestion};
pub use repo::{
    CandidateRepo, ConfigRepo, QuestionRepo, QuestionSetRepo, SessionQuestionRepo, SessionRepo,
};
pub use schema::SCHEMA_VERSION;
pub use store::{Record, Store};
pub use transfer::{CandidateExport, ImportReport, ImportWarning, QuestionSetExport, Snapshot};

/// Result type for filipa operations
pub type Result<T> = std::result::Result<T, Error>;
