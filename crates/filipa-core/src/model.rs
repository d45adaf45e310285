//! Record model for filipa
//!
//! Plain data contracts for the five stored entities. Field names serialize
//! in camelCase and timestamps as RFC 3339 strings, matching the snapshot
//! format the app exchanges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{content_hash, generate_id};

/// Question type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Candidate rates themselves on a scale
    Rating,
    #[default]
    Text,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Rating => "rating",
            QuestionType::Text => "text",
        }
    }
}

impl std::str::FromStr for QuestionType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rating" => Ok(QuestionType::Rating),
            "text" => Ok(QuestionType::Text),
            _ => Err(crate::Error::Other(format!("Invalid question type: {s}"))),
        }
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A person being interviewed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Candidate {
    pub fn new(display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            display_name: display_name.into(),
            notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// One interview round for a candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub candidate_id: String,
    #[serde(default)]
    pub interviewers: Vec<String>,
    pub name: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
    /// Question currently shown to the candidate
    #[serde(default)]
    pub current_question_index: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        candidate_id: impl Into<String>,
        name: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            candidate_id: candidate_id.into(),
            interviewers: Vec::new(),
            name: name.into(),
            date,
            notes: String::new(),
            current_question_index: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Named group of catalog questions
///
/// `question_ids` are loose references; nothing checks that they resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub question_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuestionSet {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            name: name.into(),
            notes: String::new(),
            question_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Catalog question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub question_type: QuestionType,
    pub question: String,
    #[serde(default)]
    pub expected_answer: String,
    /// Self-rating levels this question suits, e.g. `[3, 4, 5]`
    #[serde(default)]
    pub difficulty: Vec<u8>,
    /// See [`content_hash`]
    #[serde(default)]
    pub hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Question {
    pub fn new(
        question: impl Into<String>,
        question_type: QuestionType,
        tags: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        let mut q = Self {
            id: generate_id(),
            tags,
            question_type,
            question: question.into(),
            expected_answer: String::new(),
            difficulty: Vec::new(),
            hash: String::new(),
            created_at: now,
            updated_at: now,
        };
        q.rehash();
        q
    }

    /// Hash of the current question text, tags and type
    pub fn compute_hash(&self) -> String {
        content_hash(&self.question, &self.tags, self.question_type.as_str())
    }

    /// Refresh `hash` after editing question, tags or type
    pub fn rehash(&mut self) {
        self.hash = self.compute_hash();
    }
}

/// A question as asked in one session
///
/// `question_obj` is a copy taken when the question was added, so later
/// catalog edits do not rewrite interview history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuestion {
    pub id: String,
    pub session_id: String,
    pub question_obj: Question,
    pub order: u32,
    #[serde(default)]
    pub note: String,
    /// Interviewer's rating of the answer
    #[serde(default)]
    pub question_rating: u8,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub is_presented: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionQuestion {
    pub fn from_question(session_id: impl Into<String>, question: &Question, order: u32) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            session_id: session_id.into(),
            question_obj: question.clone(),
            order,
            note: String::new(),
            question_rating: 0,
            answer: String::new(),
            is_presented: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_serializes_camel_case() {
        let mut q = Question::new("What is a closure?", QuestionType::Text, vec!["js".into()]);
        q.expected_answer = "A function with its environment".into();
        q.difficulty = vec![3, 4];

        let value = serde_json::to_value(&q).unwrap();
        assert_eq!(value["questionType"], "text");
        assert_eq!(value["expectedAnswer"], "A function with its environment");
        assert_eq!(value["difficulty"], serde_json::json!([3, 4]));
        assert!(value["createdAt"].is_string());

        let back: Question = serde_json::from_value(value).unwrap();
        assert_eq!(back, q);
    }

    #[test]
    fn test_question_hash_tracks_content() {
        let mut q = Question::new("What is a closure?", QuestionType::Text, vec!["js".into()]);
        let before = q.hash.clone();
        assert_eq!(before, q.compute_hash());

        q.tags.push("scope".into());
        assert_eq!(q.hash, before);
        q.rehash();
        assert_ne!(q.hash, before);
    }

    #[test]
    fn test_session_question_snapshot_is_a_copy() {
        let mut q = Question::new("Rate your SQL", QuestionType::Rating, vec![]);
        let sq = SessionQuestion::from_question("s1", &q, 0);
        q.question = "Rate your NoSQL".into();
        assert_eq!(sq.question_obj.question, "Rate your SQL");
    }

    #[test]
    fn test_question_type_parse() {
        assert_eq!("Rating".parse::<QuestionType>().unwrap(), QuestionType::Rating);
        assert_eq!(" text ".parse::<QuestionType>().unwrap(), QuestionType::Text);
        assert!("essay".parse::<QuestionType>().is_err());
    }
}
