//! Core data model types for probforge.
//!
//! Problems form a forest through `parent_id`: a root problem is one the user
//! wrote, every other node is a generated variant of its parent. Exams reference
//! problems through ordered [`ExamProblem`] links.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Subject assigned when a draft does not name one.
pub const DEFAULT_SUBJECT: &str = "math";
/// Difficulty assigned when a draft does not name one.
pub const DEFAULT_DIFFICULTY: i32 = 1;
/// Lowest accepted difficulty rank.
pub const MIN_DIFFICULTY: i32 = 1;
/// Highest accepted difficulty rank.
pub const MAX_DIFFICULTY: i32 = 5;

/// A stored practice problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Unique identifier, assigned by the store.
    pub id: Uuid,
    /// Creating user, absent for rows written without an authenticated caller.
    #[serde(default)]
    pub owner_id: Option<Uuid>,
    /// Problem this one was generated from. `None` marks a root problem.
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    /// Problem statement, may embed LaTeX.
    pub content: String,
    /// Worked solution.
    #[serde(default)]
    pub solution: Option<String>,
    /// Free-form classification tag such as "math" or "physics".
    pub subject: String,
    /// Rank within [`MIN_DIFFICULTY`]..=[`MAX_DIFFICULTY`].
    pub difficulty: i32,
    /// Server-assigned creation time.
    pub created_at: DateTime<Utc>,
}

impl Problem {
    /// Returns `true` if this problem is the root of its lineage.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A validated problem ready to be inserted. The store assigns `id` and
/// `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProblem {
    pub owner_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub solution: Option<String>,
    pub subject: String,
    pub difficulty: i32,
}

impl NewProblem {
    /// Materialize the row with a fresh identifier and timestamp.
    pub fn into_problem(self) -> Problem {
        Problem {
            id: Uuid::new_v4(),
            owner_id: self.owner_id,
            parent_id: self.parent_id,
            content: self.content,
            solution: self.solution,
            subject: self.subject,
            difficulty: self.difficulty,
            created_at: Utc::now(),
        }
    }
}

/// User-supplied payload for creating a problem (`POST /problems`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDraft {
    pub content: String,
    #[serde(default)]
    pub solution: Option<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: i32,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

impl ProblemDraft {
    /// Draft with the given statement and default classification.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            solution: None,
            subject: default_subject(),
            difficulty: default_difficulty(),
            parent_id: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_difficulty(mut self, difficulty: i32) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_solution(mut self, solution: impl Into<String>) -> Self {
        self.solution = Some(solution.into());
        self
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Check the draft and turn it into an insertable row.
    pub fn validate(self, owner_id: Option<Uuid>) -> Result<NewProblem> {
        let content = self.content.trim();
        if content.is_empty() {
            return Err(Error::Validation("content must not be empty".into()));
        }
        let subject = validate_subject(&self.subject)?;
        validate_difficulty(self.difficulty)?;

        Ok(NewProblem {
            owner_id,
            parent_id: self.parent_id,
            content: content.to_string(),
            solution: self.solution,
            subject,
            difficulty: self.difficulty,
        })
    }
}

/// Explicit replacements for the classification a variant would otherwise
/// inherit from its parent. Ownership is never overridable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantOverrides {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub difficulty: Option<i32>,
}

impl VariantOverrides {
    /// Subject and difficulty the variant ends up with.
    pub fn resolve(&self, parent: &Problem) -> Result<(String, i32)> {
        let subject = match &self.subject {
            Some(s) => validate_subject(s)?,
            None => parent.subject.clone(),
        };
        let difficulty = match self.difficulty {
            Some(d) => {
                validate_difficulty(d)?;
                d
            }
            None => parent.difficulty,
        };
        Ok((subject, difficulty))
    }
}

/// Output of the variant generator: a new statement and its solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedVariant {
    pub content: String,
    pub solution: String,
}

/// Filter for listing problems. Empty filter lists everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProblemFilter {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub owner_id: Option<Uuid>,
    /// Only return problems without a parent.
    #[serde(default)]
    pub roots_only: bool,
}

impl ProblemFilter {
    pub fn matches(&self, problem: &Problem) -> bool {
        if let Some(subject) = &self.subject {
            if &problem.subject != subject {
                return false;
            }
        }
        if let Some(owner) = self.owner_id {
            if problem.owner_id != Some(owner) {
                return false;
            }
        }
        !(self.roots_only && !problem.is_root())
    }
}

/// An exam: a titled, ordered collection of problems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exam {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

/// A validated exam ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExam {
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
}

impl NewExam {
    pub fn into_exam(self) -> Exam {
        Exam {
            id: Uuid::new_v4(),
            owner_id: self.owner_id,
            title: self.title,
            description: self.description,
            is_published: false,
            created_at: Utc::now(),
        }
    }
}

/// User-supplied payload for creating an exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl ExamDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
        }
    }

    pub fn validate(self, owner_id: Uuid) -> Result<NewExam> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(Error::Validation("title must not be empty".into()));
        }
        Ok(NewExam {
            owner_id,
            title: title.to_string(),
            description: self.description,
        })
    }
}

/// Link placing a problem inside an exam. `(exam_id, problem_id)` is unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamProblem {
    pub exam_id: Uuid,
    pub problem_id: Uuid,
    pub order_index: i32,
}

/// A problem as it appears inside an exam listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamEntry {
    pub order_index: i32,
    pub problem: Problem,
}

/// What happens to exam links when a problem is deleted.
///
/// Problems that still have variants are never deletable, regardless of the
/// policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletePolicy {
    /// Refuse to delete a problem that any exam references.
    #[default]
    Reject,
    /// Remove the exam links together with the problem.
    Cascade,
}

impl fmt::Display for DeletePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeletePolicy::Reject => write!(f, "reject"),
            DeletePolicy::Cascade => write!(f, "cascade"),
        }
    }
}

impl FromStr for DeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(DeletePolicy::Reject),
            "cascade" => Ok(DeletePolicy::Cascade),
            other => Err(format!("unknown delete policy: {other}")),
        }
    }
}

/// Result of a successful delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub problem_id: Uuid,
    /// Exam links removed alongside the problem (always 0 under `Reject`).
    pub links_removed: usize,
}

fn default_subject() -> String {
    DEFAULT_SUBJECT.to_string()
}

fn default_difficulty() -> i32 {
    DEFAULT_DIFFICULTY
}

fn validate_subject(subject: &str) -> Result<String> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(Error::Validation("subject must not be empty".into()));
    }
    Ok(subject.to_string())
}

fn validate_difficulty(difficulty: i32) -> Result<()> {
    if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&difficulty) {
        return Err(Error::Validation(format!(
            "difficulty must be between {MIN_DIFFICULTY} and {MAX_DIFFICULTY}, got {difficulty}"
        )));
    }
    Ok(())
}
