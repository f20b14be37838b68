//! Core types for the LinguaFlow platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Judgement for a single analyzed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Correct,
    Error,
    Extra,
    Missing,
}

impl Default for TokenStatus {
    fn default() -> Self {
        Self::Correct
    }
}

/// One word/segment of an analysis result.
///
/// A `Correct` token never carries `correction`, `error_type` or
/// `explanation`; use the constructors to keep that invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisToken {
    pub text: String,
    pub status: TokenStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl AnalysisToken {
    /// A token the analysis could not fault.
    pub fn correct(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status: TokenStatus::Correct,
            correction: None,
            error_type: None,
            explanation: None,
        }
    }

    /// A token flagged with a known mistake.
    pub fn error(
        text: impl Into<String>,
        correction: Option<String>,
        error_type: impl Into<String>,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            status: TokenStatus::Error,
            correction,
            error_type: Some(error_type.into()),
            explanation: Some(explanation.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status != TokenStatus::Correct
    }
}

/// Output of one local estimation pass.
///
/// Created fresh per check, immutable, and discarded once the authoritative
/// AI result supersedes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalDiffResult {
    /// Tokens in input order; never reordered.
    pub tokens: Vec<AnalysisToken>,
    /// Heuristic quality estimate in `[0, 100]`.
    pub estimated_score: u8,
    pub has_errors: bool,
    /// Confidence in `[0, 1]`, capped well below certainty.
    pub confidence: f64,
}

impl LocalDiffResult {
    /// The result for empty or whitespace-only input.
    pub fn empty() -> Self {
        Self {
            tokens: Vec::new(),
            estimated_score: 0,
            has_errors: false,
            confidence: 0.0,
        }
    }
}

/// One item's target position within a reorder batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub id: String,
    pub order_index: u32,
}

/// Exercise kinds supported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseType {
    Translation,
    Roleplay,
    ErrorCorrection,
}

impl Default for ExerciseType {
    fn default() -> Self {
        Self::Translation
    }
}

impl ExerciseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Translation => "translation",
            Self::Roleplay => "roleplay",
            Self::ErrorCorrection => "error_correction",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "translation" => Some(Self::Translation),
            "roleplay" => Some(Self::Roleplay),
            "error_correction" => Some(Self::ErrorCorrection),
            _ => None,
        }
    }
}

/// Authoritative grading produced by the AI evaluation endpoint.
///
/// Partial results arrive with progressively fuller fields while the
/// response streams in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub score: u8,
    pub feedback: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_text: Option<String>,
    #[serde(default)]
    pub detailed_analysis: Vec<AnalysisToken>,
}

/// Lesson difficulty level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl Default for LessonLevel {
    fn default() -> Self {
        Self::Beginner
    }
}

/// A curated lesson grouping a set of exercises.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    pub title: String,
    pub description: String,
    pub level: LessonLevel,
    pub order_index: u32,
    pub created_at: DateTime<Utc>,
}

/// A single exercise within a lesson.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exercise {
    pub id: String,
    pub lesson_id: String,
    pub exercise_type: ExerciseType,
    pub prompt: String,
    pub expected_answer: String,
    pub order_index: u32,
    pub created_at: DateTime<Utc>,
}

/// One completed exercise attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub id: String,
    pub user_id: String,
    pub exercise_id: String,
    pub score: u8,
    pub answer: String,
    pub completed_at: DateTime<Utc>,
}
