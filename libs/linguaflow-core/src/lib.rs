//! Core LinguaFlow library shared by the client engine and tooling.
//!
//! Provides:
//! - Local diff estimation for instant answer feedback before AI grading
//! - Merge logic between local estimates and authoritative AI analysis
//! - Shared types (Lesson, Exercise, AnalysisToken, OrderUpdate, etc.)

pub mod diff;
pub mod types;

pub use diff::{estimate, merge};
pub use types::{
    AnalysisToken, EvaluationResult, Exercise, ExerciseType, Lesson, LessonLevel, LocalDiffResult,
    OrderUpdate, ProgressRecord, TokenStatus,
};
