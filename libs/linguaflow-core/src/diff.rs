//! Local diff estimation for typed exercise answers.
//!
//! Gives the learner an instant, low-confidence quality estimate while the
//! authoritative AI grading streams in. The pass only flags known mistakes;
//! an unrecognized token is left tentatively correct.

use crate::types::{AnalysisToken, LocalDiffResult, TokenStatus};
use once_cell::sync::Lazy;
use regex::Regex;

/// Confidence ceiling for the heuristic pass. Local analysis can flag known
/// mistakes but cannot prove correctness, so it never reports certainty.
const MAX_CONFIDENCE: f64 = 0.6;

/// Known irregular-verb mis-conjugations and their corrections.
static IRREGULAR_VERBS: &[(&str, &str)] = &[
    ("bringed", "brought"),
    ("buyed", "bought"),
    ("catched", "caught"),
    ("comed", "came"),
    ("drinked", "drank"),
    ("eated", "ate"),
    ("falled", "fell"),
    ("feeled", "felt"),
    ("gived", "gave"),
    ("goed", "went"),
    ("knowed", "knew"),
    ("maked", "made"),
    ("runned", "ran"),
    ("speaked", "spoke"),
    ("swimmed", "swam"),
    ("taked", "took"),
    ("teached", "taught"),
    ("thinked", "thought"),
    ("writed", "wrote"),
];

/// A whole-sentence error pattern with its category and explanation.
struct ErrorPattern {
    regex: Regex,
    error_type: &'static str,
    explanation: &'static str,
}

/// Multi-word patterns: literal-translation calques, missing articles,
/// double negatives.
static ERROR_PATTERNS: Lazy<Vec<ErrorPattern>> = Lazy::new(|| {
    vec![
        ErrorPattern {
            regex: Regex::new(r"(?i)\bvery\s+(like|love|hate|enjoy|want|need)\b")
                .expect("valid pattern"),
            error_type: "Vietlish",
            explanation: "\"very\" cannot modify a verb; use \"really\" instead",
        },
        ErrorPattern {
            regex: Regex::new(r"(?i)\b(open|close)\s+the\s+(light|lights|tv|radio|fan)\b")
                .expect("valid pattern"),
            error_type: "Vietlish",
            explanation: "use \"turn on\" / \"turn off\" for devices",
        },
        ErrorPattern {
            regex: Regex::new(
                r"(?i)\b(am|is|are|was|were)\s+(teacher|student|doctor|nurse|engineer|lawyer|farmer|singer|driver)\b",
            )
            .expect("valid pattern"),
            error_type: "Grammar",
            explanation: "missing article before a profession noun",
        },
        ErrorPattern {
            regex: Regex::new(
                r"(?i)\b(don't|doesn't|didn't|can't|couldn't|won't|haven't|hasn't)\s+\w+(\s+\w+)?\s+(nothing|nobody|nowhere|no one)\b",
            )
            .expect("valid pattern"),
            error_type: "Grammar",
            explanation: "double negative",
        },
    ]
});

/// Estimate the quality of a typed answer before the AI grading arrives.
///
/// Synchronous, side-effect-free and deterministic. Empty or whitespace-only
/// input yields the empty result.
pub fn estimate(text: &str) -> LocalDiffResult {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return LocalDiffResult::empty();
    }

    let mut tokens: Vec<AnalysisToken> = Vec::with_capacity(words.len());
    let mut error_count = 0usize;

    // Per-token pass: known irregular-verb mis-conjugations.
    for word in &words {
        let stripped = word.trim_end_matches(|c: char| c.is_ascii_punctuation());
        let lookup = stripped.to_lowercase();
        match IRREGULAR_VERBS.iter().find(|(wrong, _)| *wrong == lookup) {
            Some((_, correction)) => {
                error_count += 1;
                tokens.push(AnalysisToken::error(
                    *word,
                    Some((*correction).to_string()),
                    "Grammar",
                    "irregular verb",
                ));
            }
            None => tokens.push(AnalysisToken::correct(*word)),
        }
    }

    // Whole-string pass. Patterns run against the single-space join of the
    // tokens so match spans share a coordinate system with the token ranges
    // below, even when the raw input had irregular whitespace.
    let joined = words.join(" ");
    let mut spans = Vec::with_capacity(words.len());
    let mut offset = 0usize;
    for word in &words {
        spans.push((offset, offset + word.len()));
        offset += word.len() + 1;
    }

    for pattern in ERROR_PATTERNS.iter() {
        for found in pattern.regex.find_iter(&joined) {
            error_count += 1;
            for (idx, &(start, end)) in spans.iter().enumerate() {
                if start < found.end() && found.start() < end {
                    // A token already flagged by an earlier pass keeps its
                    // first marking.
                    let token = &mut tokens[idx];
                    if token.status == TokenStatus::Correct {
                        token.status = TokenStatus::Error;
                        token.error_type = Some(pattern.error_type.to_string());
                        token.explanation = Some(pattern.explanation.to_string());
                    }
                }
            }
        }
    }

    let error_ratio = error_count as f64 / words.len() as f64;
    let estimated_score = (100.0 - error_ratio * 50.0).clamp(0.0, 100.0).round() as u8;
    let confidence = (1.0 - error_ratio).clamp(0.0, MAX_CONFIDENCE);

    LocalDiffResult {
        tokens,
        estimated_score,
        has_errors: error_count > 0,
        confidence,
    }
}

/// Merge a local estimate with the authoritative AI token analysis.
///
/// A non-empty AI analysis fully replaces the local tokens; otherwise the
/// local tokens stand as the only available feedback. There is no
/// field-by-field reconciliation.
pub fn merge(local: &LocalDiffResult, ai_tokens: &[AnalysisToken]) -> Vec<AnalysisToken> {
    if ai_tokens.is_empty() {
        local.tokens.clone()
    } else {
        ai_tokens.to_vec()
    }
}
