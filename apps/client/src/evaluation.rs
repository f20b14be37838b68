//! Streaming client for the AI evaluation proxy.
//!
//! The proxy grades an answer with a language model and streams back
//! progressively fuller [`EvaluationResult`] payloads as SSE-style
//! `data:` lines.

use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::api::ApiError;
use crate::config::ClientConfig;
use linguaflow_core::types::{EvaluationResult, ExerciseType};

/// Callback invoked with each partial result as the stream progresses.
pub type PartialCallback = Box<dyn FnMut(&EvaluationResult) + Send>;

#[derive(Debug, Serialize)]
struct EvaluateRequest<'a> {
    original_text: &'a str,
    user_text: &'a str,
    exercise_type: ExerciseType,
}

/// Whether an evaluation is complete enough to replace the local estimate.
///
/// The UI shows the local diff only until the first partial carrying a
/// non-empty token analysis arrives.
pub fn supersedes_local(result: &EvaluationResult) -> bool {
    !result.detailed_analysis.is_empty()
}

/// Parse one stream line into an evaluation payload, if it carries one.
fn parse_stream_line(line: &str) -> Option<EvaluationResult> {
    let data = line.strip_prefix("data: ")?;
    if data == "[DONE]" {
        return None;
    }
    serde_json::from_str(data).ok()
}

struct EvaluationClientInner {
    client: Client,
    config: ClientConfig,
}

/// Client for the serverless evaluation proxy. Clone-able; state is Arc-shared.
#[derive(Clone)]
pub struct EvaluationClient {
    inner: Arc<EvaluationClientInner>,
}

impl EvaluationClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(EvaluationClientInner {
                client: Client::new(),
                config,
            }),
        }
    }

    /// Grade an answer, invoking `on_partial` zero or more times with
    /// progressively fuller results, then returning the final one.
    pub async fn evaluate(
        &self,
        original_text: &str,
        user_text: &str,
        exercise_type: ExerciseType,
        mut on_partial: PartialCallback,
    ) -> Result<EvaluationResult, ApiError> {
        let request = EvaluateRequest {
            original_text,
            user_text,
            exercise_type,
        };

        let url = format!("{}/api/evaluate", self.inner.config.base_url);
        let resp = self
            .inner
            .client
            .post(&url)
            .bearer_auth(&self.inner.config.api_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ApiError::Backend { status, message });
        }

        let mut stream = resp.bytes_stream();
        let mut buffer = String::new();
        let mut latest: Option<EvaluationResult> = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ApiError::Network(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // A chunk boundary can split a line; only complete lines parse.
            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim_end_matches('\r').to_string();
                buffer.drain(..=pos);
                if let Some(result) = parse_stream_line(&line) {
                    on_partial(&result);
                    latest = Some(result);
                }
            }
        }

        if let Some(result) = parse_stream_line(buffer.trim_end()) {
            on_partial(&result);
            latest = Some(result);
        }

        debug!(
            partials = latest.is_some(),
            "evaluation stream finished"
        );
        latest.ok_or_else(|| ApiError::Parse("stream ended without a result".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linguaflow_core::types::AnalysisToken;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_stream_line() {
        let line = r#"data: {"score":72,"feedback":"Almost there"}"#;
        let result = parse_stream_line(line).expect("payload line parses");
        assert_eq!(result.score, 72);
        assert_eq!(result.feedback, "Almost there");
        assert!(result.detailed_analysis.is_empty());

        assert!(parse_stream_line("data: [DONE]").is_none());
        assert!(parse_stream_line("event: ping").is_none());
        assert!(parse_stream_line("data: not json").is_none());
        assert!(parse_stream_line("").is_none());
    }

    #[test]
    fn test_parse_stream_line_with_analysis() {
        let line = r#"data: {"score":90,"feedback":"ok","detailed_analysis":[{"text":"I","status":"correct"}]}"#;
        let result = parse_stream_line(line).expect("payload line parses");
        assert_eq!(result.detailed_analysis.len(), 1);
        assert_eq!(result.detailed_analysis[0], AnalysisToken::correct("I"));
    }

    #[test]
    fn test_supersedes_local_requires_analysis() {
        let mut result = EvaluationResult {
            score: 80,
            feedback: "good".to_string(),
            corrected_text: None,
            detailed_analysis: Vec::new(),
        };
        assert!(!supersedes_local(&result));

        result.detailed_analysis.push(AnalysisToken::correct("I"));
        assert!(supersedes_local(&result));
    }
}
