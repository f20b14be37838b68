//! HTTP client for the hosted backend.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::ClientConfig;
use linguaflow_core::types::{
    Exercise, ExerciseType, Lesson, LessonLevel, OrderUpdate, ProgressRecord,
};

/// API errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend error: {status} - {message}")]
    Backend { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ApiError {
    /// Whether the error is a rate-limit rejection. Rate-limited writes must
    /// not be retried.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Backend { status: 429, .. } => true,
            other => other.to_string().contains("429"),
        }
    }
}

/// Write seam for persisting exercise order, so the reorder manager can be
/// driven against a test double.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn save_order(&self, updates: &[OrderUpdate]) -> Result<(), ApiError>;
}

#[derive(Debug, Serialize)]
struct SaveOrderRequest<'a> {
    updates: &'a [OrderUpdate],
}

#[derive(Debug, Serialize)]
struct RecordProgressRequest<'a> {
    user_id: &'a str,
    exercise_id: &'a str,
    score: u8,
    answer: &'a str,
}

/// Inner state shared across clones.
struct ApiClientInner {
    client: Client,
    config: ClientConfig,
}

/// Client for the hosted backend.
///
/// Clone-able because all state lives behind an Arc; clones share the
/// underlying connection pool.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ApiClientInner {
                client: Client::new(),
                config,
            }),
        }
    }

    // === Lessons ===

    pub async fn list_lessons(&self) -> Result<Vec<Lesson>, ApiError> {
        self.get_json("/api/lessons").await
    }

    pub async fn get_lesson(&self, id: &str) -> Result<Lesson, ApiError> {
        self.get_json(&format!("/api/lessons/{id}")).await
    }

    /// Create a lesson. The id is assigned client-side so the UI can insert
    /// optimistically before the write lands.
    pub async fn create_lesson(
        &self,
        title: &str,
        description: &str,
        level: LessonLevel,
        order_index: u32,
    ) -> Result<Lesson, ApiError> {
        let lesson = Lesson {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: description.to_string(),
            level,
            order_index,
            created_at: Utc::now(),
        };
        self.post_json("/api/lessons", &lesson).await
    }

    pub async fn update_lesson(&self, lesson: &Lesson) -> Result<(), ApiError> {
        self.put_json(&format!("/api/lessons/{}", lesson.id), lesson)
            .await
    }

    pub async fn delete_lesson(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/api/lessons/{id}")).await
    }

    // === Exercises ===

    pub async fn list_exercises(&self, lesson_id: &str) -> Result<Vec<Exercise>, ApiError> {
        self.get_json(&format!("/api/lessons/{lesson_id}/exercises"))
            .await
    }

    pub async fn create_exercise(
        &self,
        lesson_id: &str,
        exercise_type: ExerciseType,
        prompt: &str,
        expected_answer: &str,
        order_index: u32,
    ) -> Result<Exercise, ApiError> {
        let exercise = Exercise {
            id: Uuid::new_v4().to_string(),
            lesson_id: lesson_id.to_string(),
            exercise_type,
            prompt: prompt.to_string(),
            expected_answer: expected_answer.to_string(),
            order_index,
            created_at: Utc::now(),
        };
        self.post_json("/api/exercises", &exercise).await
    }

    pub async fn update_exercise(&self, exercise: &Exercise) -> Result<(), ApiError> {
        self.put_json(&format!("/api/exercises/{}", exercise.id), exercise)
            .await
    }

    pub async fn delete_exercise(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/api/exercises/{id}")).await
    }

    // === Progress ===

    pub async fn record_progress(
        &self,
        user_id: &str,
        exercise_id: &str,
        score: u8,
        answer: &str,
    ) -> Result<ProgressRecord, ApiError> {
        let request = RecordProgressRequest {
            user_id,
            exercise_id,
            score,
            answer,
        };
        self.post_json("/api/progress", &request).await
    }

    pub async fn list_progress(&self, user_id: &str) -> Result<Vec<ProgressRecord>, ApiError> {
        self.get_json(&format!("/api/progress?user_id={user_id}"))
            .await
    }

    // === Plumbing ===

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.config.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self
            .inner
            .client
            .get(self.url(path))
            .bearer_auth(&self.inner.config.api_token)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::decode(resp).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .inner
            .client
            .post(self.url(path))
            .bearer_auth(&self.inner.config.api_token)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::decode(resp).await
    }

    async fn put_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let resp = self
            .inner
            .client
            .put(self.url(path))
            .bearer_auth(&self.inner.config.api_token)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::check(resp).await
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let resp = self
            .inner
            .client
            .delete(self.url(path))
            .bearer_auth(&self.inner.config.api_token)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::check(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ApiError::Backend { status, message });
        }
        resp.json().await.map_err(|e| ApiError::Parse(e.to_string()))
    }

    async fn check(resp: reqwest::Response) -> Result<(), ApiError> {
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ApiError::Backend { status, message });
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for ApiClient {
    async fn save_order(&self, updates: &[OrderUpdate]) -> Result<(), ApiError> {
        debug!(count = updates.len(), "saving exercise order");
        let resp = self
            .inner
            .client
            .patch(self.url("/api/exercises/order"))
            .bearer_auth(&self.inner.config.api_token)
            .json(&SaveOrderRequest { updates })
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::check(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_detection() {
        let err = ApiError::Backend {
            status: 429,
            message: "Too Many Requests".to_string(),
        };
        assert!(err.is_rate_limited());

        let err = ApiError::Network("HTTP 429 from upstream".to_string());
        assert!(err.is_rate_limited());

        let err = ApiError::Backend {
            status: 500,
            message: "internal error".to_string(),
        };
        assert!(!err.is_rate_limited());

        let err = ApiError::Network("connection refused".to_string());
        assert!(!err.is_rate_limited());
    }
}
