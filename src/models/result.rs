// src/models/result.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::{grading::QuestionOutcome, models::answer::AnswerValue};

/// Represents the 'user_results' table in the database.
/// One row per persisted submission; never updated afterwards.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResult {
    pub id: String,
    pub user_id: String,
    /// `None` once the test has been deleted.
    pub test_id: Option<String>,
    pub score: i64,
    pub max_score: i64,
    /// Seconds spent, as reported by the client.
    pub time_spent: Option<i64>,
    pub submitted_at: DateTime<Utc>,
}

/// DTO for submitting answers to a test.
/// The score is always computed on the server.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTestRequest {
    pub test_id: String,
    /// Answers keyed by question id.
    #[serde(default)]
    pub answers: HashMap<String, AnswerValue>,
    pub time_spent: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    /// Id of the stored result; `None` for anonymous submissions.
    pub id: Option<String>,
    pub test_id: String,
    pub score: i64,
    pub max_score: i64,
    pub outcomes: Vec<QuestionOutcome>,
    pub saved: bool,
}

/// Query parameters for listing results.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ResultListParams {
    pub user: Option<String>,
    pub test: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Query parameters for a user's history.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Row of a user's history joined with test and author data.
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    pub id: String,
    pub score: i64,
    pub max_score: i64,
    pub time_spent: Option<i64>,
    pub submitted_at: DateTime<Utc>,
    pub test_id: String,
    pub test_title: String,
    pub test_image_url: Option<String>,
    pub author_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryTestRef {
    pub id: String,
    pub title: String,
    pub author_name: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub test: HistoryTestRef,
    pub score: i64,
    pub max_score: i64,
    pub time_spent: Option<i64>,
    pub submitted_at: DateTime<Utc>,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        Self {
            id: row.id,
            test: HistoryTestRef {
                id: row.test_id,
                title: row.test_title,
                author_name: row.author_name,
                image_url: row.test_image_url,
            },
            score: row.score,
            max_score: row.max_score,
            time_spent: row.time_spent,
            submitted_at: row.submitted_at,
        }
    }
}

/// Aggregated statistics over all results of a user.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_tests: i64,
    /// Mean of `score / maxScore` over all results, in `0.0..=1.0`.
    pub average_score: f64,
    /// Best single `score / maxScore`.
    pub best_score: f64,
}

impl UserStats {
    /// Results with a zero `max_score` count toward the total but not the ratios.
    pub fn from_scores(scores: &[(i64, i64)]) -> Self {
        let ratios: Vec<f64> = scores
            .iter()
            .filter(|(_, max)| *max > 0)
            .map(|(score, max)| *score as f64 / *max as f64)
            .collect();

        let average_score = if ratios.is_empty() {
            0.0
        } else {
            ratios.iter().sum::<f64>() / ratios.len() as f64
        };
        let best_score = ratios.iter().cloned().fold(0.0, f64::max);

        Self {
            total_tests: scores.len() as i64,
            average_score,
            best_score,
        }
    }
}
