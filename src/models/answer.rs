// src/models/answer.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use utoipa::{IntoParams, ToSchema};

/// A submitted answer. Its shape depends on the question type:
/// a string for `single`, a list for `multiple` and `order`,
/// and a `left -> right` map for `match`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    List(Vec<String>),
    Pairs(BTreeMap<String, String>),
}

impl AnswerValue {
    /// An answer counts as given when it carries at least one non-blank value.
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Text(text) => text.trim().is_empty(),
            AnswerValue::List(items) => items.is_empty(),
            AnswerValue::Pairs(pairs) => pairs.is_empty(),
        }
    }
}

/// Represents the 'user_answers' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserAnswer {
    pub id: String,
    pub result_id: String,
    pub question_id: Option<String>,
    #[schema(value_type = AnswerValue)]
    pub user_answer: Json<AnswerValue>,
    pub is_correct: bool,
    pub earned_points: i64,
}

/// Query parameters for listing answers.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AnswerListParams {
    /// Result the answers belong to.
    pub result: String,
}
