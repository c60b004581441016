// src/models/question.rs

use std::{borrow::Cow, collections::HashSet};

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

pub const MIN_ITEMS: usize = 2;
pub const MAX_ITEMS: usize = 10;
pub const MAX_QUESTION_LENGTH: usize = 300;
pub const MAX_OPTION_LENGTH: usize = 200;
pub const MIN_POINTS: i64 = 1;
pub const MAX_POINTS: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MatchPair {
    pub left: String,
    pub right: String,
}

/// Type-specific part of a question, discriminated by `type`.
///
/// Each variant only carries the fields that make sense for it, so a `single`
/// question can never hold match pairs. Rows written by older clients with a
/// type this server does not know decode as `Unsupported` and grade to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QuestionKind {
    Single {
        options: Vec<String>,
        #[serde(rename = "correctAnswer")]
        correct_answer: String,
    },
    Multiple {
        options: Vec<String>,
        #[serde(rename = "correctAnswer")]
        correct_answer: Vec<String>,
    },
    Order {
        order: Vec<String>,
    },
    Match {
        #[serde(rename = "matchPairs")]
        match_pairs: Vec<MatchPair>,
    },
    #[serde(other)]
    Unsupported,
}

impl QuestionKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            QuestionKind::Single { .. } => "single",
            QuestionKind::Multiple { .. } => "multiple",
            QuestionKind::Order { .. } => "order",
            QuestionKind::Match { .. } => "match",
            QuestionKind::Unsupported => "unsupported",
        }
    }

    /// Checks the structural rules of the question body.
    /// Returns the first violated rule as a human readable message.
    pub fn check(&self) -> Result<(), String> {
        match self {
            QuestionKind::Single {
                options,
                correct_answer,
            } => {
                check_items(options, "options")?;
                if !options.iter().any(|o| o == correct_answer) {
                    return Err("correctAnswer must be one of the options".to_string());
                }
                Ok(())
            }
            QuestionKind::Multiple {
                options,
                correct_answer,
            } => {
                check_items(options, "options")?;
                if correct_answer.is_empty() {
                    return Err("Select at least one correct answer".to_string());
                }
                let mut seen = HashSet::new();
                for answer in correct_answer {
                    if !options.contains(answer) {
                        return Err(format!("Correct answer '{}' is not an option", answer));
                    }
                    if !seen.insert(answer) {
                        return Err("Correct answers must be unique".to_string());
                    }
                }
                Ok(())
            }
            QuestionKind::Order { order } => check_items(order, "order items"),
            QuestionKind::Match { match_pairs } => {
                if match_pairs.len() < MIN_ITEMS || match_pairs.len() > MAX_ITEMS {
                    return Err(format!(
                        "A match question needs between {} and {} pairs",
                        MIN_ITEMS, MAX_ITEMS
                    ));
                }
                let lefts: Vec<String> = match_pairs.iter().map(|p| p.left.clone()).collect();
                let rights: Vec<String> = match_pairs.iter().map(|p| p.right.clone()).collect();
                check_items(&lefts, "left sides")?;
                check_items(&rights, "right sides")
            }
            QuestionKind::Unsupported => Err("Unsupported question type".to_string()),
        }
    }

    /// Strips the answer key. Order items and right-hand match sides are shuffled
    /// so the stored order does not give the answer away.
    pub fn public_view(&self) -> PublicQuestionKind {
        let mut rng = rand::thread_rng();
        match self {
            QuestionKind::Single { options, .. } => PublicQuestionKind::Single {
                options: options.clone(),
            },
            QuestionKind::Multiple { options, .. } => PublicQuestionKind::Multiple {
                options: options.clone(),
            },
            QuestionKind::Order { order } => {
                let mut items = order.clone();
                items.shuffle(&mut rng);
                PublicQuestionKind::Order { items }
            }
            QuestionKind::Match { match_pairs } => {
                let left = match_pairs.iter().map(|p| p.left.clone()).collect();
                let mut right: Vec<String> = match_pairs.iter().map(|p| p.right.clone()).collect();
                right.shuffle(&mut rng);
                PublicQuestionKind::Match { left, right }
            }
            QuestionKind::Unsupported => PublicQuestionKind::Unsupported,
        }
    }
}

/// Shared rule for option lists, order items and match sides:
/// 2..=10 entries, each non-empty after trim, bounded length, unique after trim.
fn check_items(items: &[String], what: &str) -> Result<(), String> {
    if items.len() < MIN_ITEMS || items.len() > MAX_ITEMS {
        return Err(format!(
            "Between {} and {} {} are required",
            MIN_ITEMS, MAX_ITEMS, what
        ));
    }
    let mut seen = HashSet::new();
    for item in items {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            return Err(format!("All {} must be filled in", what));
        }
        if trimmed.chars().count() > MAX_OPTION_LENGTH {
            return Err(format!(
                "Each of the {} must be at most {} characters",
                what, MAX_OPTION_LENGTH
            ));
        }
        if !seen.insert(trimmed) {
            return Err(format!("The {} must be unique", what));
        }
    }
    Ok(())
}

/// Question body as shown to test takers.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PublicQuestionKind {
    Single { options: Vec<String> },
    Multiple { options: Vec<String> },
    Order { items: Vec<String> },
    Match { left: Vec<String>, right: Vec<String> },
    Unsupported,
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct QuestionRow {
    pub id: String,
    pub test_id: String,
    pub position: i64,
    pub question: String,
    pub points: i64,
    pub image_url: Option<String>,
    pub body: Json<QuestionKind>,
}

/// A question with its answer key.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub test_id: String,
    pub position: i64,
    pub question: String,
    pub points: i64,
    pub image_url: Option<String>,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Self {
        Self {
            id: row.id,
            test_id: row.test_id,
            position: row.position,
            question: row.question,
            points: row.points,
            image_url: row.image_url,
            kind: row.body.0,
        }
    }
}

/// DTO for sending a question to a test taker (no answer key).
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: String,
    pub position: i64,
    pub question: String,
    pub points: i64,
    pub image_url: Option<String>,
    #[serde(flatten)]
    pub kind: PublicQuestionKind,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            position: q.position,
            question: q.question.clone(),
            points: q.points,
            image_url: q.image_url.clone(),
            kind: q.kind.public_view(),
        }
    }
}

/// Either view of a question, depending on who is asking.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(untagged)]
pub enum QuestionView {
    Full(Question),
    Public(PublicQuestion),
}

impl QuestionView {
    pub fn new(question: Question, with_answers: bool) -> Self {
        if with_answers {
            QuestionView::Full(question)
        } else {
            QuestionView::Public(PublicQuestion::from(&question))
        }
    }
}

/// DTO for creating or replacing a question.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestion {
    #[validate(length(
        min = 1,
        max = 300,
        message = "Question text must be between 1 and 300 characters"
    ))]
    pub question: String,

    #[serde(default = "default_points")]
    #[validate(range(min = 1, max = 100, message = "Points must be between 1 and 100"))]
    pub points: i64,

    #[validate(length(max = 500), custom(function = crate::utils::validation::validate_image_url))]
    pub image_url: Option<String>,

    #[serde(flatten)]
    #[validate(custom(function = validate_kind))]
    pub kind: QuestionKind,
}

fn default_points() -> i64 {
    MIN_POINTS
}

fn validate_kind(kind: &QuestionKind) -> Result<(), ValidationError> {
    kind.check().map_err(|msg| {
        ValidationError::new("invalid_question").with_message(Cow::Owned(msg))
    })
}

/// DTO for attaching a new question to an existing test.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    pub test_id: String,
    #[serde(flatten)]
    #[validate(nested)]
    pub question: NewQuestion,
}

/// Query parameters for listing questions.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct QuestionListParams {
    /// Owning test id.
    pub test_id: String,
}
