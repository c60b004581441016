// src/authoring.rs

//! Test authoring form.
//!
//! A draft moves through two steps: `Info` (title, description, type, tags,
//! cover image) and `Questions` (one editor per question). Editors enforce the
//! same limits as the API so a finished draft always passes server validation.

use validator::Validate;

use crate::{
    error::AppError,
    models::{
        question::{
            MAX_ITEMS, MAX_OPTION_LENGTH, MAX_POINTS, MAX_QUESTION_LENGTH, MIN_ITEMS, MIN_POINTS,
            MatchPair, NewQuestion, QuestionKind,
        },
        tag::{check_tag_name, normalize_tag_name},
        test::{
            CreateTestRequest, MAX_DESCRIPTION_LENGTH, MAX_TAGS, MAX_TITLE_LENGTH, TestType,
        },
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftStep {
    Info,
    Questions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionType {
    Single,
    Multiple,
    Order,
    Match,
}

#[derive(Debug, Clone)]
pub struct TestDraft {
    step: DraftStep,
    pub title: String,
    pub description: String,
    pub test_type: Option<TestType>,
    pub image_url: Option<String>,
    tags: Vec<String>,
    questions: Vec<QuestionDraft>,
}

impl Default for TestDraft {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDraft {
    pub fn new() -> Self {
        Self {
            step: DraftStep::Info,
            title: String::new(),
            description: String::new(),
            test_type: None,
            image_url: None,
            tags: Vec::new(),
            questions: Vec::new(),
        }
    }

    pub fn step(&self) -> DraftStep {
        self.step
    }

    /// Info -> Questions. Title, description and type must be filled in.
    pub fn advance(&mut self) -> Result<(), AppError> {
        if self.step == DraftStep::Questions {
            return Err(AppError::BadRequest("Already on the last step".to_string()));
        }
        if self.title.trim().is_empty() {
            return Err(AppError::BadRequest("Title is required".to_string()));
        }
        if self.title.trim().chars().count() > MAX_TITLE_LENGTH {
            return Err(AppError::BadRequest(format!(
                "Title must be at most {} characters",
                MAX_TITLE_LENGTH
            )));
        }
        if self.description.trim().is_empty() {
            return Err(AppError::BadRequest("Description is required".to_string()));
        }
        if self.description.trim().chars().count() > MAX_DESCRIPTION_LENGTH {
            return Err(AppError::BadRequest(format!(
                "Description must be at most {} characters",
                MAX_DESCRIPTION_LENGTH
            )));
        }
        if self.test_type.is_none() {
            return Err(AppError::BadRequest("Choose a test type".to_string()));
        }
        self.step = DraftStep::Questions;
        Ok(())
    }

    pub fn back(&mut self) {
        self.step = DraftStep::Info;
    }

    pub fn add_tag(&mut self, name: &str) -> Result<(), AppError> {
        let name = check_tag_name(name)?;
        if self.tags.contains(&name) {
            return Err(AppError::BadRequest(format!("Tag '{}' is already added", name)));
        }
        if self.tags.len() >= MAX_TAGS {
            return Err(AppError::BadRequest(format!(
                "A test can have at most {} tags",
                MAX_TAGS
            )));
        }
        self.tags.push(name);
        Ok(())
    }

    pub fn remove_tag(&mut self, name: &str) {
        let name = normalize_tag_name(name);
        self.tags.retain(|tag| *tag != name);
    }

    /// Appends a blank editor of the given type and returns its index.
    pub fn add_question(&mut self, question_type: QuestionType) -> usize {
        self.questions.push(QuestionDraft::new(question_type));
        self.questions.len() - 1
    }

    pub fn remove_question(&mut self, index: usize) -> Result<QuestionDraft, AppError> {
        if index >= self.questions.len() {
            return Err(no_such("question", index));
        }
        Ok(self.questions.remove(index))
    }

    pub fn question_mut(&mut self, index: usize) -> Result<&mut QuestionDraft, AppError> {
        self.questions
            .get_mut(index)
            .ok_or_else(|| no_such("question", index))
    }

    /// Validates the whole draft and produces the create request.
    /// Tags travel as names and are resolved (or created) by the server.
    pub fn finish(&self) -> Result<CreateTestRequest, AppError> {
        if self.step != DraftStep::Questions {
            return Err(AppError::BadRequest(
                "Fill in the test information first".to_string(),
            ));
        }
        let test_type = self
            .test_type
            .ok_or_else(|| AppError::BadRequest("Choose a test type".to_string()))?;

        let questions = self
            .questions
            .iter()
            .enumerate()
            .map(|(index, draft)| {
                draft.to_new_question().map_err(|e| match e {
                    AppError::BadRequest(msg) => {
                        AppError::BadRequest(format!("Question {}: {}", index + 1, msg))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let request = CreateTestRequest {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            test_type,
            tags: Vec::new(),
            new_tags: self.tags.clone(),
            image_url: self.image_url.clone(),
            questions,
        };
        request.check()?;
        Ok(request)
    }
}

/// Type-specific editor state. Unlike `QuestionKind` it tolerates blanks
/// and a missing correct answer while the author is still typing.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftBody {
    Single {
        options: Vec<String>,
        correct: Option<String>,
    },
    Multiple {
        options: Vec<String>,
        correct: Vec<String>,
    },
    Order {
        items: Vec<String>,
    },
    Match {
        pairs: Vec<MatchPair>,
    },
}

#[derive(Debug, Clone)]
pub struct QuestionDraft {
    text: String,
    points: i64,
    pub image_url: Option<String>,
    body: DraftBody,
}

impl QuestionDraft {
    /// A blank editor starts with two empty slots.
    pub fn new(question_type: QuestionType) -> Self {
        let blanks = || vec![String::new(); MIN_ITEMS];
        let body = match question_type {
            QuestionType::Single => DraftBody::Single {
                options: blanks(),
                correct: None,
            },
            QuestionType::Multiple => DraftBody::Multiple {
                options: blanks(),
                correct: Vec::new(),
            },
            QuestionType::Order => DraftBody::Order { items: blanks() },
            QuestionType::Match => DraftBody::Match {
                pairs: (0..MIN_ITEMS)
                    .map(|_| MatchPair {
                        left: String::new(),
                        right: String::new(),
                    })
                    .collect(),
            },
        };
        Self {
            text: String::new(),
            points: MIN_POINTS,
            image_url: None,
            body,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn points(&self) -> i64 {
        self.points
    }

    pub fn body(&self) -> &DraftBody {
        &self.body
    }

    pub fn set_text(&mut self, text: &str) -> Result<(), AppError> {
        if text.chars().count() > MAX_QUESTION_LENGTH {
            return Err(AppError::BadRequest(format!(
                "Question text must be at most {} characters",
                MAX_QUESTION_LENGTH
            )));
        }
        self.text = text.to_string();
        Ok(())
    }

    pub fn set_points(&mut self, points: i64) {
        self.points = points.clamp(MIN_POINTS, MAX_POINTS);
    }

    fn options_mut(&mut self) -> Result<&mut Vec<String>, AppError> {
        match &mut self.body {
            DraftBody::Single { options, .. } | DraftBody::Multiple { options, .. } => Ok(options),
            _ => Err(wrong_kind("options")),
        }
    }

    fn items_mut(&mut self) -> Result<&mut Vec<String>, AppError> {
        match &mut self.body {
            DraftBody::Order { items } => Ok(items),
            _ => Err(wrong_kind("order items")),
        }
    }

    fn pairs_mut(&mut self) -> Result<&mut Vec<MatchPair>, AppError> {
        match &mut self.body {
            DraftBody::Match { pairs } => Ok(pairs),
            _ => Err(wrong_kind("match pairs")),
        }
    }

    /// Drops correct answers that are no longer among the options.
    fn prune_correct(&mut self) {
        match &mut self.body {
            DraftBody::Single { options, correct } => {
                if correct.as_ref().is_some_and(|c| !options.contains(c)) {
                    *correct = None;
                }
            }
            DraftBody::Multiple { options, correct } => {
                correct.retain(|c| options.contains(c));
            }
            _ => {}
        }
    }

    pub fn add_option(&mut self, value: &str) -> Result<(), AppError> {
        let options = self.options_mut()?;
        push_entry(options, value)
    }

    pub fn set_option(&mut self, index: usize, value: &str) -> Result<(), AppError> {
        let options = self.options_mut()?;
        set_entry(options, index, value)?;
        self.prune_correct();
        Ok(())
    }

    pub fn remove_option(&mut self, index: usize) -> Result<(), AppError> {
        let options = self.options_mut()?;
        remove_entry(options, index)?;
        self.prune_correct();
        Ok(())
    }

    /// Marks the single correct option.
    pub fn set_correct(&mut self, value: &str) -> Result<(), AppError> {
        match &mut self.body {
            DraftBody::Single { options, correct } => {
                if value.trim().is_empty() || !options.iter().any(|o| o == value) {
                    return Err(AppError::BadRequest(
                        "The correct answer must be one of the options".to_string(),
                    ));
                }
                *correct = Some(value.to_string());
                Ok(())
            }
            _ => Err(wrong_kind("a single correct answer")),
        }
    }

    /// Adds or removes an option from the correct answers of a multiple choice question.
    pub fn toggle_correct(&mut self, value: &str) -> Result<(), AppError> {
        match &mut self.body {
            DraftBody::Multiple { options, correct } => {
                if let Some(pos) = correct.iter().position(|c| c == value) {
                    correct.remove(pos);
                    return Ok(());
                }
                if value.trim().is_empty() || !options.iter().any(|o| o == value) {
                    return Err(AppError::BadRequest(
                        "A correct answer must be one of the options".to_string(),
                    ));
                }
                correct.push(value.to_string());
                Ok(())
            }
            _ => Err(wrong_kind("several correct answers")),
        }
    }

    pub fn add_item(&mut self, value: &str) -> Result<(), AppError> {
        push_entry(self.items_mut()?, value)
    }

    pub fn set_item(&mut self, index: usize, value: &str) -> Result<(), AppError> {
        set_entry(self.items_mut()?, index, value)
    }

    pub fn remove_item(&mut self, index: usize) -> Result<(), AppError> {
        remove_entry(self.items_mut()?, index)
    }

    /// Moves an order item, shifting the ones in between.
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<(), AppError> {
        let items = self.items_mut()?;
        if from >= items.len() || to >= items.len() {
            return Err(no_such("item", from.max(to)));
        }
        let item = items.remove(from);
        items.insert(to, item);
        Ok(())
    }

    pub fn add_pair(&mut self, left: &str, right: &str) -> Result<(), AppError> {
        let pairs = self.pairs_mut()?;
        if pairs.len() >= MAX_ITEMS {
            return Err(too_many());
        }
        check_pair_sides(pairs, None, left, right)?;
        pairs.push(MatchPair {
            left: left.to_string(),
            right: right.to_string(),
        });
        Ok(())
    }

    pub fn set_pair(&mut self, index: usize, left: &str, right: &str) -> Result<(), AppError> {
        let pairs = self.pairs_mut()?;
        if index >= pairs.len() {
            return Err(no_such("pair", index));
        }
        check_pair_sides(pairs, Some(index), left, right)?;
        pairs[index] = MatchPair {
            left: left.to_string(),
            right: right.to_string(),
        };
        Ok(())
    }

    pub fn remove_pair(&mut self, index: usize) -> Result<(), AppError> {
        let pairs = self.pairs_mut()?;
        if index >= pairs.len() {
            return Err(no_such("pair", index));
        }
        if pairs.len() <= MIN_ITEMS {
            return Err(too_few());
        }
        pairs.remove(index);
        Ok(())
    }

    /// Converts the editor into a validated question.
    pub fn to_new_question(&self) -> Result<NewQuestion, AppError> {
        let kind = match &self.body {
            DraftBody::Single { options, correct } => QuestionKind::Single {
                options: options.clone(),
                correct_answer: correct.clone().ok_or_else(|| {
                    AppError::BadRequest("Select the correct answer".to_string())
                })?,
            },
            DraftBody::Multiple { options, correct } => QuestionKind::Multiple {
                options: options.clone(),
                correct_answer: correct.clone(),
            },
            DraftBody::Order { items } => QuestionKind::Order {
                order: items.clone(),
            },
            DraftBody::Match { pairs } => QuestionKind::Match {
                match_pairs: pairs.clone(),
            },
        };
        kind.check().map_err(AppError::BadRequest)?;

        let question = NewQuestion {
            question: self.text.trim().to_string(),
            points: self.points,
            image_url: self.image_url.clone(),
            kind,
        };
        question.validate()?;
        Ok(question)
    }
}

fn no_such(what: &str, index: usize) -> AppError {
    AppError::BadRequest(format!("There is no {} #{}", what, index + 1))
}

fn wrong_kind(what: &str) -> AppError {
    AppError::BadRequest(format!("This question type has no {}", what))
}

fn too_many() -> AppError {
    AppError::BadRequest(format!("At most {} entries are allowed", MAX_ITEMS))
}

fn too_few() -> AppError {
    AppError::BadRequest(format!("At least {} entries are required", MIN_ITEMS))
}

/// Blank entries are allowed while editing; filled ones must be unique after trim.
fn check_entry(entries: &[String], skip: Option<usize>, value: &str) -> Result<(), AppError> {
    if value.trim().chars().count() > MAX_OPTION_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Entries must be at most {} characters",
            MAX_OPTION_LENGTH
        )));
    }
    let trimmed = value.trim();
    let duplicate = !trimmed.is_empty()
        && entries
            .iter()
            .enumerate()
            .any(|(i, entry)| Some(i) != skip && entry.trim() == trimmed);
    if duplicate {
        return Err(AppError::BadRequest(format!("'{}' is already listed", trimmed)));
    }
    Ok(())
}

fn push_entry(entries: &mut Vec<String>, value: &str) -> Result<(), AppError> {
    if entries.len() >= MAX_ITEMS {
        return Err(too_many());
    }
    check_entry(entries, None, value)?;
    entries.push(value.to_string());
    Ok(())
}

fn set_entry(entries: &mut [String], index: usize, value: &str) -> Result<(), AppError> {
    if index >= entries.len() {
        return Err(no_such("entry", index));
    }
    check_entry(entries, Some(index), value)?;
    entries[index] = value.to_string();
    Ok(())
}

fn remove_entry(entries: &mut Vec<String>, index: usize) -> Result<(), AppError> {
    if index >= entries.len() {
        return Err(no_such("entry", index));
    }
    if entries.len() <= MIN_ITEMS {
        return Err(too_few());
    }
    entries.remove(index);
    Ok(())
}

fn check_pair_sides(
    pairs: &[MatchPair],
    skip: Option<usize>,
    left: &str,
    right: &str,
) -> Result<(), AppError> {
    let lefts: Vec<String> = pairs.iter().map(|p| p.left.clone()).collect();
    let rights: Vec<String> = pairs.iter().map(|p| p.right.clone()).collect();
    check_entry(&lefts, skip, left)?;
    check_entry(&rights, skip, right)
}
