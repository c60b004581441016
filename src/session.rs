// src/session.rs

use std::collections::HashMap;

use crate::{
    error::AppError,
    models::{answer::AnswerValue, test::TestType},
};

/// How questions are walked through while taking a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Every question visible, answered in any order.
    Quiz,
    /// One question at a time; moving on requires an answer.
    Step,
}

impl From<TestType> for SessionMode {
    fn from(test_type: TestType) -> Self {
        match test_type {
            TestType::Quiz => SessionMode::Quiz,
            TestType::Test => SessionMode::Step,
        }
    }
}

/// State of one person taking one test.
#[derive(Debug, Clone)]
pub struct TakingSession {
    mode: SessionMode,
    question_ids: Vec<String>,
    current: usize,
    answers: HashMap<String, AnswerValue>,
}

impl TakingSession {
    pub fn new(mode: SessionMode, question_ids: Vec<String>) -> Self {
        Self {
            mode,
            question_ids,
            current: 0,
            answers: HashMap::new(),
        }
    }

    /// Feeds a complete submission through a fresh session, in question order.
    /// Answers to questions outside the test are dropped.
    pub fn replay(
        mode: SessionMode,
        question_ids: Vec<String>,
        mut submitted: HashMap<String, AnswerValue>,
    ) -> Result<HashMap<String, AnswerValue>, AppError> {
        let mut session = TakingSession::new(mode, question_ids);
        let ids = session.question_ids.clone();
        for (index, id) in ids.iter().enumerate() {
            if let Some(value) = submitted.remove(id) {
                session.answer(id, value)?;
            }
            if mode == SessionMode::Step && index + 1 < ids.len() {
                session.next()?;
            }
        }
        session.finish()
    }

    pub fn current_question(&self) -> Option<&str> {
        self.question_ids.get(self.current).map(String::as_str)
    }

    pub fn is_last(&self) -> bool {
        self.current + 1 >= self.question_ids.len()
    }

    fn is_answered(&self, question_id: &str) -> bool {
        self.answers
            .get(question_id)
            .is_some_and(|value| !value.is_empty())
    }

    /// Records (or replaces) an answer.
    pub fn answer(&mut self, question_id: &str, value: AnswerValue) -> Result<(), AppError> {
        let allowed = match self.mode {
            SessionMode::Quiz => self.question_ids.iter().any(|id| id == question_id),
            SessionMode::Step => self.current_question() == Some(question_id),
        };
        if !allowed {
            return Err(AppError::BadRequest(format!(
                "Question {} cannot be answered now",
                question_id
            )));
        }
        self.answers.insert(question_id.to_string(), value);
        Ok(())
    }

    /// Moves to the next question (step mode only).
    pub fn next(&mut self) -> Result<(), AppError> {
        if self.mode != SessionMode::Step {
            return Err(AppError::BadRequest(
                "All questions are already shown".to_string(),
            ));
        }
        if self.is_last() {
            return Err(AppError::BadRequest("This is the last question".to_string()));
        }
        let current = self.current_question().unwrap_or_default();
        if !self.is_answered(current) {
            return Err(AppError::BadRequest(format!(
                "Question {} must be answered before moving on",
                self.current + 1
            )));
        }
        self.current += 1;
        Ok(())
    }

    pub fn can_submit(&self) -> bool {
        match self.mode {
            SessionMode::Quiz => true,
            SessionMode::Step => {
                self.is_last()
                    && self
                        .current_question()
                        .is_some_and(|id| self.is_answered(id))
            }
        }
    }

    /// Ends the session, yielding the answers to grade.
    pub fn finish(self) -> Result<HashMap<String, AnswerValue>, AppError> {
        if !self.can_submit() {
            return Err(AppError::BadRequest(format!(
                "Question {} must be answered before submitting",
                self.current + 1
            )));
        }
        Ok(self.answers)
    }
}
