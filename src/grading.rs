// src/grading.rs

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{answer::AnswerValue, question::Question, question::QuestionKind};

/// Per-question verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOutcome {
    pub question_id: String,
    pub is_correct: bool,
    pub earned_points: i64,
    pub max_points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeReport {
    pub score: i64,
    pub max_score: i64,
    pub outcomes: Vec<QuestionOutcome>,
}

/// Decides whether a single answer is correct. Scoring is all-or-nothing:
/// partially right answers earn nothing.
///
/// A missing answer, an answer of the wrong shape, or an unsupported
/// question type is simply incorrect.
pub fn grade_question(kind: &QuestionKind, answer: Option<&AnswerValue>) -> bool {
    let Some(answer) = answer else {
        return false;
    };

    match (kind, answer) {
        (QuestionKind::Single { correct_answer, .. }, AnswerValue::Text(given)) => {
            given == correct_answer
        }
        (QuestionKind::Multiple { correct_answer, .. }, AnswerValue::List(given)) => {
            if given.len() != correct_answer.len() {
                return false;
            }
            let expected: HashSet<&String> = correct_answer.iter().collect();
            let given: HashSet<&String> = given.iter().collect();
            given == expected
        }
        (QuestionKind::Order { order }, AnswerValue::List(given)) => given == order,
        (QuestionKind::Match { match_pairs }, AnswerValue::Pairs(given)) => {
            match_pairs.iter().all(|pair| {
                !pair.left.is_empty()
                    && !pair.right.is_empty()
                    && given.get(&pair.left) == Some(&pair.right)
            })
        }
        _ => false,
    }
}

/// Grades a submission against the stored questions (in display order).
/// `answers` is keyed by question id; unknown ids are ignored.
pub fn grade(questions: &[Question], answers: &HashMap<String, AnswerValue>) -> GradeReport {
    let outcomes: Vec<QuestionOutcome> = questions
        .iter()
        .map(|question| {
            let is_correct = grade_question(&question.kind, answers.get(&question.id));
            QuestionOutcome {
                question_id: question.id.clone(),
                is_correct,
                earned_points: if is_correct { question.points } else { 0 },
                max_points: question.points,
            }
        })
        .collect();

    GradeReport {
        score: outcomes.iter().map(|o| o.earned_points).sum(),
        max_score: outcomes.iter().map(|o| o.max_points).sum(),
        outcomes,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::models::question::MatchPair;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn text(value: &str) -> AnswerValue {
        AnswerValue::Text(value.to_string())
    }

    fn list(items: &[&str]) -> AnswerValue {
        AnswerValue::List(strings(items))
    }

    fn pairs(items: &[(&str, &str)]) -> AnswerValue {
        AnswerValue::Pairs(
            items
                .iter()
                .map(|(l, r)| (l.to_string(), r.to_string()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    fn single() -> QuestionKind {
        QuestionKind::Single {
            options: strings(&["3", "4"]),
            correct_answer: "4".to_string(),
        }
    }

    fn multiple() -> QuestionKind {
        QuestionKind::Multiple {
            options: strings(&["A", "B", "C"]),
            correct_answer: strings(&["A", "C"]),
        }
    }

    fn order() -> QuestionKind {
        QuestionKind::Order {
            order: strings(&["x", "y", "z"]),
        }
    }

    fn matching() -> QuestionKind {
        QuestionKind::Match {
            match_pairs: vec![
                MatchPair { left: "1".into(), right: "one".into() },
                MatchPair { left: "2".into(), right: "two".into() },
            ],
        }
    }

    #[test]
    fn single_is_exact_and_case_sensitive() {
        assert!(grade_question(&single(), Some(&text("4"))));
        assert!(!grade_question(&single(), Some(&text("3"))));
        let kind = QuestionKind::Single {
            options: strings(&["Paris", "Rome"]),
            correct_answer: "Paris".into(),
        };
        assert!(!grade_question(&kind, Some(&text("paris"))));
    }

    #[test]
    fn multiple_is_set_equality() {
        assert!(grade_question(&multiple(), Some(&list(&["C", "A"]))));
        assert!(!grade_question(&multiple(), Some(&list(&["A"]))));
        assert!(!grade_question(&multiple(), Some(&list(&["A", "B", "C"]))));
        // Same length but a duplicate instead of the second answer.
        assert!(!grade_question(&multiple(), Some(&list(&["A", "A"]))));
    }

    #[test]
    fn order_requires_full_sequence() {
        assert!(grade_question(&order(), Some(&list(&["x", "y", "z"]))));
        assert!(!grade_question(&order(), Some(&list(&["y", "x", "z"]))));
        assert!(!grade_question(&order(), Some(&list(&["x", "y"]))));
        assert!(!grade_question(&order(), Some(&list(&["x", "y", "z", "w"]))));
    }

    #[test]
    fn match_requires_every_pair() {
        assert!(grade_question(&matching(), Some(&pairs(&[("1", "one"), ("2", "two")]))));
        assert!(!grade_question(&matching(), Some(&pairs(&[("1", "two"), ("2", "one")]))));
        assert!(!grade_question(&matching(), Some(&pairs(&[("1", "one")]))));
    }

    #[test]
    fn match_with_blank_side_never_grades_correct() {
        let kind = QuestionKind::Match {
            match_pairs: vec![
                MatchPair { left: "1".into(), right: "".into() },
                MatchPair { left: "2".into(), right: "two".into() },
            ],
        };
        assert!(!grade_question(&kind, Some(&pairs(&[("1", ""), ("2", "two")]))));
    }

    #[test]
    fn missing_wrong_shape_and_unsupported_are_incorrect() {
        assert!(!grade_question(&single(), None));
        assert!(!grade_question(&single(), Some(&list(&["4"]))));
        assert!(!grade_question(&order(), Some(&text("x"))));
        assert!(!grade_question(&QuestionKind::Unsupported, Some(&text("x"))));
    }

    fn question(id: &str, points: i64, kind: QuestionKind) -> Question {
        Question {
            id: id.to_string(),
            test_id: "t".to_string(),
            position: 0,
            question: "?".to_string(),
            points,
            image_url: None,
            kind,
        }
    }

    #[test]
    fn report_sums_points() {
        let questions = vec![
            question("q1", 1, single()),
            question("q2", 3, multiple()),
            question("q3", 2, order()),
        ];
        let mut answers = HashMap::new();
        answers.insert("q1".to_string(), text("4"));
        answers.insert("q2".to_string(), list(&["A"]));
        answers.insert("q3".to_string(), list(&["x", "y", "z"]));
        answers.insert("unknown".to_string(), text("ignored"));

        let report = grade(&questions, &answers);
        assert_eq!(report.score, 3);
        assert_eq!(report.max_score, 6);
        assert_eq!(report.outcomes.len(), 3);
        assert!(report.outcomes[0].is_correct);
        assert_eq!(report.outcomes[1].earned_points, 0);
        assert_eq!(report.outcomes[2].earned_points, 2);
        assert!(report.score <= report.max_score);
    }

    #[test]
    fn empty_submission_scores_zero() {
        let questions = vec![question("q1", 5, single()), question("q2", 1, matching())];
        let report = grade(&questions, &HashMap::new());
        assert_eq!(report.score, 0);
        assert_eq!(report.max_score, 6);
    }
}
