//! Grading of a submitted attempt.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AnswerDetail, Question};

/// Selected index recorded for a question the taker never answered.
pub const UNANSWERED: i32 = -1;

/// Upper bound on the points a single question may carry.
pub const MAX_QUESTION_POINTS: i32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Score does not fit in a result")]
pub struct ScoreOverflow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: Uuid,
    pub selected_answer: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub score: i32,
    pub correct_answers: i32,
    pub total_questions: i32,
    pub answers: Vec<AnswerDetail>,
}

fn detail(question: &Question, selected_answer: i32) -> AnswerDetail {
    AnswerDetail {
        question_id: question.id,
        question_text: question.question_text.clone(),
        selected_answer,
        correct_answer: question.correct_answer,
        is_correct: selected_answer == question.correct_answer,
        explanation: question.explanation.clone(),
        options: question.options.0.clone(),
    }
}

/// Grades `submitted` against the questions of one test.
///
/// Answers naming a question outside `questions` are skipped, and only the
/// first answer per question counts. `total_questions` is the size of the
/// test, not the number of answers.
pub fn grade(questions: &[Question], submitted: &[SubmittedAnswer]) -> Result<Grade, ScoreOverflow> {
    let mut seen = HashSet::new();
    let mut score: i32 = 0;
    let mut correct_answers = 0;
    let mut answers = Vec::with_capacity(submitted.len());

    for answer in submitted {
        let Some(question) = questions.iter().find(|q| q.id == answer.question_id) else {
            continue;
        };
        if !seen.insert(question.id) {
            continue;
        }

        let line = detail(question, answer.selected_answer);
        if line.is_correct {
            score = score.checked_add(question.points).ok_or(ScoreOverflow)?;
            correct_answers += 1;
        }
        answers.push(line);
    }

    Ok(Grade {
        score,
        correct_answers,
        total_questions: questions.len() as i32,
        answers,
    })
}

/// Rebuilds a stored breakdown against the current questions of the test,
/// in question order. Questions missing from `stored` get [`UNANSWERED`].
pub fn rebuild(questions: &[Question], stored: &[AnswerDetail]) -> Vec<AnswerDetail> {
    questions
        .iter()
        .map(|question| {
            let selected = stored
                .iter()
                .find(|a| a.question_id == question.id)
                .map_or(UNANSWERED, |a| a.selected_answer);

            detail(question, selected)
        })
        .collect()
}
