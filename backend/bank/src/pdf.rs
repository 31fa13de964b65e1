//! # PDF Question Parser
//!
//! Best-effort extraction of multiple choice questions from the plain text of
//! an uploaded PDF. Expected layout, one item per line:
//!
//! ```text
//! 1. What is 2 + 2?
//! A) 3
//! B) 4 *
//! C) 5
//! ```
//!
//! - `N.` or `N)` starts a question, unless a question is open, its options so
//!   far were all numbered, and `N` is the next option number (1 to 4), in
//!   which case it is an option
//! - `A.` to `D.` or `a)` to `d)` is an option of the open question
//! - anything else continues the last option, or the question when it has no
//!   options yet
//!
//! An option containing a marker (`*`, `правильный`, `верный`, `correct`, `✓`)
//! is correct, and markers are stripped from its text. Questions with fewer
//! than two options are dropped. Without any marker the first option is taken
//! as the answer.
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::QuestionOption;

/// Points given to every imported question.
pub const POINTS_PER_QUESTION: i32 = 10;

const MAX_NUMBERED_OPTIONS: usize = 4;

static NUMBERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)[.)]\s*(.+)$").expect("valid numbered line regex"));

static LETTERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Da-d])[.)]\s*(.+)$").expect("valid lettered line regex"));

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\*|правильный|верный|correct|✓").expect("valid marker regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedQuestion {
    pub question_text: String,
    pub options: Vec<QuestionOption>,
    pub correct_answer: i32,
}

#[derive(Default)]
struct Draft {
    text: String,
    options: Vec<QuestionOption>,
    lettered: bool,
}

impl Draft {
    fn push_option(&mut self, raw: &str) {
        let is_correct = MARKER.is_match(raw);
        let text = strip_markers(raw);

        if !text.is_empty() {
            self.options.push(QuestionOption { text, is_correct });
        }
    }

    fn continue_with(&mut self, line: &str) {
        match self.options.last_mut() {
            Some(option) => {
                option.is_correct |= MARKER.is_match(line);
                let extra = strip_markers(line);
                if !extra.is_empty() {
                    option.text.push(' ');
                    option.text.push_str(&extra);
                }
            }
            None => {
                self.text.push(' ');
                self.text.push_str(line);
            }
        }
    }

    fn finish(self) -> Option<ParsedQuestion> {
        if self.options.len() < 2 {
            return None;
        }

        let correct = self.options.iter().position(|o| o.is_correct).unwrap_or(0);
        let options = self
            .options
            .into_iter()
            .enumerate()
            .map(|(i, option)| QuestionOption {
                text: option.text,
                is_correct: i == correct,
            })
            .collect();

        Some(ParsedQuestion {
            question_text: self.text.trim().to_string(),
            options,
            correct_answer: correct as i32,
        })
    }
}

fn strip_markers(text: &str) -> String {
    MARKER.replace_all(text, "").trim().to_string()
}

pub fn parse_questions(text: &str) -> Vec<ParsedQuestion> {
    let mut questions = Vec::new();
    let mut open: Option<Draft> = None;

    let lines = text
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().count() > 2);

    for line in lines {
        if let Some(caps) = NUMBERED.captures(line) {
            let number = caps[1].parse::<usize>().ok();
            let rest = &caps[2];

            if let Some(draft) = open.as_mut() {
                let next = draft.options.len() + 1;
                if !draft.lettered && number == Some(next) && next <= MAX_NUMBERED_OPTIONS {
                    draft.push_option(rest);
                    continue;
                }
            }

            questions.extend(open.take().and_then(Draft::finish));
            open = Some(Draft {
                text: rest.to_string(),
                ..Draft::default()
            });
            continue;
        }

        let Some(draft) = open.as_mut() else {
            continue;
        };

        match LETTERED.captures(line) {
            Some(caps) => {
                draft.lettered = true;
                draft.push_option(&caps[2]);
            }
            None => draft.continue_with(line),
        }
    }

    questions.extend(open.and_then(Draft::finish));
    questions
}
