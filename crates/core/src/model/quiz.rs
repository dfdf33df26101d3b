use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{LessonId, QuizId, UserId};
use crate::model::percent::Percent;

/// Passing score applied when a quiz definition does not set one.
pub const DEFAULT_PASSING_SCORE: u8 = 70;

/// Points applied when a question does not set its own weight.
pub const DEFAULT_QUESTION_POINTS: u32 = 1;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("question {index} must be worth at least one point")]
    ZeroPoints { index: usize },

    #[error("question {index} needs at least two options")]
    TooFewOptions { index: usize },

    #[error("question {index} has no correct option")]
    NoCorrectOption { index: usize },

    #[error("question {index} has {count} correct options, expected exactly one")]
    MultipleCorrectOptions { index: usize, count: usize },

    #[error("correct option {correct} is out of range for {options} options")]
    CorrectIndexOutOfRange { correct: usize, options: usize },

    #[error("invalid answer entry: {0}")]
    InvalidAnswer(String),
}

//
// ─── STATUS & KINDS ────────────────────────────────────────────────────────────
//

/// Publication state of a quiz. Learners can only submit to active quizzes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizStatus {
    #[default]
    Draft,
    Active,
}

impl QuizStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    #[default]
    SingleChoice,
    TrueFalse,
}

impl QuestionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleChoice => "single_choice",
            Self::TrueFalse => "true_false",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "single_choice" => Some(Self::SingleChoice),
            "true_false" => Some(Self::TrueFalse),
            _ => None,
        }
    }
}

//
// ─── QUESTIONS ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizOption {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

impl QuizOption {
    #[must_use]
    pub fn new(text: impl Into<String>, is_correct: bool) -> Self {
        Self {
            text: text.into(),
            is_correct,
        }
    }
}

fn default_points() -> u32 {
    DEFAULT_QUESTION_POINTS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub kind: QuestionKind,
    #[serde(default = "default_points")]
    pub points: u32,
    pub options: Vec<QuizOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Question {
    /// Build a single-choice question from option texts and the index of the
    /// correct one.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::CorrectIndexOutOfRange` if `correct` does not point
    /// at one of the options.
    pub fn single_choice<S: Into<String>>(
        text: impl Into<String>,
        options: impl IntoIterator<Item = S>,
        correct: usize,
        points: u32,
    ) -> Result<Self, QuizError> {
        let options: Vec<QuizOption> = options
            .into_iter()
            .enumerate()
            .map(|(i, label)| QuizOption::new(label, i == correct))
            .collect();
        if correct >= options.len() {
            return Err(QuizError::CorrectIndexOutOfRange {
                correct,
                options: options.len(),
            });
        }
        Ok(Self {
            text: text.into(),
            kind: QuestionKind::SingleChoice,
            points,
            options,
            explanation: None,
        })
    }

    /// Build a yes/no question. Option 0 is "Yes", option 1 is "No".
    #[must_use]
    pub fn true_false(text: impl Into<String>, yes_is_correct: bool, points: u32) -> Self {
        Self {
            text: text.into(),
            kind: QuestionKind::TrueFalse,
            points,
            options: vec![
                QuizOption::new("Yes", yes_is_correct),
                QuizOption::new("No", !yes_is_correct),
            ],
            explanation: None,
        }
    }

    #[must_use]
    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    /// Index of the option flagged correct, if there is exactly one.
    #[must_use]
    pub fn correct_option(&self) -> Option<usize> {
        let mut correct = self.options.iter().enumerate().filter(|(_, o)| o.is_correct);
        match (correct.next(), correct.next()) {
            (Some((i, _)), None) => Some(i),
            _ => None,
        }
    }

    fn validate(&self, index: usize) -> Result<(), QuizError> {
        if self.points == 0 {
            return Err(QuizError::ZeroPoints { index });
        }
        if self.options.len() < 2 {
            return Err(QuizError::TooFewOptions { index });
        }
        match self.options.iter().filter(|o| o.is_correct).count() {
            0 => Err(QuizError::NoCorrectOption { index }),
            1 => Ok(()),
            count => Err(QuizError::MultipleCorrectOptions { index, count }),
        }
    }
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

/// A graded quiz attached to a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "QuizDefinition")]
pub struct Quiz {
    id: QuizId,
    lesson_id: Option<LessonId>,
    title: String,
    passing_score_percent: Percent,
    time_limit_minutes: Option<u32>,
    status: QuizStatus,
    questions: Vec<Question>,
}

fn default_passing_score() -> Percent {
    Percent::new(DEFAULT_PASSING_SCORE)
}

/// Unvalidated quiz payload as received from the catalog.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizDefinition {
    pub id: QuizId,
    #[serde(default)]
    pub lesson_id: Option<LessonId>,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_passing_score")]
    pub passing_score_percent: Percent,
    #[serde(default)]
    pub time_limit_minutes: Option<u32>,
    #[serde(default)]
    pub status: QuizStatus,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl QuizDefinition {
    /// Starts a definition with the default passing score and no questions.
    #[must_use]
    pub fn new(id: QuizId, title: impl Into<String>) -> Self {
        Self {
            id,
            lesson_id: None,
            title: title.into(),
            passing_score_percent: default_passing_score(),
            time_limit_minutes: None,
            status: QuizStatus::Draft,
            questions: Vec::new(),
        }
    }
}

impl TryFrom<QuizDefinition> for Quiz {
    type Error = QuizError;

    fn try_from(def: QuizDefinition) -> Result<Self, Self::Error> {
        Quiz::new(def)
    }
}

impl Quiz {
    /// Validate a definition: every question needs positive points, at least
    /// two options and exactly one correct option.
    ///
    /// A quiz with no questions is valid; it simply cannot be passed.
    ///
    /// # Errors
    ///
    /// Returns the first `QuizError` found, tagged with the question index.
    pub fn new(def: QuizDefinition) -> Result<Self, QuizError> {
        for (index, question) in def.questions.iter().enumerate() {
            question.validate(index)?;
        }
        Ok(Self {
            id: def.id,
            lesson_id: def.lesson_id,
            title: def.title,
            passing_score_percent: def.passing_score_percent,
            time_limit_minutes: def.time_limit_minutes.filter(|m| *m > 0),
            status: def.status,
            questions: def.questions,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuizId {
        self.id
    }

    #[must_use]
    pub fn lesson_id(&self) -> Option<LessonId> {
        self.lesson_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn passing_score_percent(&self) -> Percent {
        self.passing_score_percent
    }

    #[must_use]
    pub fn time_limit_minutes(&self) -> Option<u32> {
        self.time_limit_minutes
    }

    #[must_use]
    pub fn status(&self) -> QuizStatus {
        self.status
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == QuizStatus::Active
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn total_points(&self) -> u64 {
        self.questions.iter().map(|q| u64::from(q.points)).sum()
    }

    /// Whether an attempt started and submitted at the given times stays
    /// within the time limit. Always `true` for untimed quizzes.
    #[must_use]
    pub fn is_within_time_limit(
        &self,
        started_at: DateTime<Utc>,
        submitted_at: DateTime<Utc>,
    ) -> bool {
        match self.time_limit_minutes {
            Some(minutes) => submitted_at - started_at <= Duration::minutes(i64::from(minutes)),
            None => true,
        }
    }
}

//
// ─── ANSWERS ───────────────────────────────────────────────────────────────────
//

/// Learner selections: question index → option index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Answers(BTreeMap<usize, usize>);

impl Answers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select an option, replacing any earlier selection for the question.
    pub fn select(&mut self, question: usize, option: usize) {
        self.0.insert(question, option);
    }

    #[must_use]
    pub fn with(mut self, question: usize, option: usize) -> Self {
        self.select(question, option);
        self
    }

    #[must_use]
    pub fn selected(&self, question: usize) -> Option<usize> {
        self.0.get(&question).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.0.iter().map(|(q, o)| (*q, *o))
    }
}

impl FromIterator<(usize, usize)> for Answers {
    fn from_iter<T: IntoIterator<Item = (usize, usize)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Parses `"0=1,1=0"` style selections. Whitespace around entries is ignored
/// and an empty string yields no answers.
impl FromStr for Answers {
    type Err = QuizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut answers = Answers::new();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (question, option) = entry
                .split_once('=')
                .ok_or_else(|| QuizError::InvalidAnswer(entry.to_owned()))?;
            let question = question
                .trim()
                .parse::<usize>()
                .map_err(|_| QuizError::InvalidAnswer(entry.to_owned()))?;
            let option = option
                .trim()
                .parse::<usize>()
                .map_err(|_| QuizError::InvalidAnswer(entry.to_owned()))?;
            answers.select(question, option);
        }
        Ok(answers)
    }
}

impl fmt::Display for Answers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (q, o) in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{q}={o}")?;
            first = false;
        }
        Ok(())
    }
}

//
// ─── ATTEMPT & RESULT ──────────────────────────────────────────────────────────
//

/// One submission of answers for grading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    pub quiz_id: QuizId,
    pub user_id: UserId,
    pub answers: Answers,
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
}

/// How a single question was scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOutcome {
    pub index: usize,
    pub selected: Option<usize>,
    pub correct_option: Option<usize>,
    pub awarded_points: u32,
}

impl QuestionOutcome {
    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.awarded_points > 0
    }
}

/// Score for one attempt. `passed` means `percent >= passing score` on a
/// quiz worth at least one point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub correct_count: u32,
    pub total_questions: u32,
    pub earned_points: u64,
    pub total_points: u64,
    pub percent: Percent,
    pub passed: bool,
    pub outcomes: Vec<QuestionOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn definition(questions: Vec<Question>) -> QuizDefinition {
        let mut def = QuizDefinition::new(QuizId::new(1), "Checkpoint");
        def.questions = questions;
        def
    }

    #[test]
    fn single_choice_marks_correct_index() {
        let q = Question::single_choice("2+2?", ["3", "4", "5"], 1, 5).unwrap();
        assert_eq!(q.correct_option(), Some(1));
        assert_eq!(q.options.len(), 3);
        assert_eq!(q.points, 5);
    }

    #[test]
    fn single_choice_rejects_out_of_range_correct_index() {
        let err = Question::single_choice("?", ["a", "b"], 2, 1).unwrap_err();
        assert_eq!(
            err,
            QuizError::CorrectIndexOutOfRange {
                correct: 2,
                options: 2
            }
        );
    }

    #[test]
    fn true_false_has_yes_and_no() {
        let q = Question::true_false("Rust has a GC?", false, 1);
        assert_eq!(q.options[0].text, "Yes");
        assert_eq!(q.options[1].text, "No");
        assert_eq!(q.correct_option(), Some(1));
        assert_eq!(q.kind, QuestionKind::TrueFalse);
    }

    #[test]
    fn quiz_validation_reports_question_index() {
        let mut bad = Question::true_false("?", true, 1);
        bad.options[1].is_correct = true;
        let err = Quiz::new(definition(vec![Question::true_false("ok", true, 1), bad])).unwrap_err();
        assert_eq!(
            err,
            QuizError::MultipleCorrectOptions { index: 1, count: 2 }
        );

        let zero = Question::true_false("?", true, 0);
        let err = Quiz::new(definition(vec![zero])).unwrap_err();
        assert_eq!(err, QuizError::ZeroPoints { index: 0 });
    }

    #[test]
    fn empty_quiz_is_valid() {
        let quiz = Quiz::new(definition(Vec::new())).unwrap();
        assert_eq!(quiz.total_points(), 0);
        assert_eq!(quiz.passing_score_percent().value(), DEFAULT_PASSING_SCORE);
    }

    #[test]
    fn definition_defaults_from_json() {
        let json = r#"{
            "id": 3,
            "questions": [
                { "options": [ { "isCorrect": true }, { "isCorrect": false } ] }
            ]
        }"#;
        let quiz: Quiz = serde_json::from_str(json).unwrap();
        assert_eq!(quiz.passing_score_percent().value(), 70);
        assert_eq!(quiz.questions()[0].points, DEFAULT_QUESTION_POINTS);
        assert_eq!(quiz.status(), QuizStatus::Draft);
    }

    #[test]
    fn time_limit_check() {
        let mut def = definition(Vec::new());
        def.time_limit_minutes = Some(10);
        let quiz = Quiz::new(def).unwrap();
        let start = fixed_now();
        assert!(quiz.is_within_time_limit(start, start + Duration::minutes(10)));
        assert!(!quiz.is_within_time_limit(start, start + Duration::minutes(11)));

        let untimed = Quiz::new(definition(Vec::new())).unwrap();
        assert!(untimed.is_within_time_limit(start, start + Duration::days(3)));
    }

    #[test]
    fn zero_minute_limit_means_untimed() {
        let mut def = definition(Vec::new());
        def.time_limit_minutes = Some(0);
        let quiz = Quiz::new(def).unwrap();
        assert_eq!(quiz.time_limit_minutes(), None);
    }

    #[test]
    fn answers_parse_and_display() {
        let answers: Answers = "0=1, 2=0".parse().unwrap();
        assert_eq!(answers.selected(0), Some(1));
        assert_eq!(answers.selected(1), None);
        assert_eq!(answers.to_string(), "0=1,2=0");
        assert!("".parse::<Answers>().unwrap().is_empty());
        assert!("0:1".parse::<Answers>().is_err());
    }

    #[test]
    fn answers_later_selection_wins() {
        let answers = Answers::new().with(0, 1).with(0, 2);
        assert_eq!(answers.selected(0), Some(2));
        assert_eq!(answers.len(), 1);
    }
}
