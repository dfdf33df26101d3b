//! Point-weighted quiz scoring.
//!
//! Grading is total: partial, empty and out-of-range answers all produce a
//! result. Each question is worth its `points`; the percent is earned over
//! total points, rounded half up.

use crate::model::{Answers, Percent, QuestionOutcome, Quiz, QuizResult};

/// Score an attempt against the quiz definition.
///
/// Missing answers and option indices past the end of a question's options
/// score zero. A quiz without questions yields 0% and is never passed.
///
/// ```
/// # use course_core::grader::grade;
/// # use course_core::model::{Answers, Question, Quiz, QuizDefinition, QuizId};
/// let mut def = QuizDefinition::new(QuizId::new(1), "Ownership");
/// def.questions = vec![
///     Question::true_false("Can a value have two owners?", false, 10),
///     Question::true_false("Is borrowing free at runtime?", true, 10),
/// ];
/// let quiz = Quiz::new(def).unwrap();
///
/// let result = grade(&quiz, &Answers::new().with(0, 1));
/// assert_eq!(result.earned_points, 10);
/// assert_eq!(result.percent.value(), 50);
/// assert!(!result.passed);
/// ```
#[must_use]
pub fn grade(quiz: &Quiz, answers: &Answers) -> QuizResult {
    let mut outcomes = Vec::with_capacity(quiz.questions().len());
    let mut earned_points = 0_u64;
    let mut total_points = 0_u64;
    let mut correct_count = 0_u32;

    for (index, question) in quiz.questions().iter().enumerate() {
        let selected = answers.selected(index);
        let hit = selected
            .and_then(|option| question.options.get(option))
            .is_some_and(|option| option.is_correct);
        let awarded_points = if hit { question.points } else { 0 };

        total_points += u64::from(question.points);
        earned_points += u64::from(awarded_points);
        if hit {
            correct_count = correct_count.saturating_add(1);
        }

        outcomes.push(QuestionOutcome {
            index,
            selected,
            correct_option: question.correct_option(),
            awarded_points,
        });
    }

    let percent = Percent::from_ratio(earned_points, total_points);
    let passed = total_points > 0 && percent >= quiz.passing_score_percent();

    QuizResult {
        correct_count,
        total_questions: u32::try_from(quiz.questions().len()).unwrap_or(u32::MAX),
        earned_points,
        total_points,
        percent,
        passed,
        outcomes,
    }
}

/// True when every question has a selection. Gates the submit button; the
/// grader itself accepts partial attempts.
#[must_use]
pub fn is_answer_complete(quiz: &Quiz, answers: &Answers) -> bool {
    (0..quiz.questions().len()).all(|index| answers.selected(index).is_some())
}

/// Number of questions of this quiz that have a selection.
///
/// Entries for question indices the quiz does not have are not counted.
#[must_use]
pub fn answered_count(quiz: &Quiz, answers: &Answers) -> usize {
    answers
        .iter()
        .filter(|(question, _)| *question < quiz.questions().len())
        .count()
}

/// Share of the quiz's questions answered so far (the in-quiz progress bar).
#[must_use]
pub fn attempt_progress(quiz: &Quiz, answers: &Answers) -> Percent {
    Percent::from_ratio(
        answered_count(quiz, answers) as u64,
        quiz.questions().len() as u64,
    )
}
