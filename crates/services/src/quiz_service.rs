use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use course_core::grader;
use course_core::model::{Answers, Quiz, QuizAttempt, QuizId, QuizResult, UserId};
use storage::repository::{
    AttemptRecord, QuizAttemptRepository, QuizRepository, QuizStats, StorageError,
};

use crate::Clock;
use crate::error::QuizServiceError;

/// A graded, persisted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedAttempt {
    pub attempt_id: i64,
    pub result: QuizResult,
    pub within_time_limit: bool,
}

/// Grades quiz submissions and keeps the attempt history.
#[derive(Clone)]
pub struct QuizService {
    clock: Clock,
    quizzes: Arc<dyn QuizRepository>,
    attempts: Arc<dyn QuizAttemptRepository>,
}

impl QuizService {
    #[must_use]
    pub fn new(
        clock: Clock,
        quizzes: Arc<dyn QuizRepository>,
        attempts: Arc<dyn QuizAttemptRepository>,
    ) -> Self {
        Self {
            clock,
            quizzes,
            attempts,
        }
    }

    /// Fetch a quiz, failing with `NotFound` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::Storage` on repository failures.
    pub async fn quiz(&self, quiz_id: QuizId) -> Result<Quiz, QuizServiceError> {
        let quiz = self
            .quizzes
            .get_quiz(quiz_id)
            .await?
            .ok_or(StorageError::NotFound)?;
        Ok(quiz)
    }

    /// Grade and record one attempt.
    ///
    /// `started_at` is when the learner opened the quiz; submission time comes
    /// from the service clock. Running over the time limit is logged and
    /// reported but does not change the score. A retake is simply another
    /// call.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::NotActive` for draft quizzes and
    /// `QuizServiceError::Storage` if the quiz is missing or persistence fails.
    pub async fn submit_attempt(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
        answers: Answers,
        started_at: DateTime<Utc>,
    ) -> Result<GradedAttempt, QuizServiceError> {
        let quiz = self.quiz(quiz_id).await?;
        if !quiz.is_active() {
            return Err(QuizServiceError::NotActive { quiz: quiz_id });
        }

        let attempt = QuizAttempt {
            quiz_id,
            user_id,
            answers,
            started_at,
            submitted_at: self.clock.now(),
        };
        if !grader::is_answer_complete(&quiz, &attempt.answers) {
            info!(
                %user_id,
                %quiz_id,
                answered = grader::answered_count(&quiz, &attempt.answers),
                questions = quiz.questions().len(),
                "grading partial attempt"
            );
        }

        let within_time_limit = quiz.is_within_time_limit(attempt.started_at, attempt.submitted_at);
        if !within_time_limit {
            warn!(
                %user_id,
                %quiz_id,
                limit_minutes = quiz.time_limit_minutes(),
                "attempt submitted after the time limit"
            );
        }

        let result = grader::grade(&quiz, &attempt.answers);
        let attempt_id = self
            .attempts
            .append_attempt(AttemptRecord::from_graded(&attempt, &result))
            .await?;

        info!(
            %user_id,
            %quiz_id,
            attempt_id,
            percent = result.percent.value(),
            passed = result.passed,
            "graded quiz attempt"
        );
        Ok(GradedAttempt {
            attempt_id,
            result,
            within_time_limit,
        })
    }

    /// A learner's attempts at a quiz, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::Storage` on repository failures.
    pub async fn attempts(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
    ) -> Result<Vec<AttemptRecord>, QuizServiceError> {
        Ok(self.attempts.attempts_for_user(quiz_id, user_id).await?)
    }

    /// Highest-scoring attempt; the earliest one wins a tie.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::Storage` on repository failures.
    pub async fn best_attempt(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
    ) -> Result<Option<AttemptRecord>, QuizServiceError> {
        let attempts = self.attempts(user_id, quiz_id).await?;
        Ok(attempts
            .into_iter()
            .rev()
            .max_by_key(|a| a.percent))
    }

    /// # Errors
    ///
    /// Returns `QuizServiceError::Storage` if the quiz is missing or on
    /// repository failures.
    pub async fn quiz_stats(&self, quiz_id: QuizId) -> Result<QuizStats, QuizServiceError> {
        self.quiz(quiz_id).await?;
        Ok(self.attempts.quiz_stats(quiz_id).await?)
    }
}
