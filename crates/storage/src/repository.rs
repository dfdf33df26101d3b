use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::{
    Course, CourseId, LessonId, Percent, ProgressRecord, Quiz, QuizAttempt, QuizId, QuizResult,
    UserId,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Persisted summary of one graded quiz attempt.
///
/// Only the score is kept, not the individual selections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub id: Option<i64>,
    pub quiz_id: QuizId,
    pub user_id: UserId,
    pub percent: Percent,
    pub passed: bool,
    pub earned_points: u64,
    pub total_points: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl AttemptRecord {
    #[must_use]
    pub fn from_graded(attempt: &QuizAttempt, result: &QuizResult) -> Self {
        Self {
            id: None,
            quiz_id: attempt.quiz_id,
            user_id: attempt.user_id,
            percent: result.percent,
            passed: result.passed,
            earned_points: result.earned_points,
            total_points: result.total_points,
            started_at: attempt.started_at,
            completed_at: attempt.submitted_at,
        }
    }
}

/// Instructor-facing aggregate over all attempts of a quiz.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizStats {
    pub attempts: u64,
    /// Mean attempt percent; 0.0 when nobody has attempted the quiz yet.
    pub average_percent: f64,
    pub passed: u64,
}

impl QuizStats {
    #[must_use]
    pub fn from_attempts<'a>(attempts: impl IntoIterator<Item = &'a AttemptRecord>) -> Self {
        let mut stats = Self::default();
        let mut sum = 0_u64;
        for attempt in attempts {
            stats.attempts += 1;
            sum += u64::from(attempt.percent.value());
            if attempt.passed {
                stats.passed += 1;
            }
        }
        if stats.attempts > 0 {
            #[allow(clippy::cast_precision_loss)]
            let avg = sum as f64 / stats.attempts as f64;
            stats.average_percent = avg;
        }
        stats
    }
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Course catalog (sections and lessons).
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Persist or replace a course and its full section/lesson tree.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a lesson id is already owned by
    /// another course, or other storage errors.
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError>;

    /// Fetch a course by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError>;

    /// List courses ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    async fn list_courses(&self, limit: u32) -> Result<Vec<Course>, StorageError>;
}

/// Per-user, per-course progress records.
///
/// Implementations merge on save: watched lessons are only ever added and
/// the stored percent is only ever raised.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the record for an enrollment, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn get_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<ProgressRecord>, StorageError>;

    /// Merge a record into storage.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on write failures.
    async fn save_progress(&self, record: &ProgressRecord) -> Result<(), StorageError>;

    /// All progress records of a learner, ordered by course ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn progress_for_user(&self, user_id: UserId) -> Result<Vec<ProgressRecord>, StorageError>;
}

#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Persist or replace a quiz with all its questions and options.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the quiz cannot be stored.
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError>;

    /// Fetch a quiz by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures or if the stored definition no
    /// longer validates.
    async fn get_quiz(&self, id: QuizId) -> Result<Option<Quiz>, StorageError>;

    /// Quizzes attached to a lesson, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn quizzes_for_lesson(&self, lesson_id: LessonId) -> Result<Vec<Quiz>, StorageError>;
}

#[async_trait]
pub trait QuizAttemptRepository: Send + Sync {
    /// Append a graded attempt and return its ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the attempt cannot be stored.
    async fn append_attempt(&self, record: AttemptRecord) -> Result<i64, StorageError>;

    /// A learner's attempts at a quiz, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn attempts_for_user(
        &self,
        quiz_id: QuizId,
        user_id: UserId,
    ) -> Result<Vec<AttemptRecord>, StorageError>;

    /// Attempt count, average percent and pass count for a quiz.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn quiz_stats(&self, quiz_id: QuizId) -> Result<QuizStats, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    courses: Arc<Mutex<HashMap<CourseId, Course>>>,
    progress: Arc<Mutex<HashMap<(UserId, CourseId), ProgressRecord>>>,
    quizzes: Arc<Mutex<HashMap<QuizId, Quiz>>>,
    attempts: Arc<Mutex<Vec<AttemptRecord>>>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let mut guard = self.courses.lock().map_err(poisoned)?;
        let taken = guard
            .values()
            .filter(|other| other.id() != course.id())
            .any(|other| {
                course.lessons().any(|l| other.contains_lesson(l.id))
                    || course
                        .sections()
                        .iter()
                        .any(|s| other.sections().iter().any(|o| o.id == s.id))
            });
        if taken {
            return Err(StorageError::Conflict);
        }
        guard.insert(course.id(), course.clone());
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let guard = self.courses.lock().map_err(poisoned)?;
        Ok(guard.get(&id).cloned())
    }

    async fn list_courses(&self, limit: u32) -> Result<Vec<Course>, StorageError> {
        let guard = self.courses.lock().map_err(poisoned)?;
        let mut courses: Vec<Course> = guard.values().cloned().collect();
        courses.sort_by_key(Course::id);
        courses.truncate(limit as usize);
        Ok(courses)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard.get(&(user_id, course_id)).cloned())
    }

    async fn save_progress(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        guard
            .entry((record.user_id, record.course_id))
            .and_modify(|stored| {
                stored
                    .watched_lesson_ids
                    .extend(record.watched_lesson_ids.iter().copied());
                stored.percent = stored.percent.max(record.percent);
                stored.updated_at = record.updated_at;
            })
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn progress_for_user(&self, user_id: UserId) -> Result<Vec<ProgressRecord>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        let mut records: Vec<ProgressRecord> = guard
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.course_id);
        Ok(records)
    }
}

#[async_trait]
impl QuizRepository for InMemoryRepository {
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let mut guard = self.quizzes.lock().map_err(poisoned)?;
        guard.insert(quiz.id(), quiz.clone());
        Ok(())
    }

    async fn get_quiz(&self, id: QuizId) -> Result<Option<Quiz>, StorageError> {
        let guard = self.quizzes.lock().map_err(poisoned)?;
        Ok(guard.get(&id).cloned())
    }

    async fn quizzes_for_lesson(&self, lesson_id: LessonId) -> Result<Vec<Quiz>, StorageError> {
        let guard = self.quizzes.lock().map_err(poisoned)?;
        let mut quizzes: Vec<Quiz> = guard
            .values()
            .filter(|q| q.lesson_id() == Some(lesson_id))
            .cloned()
            .collect();
        quizzes.sort_by_key(Quiz::id);
        Ok(quizzes)
    }
}

#[async_trait]
impl QuizAttemptRepository for InMemoryRepository {
    async fn append_attempt(&self, mut record: AttemptRecord) -> Result<i64, StorageError> {
        let mut guard = self.attempts.lock().map_err(poisoned)?;
        let id = i64::try_from(guard.len() + 1)
            .map_err(|_| StorageError::Serialization("attempt id overflow".into()))?;
        record.id = Some(id);
        guard.push(record);
        Ok(id)
    }

    async fn attempts_for_user(
        &self,
        quiz_id: QuizId,
        user_id: UserId,
    ) -> Result<Vec<AttemptRecord>, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        let mut found: Vec<AttemptRecord> = guard
            .iter()
            .filter(|a| a.quiz_id == quiz_id && a.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.completed_at, a.id));
        Ok(found)
    }

    async fn quiz_stats(&self, quiz_id: QuizId) -> Result<QuizStats, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        Ok(QuizStats::from_attempts(
            guard.iter().filter(|a| a.quiz_id == quiz_id),
        ))
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Bundles the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn CatalogRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub quizzes: Arc<dyn QuizRepository>,
    pub attempts: Arc<dyn QuizAttemptRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            catalog: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            quizzes: Arc::new(repo.clone()),
            attempts: Arc::new(repo),
        }
    }
}
