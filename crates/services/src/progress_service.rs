use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use course_core::model::{
    Course, CourseId, LessonId, Percent, ProgressRecord, ProgressStatus, UserId, WatchEvent,
};
use course_core::tracker;
use storage::repository::{CatalogRepository, ProgressRepository, StorageError};

use crate::Clock;
use crate::error::ProgressServiceError;

//
// ─── SNAPSHOT ──────────────────────────────────────────────────────────────────
//

/// What the learner sees for one enrollment: the stored record joined with
/// the course catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub course_id: CourseId,
    pub user_id: UserId,
    pub percent: Percent,
    pub status: ProgressStatus,
    pub is_complete: bool,
    pub watched_lessons: usize,
    pub total_lessons: usize,
    pub watched_seconds: u64,
    pub total_seconds: u64,
    pub next_lesson_id: Option<LessonId>,
}

impl ProgressSnapshot {
    #[must_use]
    pub fn new(course: &Course, record: &ProgressRecord) -> Self {
        let all = course.all_lesson_ids();
        let watched = &record.watched_lesson_ids;
        Self {
            course_id: course.id(),
            user_id: record.user_id,
            percent: record.percent,
            status: record.status(),
            is_complete: tracker::is_course_complete(&all, watched),
            watched_lessons: all.iter().filter(|id| watched.contains(id)).count(),
            total_lessons: course.lesson_count(),
            watched_seconds: tracker::watched_duration_seconds(course, watched),
            total_seconds: course.total_duration_seconds(),
            next_lesson_id: tracker::next_unwatched_lesson(course, watched).map(|l| l.id),
        }
    }
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Records lesson completions and reports course progress.
///
/// All arithmetic is delegated to `course_core::tracker`; this service only
/// loads, merges and persists.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    catalog: Arc<dyn CatalogRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn CatalogRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            catalog,
            progress,
        }
    }

    async fn course(&self, course_id: CourseId) -> Result<Course, ProgressServiceError> {
        let course = self
            .catalog
            .get_course(course_id)
            .await?
            .ok_or(StorageError::NotFound)?;
        Ok(course)
    }

    /// Mark a lesson as watched and persist the updated record.
    ///
    /// Enrolls the learner on first watch. The stored percent is never
    /// lowered, even if the catalog has grown since the last update.
    ///
    /// The returned snapshot reflects the merged record in storage, which
    /// includes lessons recorded by concurrent events.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` with `StorageError::NotFound`
    /// if the course does not exist, or any repository failure.
    pub async fn record_watch_event(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
    ) -> Result<ProgressSnapshot, ProgressServiceError> {
        let course = self.course(course_id).await?;
        if !course.contains_lesson(lesson_id) {
            warn!(%course_id, %lesson_id, "watched lesson is not part of the course catalog");
        }

        let now = self.clock.now();
        let mut record = self
            .progress
            .get_progress(user_id, course_id)
            .await?
            .unwrap_or_else(|| ProgressRecord::enroll(course_id, user_id, now));
        let before = record.percent;

        record.apply_watch(&course, WatchEvent::new(lesson_id, now));
        self.progress.save_progress(&record).await?;
        let record = self.settle(&course, record).await?;

        info!(
            %user_id,
            %course_id,
            %lesson_id,
            from = before.value(),
            to = record.percent.value(),
            "recorded watched lesson"
        );
        Ok(ProgressSnapshot::new(&course, &record))
    }

    /// Re-reads the merged record and raises its percent to match the union
    /// of watched lessons when another writer saved in between.
    async fn settle(
        &self,
        course: &Course,
        saved: ProgressRecord,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        let Some(mut merged) = self
            .progress
            .get_progress(saved.user_id, saved.course_id)
            .await?
        else {
            return Ok(saved);
        };
        let stored = merged.percent;
        merged.reconcile(course);
        if merged.percent > stored {
            debug!(
                course_id = %course.id(),
                stored = stored.value(),
                merged = merged.percent.value(),
                "raising percent after concurrent update"
            );
            self.progress.save_progress(&merged).await?;
        }
        Ok(merged)
    }

    /// Current progress for an enrollment.
    ///
    /// A learner without a stored record gets the 0% default rather than an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` with `StorageError::NotFound`
    /// if the course does not exist, or any repository failure.
    pub async fn get_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<ProgressSnapshot, ProgressServiceError> {
        let course = self.course(course_id).await?;
        let record = match self.progress.get_progress(user_id, course_id).await? {
            Some(record) => reconciled(&course, record),
            None => {
                debug!(%user_id, %course_id, "no progress yet, reporting 0%");
                ProgressRecord::enroll(course_id, user_id, self.clock.now())
            }
        };
        Ok(ProgressSnapshot::new(&course, &record))
    }

    /// Every enrollment of a learner, ordered by course id.
    ///
    /// Records whose course has since been removed from the catalog are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` on repository failures.
    pub async fn my_learning(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ProgressSnapshot>, ProgressServiceError> {
        let records = self.progress.progress_for_user(user_id).await?;
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            match self.catalog.get_course(record.course_id).await? {
                Some(course) => {
                    let record = reconciled(&course, record);
                    out.push(ProgressSnapshot::new(&course, &record));
                }
                None => warn!(%user_id, course_id = %record.course_id, "progress for unknown course"),
            }
        }
        Ok(out)
    }
}

fn reconciled(course: &Course, mut record: ProgressRecord) -> ProgressRecord {
    let stored = record.percent;
    record.reconcile(course);
    let derived = tracker::compute_percent(&course.all_lesson_ids(), &record.watched_lesson_ids);
    if derived < stored {
        warn!(
            course_id = %course.id(),
            stored = stored.value(),
            derived = derived.value(),
            "kept stored percent above catalog-derived value"
        );
    }
    record
}
