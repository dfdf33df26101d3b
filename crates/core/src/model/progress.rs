use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::course::Course;
use crate::model::ids::{CourseId, LessonId, UserId};
use crate::model::percent::Percent;
use crate::tracker;

//
// ─── WATCH EVENT ───────────────────────────────────────────────────────────────
//

/// A learner finished a lesson's video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchEvent {
    pub lesson_id: LessonId,
    pub completed_at: DateTime<Utc>,
}

impl WatchEvent {
    #[must_use]
    pub fn new(lesson_id: LessonId, completed_at: DateTime<Utc>) -> Self {
        Self {
            lesson_id,
            completed_at,
        }
    }
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Enrollment lifecycle as the learner sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl ProgressStatus {
    #[must_use]
    pub fn from_percent(percent: Percent) -> Self {
        if percent.is_full() {
            Self::Completed
        } else if percent.is_zero() {
            Self::NotStarted
        } else {
            Self::InProgress
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// Per-user, per-course progress as persisted by the backend.
///
/// `percent` only ever moves up: updates go through
/// [`tracker::merge_with_server_percent`], so a stale or partial watched set
/// never shows the learner a regression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub course_id: CourseId,
    pub user_id: UserId,
    pub watched_lesson_ids: BTreeSet<LessonId>,
    pub percent: Percent,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// Fresh record for a new enrollment: nothing watched, 0%.
    #[must_use]
    pub fn enroll(course_id: CourseId, user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            course_id,
            user_id,
            watched_lesson_ids: BTreeSet::new(),
            percent: Percent::ZERO,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn status(&self) -> ProgressStatus {
        ProgressStatus::from_percent(self.percent)
    }

    #[must_use]
    pub fn has_watched(&self, lesson: LessonId) -> bool {
        self.watched_lesson_ids.contains(&lesson)
    }

    /// Apply a watch event against the course catalog.
    ///
    /// Records the lesson, recomputes the percent from the catalog and keeps
    /// whichever of the derived and stored percent is higher.
    pub fn apply_watch(&mut self, course: &Course, event: WatchEvent) {
        self.watched_lesson_ids =
            tracker::record_watched(self.course_id, event.lesson_id, &self.watched_lesson_ids);
        self.reconcile(course);
        if event.completed_at > self.updated_at {
            self.updated_at = event.completed_at;
        }
    }

    /// Recompute the percent from the catalog without adding any lessons.
    ///
    /// Used when the catalog changed since the record was written.
    pub fn reconcile(&mut self, course: &Course) {
        let local = tracker::compute_percent(&course.all_lesson_ids(), &self.watched_lesson_ids);
        self.percent = tracker::merge_with_server_percent(local, self.percent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::course::{Lesson, Section};
    use crate::model::ids::SectionId;
    use crate::time::fixed_now;

    fn course(lessons: u64) -> Course {
        let lessons = (1..=lessons)
            .map(|id| Lesson::new(LessonId::new(id), format!("L{id}"), 60))
            .collect();
        Course::new(
            CourseId::new(1),
            "Course",
            vec![Section::new(SectionId::new(1), "S", lessons)],
        )
        .unwrap()
    }

    #[test]
    fn status_follows_percent() {
        assert_eq!(
            ProgressStatus::from_percent(Percent::ZERO),
            ProgressStatus::NotStarted
        );
        assert_eq!(
            ProgressStatus::from_percent(Percent::new(1)),
            ProgressStatus::InProgress
        );
        assert_eq!(
            ProgressStatus::from_percent(Percent::new(99)),
            ProgressStatus::InProgress
        );
        assert_eq!(
            ProgressStatus::from_percent(Percent::FULL),
            ProgressStatus::Completed
        );
    }

    #[test]
    fn apply_watch_moves_through_lifecycle() {
        let course = course(2);
        let now = fixed_now();
        let mut record = ProgressRecord::enroll(course.id(), UserId::new(3), now);
        assert_eq!(record.status(), ProgressStatus::NotStarted);

        record.apply_watch(&course, WatchEvent::new(LessonId::new(1), now));
        assert_eq!(record.percent.value(), 50);
        assert_eq!(record.status(), ProgressStatus::InProgress);

        record.apply_watch(&course, WatchEvent::new(LessonId::new(2), now));
        assert_eq!(record.status(), ProgressStatus::Completed);
    }

    #[test]
    fn apply_watch_never_lowers_stored_percent() {
        let course = course(4);
        let now = fixed_now();
        let mut record = ProgressRecord::enroll(course.id(), UserId::new(3), now);
        record.percent = Percent::new(80);

        record.apply_watch(&course, WatchEvent::new(LessonId::new(1), now));
        assert_eq!(record.percent.value(), 80);
        assert!(record.has_watched(LessonId::new(1)));
    }

    #[test]
    fn apply_watch_advances_updated_at() {
        let course = course(1);
        let now = fixed_now();
        let later = now + chrono::Duration::minutes(5);
        let mut record = ProgressRecord::enroll(course.id(), UserId::new(3), now);

        record.apply_watch(&course, WatchEvent::new(LessonId::new(1), later));
        assert_eq!(record.updated_at, later);
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let record = ProgressRecord::enroll(CourseId::new(1), UserId::new(2), fixed_now());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["courseId"], 1);
        assert_eq!(json["watchedLessonIds"], serde_json::json!([]));
        assert_eq!(json["percent"], 0);
    }
}
