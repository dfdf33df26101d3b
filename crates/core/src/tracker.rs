//! Course completion arithmetic.
//!
//! Everything here is a pure function over explicit inputs. Callers load the
//! catalog and the stored watched set, call in, and persist what comes back.

use std::collections::BTreeSet;

use crate::model::{Course, CourseId, Lesson, LessonId, Percent};

/// Add a finished lesson to the watched set.
///
/// Idempotent: recording a lesson twice yields the same set. Lessons unknown
/// to the catalog are kept; whether they exist is the catalog's business.
#[must_use]
pub fn record_watched(
    _course_id: CourseId,
    lesson_id: LessonId,
    watched: &BTreeSet<LessonId>,
) -> BTreeSet<LessonId> {
    let mut next = watched.clone();
    next.insert(lesson_id);
    next
}

/// Share of the catalog's lessons that have been watched.
///
/// Only ids present in both inputs count, so the result stays in `0..=100`
/// even when `watched` holds stale ids. An empty catalog is 0%.
#[must_use]
pub fn compute_percent(all_lesson_ids: &[LessonId], watched: &BTreeSet<LessonId>) -> Percent {
    let all: BTreeSet<LessonId> = all_lesson_ids.iter().copied().collect();
    let seen = all.intersection(watched).count();
    Percent::from_ratio(seen as u64, all.len() as u64)
}

#[must_use]
pub fn is_course_complete(all_lesson_ids: &[LessonId], watched: &BTreeSet<LessonId>) -> bool {
    compute_percent(all_lesson_ids, watched).is_full()
}

/// Reconcile a locally derived percent with the server's value.
///
/// Returns the larger of the two, so progress never appears to go backwards.
#[must_use]
pub fn merge_with_server_percent(local: Percent, server: Percent) -> Percent {
    local.max(server)
}

/// Seconds of catalog content the learner has finished.
#[must_use]
pub fn watched_duration_seconds(course: &Course, watched: &BTreeSet<LessonId>) -> u64 {
    course
        .lessons()
        .filter(|l| watched.contains(&l.id))
        .map(|l| u64::from(l.duration_seconds))
        .sum()
}

/// First lesson in catalog order that has not been watched yet.
///
/// This is where "continue learning" should land; `None` once every lesson
/// is done (or the course is empty).
#[must_use]
pub fn next_unwatched_lesson<'a>(
    course: &'a Course,
    watched: &BTreeSet<LessonId>,
) -> Option<&'a Lesson> {
    course.lessons().find(|l| !watched.contains(&l.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Section, SectionId};

    fn ids(raw: &[u64]) -> Vec<LessonId> {
        raw.iter().copied().map(LessonId::new).collect()
    }

    fn set(raw: &[u64]) -> BTreeSet<LessonId> {
        raw.iter().copied().map(LessonId::new).collect()
    }

    fn course() -> Course {
        Course::new(
            CourseId::new(1),
            "Course",
            vec![
                Section::new(
                    SectionId::new(1),
                    "Intro",
                    vec![
                        Lesson::new(LessonId::new(1), "Welcome", 30),
                        Lesson::new(LessonId::new(2), "Setup", 90),
                    ],
                ),
                Section::new(
                    SectionId::new(2),
                    "Core",
                    vec![Lesson::new(LessonId::new(3), "Traits", 600)],
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn half_of_four_lessons_is_fifty() {
        assert_eq!(compute_percent(&ids(&[1, 2, 3, 4]), &set(&[1, 2])).value(), 50);
    }

    #[test]
    fn unknown_watched_ids_are_ignored() {
        let all = ids(&[1, 2, 3, 4]);
        let watched = set(&[1, 2, 3, 4, 99]);
        assert_eq!(compute_percent(&all, &watched), Percent::FULL);
        assert!(is_course_complete(&all, &watched));

        assert_eq!(compute_percent(&all, &set(&[98, 99])), Percent::ZERO);
    }

    #[test]
    fn empty_catalog_is_zero_percent() {
        assert_eq!(compute_percent(&[], &set(&[1, 2])), Percent::ZERO);
        assert!(!is_course_complete(&[], &set(&[1])));
    }

    #[test]
    fn duplicate_catalog_ids_count_once() {
        assert_eq!(compute_percent(&ids(&[1, 1, 2]), &set(&[1])).value(), 50);
    }

    #[test]
    fn complete_only_when_catalog_is_covered() {
        let all = ids(&[1, 2, 3]);
        assert!(!is_course_complete(&all, &set(&[1, 2])));
        assert!(is_course_complete(&all, &set(&[1, 2, 3])));
    }

    #[test]
    fn percent_rounds_half_up() {
        // 1 of 8 = 12.5%
        let all = ids(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(compute_percent(&all, &set(&[1])).value(), 13);
        // 2 of 3 = 66.67%
        assert_eq!(compute_percent(&ids(&[1, 2, 3]), &set(&[1, 2])).value(), 67);
    }

    #[test]
    fn percent_stays_in_range_for_every_subset() {
        let all = ids(&[1, 2, 3, 4, 5]);
        for mask in 0u32..(1 << 6) {
            let watched: BTreeSet<LessonId> = (0u32..6)
                .filter(|bit| mask & (1 << bit) != 0)
                .map(|bit| LessonId::new(u64::from(bit) + 1))
                .collect();
            let p = compute_percent(&all, &watched);
            assert!(p.value() <= 100);
            let covers = all.iter().all(|id| watched.contains(id));
            assert_eq!(p.is_full(), covers);
        }
    }

    #[test]
    fn recording_is_idempotent() {
        let course_id = CourseId::new(1);
        let lesson = LessonId::new(2);
        let once = record_watched(course_id, lesson, &set(&[1]));
        let twice = record_watched(course_id, lesson, &once);
        assert_eq!(once, twice);
        assert_eq!(once, set(&[1, 2]));
    }

    #[test]
    fn recording_commutes() {
        let c = CourseId::new(1);
        let start = set(&[]);
        let ab = record_watched(c, LessonId::new(2), &record_watched(c, LessonId::new(1), &start));
        let ba = record_watched(c, LessonId::new(1), &record_watched(c, LessonId::new(2), &start));
        assert_eq!(ab, ba);
    }

    #[test]
    fn recording_keeps_unknown_lessons() {
        let next = record_watched(CourseId::new(1), LessonId::new(404), &set(&[]));
        assert!(next.contains(&LessonId::new(404)));
    }

    #[test]
    fn merge_takes_the_larger_value() {
        let merge = |a, b| merge_with_server_percent(Percent::new(a), Percent::new(b)).value();
        assert_eq!(merge(40, 65), 65);
        assert_eq!(merge(80, 30), 80);
        assert_eq!(merge(0, 0), 0);
        for a in (0..=100).step_by(7) {
            for b in (0..=100).step_by(11) {
                let m = merge(a, b);
                assert!(m >= a && m >= b);
                assert_eq!(m, a.max(b));
            }
        }
    }

    #[test]
    fn watched_duration_counts_catalog_lessons_only() {
        let course = course();
        assert_eq!(watched_duration_seconds(&course, &set(&[1, 3, 77])), 630);
        assert_eq!(watched_duration_seconds(&course, &set(&[])), 0);
    }

    #[test]
    fn next_unwatched_follows_catalog_order() {
        let course = course();
        assert_eq!(
            next_unwatched_lesson(&course, &set(&[1])).map(|l| l.id),
            Some(LessonId::new(2))
        );
        assert_eq!(
            next_unwatched_lesson(&course, &set(&[2])).map(|l| l.id),
            Some(LessonId::new(1))
        );
        assert!(next_unwatched_lesson(&course, &set(&[1, 2, 3])).is_none());
    }
}
