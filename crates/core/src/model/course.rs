use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, LessonId, SectionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title cannot be empty")]
    EmptyTitle,

    #[error("lesson {lesson} appears in more than one place")]
    DuplicateLesson { lesson: LessonId },

    #[error("section {section} appears more than once")]
    DuplicateSection { section: SectionId },
}

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

/// A single video unit within a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: LessonId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub duration_seconds: u32,
    /// Watchable without purchasing the course.
    #[serde(default)]
    pub free_preview: bool,
}

impl Lesson {
    #[must_use]
    pub fn new(id: LessonId, title: impl Into<String>, duration_seconds: u32) -> Self {
        Self {
            id,
            title: title.into(),
            duration_seconds,
            free_preview: false,
        }
    }

    #[must_use]
    pub fn with_free_preview(mut self, free_preview: bool) -> Self {
        self.free_preview = free_preview;
        self
    }
}

//
// ─── SECTION ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: SectionId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

impl Section {
    #[must_use]
    pub fn new(id: SectionId, title: impl Into<String>, lessons: Vec<Lesson>) -> Self {
        Self {
            id,
            title: title.into(),
            lessons,
        }
    }
}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

/// Catalog view of a course: ordered sections of ordered lessons.
///
/// This is the shape the catalog service hands out; the progress tracker only
/// needs the lesson ids and durations from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawCourse")]
pub struct Course {
    id: CourseId,
    title: String,
    sections: Vec<Section>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCourse {
    id: CourseId,
    title: String,
    #[serde(default)]
    sections: Vec<Section>,
}

impl TryFrom<RawCourse> for Course {
    type Error = CourseError;

    fn try_from(raw: RawCourse) -> Result<Self, Self::Error> {
        Course::new(raw.id, raw.title, raw.sections)
    }
}

impl Course {
    /// Build a course, checking that the title is present and that every
    /// lesson belongs to exactly one section.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyTitle` for a blank title, or a duplicate
    /// error when a section or lesson id is repeated.
    pub fn new(
        id: CourseId,
        title: impl Into<String>,
        sections: Vec<Section>,
    ) -> Result<Self, CourseError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CourseError::EmptyTitle);
        }

        let mut seen_sections = HashSet::new();
        let mut seen_lessons = HashSet::new();
        for section in &sections {
            if !seen_sections.insert(section.id) {
                return Err(CourseError::DuplicateSection {
                    section: section.id,
                });
            }
            for lesson in &section.lessons {
                if !seen_lessons.insert(lesson.id) {
                    return Err(CourseError::DuplicateLesson { lesson: lesson.id });
                }
            }
        }

        Ok(Self {
            id,
            title,
            sections,
        })
    }

    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Lessons in catalog order (section by section).
    pub fn lessons(&self) -> impl Iterator<Item = &Lesson> + '_ {
        self.sections.iter().flat_map(|s| s.lessons.iter())
    }

    /// All lesson ids in catalog order.
    #[must_use]
    pub fn all_lesson_ids(&self) -> Vec<LessonId> {
        self.lessons().map(|l| l.id).collect()
    }

    #[must_use]
    pub fn lesson_count(&self) -> usize {
        self.sections.iter().map(|s| s.lessons.len()).sum()
    }

    #[must_use]
    pub fn total_duration_seconds(&self) -> u64 {
        self.lessons().map(|l| u64::from(l.duration_seconds)).sum()
    }

    #[must_use]
    pub fn lesson(&self, id: LessonId) -> Option<&Lesson> {
        self.lessons().find(|l| l.id == id)
    }

    #[must_use]
    pub fn section_of(&self, lesson: LessonId) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.lessons.iter().any(|l| l.id == lesson))
    }

    #[must_use]
    pub fn contains_lesson(&self, id: LessonId) -> bool {
        self.lesson(id).is_some()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
