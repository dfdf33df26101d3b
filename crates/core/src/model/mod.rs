mod course;
mod ids;
mod percent;
mod progress;
mod quiz;

pub use ids::{CourseId, LessonId, ParseIdError, QuizId, SectionId, UserId};
pub use percent::Percent;

pub use course::{Course, CourseError, Lesson, Section};
pub use progress::{ProgressRecord, ProgressStatus, WatchEvent};
pub use quiz::{
    Answers, DEFAULT_PASSING_SCORE, DEFAULT_QUESTION_POINTS, Question, QuestionKind,
    QuestionOutcome, Quiz, QuizAttempt, QuizDefinition, QuizError, QuizOption, QuizResult,
    QuizStatus,
};
