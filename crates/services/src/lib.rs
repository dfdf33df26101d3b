#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod progress_service;
pub mod quiz_service;

pub use course_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, ProgressServiceError, QuizServiceError};
pub use progress_service::{ProgressService, ProgressSnapshot};
pub use quiz_service::{GradedAttempt, QuizService};
