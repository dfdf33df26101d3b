use std::collections::BTreeSet;

use chrono::Duration;
use course_core::model::{
    Course, CourseId, Lesson, LessonId, Percent, ProgressRecord, Question, Quiz, QuizDefinition,
    QuizId, QuizStatus, Section, SectionId, UserId,
};
use course_core::time::fixed_now;
use storage::repository::{
    AttemptRecord, CatalogRepository, ProgressRepository, QuizAttemptRepository, QuizRepository,
    Storage, StorageError,
};
use storage::sqlite::SqliteRepository;

async fn repo(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn course(id: u64, lessons: &[&[u64]]) -> Course {
    let sections = lessons
        .iter()
        .enumerate()
        .map(|(s, ids)| {
            Section::new(
                SectionId::new(id * 100 + s as u64),
                format!("Section {s}"),
                ids.iter()
                    .map(|l| Lesson::new(LessonId::new(*l), format!("Lesson {l}"), 120))
                    .collect(),
            )
        })
        .collect();
    Course::new(CourseId::new(id), format!("Course {id}"), sections).unwrap()
}

fn quiz(id: u64) -> Quiz {
    let mut def = QuizDefinition::new(QuizId::new(id), "Checkpoint");
    def.lesson_id = Some(LessonId::new(3));
    def.time_limit_minutes = Some(15);
    def.status = QuizStatus::Active;
    def.questions = vec![
        Question::single_choice("Pick b", ["a", "b", "c"], 1, 3).unwrap(),
        Question::true_false("Yes?", true, 1).with_explanation("It is yes."),
    ];
    Quiz::new(def).unwrap()
}

fn attempt(quiz_id: QuizId, user: u64, percent: u8, minutes: i64) -> AttemptRecord {
    AttemptRecord {
        id: None,
        quiz_id,
        user_id: UserId::new(user),
        percent: Percent::new(percent),
        passed: percent >= 70,
        earned_points: u64::from(percent),
        total_points: 100,
        started_at: fixed_now() + Duration::minutes(minutes),
        completed_at: fixed_now() + Duration::minutes(minutes + 5),
    }
}

#[tokio::test]
async fn course_tree_round_trips_in_order() {
    let repo = repo("memdb_course_tree").await;
    let original = course(1, &[&[3, 1], &[2]]);
    repo.upsert_course(&original).await.unwrap();

    let fetched = repo.get_course(CourseId::new(1)).await.unwrap().unwrap();
    assert_eq!(fetched, original);
    assert_eq!(
        fetched.all_lesson_ids(),
        vec![LessonId::new(3), LessonId::new(1), LessonId::new(2)]
    );

    // Replacing the tree drops lessons that are no longer listed.
    let trimmed = course(1, &[&[3]]);
    repo.upsert_course(&trimmed).await.unwrap();
    let fetched = repo.get_course(CourseId::new(1)).await.unwrap().unwrap();
    assert_eq!(fetched.lesson_count(), 1);

    assert!(repo.get_course(CourseId::new(9)).await.unwrap().is_none());
}

#[tokio::test]
async fn lesson_owned_by_another_course_conflicts() {
    let repo = repo("memdb_lesson_conflict").await;
    repo.upsert_course(&course(1, &[&[1, 2]])).await.unwrap();

    let err = repo.upsert_course(&course(2, &[&[2]])).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let listed = repo.list_courses(10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id(), CourseId::new(1));
}

#[tokio::test]
async fn section_owned_by_another_course_conflicts() {
    let repo = repo("memdb_section_conflict").await;
    repo.upsert_course(&course(1, &[&[1, 2]])).await.unwrap();

    let borrowed = Course::new(
        CourseId::new(2),
        "Borrowed section",
        vec![Section::new(
            SectionId::new(100),
            "Section 0",
            vec![Lesson::new(LessonId::new(9), "Lesson 9", 120)],
        )],
    )
    .unwrap();
    let err = repo.upsert_course(&borrowed).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));
    assert!(repo.get_course(CourseId::new(2)).await.unwrap().is_none());
}

#[tokio::test]
async fn progress_save_never_regresses() {
    let repo = repo("memdb_progress_merge").await;
    let user = UserId::new(7);
    let course_id = CourseId::new(1);

    let mut record = ProgressRecord::enroll(course_id, user, fixed_now());
    record.watched_lesson_ids = [1, 2, 3].into_iter().map(LessonId::new).collect();
    record.percent = Percent::new(75);
    repo.save_progress(&record).await.unwrap();

    let mut stale = ProgressRecord::enroll(course_id, user, fixed_now() + Duration::hours(1));
    stale.watched_lesson_ids = [4].into_iter().map(LessonId::new).collect();
    stale.percent = Percent::new(25);
    repo.save_progress(&stale).await.unwrap();

    let stored = repo.get_progress(user, course_id).await.unwrap().unwrap();
    assert_eq!(stored.percent.value(), 75);
    let expected: BTreeSet<LessonId> = [1, 2, 3, 4].into_iter().map(LessonId::new).collect();
    assert_eq!(stored.watched_lesson_ids, expected);
    assert_eq!(stored.updated_at, fixed_now() + Duration::hours(1));

    assert!(repo.get_progress(user, CourseId::new(2)).await.unwrap().is_none());
    assert_eq!(repo.progress_for_user(user).await.unwrap().len(), 1);
    assert!(repo.progress_for_user(UserId::new(8)).await.unwrap().is_empty());
}

#[tokio::test]
async fn quiz_round_trips_with_questions_and_options() {
    let repo = repo("memdb_quiz_roundtrip").await;
    let original = quiz(5);
    repo.upsert_quiz(&original).await.unwrap();

    let fetched = repo.get_quiz(QuizId::new(5)).await.unwrap().unwrap();
    assert_eq!(fetched, original);
    assert_eq!(fetched.questions()[0].correct_option(), Some(1));
    assert_eq!(
        fetched.questions()[1].explanation.as_deref(),
        Some("It is yes.")
    );

    let by_lesson = repo.quizzes_for_lesson(LessonId::new(3)).await.unwrap();
    assert_eq!(by_lesson.len(), 1);
    assert!(repo.quizzes_for_lesson(LessonId::new(4)).await.unwrap().is_empty());

    // Re-upserting replaces the question list.
    let mut def = QuizDefinition::new(QuizId::new(5), "Checkpoint v2");
    def.questions = vec![Question::true_false("Only one", false, 2)];
    repo.upsert_quiz(&Quiz::new(def).unwrap()).await.unwrap();
    let fetched = repo.get_quiz(QuizId::new(5)).await.unwrap().unwrap();
    assert_eq!(fetched.questions().len(), 1);
    assert_eq!(fetched.status(), QuizStatus::Draft);
    assert_eq!(fetched.lesson_id(), None);
}

#[tokio::test]
async fn attempts_are_listed_and_aggregated() {
    let repo = repo("memdb_attempts").await;
    let quiz = quiz(1);
    repo.upsert_quiz(&quiz).await.unwrap();

    let first = repo.append_attempt(attempt(quiz.id(), 1, 40, 0)).await.unwrap();
    let second = repo.append_attempt(attempt(quiz.id(), 1, 90, 30)).await.unwrap();
    repo.append_attempt(attempt(quiz.id(), 2, 80, 10)).await.unwrap();
    assert!(second > first);

    let mine = repo.attempts_for_user(quiz.id(), UserId::new(1)).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].id, Some(first));
    assert_eq!(mine[1].percent.value(), 90);
    assert!(mine[1].passed);

    let stats = repo.quiz_stats(quiz.id()).await.unwrap();
    assert_eq!(stats.attempts, 3);
    assert_eq!(stats.passed, 2);
    assert!((stats.average_percent - 70.0).abs() < 1e-9);

    let none = repo.quiz_stats(QuizId::new(99)).await.unwrap();
    assert_eq!(none.attempts, 0);
    assert!(none.average_percent.abs() < f64::EPSILON);
}

#[tokio::test]
async fn storage_sqlite_wires_every_repository() {
    let storage = Storage::sqlite("sqlite:file:memdb_storage_wiring?mode=memory&cache=shared")
        .await
        .expect("storage");
    storage.catalog.upsert_course(&course(1, &[&[1]])).await.unwrap();
    storage.quizzes.upsert_quiz(&quiz(1)).await.unwrap();

    assert!(storage.catalog.get_course(CourseId::new(1)).await.unwrap().is_some());
    assert!(storage.quizzes.get_quiz(QuizId::new(1)).await.unwrap().is_some());
    assert!(
        storage
            .progress
            .get_progress(UserId::new(1), CourseId::new(1))
            .await
            .unwrap()
            .is_none()
    );
}
