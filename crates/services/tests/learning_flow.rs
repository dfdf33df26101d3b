use chrono::Duration;
use course_core::model::{
    Answers, Course, CourseId, Lesson, LessonId, ProgressStatus, Question, Quiz, QuizDefinition,
    QuizId, QuizStatus, Section, SectionId, UserId,
};
use course_core::time::fixed_now;
use services::{AppServices, Clock};

fn catalog() -> Course {
    Course::new(
        CourseId::new(1),
        "Async Rust",
        vec![
            Section::new(
                SectionId::new(1),
                "Basics",
                vec![
                    Lesson::new(LessonId::new(1), "Futures", 300).with_free_preview(true),
                    Lesson::new(LessonId::new(2), "Executors", 420),
                ],
            ),
            Section::new(
                SectionId::new(2),
                "Practice",
                vec![
                    Lesson::new(LessonId::new(3), "Channels", 600),
                    Lesson::new(LessonId::new(4), "Cancellation", 480),
                ],
            ),
        ],
    )
    .unwrap()
}

fn checkpoint() -> Quiz {
    let mut def = QuizDefinition::new(QuizId::new(1), "Practice checkpoint");
    def.lesson_id = Some(LessonId::new(4));
    def.status = QuizStatus::Active;
    def.questions = vec![
        Question::single_choice("What drives a future?", ["An executor", "The OS"], 0, 10)
            .unwrap(),
        Question::true_false("Dropping a future cancels it.", true, 10),
    ];
    Quiz::new(def).unwrap()
}

async fn app(name: &str) -> AppServices {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let app = AppServices::new_sqlite(&url, Clock::fixed(fixed_now()))
        .await
        .expect("connect sqlite");
    app.storage().catalog.upsert_course(&catalog()).await.unwrap();
    app.storage().quizzes.upsert_quiz(&checkpoint()).await.unwrap();
    app
}

#[tokio::test]
async fn watching_every_lesson_completes_the_course() {
    let app = app("memdb_learning_complete").await;
    let progress = app.progress();
    let user = UserId::new(7);
    let course = CourseId::new(1);

    let fresh = progress.get_progress(user, course).await.unwrap();
    assert_eq!(fresh.status, ProgressStatus::NotStarted);

    let mut last = fresh;
    for lesson in [1, 2, 3, 4] {
        last = progress
            .record_watch_event(user, course, LessonId::new(lesson))
            .await
            .unwrap();
    }
    assert!(last.is_complete);
    assert_eq!(last.percent.value(), 100);
    assert_eq!(last.status, ProgressStatus::Completed);
    assert_eq!(last.watched_seconds, last.total_seconds);
    assert!(last.next_lesson_id.is_none());

    let stored = progress.get_progress(user, course).await.unwrap();
    assert_eq!(stored, last);
    assert_eq!(progress.my_learning(user).await.unwrap(), vec![last]);
}

#[tokio::test]
async fn progress_is_per_learner() {
    let app = app("memdb_learning_per_user").await;
    let progress = app.progress();
    let course = CourseId::new(1);

    progress
        .record_watch_event(UserId::new(1), course, LessonId::new(1))
        .await
        .unwrap();
    let other = progress.get_progress(UserId::new(2), course).await.unwrap();
    assert!(other.percent.is_zero());

    let mine = progress.get_progress(UserId::new(1), course).await.unwrap();
    assert_eq!(mine.percent.value(), 25);
    assert_eq!(mine.next_lesson_id, Some(LessonId::new(2)));
}

#[tokio::test]
async fn quiz_retake_improves_best_attempt() {
    let app = app("memdb_learning_quiz").await;
    let quizzes = app.quizzes();
    let user = UserId::new(7);
    let started = fixed_now() - Duration::minutes(3);

    let first = quizzes
        .submit_attempt(user, QuizId::new(1), Answers::new().with(0, 0), started)
        .await
        .unwrap();
    assert_eq!(first.result.percent.value(), 50);
    assert!(!first.result.passed);

    let second = quizzes
        .submit_attempt(
            user,
            QuizId::new(1),
            "0=0,1=0".parse::<Answers>().unwrap(),
            started,
        )
        .await
        .unwrap();
    assert!(second.result.passed);
    assert!(second.attempt_id > first.attempt_id);

    let best = quizzes.best_attempt(user, QuizId::new(1)).await.unwrap().unwrap();
    assert_eq!(best.id, Some(second.attempt_id));

    let stats = quizzes.quiz_stats(QuizId::new(1)).await.unwrap();
    assert_eq!(stats.attempts, 2);
    assert_eq!(stats.passed, 1);
    assert!((stats.average_percent - 75.0).abs() < 1e-9);
}
