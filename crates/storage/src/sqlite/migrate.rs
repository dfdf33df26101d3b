use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the catalog (courses, sections, lessons), learner progress, quizzes
/// with their questions/options, and graded attempts.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if is_applied(pool, 1).await? {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    let statements = [
        r"
            CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL
            );
        ",
        r"
            CREATE TABLE IF NOT EXISTS sections (
                id INTEGER PRIMARY KEY,
                course_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                position INTEGER NOT NULL CHECK (position >= 0),
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
        ",
        r"
            CREATE TABLE IF NOT EXISTS lessons (
                id INTEGER PRIMARY KEY,
                course_id INTEGER NOT NULL,
                section_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                duration_seconds INTEGER NOT NULL CHECK (duration_seconds >= 0),
                free_preview INTEGER NOT NULL DEFAULT 0,
                position INTEGER NOT NULL CHECK (position >= 0),
                FOREIGN KEY (section_id) REFERENCES sections(id) ON DELETE CASCADE,
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
        ",
        // Progress rows are not tied to the catalog: watched ids may refer to
        // lessons the catalog no longer (or not yet) lists.
        r"
            CREATE TABLE IF NOT EXISTS progress (
                user_id INTEGER NOT NULL,
                course_id INTEGER NOT NULL,
                percent INTEGER NOT NULL CHECK (percent BETWEEN 0 AND 100),
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, course_id)
            );
        ",
        r"
            CREATE TABLE IF NOT EXISTS watched_lessons (
                user_id INTEGER NOT NULL,
                course_id INTEGER NOT NULL,
                lesson_id INTEGER NOT NULL,
                PRIMARY KEY (user_id, course_id, lesson_id),
                FOREIGN KEY (user_id, course_id)
                    REFERENCES progress(user_id, course_id) ON DELETE CASCADE
            );
        ",
        r"
            CREATE TABLE IF NOT EXISTS quizzes (
                id INTEGER PRIMARY KEY,
                lesson_id INTEGER,
                title TEXT NOT NULL,
                passing_score INTEGER NOT NULL CHECK (passing_score BETWEEN 0 AND 100),
                time_limit_minutes INTEGER CHECK (time_limit_minutes > 0),
                status TEXT NOT NULL
            );
        ",
        r"
            CREATE TABLE IF NOT EXISTS quiz_questions (
                quiz_id INTEGER NOT NULL,
                position INTEGER NOT NULL CHECK (position >= 0),
                text TEXT NOT NULL,
                kind TEXT NOT NULL,
                points INTEGER NOT NULL CHECK (points > 0),
                explanation TEXT,
                PRIMARY KEY (quiz_id, position),
                FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE
            );
        ",
        r"
            CREATE TABLE IF NOT EXISTS quiz_options (
                quiz_id INTEGER NOT NULL,
                question_position INTEGER NOT NULL,
                position INTEGER NOT NULL CHECK (position >= 0),
                text TEXT NOT NULL,
                is_correct INTEGER NOT NULL,
                PRIMARY KEY (quiz_id, question_position, position),
                FOREIGN KEY (quiz_id, question_position)
                    REFERENCES quiz_questions(quiz_id, position) ON DELETE CASCADE
            );
        ",
        r"
            CREATE TABLE IF NOT EXISTS quiz_attempts (
                id INTEGER PRIMARY KEY,
                quiz_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                percent INTEGER NOT NULL CHECK (percent BETWEEN 0 AND 100),
                passed INTEGER NOT NULL,
                earned_points INTEGER NOT NULL CHECK (earned_points >= 0),
                total_points INTEGER NOT NULL CHECK (total_points >= 0),
                started_at TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE
            );
        ",
        r"
            CREATE INDEX IF NOT EXISTS idx_lessons_section_position
                ON lessons (section_id, position);
        ",
        r"
            CREATE INDEX IF NOT EXISTS idx_quizzes_lesson
                ON quizzes (lesson_id);
        ",
        r"
            CREATE INDEX IF NOT EXISTS idx_quiz_attempts_quiz_user
                ON quiz_attempts (quiz_id, user_id, completed_at);
        ",
    ];

    for statement in statements {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    sqlx::query(
        r"
            INSERT INTO schema_migrations (version, applied_at)
            VALUES (?1, ?2)
            ON CONFLICT(version) DO NOTHING
        ",
    )
    .bind(1_i64)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(())
}
