use course_core::model::{LessonId, Question, Quiz, QuizDefinition, QuizId, QuizOption};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{
    conn, i64_to_u32, id_to_i64, lesson_id_from_i64, parse_question_kind, parse_quiz_status,
    percent_from_i64, quiz_id_from_i64, ser, usize_to_i64, write_err,
};
use crate::repository::{QuizRepository, StorageError};

const QUIZ_COLUMNS: &str = "id, lesson_id, title, passing_score, time_limit_minutes, status";

#[async_trait::async_trait]
impl QuizRepository for SqliteRepository {
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let quiz_id = id_to_i64("quiz_id", quiz.id().value())?;
        let lesson_id = quiz
            .lesson_id()
            .map(|l| id_to_i64("lesson_id", l.value()))
            .transpose()?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO quizzes (id, lesson_id, title, passing_score, time_limit_minutes, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                lesson_id = excluded.lesson_id,
                title = excluded.title,
                passing_score = excluded.passing_score,
                time_limit_minutes = excluded.time_limit_minutes,
                status = excluded.status
            ",
        )
        .bind(quiz_id)
        .bind(lesson_id)
        .bind(quiz.title())
        .bind(i64::from(quiz.passing_score_percent().value()))
        .bind(quiz.time_limit_minutes().map(i64::from))
        .bind(quiz.status().as_str())
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        sqlx::query("DELETE FROM quiz_options WHERE quiz_id = ?1")
            .bind(quiz_id)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        sqlx::query("DELETE FROM quiz_questions WHERE quiz_id = ?1")
            .bind(quiz_id)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;

        for (q_pos, question) in quiz.questions().iter().enumerate() {
            let q_pos = usize_to_i64("question position", q_pos)?;
            sqlx::query(
                r"
                INSERT INTO quiz_questions (quiz_id, position, text, kind, points, explanation)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )
            .bind(quiz_id)
            .bind(q_pos)
            .bind(&question.text)
            .bind(question.kind.as_str())
            .bind(i64::from(question.points))
            .bind(question.explanation.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;

            for (o_pos, option) in question.options.iter().enumerate() {
                sqlx::query(
                    r"
                    INSERT INTO quiz_options (quiz_id, question_position, position, text, is_correct)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ",
                )
                .bind(quiz_id)
                .bind(q_pos)
                .bind(usize_to_i64("option position", o_pos)?)
                .bind(&option.text)
                .bind(option.is_correct)
                .execute(&mut *tx)
                .await
                .map_err(write_err)?;
            }
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_quiz(&self, id: QuizId) -> Result<Option<Quiz>, StorageError> {
        let row = sqlx::query(&format!("SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = ?1"))
            .bind(id_to_i64("quiz_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        match row {
            Some(row) => self.load_quiz(&row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn quizzes_for_lesson(&self, lesson_id: LessonId) -> Result<Vec<Quiz>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {QUIZ_COLUMNS} FROM quizzes WHERE lesson_id = ?1 ORDER BY id ASC"
        ))
        .bind(id_to_i64("lesson_id", lesson_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(self.load_quiz(&row).await?);
        }
        Ok(out)
    }
}

impl SqliteRepository {
    async fn load_quiz(&self, row: &SqliteRow) -> Result<Quiz, StorageError> {
        let quiz_id: i64 = row.try_get("id").map_err(ser)?;
        let lesson_id: Option<i64> = row.try_get("lesson_id").map_err(ser)?;
        let passing: i64 = row.try_get("passing_score").map_err(ser)?;
        let time_limit: Option<i64> = row.try_get("time_limit_minutes").map_err(ser)?;
        let status: String = row.try_get("status").map_err(ser)?;

        let mut def = QuizDefinition::new(
            quiz_id_from_i64(quiz_id)?,
            row.try_get::<String, _>("title").map_err(ser)?,
        );
        def.lesson_id = lesson_id.map(lesson_id_from_i64).transpose()?;
        def.passing_score_percent = percent_from_i64("passing_score", passing)?;
        def.time_limit_minutes = time_limit
            .map(|m| i64_to_u32("time_limit_minutes", m))
            .transpose()?;
        def.status = parse_quiz_status(&status)?;

        let question_rows = sqlx::query(
            r"
            SELECT position, text, kind, points, explanation
            FROM quiz_questions
            WHERE quiz_id = ?1
            ORDER BY position ASC
            ",
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let option_rows = sqlx::query(
            r"
            SELECT question_position, text, is_correct
            FROM quiz_options
            WHERE quiz_id = ?1
            ORDER BY question_position ASC, position ASC
            ",
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut positions = Vec::with_capacity(question_rows.len());
        for r in &question_rows {
            let kind: String = r.try_get("kind").map_err(ser)?;
            positions.push(r.try_get::<i64, _>("position").map_err(ser)?);
            def.questions.push(Question {
                text: r.try_get("text").map_err(ser)?,
                kind: parse_question_kind(&kind)?,
                points: i64_to_u32("points", r.try_get("points").map_err(ser)?)?,
                options: Vec::new(),
                explanation: r.try_get("explanation").map_err(ser)?,
            });
        }

        for r in &option_rows {
            let position: i64 = r.try_get("question_position").map_err(ser)?;
            let index = positions
                .iter()
                .position(|p| *p == position)
                .ok_or_else(|| {
                    StorageError::Serialization(format!("option for unknown question {position}"))
                })?;
            def.questions[index].options.push(QuizOption::new(
                r.try_get::<String, _>("text").map_err(ser)?,
                r.try_get::<bool, _>("is_correct").map_err(ser)?,
            ));
        }

        Quiz::new(def).map_err(ser)
    }
}
