use chrono::{DateTime, Utc};
use course_core::model::{QuizId, UserId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{
    conn, i64_to_u64, id_to_i64, percent_from_i64, quiz_id_from_i64, ser, user_id_from_i64,
    write_err,
};
use crate::repository::{AttemptRecord, QuizAttemptRepository, QuizStats, StorageError};

fn map_attempt_row(row: &SqliteRow) -> Result<AttemptRecord, StorageError> {
    let started_at: DateTime<Utc> = row.try_get("started_at").map_err(ser)?;
    let completed_at: DateTime<Utc> = row.try_get("completed_at").map_err(ser)?;
    Ok(AttemptRecord {
        id: Some(row.try_get("id").map_err(ser)?),
        quiz_id: quiz_id_from_i64(row.try_get("quiz_id").map_err(ser)?)?,
        user_id: user_id_from_i64(row.try_get("user_id").map_err(ser)?)?,
        percent: percent_from_i64("percent", row.try_get("percent").map_err(ser)?)?,
        passed: row.try_get("passed").map_err(ser)?,
        earned_points: i64_to_u64("earned_points", row.try_get("earned_points").map_err(ser)?)?,
        total_points: i64_to_u64("total_points", row.try_get("total_points").map_err(ser)?)?,
        started_at,
        completed_at,
    })
}

#[async_trait::async_trait]
impl QuizAttemptRepository for SqliteRepository {
    async fn append_attempt(&self, record: AttemptRecord) -> Result<i64, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO quiz_attempts (
                    quiz_id, user_id, percent, passed,
                    earned_points, total_points, started_at, completed_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(id_to_i64("quiz_id", record.quiz_id.value())?)
        .bind(id_to_i64("user_id", record.user_id.value())?)
        .bind(i64::from(record.percent.value()))
        .bind(record.passed)
        .bind(id_to_i64("earned_points", record.earned_points)?)
        .bind(id_to_i64("total_points", record.total_points)?)
        .bind(record.started_at)
        .bind(record.completed_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(res.last_insert_rowid())
    }

    async fn attempts_for_user(
        &self,
        quiz_id: QuizId,
        user_id: UserId,
    ) -> Result<Vec<AttemptRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    id, quiz_id, user_id, percent, passed,
                    earned_points, total_points, started_at, completed_at
                FROM quiz_attempts
                WHERE quiz_id = ?1 AND user_id = ?2
                ORDER BY completed_at ASC, id ASC
            ",
        )
        .bind(id_to_i64("quiz_id", quiz_id.value())?)
        .bind(id_to_i64("user_id", user_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_attempt_row(&row)?);
        }
        Ok(out)
    }

    async fn quiz_stats(&self, quiz_id: QuizId) -> Result<QuizStats, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    COUNT(*) AS attempts,
                    AVG(percent) AS average_percent,
                    COALESCE(SUM(passed), 0) AS passed
                FROM quiz_attempts
                WHERE quiz_id = ?1
            ",
        )
        .bind(id_to_i64("quiz_id", quiz_id.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        let average: Option<f64> = row.try_get("average_percent").map_err(ser)?;
        Ok(QuizStats {
            attempts: i64_to_u64("attempts", row.try_get("attempts").map_err(ser)?)?,
            average_percent: average.unwrap_or(0.0),
            passed: i64_to_u64("passed", row.try_get("passed").map_err(ser)?)?,
        })
    }
}
