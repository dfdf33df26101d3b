use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use course_core::model::{CourseId, LessonId, ProgressRecord, UserId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{
    conn, course_id_from_i64, id_to_i64, lesson_id_from_i64, percent_from_i64, ser,
    user_id_from_i64, write_err,
};
use crate::repository::{ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT user_id, course_id, percent, updated_at
            FROM progress
            WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .bind(id_to_i64("course_id", course_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => self.load_progress(&row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn save_progress(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let user_id = id_to_i64("user_id", record.user_id.value())?;
        let course_id = id_to_i64("course_id", record.course_id.value())?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO progress (user_id, course_id, percent, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, course_id) DO UPDATE SET
                -- percent never goes backwards
                percent = MAX(progress.percent, excluded.percent),
                updated_at = excluded.updated_at
            ",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(i64::from(record.percent.value()))
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        for lesson in &record.watched_lesson_ids {
            sqlx::query(
                r"
                INSERT INTO watched_lessons (user_id, course_id, lesson_id)
                VALUES (?1, ?2, ?3)
                ON CONFLICT DO NOTHING
                ",
            )
            .bind(user_id)
            .bind(course_id)
            .bind(id_to_i64("lesson_id", lesson.value())?)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn progress_for_user(&self, user_id: UserId) -> Result<Vec<ProgressRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT user_id, course_id, percent, updated_at
            FROM progress
            WHERE user_id = ?1
            ORDER BY course_id ASC
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(self.load_progress(&row).await?);
        }
        Ok(out)
    }
}

impl SqliteRepository {
    async fn load_progress(&self, row: &SqliteRow) -> Result<ProgressRecord, StorageError> {
        let user_id: i64 = row.try_get("user_id").map_err(ser)?;
        let course_id: i64 = row.try_get("course_id").map_err(ser)?;
        let percent: i64 = row.try_get("percent").map_err(ser)?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(ser)?;

        let lesson_rows = sqlx::query(
            r"
            SELECT lesson_id FROM watched_lessons
            WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut watched: BTreeSet<LessonId> = BTreeSet::new();
        for r in &lesson_rows {
            watched.insert(lesson_id_from_i64(r.try_get("lesson_id").map_err(ser)?)?);
        }

        Ok(ProgressRecord {
            course_id: course_id_from_i64(course_id)?,
            user_id: user_id_from_i64(user_id)?,
            watched_lesson_ids: watched,
            percent: percent_from_i64("percent", percent)?,
            updated_at,
        })
    }
}
