use course_core::model::{Course, CourseId, Lesson, Section};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{
    conn, course_id_from_i64, i64_to_u32, id_to_i64, lesson_id_from_i64, section_id_from_i64, ser,
    usize_to_i64, write_err,
};
use crate::repository::{CatalogRepository, StorageError};

#[async_trait::async_trait]
impl CatalogRepository for SqliteRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let course_id = id_to_i64("course_id", course.id().value())?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO courses (id, title)
            VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET title = excluded.title
            ",
        )
        .bind(course_id)
        .bind(course.title())
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        // The section/lesson tree is replaced wholesale.
        sqlx::query("DELETE FROM lessons WHERE course_id = ?1")
            .bind(course_id)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        sqlx::query("DELETE FROM sections WHERE course_id = ?1")
            .bind(course_id)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;

        for (section_pos, section) in course.sections().iter().enumerate() {
            let section_id = id_to_i64("section_id", section.id.value())?;
            sqlx::query(
                r"
                INSERT INTO sections (id, course_id, title, position)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(section_id)
            .bind(course_id)
            .bind(&section.title)
            .bind(usize_to_i64("section position", section_pos)?)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;

            for (lesson_pos, lesson) in section.lessons.iter().enumerate() {
                sqlx::query(
                    r"
                    INSERT INTO lessons (
                        id, course_id, section_id, title, duration_seconds, free_preview, position
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ",
                )
                .bind(id_to_i64("lesson_id", lesson.id.value())?)
                .bind(course_id)
                .bind(section_id)
                .bind(&lesson.title)
                .bind(i64::from(lesson.duration_seconds))
                .bind(lesson.free_preview)
                .bind(usize_to_i64("lesson position", lesson_pos)?)
                .execute(&mut *tx)
                .await
                .map_err(write_err)?;
            }
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let row = sqlx::query("SELECT id, title FROM courses WHERE id = ?1")
            .bind(id_to_i64("course_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        match row {
            Some(row) => self.load_course(&row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn list_courses(&self, limit: u32) -> Result<Vec<Course>, StorageError> {
        let rows = sqlx::query("SELECT id, title FROM courses ORDER BY id ASC LIMIT ?1")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut courses = Vec::with_capacity(rows.len());
        for row in rows {
            courses.push(self.load_course(&row).await?);
        }
        Ok(courses)
    }
}

impl SqliteRepository {
    async fn load_course(&self, row: &SqliteRow) -> Result<Course, StorageError> {
        let course_id: i64 = row.try_get("id").map_err(ser)?;
        let title: String = row.try_get("title").map_err(ser)?;

        let section_rows = sqlx::query(
            r"
            SELECT id, title FROM sections
            WHERE course_id = ?1
            ORDER BY position ASC
            ",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let lesson_rows = sqlx::query(
            r"
            SELECT l.id, l.section_id, l.title, l.duration_seconds, l.free_preview
            FROM lessons l
            JOIN sections s ON s.id = l.section_id
            WHERE l.course_id = ?1
            ORDER BY s.position ASC, l.position ASC
            ",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut sections = Vec::with_capacity(section_rows.len());
        for row in &section_rows {
            sections.push(Section::new(
                section_id_from_i64(row.try_get("id").map_err(ser)?)?,
                row.try_get::<String, _>("title").map_err(ser)?,
                Vec::new(),
            ));
        }

        for row in &lesson_rows {
            let section_id = section_id_from_i64(row.try_get("section_id").map_err(ser)?)?;
            let lesson = Lesson::new(
                lesson_id_from_i64(row.try_get("id").map_err(ser)?)?,
                row.try_get::<String, _>("title").map_err(ser)?,
                i64_to_u32(
                    "duration_seconds",
                    row.try_get("duration_seconds").map_err(ser)?,
                )?,
            )
            .with_free_preview(row.try_get::<bool, _>("free_preview").map_err(ser)?);

            let section = sections
                .iter_mut()
                .find(|s| s.id == section_id)
                .ok_or_else(|| {
                    StorageError::Serialization(format!("lesson in unknown section {section_id}"))
                })?;
            section.lessons.push(lesson);
        }

        Course::new(course_id_from_i64(course_id)?, title, sections).map_err(ser)
    }
}
