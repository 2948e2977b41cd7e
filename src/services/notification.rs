use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;

use crate::utils::logger::LOGGER;

/// A past lesson whose register was never marked (every row still carries
/// the materialized ABSENT default).
#[derive(Debug, Serialize, FromRow)]
pub struct UnmarkedLesson {
    pub lesson_id: i32,
    pub topic: String,
    pub date: NaiveDate,
    pub teacher_id: i32,
}

#[derive(Debug)]
pub struct NotificationService {
    pool: PgPool,
}

impl NotificationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_unmarked(&self) -> Result<Vec<UnmarkedLesson>, sqlx::Error> {
        sqlx::query_as::<_, UnmarkedLesson>(
            "SELECT l.id AS lesson_id, l.topic, l.date, l.teacher_id
             FROM lessons l
             WHERE l.date < CURRENT_DATE
               AND EXISTS (
                   SELECT 1 FROM attendance a WHERE a.lesson_id = l.id
               )
               AND NOT EXISTS (
                   SELECT 1 FROM attendance a
                   WHERE a.lesson_id = l.id AND a.updated_at > a.created_at
               )
             ORDER BY l.date ASC",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Unmarked past lessons belonging to one teacher.
    pub async fn unmarked_for_teacher(
        &self,
        teacher_id: i32,
    ) -> Result<Vec<UnmarkedLesson>, sqlx::Error> {
        sqlx::query_as::<_, UnmarkedLesson>(
            "SELECT l.id AS lesson_id, l.topic, l.date, l.teacher_id
             FROM lessons l
             WHERE l.teacher_id = $1
               AND l.date < CURRENT_DATE
               AND EXISTS (
                   SELECT 1 FROM attendance a WHERE a.lesson_id = l.id
               )
               AND NOT EXISTS (
                   SELECT 1 FROM attendance a
                   WHERE a.lesson_id = l.id AND a.updated_at > a.created_at
               )
             ORDER BY l.date ASC",
        )
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Record a notification row per unmarked register. Delivery is someone
    /// else's concern; the rows are the interface.
    pub async fn process_unmarked_registers(&self) -> Result<usize, sqlx::Error> {
        let unmarked = self.find_unmarked().await?;
        let mut created = 0usize;

        for lesson in &unmarked {
            let result = sqlx::query(
                "INSERT INTO notifications (teacher_id, lesson_id, kind, message)
                 VALUES ($1, $2, 'unmarked_register', $3)
                 ON CONFLICT (lesson_id, kind) DO NOTHING",
            )
            .bind(lesson.teacher_id)
            .bind(lesson.lesson_id)
            .bind(format!(
                "Register for '{}' on {} has not been marked",
                lesson.topic, lesson.date
            ))
            .execute(&self.pool)
            .await?;

            created += result.rows_affected() as usize;
        }

        LOGGER.log_business_event(
            "unmarked_register_notifications_processed",
            None,
            [
                (
                    "unmarked_lessons".to_string(),
                    serde_json::Value::Number(serde_json::Number::from(unmarked.len())),
                ),
                (
                    "notifications_created".to_string(),
                    serde_json::Value::Number(serde_json::Number::from(created)),
                ),
            ]
            .into_iter()
            .collect::<HashMap<_, _>>(),
        );

        Ok(created)
    }
}
