use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lesson {
    pub id: i32,
    pub topic: String,
    pub module_id: Option<i32>,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub room: Option<String>,
    pub teacher_id: i32,
    pub cohort_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Lesson row joined with its optional module and the teacher's name,
/// as selected by the timetable queries.
#[derive(Debug, Clone, FromRow)]
pub struct LessonRow {
    pub id: i32,
    pub topic: String,
    pub module_id: Option<i32>,
    pub module_name: Option<String>,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub room: Option<String>,
    pub teacher_id: i32,
    pub teacher_name: String,
    pub cohort_id: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLessonRequest {
    #[validate(length(min = 1, max = 255))]
    pub topic: String,
    pub module_id: Option<i32>,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[validate(length(max = 64))]
    pub room: Option<String>,
    pub cohort_id: Option<i32>,
    /// Target for a cohort-less lesson (ad hoc 1:1 session).
    pub student_id: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct LessonResponse {
    pub id: i32,
    pub topic: String,
    pub module_id: Option<i32>,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub room: Option<String>,
    pub teacher_id: i32,
    pub cohort_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl From<Lesson> for LessonResponse {
    fn from(lesson: Lesson) -> Self {
        Self {
            id: lesson.id,
            topic: lesson.topic,
            module_id: lesson.module_id,
            date: lesson.date,
            start_time: lesson.start_time,
            end_time: lesson.end_time,
            room: lesson.room,
            teacher_id: lesson.teacher_id,
            cohort_id: lesson.cohort_id,
            created_at: lesson.created_at,
        }
    }
}
