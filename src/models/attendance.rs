use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attendance {
    pub id: i32,
    pub lesson_id: i32,
    pub student_id: i32,
    pub status: AttendanceStatus,
    pub minutes_late: Option<i32>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attendance_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
    Authorized,
}

/// One register entry submitted by a teacher for a single student.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterEntry {
    pub student_id: i32,
    pub status: AttendanceStatus,
    #[validate(range(min = 0, max = 600))]
    pub minutes_late: Option<i32>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MarkRegisterRequest {
    #[validate]
    pub entries: Vec<RegisterEntry>,
}

#[derive(Debug, Serialize)]
pub struct AttendanceResponse {
    pub id: i32,
    pub lesson_id: i32,
    pub student_id: i32,
    pub status: AttendanceStatus,
    pub minutes_late: Option<i32>,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<Attendance> for AttendanceResponse {
    fn from(att: Attendance) -> Self {
        Self {
            id: att.id,
            lesson_id: att.lesson_id,
            student_id: att.student_id,
            status: att.status,
            minutes_late: att.minutes_late,
            notes: att.notes,
            updated_at: att.updated_at,
        }
    }
}
