use serde::Serialize;
use sqlx::FromRow;

/// Cohort listing row for the admin screens, with resolved names and an
/// enrolled-student count.
#[derive(Debug, Serialize, FromRow)]
pub struct CohortOverview {
    pub id: i32,
    pub name: String,
    pub department_name: Option<String>,
    pub teacher_name: Option<String>,
    pub student_count: i64,
}
