use axum::{
    extract::{Extension, Path, State},
    response::Json,
};
use validator::Validate;

use crate::{
    middleware::auth::AuthUser,
    models::{
        attendance::{Attendance, AttendanceResponse, AttendanceStatus, MarkRegisterRequest},
        lesson::{CreateLessonRequest, Lesson, LessonResponse},
    },
    utils::{errors::AppError, logger::LOGGER},
    AppState,
};

/// Who the materialized register rows belong to: the cohort roster, or a
/// single named student for a cohort-less lesson.
#[derive(Debug, PartialEq, Eq)]
enum RegisterTarget {
    Cohort(i32),
    Student(i32),
}

fn register_target(cohort_id: Option<i32>, student_id: Option<i32>) -> Option<RegisterTarget> {
    match (cohort_id, student_id) {
        (Some(cohort_id), _) => Some(RegisterTarget::Cohort(cohort_id)),
        (None, Some(student_id)) => Some(RegisterTarget::Student(student_id)),
        (None, None) => None,
    }
}

/// A register upsert that trips the attendance FK means the entry named a
/// student that does not exist; that is the caller's mistake, not ours.
fn register_entry_error(err: sqlx::Error, student_id: i32) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
            AppError::BadRequest(format!("Unknown student id {}", student_id))
        }
        _ => AppError::from(err),
    }
}

async fn teacher_profile_id(state: &AppState, user_id: i32) -> Result<i32, AppError> {
    let profile =
        sqlx::query_as::<_, (i32,)>("SELECT id FROM teacher_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&state.db)
            .await?;

    profile
        .map(|(id,)| id)
        .ok_or_else(|| AppError::Forbidden("No teacher profile for this account".to_string()))
}

/// Schedule a lesson. Attendance rows are materialized up front with the
/// ABSENT default: one per enrolled cohort student, or one for the named
/// student when the lesson has no cohort.
pub async fn create_lesson(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<CreateLessonRequest>,
) -> Result<Json<LessonResponse>, AppError> {
    if !auth_user.is_teacher() {
        return Err(AppError::Forbidden(
            "Only teachers can schedule lessons".to_string(),
        ));
    }

    payload.validate()?;

    if payload.end_time <= payload.start_time {
        return Err(AppError::BadRequest(
            "end_time must be after start_time".to_string(),
        ));
    }
    let target = register_target(payload.cohort_id, payload.student_id).ok_or_else(|| {
        AppError::BadRequest("A lesson needs either a cohort or a target student".to_string())
    })?;

    let teacher_id = teacher_profile_id(&state, auth_user.user_id).await?;

    // Lesson and its materialized register commit together; a lesson with
    // no attendance rows would be invisible to the unmarked-register sweep.
    let mut tx = state.db.begin().await?;

    let lesson = sqlx::query_as::<_, Lesson>(
        r#"
        INSERT INTO lessons (topic, module_id, date, start_time, end_time, room, teacher_id, cohort_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(&payload.topic)
    .bind(payload.module_id)
    .bind(payload.date)
    .bind(payload.start_time)
    .bind(payload.end_time)
    .bind(&payload.room)
    .bind(teacher_id)
    .bind(payload.cohort_id)
    .fetch_one(&mut *tx)
    .await?;

    let materialized = match target {
        RegisterTarget::Cohort(cohort_id) => {
            sqlx::query(
                "INSERT INTO attendance (lesson_id, student_id)
                 SELECT $1, sp.id FROM student_profiles sp WHERE sp.cohort_id = $2",
            )
            .bind(lesson.id)
            .bind(cohort_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
        }
        RegisterTarget::Student(student_id) => {
            sqlx::query("INSERT INTO attendance (lesson_id, student_id) VALUES ($1, $2)")
                .bind(lesson.id)
                .bind(student_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| register_entry_error(e, student_id))?
                .rows_affected()
        }
    };

    tx.commit().await?;

    LOGGER.log_business_event(
        "lesson_scheduled",
        Some(auth_user.user_id),
        [(
            "attendance_rows".to_string(),
            serde_json::Value::Number(serde_json::Number::from(materialized)),
        )]
        .into_iter()
        .collect(),
    );

    Ok(Json(LessonResponse::from(lesson)))
}

/// List lessons visible to the caller: own lessons for a teacher, cohort
/// lessons for a student, everything for an admin.
pub async fn get_lessons(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<Vec<LessonResponse>>, AppError> {
    let lessons = if auth_user.is_admin() {
        sqlx::query_as::<_, Lesson>("SELECT * FROM lessons ORDER BY date DESC, start_time")
            .fetch_all(&state.db)
            .await?
    } else if auth_user.is_teacher() {
        let teacher_id = teacher_profile_id(&state, auth_user.user_id).await?;
        sqlx::query_as::<_, Lesson>(
            "SELECT * FROM lessons WHERE teacher_id = $1 ORDER BY date DESC, start_time",
        )
        .bind(teacher_id)
        .fetch_all(&state.db)
        .await?
    } else {
        sqlx::query_as::<_, Lesson>(
            "SELECT l.* FROM lessons l
             JOIN student_profiles sp ON sp.cohort_id = l.cohort_id
             WHERE sp.user_id = $1
             ORDER BY l.date DESC, l.start_time",
        )
        .bind(auth_user.user_id)
        .fetch_all(&state.db)
        .await?
    };

    Ok(Json(lessons.into_iter().map(LessonResponse::from).collect()))
}

/// Mark (or re-mark) a lesson's register. Upserts one attendance row per
/// entry; minutes_late is only kept for LATE entries.
pub async fn mark_register(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i32>,
    Json(payload): Json<MarkRegisterRequest>,
) -> Result<Json<Vec<AttendanceResponse>>, AppError> {
    payload.validate()?;

    let lesson = sqlx::query_as::<_, Lesson>("SELECT * FROM lessons WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lesson {} not found", id)))?;

    if !auth_user.is_admin() {
        let teacher_id = teacher_profile_id(&state, auth_user.user_id).await?;
        if lesson.teacher_id != teacher_id {
            return Err(AppError::Forbidden(
                "Only the lesson's teacher can mark its register".to_string(),
            ));
        }
    }

    // All entries land or none do; a register must never end up half-marked.
    let mut tx = state.db.begin().await?;

    let mut updated = Vec::with_capacity(payload.entries.len());
    for entry in &payload.entries {
        let minutes_late = match entry.status {
            AttendanceStatus::Late => entry.minutes_late,
            _ => None,
        };

        let row = sqlx::query_as::<_, Attendance>(
            r#"
            INSERT INTO attendance (lesson_id, student_id, status, minutes_late, notes)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (lesson_id, student_id)
            DO UPDATE SET
                status = $3,
                minutes_late = $4,
                notes = COALESCE($5, attendance.notes),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(lesson.id)
        .bind(entry.student_id)
        .bind(entry.status)
        .bind(minutes_late)
        .bind(&entry.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| register_entry_error(e, entry.student_id))?;

        updated.push(AttendanceResponse::from(row));
    }

    tx.commit().await?;

    LOGGER.log_business_event(
        "register_marked",
        Some(auth_user.user_id),
        [(
            "entries".to_string(),
            serde_json::Value::Number(serde_json::Number::from(updated.len())),
        )]
        .into_iter()
        .collect(),
    );

    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cohort_roster_takes_precedence_over_named_student() {
        assert_eq!(
            register_target(Some(7), Some(3)),
            Some(RegisterTarget::Cohort(7))
        );
        assert_eq!(
            register_target(None, Some(3)),
            Some(RegisterTarget::Student(3))
        );
        assert_eq!(register_target(None, None), None);
    }

    #[derive(Debug)]
    struct FkViolation;

    impl std::fmt::Display for FkViolation {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "violates foreign key constraint")
        }
    }

    impl std::error::Error for FkViolation {}

    impl sqlx::error::DatabaseError for FkViolation {
        fn message(&self) -> &str {
            "violates foreign key constraint"
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::ForeignKeyViolation
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }
    }

    #[test]
    fn unknown_student_in_register_maps_to_bad_request_with_the_id() {
        let err = register_entry_error(sqlx::Error::Database(Box::new(FkViolation)), 42);
        match err {
            AppError::BadRequest(msg) => assert!(msg.contains("42")),
            other => panic!("expected BadRequest, got {:?}", other),
        }
    }

    #[test]
    fn non_constraint_failures_stay_opaque() {
        let err = register_entry_error(sqlx::Error::PoolTimedOut, 42);
        assert!(matches!(err, AppError::InternalServerError(_)));
    }
}
