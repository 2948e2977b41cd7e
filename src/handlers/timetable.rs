use axum::{
    extract::{Extension, Path, Query, State},
    response::Json,
};
use serde::Deserialize;

use crate::{
    middleware::auth::AuthUser,
    services::{
        stats::AttendanceStats,
        timetable::{TimetableResponse, TimetableService},
    },
    utils::{errors::AppError, logger::LOGGER, week::resolve_week},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct TimetableQuery {
    pub user_id: Option<i32>,
    pub week_start: Option<String>,
}

/// `GET /timetable?user_id=&week_start=` — the weekly timetable envelope.
///
/// `user_id` defaults to the session user; students may only request their
/// own. `week_start` snaps to its enclosing Monday-Sunday window and must
/// parse if present.
pub async fn get_timetable(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<TimetableQuery>,
) -> Result<Json<TimetableResponse>, AppError> {
    let target_id = query.user_id.unwrap_or(auth_user.user_id);

    if auth_user.is_student() && target_id != auth_user.user_id {
        return Err(AppError::Forbidden(
            "Students may only view their own timetable".to_string(),
        ));
    }

    let window = resolve_week(query.week_start.as_deref())
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let service = TimetableService::new(state.db.clone());
    let user = service.fetch_user(target_id).await?;
    let response = service.week_timetable(&user, window).await?;

    LOGGER.log_request("GET", "/timetable", Some(auth_user.user_id), 200);

    Ok(Json(response))
}

/// All-time attendance stats for one student, for the profile screens.
pub async fn get_student_attendance_stats(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<i32>,
) -> Result<Json<AttendanceStats>, AppError> {
    if auth_user.is_student() && user_id != auth_user.user_id {
        return Err(AppError::Forbidden(
            "Students may only view their own attendance".to_string(),
        ));
    }

    let service = TimetableService::new(state.db.clone());
    // 404 for an unknown user, zero stats for a student with no history.
    service.fetch_user(user_id).await?;
    let stats = service.student_all_time_stats(user_id).await?;

    Ok(Json(stats))
}
