use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::Json,
};
use serde_json::json;

use crate::{
    middleware::auth::AuthUser,
    services::notification::{NotificationService, UnmarkedLesson},
    utils::errors::AppError,
    AppState,
};

/// Past lessons of the calling teacher whose register is still unmarked.
pub async fn get_unmarked_registers(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<Vec<UnmarkedLesson>>, AppError> {
    if !auth_user.is_teacher() {
        return Err(AppError::Forbidden(
            "Only teachers have a register backlog".to_string(),
        ));
    }

    let teacher_id =
        sqlx::query_as::<_, (i32,)>("SELECT id FROM teacher_profiles WHERE user_id = $1")
            .bind(auth_user.user_id)
            .fetch_optional(&state.db)
            .await?
            .map(|(id,)| id)
            .ok_or_else(|| {
                AppError::Forbidden("No teacher profile for this account".to_string())
            })?;

    let service = NotificationService::new(state.db.clone());
    let unmarked = service
        .unmarked_for_teacher(teacher_id)
        .await
        .map_err(AppError::from)?;

    Ok(Json(unmarked))
}

/// Manually run the daily unmarked-register sweep.
pub async fn trigger_notifications(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if !auth_user.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }

    let service = NotificationService::new(state.db.clone());
    match service.process_unmarked_registers().await {
        Ok(created) => Ok(Json(json!({ "notifications_created": created }))),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
