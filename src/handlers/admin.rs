use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::Json,
};
use std::collections::HashMap;

use crate::{
    middleware::auth::AuthUser,
    models::{
        cohort::CohortOverview,
        user::{User, UserResponse},
    },
    services::analytics::{AnalyticsError, AnalyticsResponse, AnalyticsService},
    utils::logger::LOGGER,
    AppState,
};

pub async fn get_analytics(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<AnalyticsResponse>, StatusCode> {
    if !auth_user.is_admin() {
        LOGGER.log_business_event(
            "unauthorized_analytics_access",
            Some(auth_user.user_id),
            HashMap::new(),
        );
        return Err(StatusCode::FORBIDDEN);
    }

    LOGGER.log_request("GET", "/admin/analytics", Some(auth_user.user_id), 200);

    let analytics_service = AnalyticsService::new(state.db.clone());

    match analytics_service.get_attendance_analytics().await {
        Ok(analytics) => Ok(Json(analytics)),
        Err(AnalyticsError::DatabaseError(msg)) => {
            let mut context = HashMap::new();
            context.insert(
                "user_id".to_string(),
                serde_json::Value::Number(serde_json::Number::from(auth_user.user_id)),
            );
            context.insert(
                "error_type".to_string(),
                serde_json::Value::String("database".to_string()),
            );
            LOGGER.log_error(&msg, context);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn get_all_students(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<Vec<UserResponse>>, StatusCode> {
    if !auth_user.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }

    let students =
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE role = 'student' ORDER BY last_name")
            .fetch_all(&state.db)
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(students.into_iter().map(UserResponse::from).collect()))
}

pub async fn get_cohorts(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<Vec<CohortOverview>>, StatusCode> {
    if !auth_user.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }

    let cohorts = sqlx::query_as::<_, CohortOverview>(
        "SELECT c.id, c.name,
                d.name AS department_name,
                tu.first_name || ' ' || tu.last_name AS teacher_name,
                COUNT(sp.id)::bigint AS student_count
         FROM cohorts c
         LEFT JOIN departments d ON c.department_id = d.id
         LEFT JOIN teacher_profiles tp ON c.teacher_id = tp.id
         LEFT JOIN users tu ON tp.user_id = tu.id
         LEFT JOIN student_profiles sp ON sp.cohort_id = c.id
         GROUP BY c.id, c.name, d.name, tu.first_name, tu.last_name
         ORDER BY c.name",
    )
    .fetch_all(&state.db)
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(cohorts))
}
