use axum::{
    extract::{Extension, State},
    response::Json,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use validator::Validate;

use crate::{
    middleware::auth::{role_str, AuthUser},
    models::user::{CreateUserRequest, LoginRequest, LoginResponse, User, UserResponse, UserRole},
    utils::{errors::AppError, jwt::create_jwt},
    AppState,
};

/// Public registration always creates a student account; staff accounts go
/// through `register_staff`.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    payload.validate()?;

    let password_hash = hash(&payload.password, DEFAULT_COST)
        .map_err(|_| AppError::InternalServerError("Failed to hash password".to_string()))?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, password_hash, first_name, last_name, role, avatar_url)
        VALUES ($1, $2, $3, $4, 'student', $5)
        RETURNING *
        "#,
    )
    .bind(&payload.email)
    .bind(&password_hash)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(&payload.avatar_url)
    .fetch_one(&state.db)
    .await?;

    sqlx::query("INSERT INTO student_profiles (user_id) VALUES ($1)")
        .bind(user.id)
        .execute(&state.db)
        .await?;

    Ok(Json(UserResponse::from(user)))
}

pub async fn register_staff(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    if !auth_user.is_admin() {
        return Err(AppError::Forbidden(
            "Only admins can create staff accounts".to_string(),
        ));
    }

    payload.validate()?;

    let password_hash = hash(&payload.password, DEFAULT_COST)
        .map_err(|_| AppError::InternalServerError("Failed to hash password".to_string()))?;

    let role = payload.role.unwrap_or(UserRole::Teacher);

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, password_hash, first_name, last_name, role, avatar_url)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(&payload.email)
    .bind(&password_hash)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(role)
    .bind(&payload.avatar_url)
    .fetch_one(&state.db)
    .await?;

    match role {
        UserRole::Teacher => {
            sqlx::query("INSERT INTO teacher_profiles (user_id) VALUES ($1)")
                .bind(user.id)
                .execute(&state.db)
                .await?;
        }
        UserRole::Student => {
            sqlx::query("INSERT INTO student_profiles (user_id) VALUES ($1)")
                .bind(user.id)
                .execute(&state.db)
                .await?;
        }
        UserRole::Admin => {}
    }

    Ok(Json(UserResponse::from(user)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    payload.validate()?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&payload.email)
        .fetch_one(&state.db)
        .await
        .map_err(|_| AppError::Unauthorized("Invalid email or password".to_string()))?;

    let is_valid = verify(&payload.password, &user.password_hash)
        .map_err(|_| AppError::InternalServerError("Failed to verify password".to_string()))?;

    if !is_valid {
        return Err(AppError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    }

    let token = create_jwt(user.id, role_str(user.role), &state.jwt_secret)
        .map_err(|_| AppError::InternalServerError("Failed to create token".to_string()))?;

    Ok(Json(LoginResponse {
        token,
        user: UserResponse::from(user),
    }))
}
