mod handlers;
mod middleware;
mod models;
mod services;
mod utils;

use axum::{
    http::{HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use std::env;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    handlers::{admin, auth, lessons, notifications, timetable},
    middleware::auth::auth_middleware,
    utils::database::create_pool,
};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "college_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

    let db = create_pool(&database_url).await?;

    sqlx::migrate!("./migrations").run(&db).await?;

    let state = AppState { db, jwt_secret };

    let cors_origin =
        env::var("CORS_ALLOWED_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

    let cors = if cors_origin == "*" {
        CorsLayer::new()
            .allow_origin(axum::http::header::HeaderValue::from_static("*"))
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
            ])
    } else {
        CorsLayer::new()
            .allow_origin(cors_origin.parse::<HeaderValue>()?)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
            ])
    };

    let protected_routes = Router::new()
        .route("/timetable", get(timetable::get_timetable))
        .route(
            "/students/:id/attendance-stats",
            get(timetable::get_student_attendance_stats),
        )
        .route("/lessons", get(lessons::get_lessons))
        .route("/lessons", post(lessons::create_lesson))
        .route("/lessons/:id/register", put(lessons::mark_register))
        .route(
            "/notifications/unmarked",
            get(notifications::get_unmarked_registers),
        )
        .route("/admin/analytics", get(admin::get_analytics))
        .route("/admin/students", get(admin::get_all_students))
        .route("/admin/cohorts", get(admin::get_cohorts))
        .route(
            "/admin/notifications/trigger",
            post(notifications::trigger_notifications),
        )
        .route("/admin/register", post(auth::register_staff))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .merge(protected_routes)
        .layer(cors)
        .with_state(state.clone());

    // Daily sweep for registers nobody marked
    let notification_db = state.db.clone();
    tokio::spawn(async move {
        use crate::services::notification::NotificationService;
        use tokio_cron_scheduler::{Job, JobScheduler};

        let sched = JobScheduler::new()
            .await
            .expect("Failed to create scheduler");

        // Run daily at 9 AM
        let job = Job::new_async("0 0 9 * * *", move |_uuid, _l| {
            let db = notification_db.clone();
            Box::pin(async move {
                let notification_service = NotificationService::new(db);
                match notification_service.process_unmarked_registers().await {
                    Ok(created) => {
                        tracing::info!("Daily register sweep created {} notifications", created)
                    }
                    Err(e) => tracing::error!("Failed to process register notifications: {}", e),
                }
            })
        })
        .expect("Failed to create notification job");

        sched.add(job).await.expect("Failed to add job");
        sched.start().await.expect("Failed to start scheduler");

        tracing::info!("Register notification scheduler started - running daily at 9 AM");

        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server running on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
