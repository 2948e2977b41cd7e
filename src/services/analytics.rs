use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Instant;

use crate::models::attendance::AttendanceStatus;
use crate::services::stats::{self, AttendanceMark, AttendanceStats};
use crate::utils::logger::LOGGER;

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub total_students: i64,
    pub total_teachers: i64,
    pub total_cohorts: i64,
    pub total_lessons: i64,
    pub overall_attendance: AttendanceStats,
    pub cohort_attendance: Vec<CohortAttendance>,
}

#[derive(Debug, Serialize)]
pub struct CohortAttendance {
    pub cohort_id: i32,
    pub cohort_name: String,
    pub student_count: i64,
    pub attendance: AttendanceStats,
}

#[derive(Debug)]
pub enum AnalyticsError {
    DatabaseError(String),
}

#[derive(Debug)]
pub struct AnalyticsService {
    pool: PgPool,
}

impl AnalyticsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attendance analytics across the whole college. Attendance summaries
    /// are folded through the same aggregator the timetable views use.
    pub async fn get_attendance_analytics(&self) -> Result<AnalyticsResponse, AnalyticsError> {
        let start_time = Instant::now();

        LOGGER.log_business_event("analytics_request_started", None, HashMap::new());

        let results = tokio::try_join!(
            self.get_basic_counts(),
            self.get_all_marks(),
            self.get_cohort_marks(),
            self.get_cohort_rosters()
        );

        let duration = start_time.elapsed();
        LOGGER.log_performance_metric(
            "analytics_total_duration",
            duration.as_millis() as f64,
            HashMap::new(),
        );

        match results {
            Ok((
                (total_students, total_teachers, total_cohorts, total_lessons),
                all_marks,
                cohort_marks,
                rosters,
            )) => {
                let overall_attendance = stats::summarize(&all_marks);

                let mut cohort_attendance: Vec<CohortAttendance> = rosters
                    .into_iter()
                    .map(|(cohort_id, cohort_name, student_count)| {
                        let marks = cohort_marks.get(&cohort_id).map(Vec::as_slice).unwrap_or(&[]);
                        CohortAttendance {
                            cohort_id,
                            cohort_name,
                            student_count,
                            attendance: stats::summarize(marks),
                        }
                    })
                    .collect();
                cohort_attendance.sort_by(|a, b| a.cohort_name.cmp(&b.cohort_name));

                LOGGER.log_business_event("analytics_request_completed", None, HashMap::new());

                Ok(AnalyticsResponse {
                    total_students,
                    total_teachers,
                    total_cohorts,
                    total_lessons,
                    overall_attendance,
                    cohort_attendance,
                })
            }
            Err(e) => Err(AnalyticsError::DatabaseError(e.to_string())),
        }
    }

    async fn get_basic_counts(&self) -> Result<(i64, i64, i64, i64), sqlx::Error> {
        let row = sqlx::query_as::<_, (i64, i64, i64, i64)>(
            "SELECT
                (SELECT COUNT(*)::bigint FROM users WHERE role = 'student'),
                (SELECT COUNT(*)::bigint FROM users WHERE role = 'teacher'),
                (SELECT COUNT(*)::bigint FROM cohorts),
                (SELECT COUNT(*)::bigint FROM lessons)",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_all_marks(&self) -> Result<Vec<AttendanceMark>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (AttendanceStatus, Option<i32>)>(
            "SELECT status, minutes_late FROM attendance",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(status, minutes_late)| AttendanceMark {
                status,
                minutes_late,
            })
            .collect())
    }

    async fn get_cohort_marks(
        &self,
    ) -> Result<HashMap<i32, Vec<AttendanceMark>>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (i32, AttendanceStatus, Option<i32>)>(
            "SELECT l.cohort_id, a.status, a.minutes_late
             FROM attendance a
             JOIN lessons l ON a.lesson_id = l.id
             WHERE l.cohort_id IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_cohort: HashMap<i32, Vec<AttendanceMark>> = HashMap::new();
        for (cohort_id, status, minutes_late) in rows {
            by_cohort.entry(cohort_id).or_default().push(AttendanceMark {
                status,
                minutes_late,
            });
        }

        Ok(by_cohort)
    }

    async fn get_cohort_rosters(&self) -> Result<Vec<(i32, String, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (i32, String, i64)>(
            "SELECT c.id, c.name, COUNT(sp.id)::bigint
             FROM cohorts c
             LEFT JOIN student_profiles sp ON sp.cohort_id = c.id
             GROUP BY c.id, c.name
             ORDER BY c.name",
        )
        .fetch_all(&self.pool)
        .await
    }
}
