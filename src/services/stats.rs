use serde::Serialize;

use crate::models::attendance::AttendanceStatus;

/// Status plus lateness of a single attendance record, stripped of
/// everything the aggregation does not need.
#[derive(Debug, Clone, Copy)]
pub struct AttendanceMark {
    pub status: AttendanceStatus,
    pub minutes_late: Option<i32>,
}

/// Derived attendance summary. Computed fresh on every request, never
/// persisted, and only ever computed by this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttendanceStats {
    pub total: i64,
    pub present: i64,
    pub late: i64,
    pub authorized_absence: i64,
    pub unauthorized_absence: i64,
    pub average_lateness: i64,
}

impl AttendanceStats {
    pub fn zero() -> Self {
        Self {
            total: 0,
            present: 0,
            late: 0,
            authorized_absence: 0,
            unauthorized_absence: 0,
            average_lateness: 0,
        }
    }
}

/// Per-lesson breakdown across all attendees, shown on the teacher view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LessonAttendanceSummary {
    pub total: i64,
    pub present: i64,
    pub late: i64,
    pub absent: i64,
    pub authorized: i64,
}

#[derive(Debug, Default)]
struct Buckets {
    total: i64,
    present: i64,
    late: i64,
    absent: i64,
    authorized: i64,
    late_minutes_sum: i64,
}

impl Buckets {
    fn fold<'a>(marks: impl IntoIterator<Item = &'a AttendanceMark>) -> Self {
        let mut b = Buckets::default();
        for mark in marks {
            b.total += 1;
            match mark.status {
                AttendanceStatus::Present => b.present += 1,
                AttendanceStatus::Late => {
                    b.late += 1;
                    b.late_minutes_sum += mark.minutes_late.unwrap_or(0) as i64;
                }
                AttendanceStatus::Absent => b.absent += 1,
                AttendanceStatus::Authorized => b.authorized += 1,
            }
        }
        b
    }

    // Round half-up in integer arithmetic. Exactly zero when there are no
    // late records, regardless of the accumulated sum.
    fn average_lateness(&self) -> i64 {
        if self.late == 0 {
            return 0;
        }
        (self.late_minutes_sum * 2 + self.late) / (self.late * 2)
    }
}

/// Summarize a set of attendance records into [`AttendanceStats`].
///
/// Pure and deterministic; the caller decides the scope (a week window,
/// all time, a single lesson).
pub fn summarize<'a>(marks: impl IntoIterator<Item = &'a AttendanceMark>) -> AttendanceStats {
    let b = Buckets::fold(marks);
    AttendanceStats {
        total: b.total,
        present: b.present,
        late: b.late,
        authorized_absence: b.authorized,
        unauthorized_absence: b.absent,
        average_lateness: b.average_lateness(),
    }
}

/// Summarize one lesson's register for the teacher-view event projection.
pub fn summarize_lesson<'a>(
    marks: impl IntoIterator<Item = &'a AttendanceMark>,
) -> LessonAttendanceSummary {
    let b = Buckets::fold(marks);
    LessonAttendanceSummary {
        total: b.total,
        present: b.present,
        late: b.late,
        absent: b.absent,
        authorized: b.authorized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark(status: AttendanceStatus, minutes_late: Option<i32>) -> AttendanceMark {
        AttendanceMark {
            status,
            minutes_late,
        }
    }

    #[test]
    fn empty_set_is_all_zeros() {
        let empty: [AttendanceMark; 0] = [];
        assert_eq!(summarize(&empty), AttendanceStats::zero());
    }

    #[test]
    fn student_week_fixture() {
        let marks = [
            mark(AttendanceStatus::Present, None),
            mark(AttendanceStatus::Late, Some(10)),
            mark(AttendanceStatus::Authorized, None),
        ];
        let stats = summarize(&marks);
        assert_eq!(
            stats,
            AttendanceStats {
                total: 3,
                present: 1,
                late: 1,
                authorized_absence: 1,
                unauthorized_absence: 0,
                average_lateness: 10,
            }
        );
    }

    #[test]
    fn teacher_lesson_fixture() {
        let marks = [
            mark(AttendanceStatus::Present, None),
            mark(AttendanceStatus::Present, None),
            mark(AttendanceStatus::Absent, None),
            mark(AttendanceStatus::Late, Some(5)),
        ];
        let summary = summarize_lesson(&marks);
        assert_eq!(
            summary,
            LessonAttendanceSummary {
                total: 4,
                present: 2,
                late: 1,
                absent: 1,
                authorized: 0,
            }
        );
        assert_eq!(summarize(&marks).average_lateness, 5);
    }

    #[test]
    fn buckets_partition_the_set() {
        let marks = [
            mark(AttendanceStatus::Present, None),
            mark(AttendanceStatus::Late, Some(3)),
            mark(AttendanceStatus::Late, Some(7)),
            mark(AttendanceStatus::Absent, None),
            mark(AttendanceStatus::Authorized, None),
            mark(AttendanceStatus::Absent, None),
        ];
        let stats = summarize(&marks);
        assert_eq!(
            stats.present + stats.late + stats.authorized_absence + stats.unauthorized_absence,
            stats.total
        );
    }

    #[test]
    fn no_late_records_means_average_exactly_zero() {
        // A stray minutes_late on a non-late record must not leak into the
        // average.
        let marks = [
            mark(AttendanceStatus::Present, Some(15)),
            mark(AttendanceStatus::Absent, None),
        ];
        assert_eq!(summarize(&marks).average_lateness, 0);
    }

    #[test]
    fn average_rounds_half_up() {
        // (3 + 4) / 2 = 3.5 -> 4
        let marks = [
            mark(AttendanceStatus::Late, Some(3)),
            mark(AttendanceStatus::Late, Some(4)),
        ];
        assert_eq!(summarize(&marks).average_lateness, 4);

        // (3 + 3 + 4) / 3 = 3.33 -> 3
        let marks = [
            mark(AttendanceStatus::Late, Some(3)),
            mark(AttendanceStatus::Late, Some(3)),
            mark(AttendanceStatus::Late, Some(4)),
        ];
        assert_eq!(summarize(&marks).average_lateness, 3);
    }

    #[test]
    fn late_record_without_minutes_counts_as_zero_minutes() {
        let marks = [
            mark(AttendanceStatus::Late, None),
            mark(AttendanceStatus::Late, Some(10)),
        ];
        assert_eq!(summarize(&marks).average_lateness, 5);
    }
}
