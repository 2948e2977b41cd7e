pub mod analytics;
pub mod notification;
pub mod stats;
pub mod timetable;
