pub mod admin;
pub mod auth;
pub mod lessons;
pub mod notifications;
pub mod timetable;
