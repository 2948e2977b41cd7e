pub mod attendance;
pub mod cohort;
pub mod lesson;
pub mod user;
