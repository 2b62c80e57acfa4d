pub mod attendance;
pub mod auth;
pub mod backup_exchange;
pub mod content;
pub mod core;
pub mod crud;
pub mod students;
pub mod teachers;
