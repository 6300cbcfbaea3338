pub mod admin;
pub mod auth;
pub mod backup_exchange;
pub mod classes;
pub mod core;
pub mod dashboard;
pub mod results;
pub mod settings;
pub mod students;
