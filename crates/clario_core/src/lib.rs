pub mod analytics;
pub mod calendar;
pub mod config;
pub mod error;
pub mod mentor;
pub mod model;
pub mod storage;
pub mod task_api;
