pub mod app_controller;
pub mod worker_controller;
