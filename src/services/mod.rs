pub mod completion_barrier;
pub mod http_service;
pub mod persistence_service;
pub mod queue_service;
pub mod rail_service;
pub mod shutdown_service;
