pub mod availability;
pub mod coordinator;
pub mod queue;
pub mod scheduler;
