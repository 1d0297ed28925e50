// src/roundtable/mod.rs

pub mod agent;
pub mod agent_manager;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod conversation;
pub mod coordinator;
pub mod director;
pub mod error;
pub mod event;
pub mod notify;
pub mod quality_gate;
pub mod rate_limiter;
pub mod retry;

// Let's explicitly export Coordinator so we don't have to access it via
// roundtable::coordinator::Coordinator and instead as roundtable::Coordinator
pub use coordinator::Coordinator;
