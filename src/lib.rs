pub mod aggregate;
pub mod api;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod poller;
pub mod scheduler;
pub mod shutdown;
pub mod worker;
