pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod publisher;
pub mod reference;
pub mod registry;
pub mod server;
pub mod storage;
