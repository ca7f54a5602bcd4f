// ABOUTME: Library root for watchtower - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod container;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod filters;
pub mod lifecycle;
pub mod metrics;
pub mod notify;
pub mod resolver;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod sorter;
pub mod types;
pub mod update;
pub mod util;
