// ABOUTME: Library root for stevedore - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod classify;
pub mod config;
pub mod error;
pub mod images;
pub mod proxy;
pub mod runtime;
pub mod server;
pub mod types;
