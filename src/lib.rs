//! bookmark-sync: a per-user bookmark list kept in step with a managed backend.
//!
//! The library exposes the session holder, bookmark store and mutation
//! dispatchers used by the `bookmark-sync-rpc` binary and the integration tests.

pub mod app;
pub mod logging;
pub mod managers;
pub mod platform;
pub mod rpc_handler;
pub mod services;
pub mod types;
