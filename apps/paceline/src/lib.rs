//! # paceline (library surface)
//!
//! Library view of the Paceline application, exposing the HTTP API,
//! CLI, and configuration modules for integration tests.
//!
//! The binary (`src/main.rs`) is the primary consumer; the library
//! target exists so `tests/` can build routers and exercise handlers
//! without starting a real server.

pub mod api;
pub mod cli;
pub mod config;
