// ABOUTME: Library root for stackwright - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod cancel;
pub mod config;
pub mod deploy;
pub mod deps;
pub mod diagnostics;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod recipe;
pub mod remote;
pub mod ssh;
pub mod target;
pub mod template;
pub mod types;
pub mod validate;
