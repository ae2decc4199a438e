// ABOUTME: Library root for skiff - exposes public types for the binary and tests.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod manifest;
pub mod output;
pub mod remote;
pub mod ssh;
pub mod stack;
pub mod types;
