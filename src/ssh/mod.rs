// ABOUTME: SSH client module for remote server connections.
// ABOUTME: Supports SSH agent and key-based authentication with known_hosts verification.

mod archive;
mod client;
mod error;

pub use archive::archive_tree;
pub use client::{Session, SessionConfig};
pub use error::{Error, Result};
