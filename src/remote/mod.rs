// ABOUTME: Abstract remote host operations consumed by the deploy core.
// ABOUTME: Run captured commands, run streamed commands, and copy directory trees.

mod error;

pub use error::{RemoteError, RemoteErrorKind};

use async_trait::async_trait;
use std::borrow::Cow;
use std::path::Path;

/// Everything the deploy core needs from a remote host.
///
/// Implemented by [`crate::ssh::Session`]; tests substitute an in-memory host.
/// Implementations carry no orchestration logic and never retry.
#[async_trait]
pub trait RemoteOps: Send + Sync {
    /// Run a shell command and return its stdout.
    ///
    /// A non-zero exit status is reported as [`RemoteError::Exit`] carrying
    /// the remote stderr.
    async fn run_command(&self, command: &str) -> Result<String, RemoteError>;

    /// Run a shell command, streaming its output to the local terminal.
    async fn run_interactive(&self, command: &str) -> Result<(), RemoteError>;

    /// Copy the local directory tree at `local` into `remote`, creating it.
    async fn sync_tree(&self, local: &Path, remote: &str) -> Result<(), RemoteError>;
}

/// Quote a single shell word for a POSIX shell.
pub fn quote(word: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_words_stay_bare() {
        assert_eq!(quote("/opt/shop/compose.yml"), "/opt/shop/compose.yml");
    }

    #[test]
    fn unsafe_words_are_single_quoted() {
        assert_eq!(quote("a b"), "'a b'");
    }
}
