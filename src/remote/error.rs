// ABOUTME: Remote execution error types with SNAFU pattern.
// ABOUTME: Unifies non-zero exits, transport failures, and tree packaging errors.

use snafu::Snafu;
use std::path::PathBuf;

/// Longest command prefix kept in error messages.
const COMMAND_SUMMARY_LEN: usize = 120;

/// Failure of a single remote operation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RemoteError {
    #[snafu(display("remote command `{command}` exited with status {code}: {}", stderr.trim()))]
    Exit {
        command: String,
        code: u32,
        stderr: String,
    },

    #[snafu(display("transport failure running `{command}`: {source}"))]
    Transport {
        command: String,
        source: crate::ssh::Error,
    },

    #[snafu(display("failed to package {} for upload: {source}", path.display()))]
    Archive {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// The command ran and returned a non-zero status.
    NonZeroExit,
    /// The session or channel failed before an exit status arrived.
    Transport,
    /// The local tree could not be read or archived.
    Archive,
}

impl RemoteError {
    /// Build an exit error, shortening the command for display.
    pub fn exit(command: &str, code: u32, stderr: impl Into<String>) -> Self {
        RemoteError::Exit {
            command: summarize(command),
            code,
            stderr: stderr.into(),
        }
    }

    /// Build a transport error, shortening the command for display.
    pub fn transport(command: &str, source: crate::ssh::Error) -> Self {
        RemoteError::Transport {
            command: summarize(command),
            source,
        }
    }

    pub fn kind(&self) -> RemoteErrorKind {
        match self {
            RemoteError::Exit { .. } => RemoteErrorKind::NonZeroExit,
            RemoteError::Transport { .. } => RemoteErrorKind::Transport,
            RemoteError::Archive { .. } => RemoteErrorKind::Archive,
        }
    }

    /// Remote stderr, when the command got far enough to produce one.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            RemoteError::Exit { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// First line of a command, cut to a readable length.
fn summarize(command: &str) -> String {
    let first_line = command.lines().next().unwrap_or_default();
    if first_line.chars().count() <= COMMAND_SUMMARY_LEN {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(COMMAND_SUMMARY_LEN).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_error_keeps_stderr() {
        let err = RemoteError::exit("docker pull nope", 1, "manifest unknown\n");
        assert_eq!(err.kind(), RemoteErrorKind::NonZeroExit);
        assert_eq!(err.stderr(), Some("manifest unknown\n"));
        assert_eq!(
            err.to_string(),
            "remote command `docker pull nope` exited with status 1: manifest unknown"
        );
    }

    #[test]
    fn long_commands_are_shortened() {
        let command = format!("printf '%s' '{}' | base64 -d", "A".repeat(500));
        let err = RemoteError::exit(&command, 2, "");
        let RemoteError::Exit { command, .. } = err else {
            panic!("expected exit error");
        };
        assert!(command.ends_with("..."));
        assert!(command.chars().count() <= COMMAND_SUMMARY_LEN + 3);
    }
}
