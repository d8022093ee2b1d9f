//! SSH Error types

use thiserror::Error;

/// Transport-level SSH failures, raised inside russh callbacks
#[derive(Error, Debug)]
pub enum SshError {
    #[error("Host key rejected: {0}")]
    HostKeyRejected(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SSH protocol error: {0}")]
    ProtocolError(String),
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::ProtocolError(err.to_string())
    }
}

/// Why a session could not be opened
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Connection timed out after {0} seconds")]
    Timeout(u64),

    #[error("Authentication rejected by server")]
    AuthRejected,

    #[error("Host unreachable: {0}")]
    Unreachable(String),

    #[error("Host key verification failed: {0}")]
    HostKeyRejected(String),
}

/// Failure to run a command on an open session
///
/// A non-zero exit status is not an `ExecError`; it is reported in
/// `ExecOutput`.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Failed to open exec channel: {0}")]
    ChannelOpen(String),

    #[error("Failed to execute command: {0}")]
    Exec(String),

    #[error("Failed to send command input: {0}")]
    Input(String),

    #[error("Channel closed without an exit status")]
    NoExitStatus,

    #[error("Session is closed")]
    Closed,
}
