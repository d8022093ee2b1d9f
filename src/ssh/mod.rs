//! SSH module - remote command sessions over russh
//!
//! # Features
//! - Password authentication with a bounded connect timeout
//! - Optional strict host key checking against ~/.ssh/known_hosts
//! - One-command-at-a-time exec with separate stdout/stderr capture

mod client;
mod config;
mod error;
pub mod known_hosts;
mod session;

pub use client::{ClientHandler, RusshConnector, SshClient};
pub use config::SshConfig;
pub use error::{ConnectError, ExecError, SshError};
pub use known_hosts::{HostKeyVerification, KnownHostsStore};
pub use session::{ExecOutput, RemoteSession, SessionConnector, SshSession, SIGNALED_EXIT_CODE};
