//! Remote command sessions
//!
//! `RemoteSession` is the seam between the deployment pipeline and the
//! transport: one authenticated connection that runs commands one at a time.

use async_trait::async_trait;
use russh::client::Handle;
use russh::{ChannelMsg, Disconnect};
use tracing::{debug, warn};

use super::client::ClientHandler;
use super::config::SshConfig;
use super::error::{ConnectError, ExecError};

/// Exit status reported when the remote process died from a signal
pub const SIGNALED_EXIT_CODE: u32 = 255;

/// Captured result of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: u32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// An authenticated session able to run commands to completion
#[async_trait]
pub trait RemoteSession: Send {
    /// Run `command`, feeding `stdin` (if any) and then EOF, and wait for exit
    ///
    /// A non-zero exit status is returned as a normal `ExecOutput`.
    async fn exec(&mut self, command: &str, stdin: Option<&[u8]>)
        -> Result<ExecOutput, ExecError>;

    /// Release the session; safe to call more than once
    async fn close(&mut self);
}

/// Opens `RemoteSession`s
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, config: &SshConfig) -> Result<Box<dyn RemoteSession>, ConnectError>;
}

/// russh-backed session
pub struct SshSession {
    handle: Option<Handle<ClientHandler>>,
}

impl SshSession {
    pub fn new(handle: Handle<ClientHandler>) -> Self {
        Self {
            handle: Some(handle),
        }
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(
        &mut self,
        command: &str,
        stdin: Option<&[u8]>,
    ) -> Result<ExecOutput, ExecError> {
        let handle = self.handle.as_ref().ok_or(ExecError::Closed)?;

        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| ExecError::ChannelOpen(e.to_string()))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| ExecError::Exec(e.to_string()))?;

        if let Some(input) = stdin {
            channel
                .data(input)
                .await
                .map_err(|e| ExecError::Input(e.to_string()))?;
        }
        channel
            .eof()
            .await
            .map_err(|e| ExecError::Input(e.to_string()))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code: Option<u32> = None;

        // Exit status may arrive after EOF, so drain until the channel closes
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => stdout.extend_from_slice(&data),
                // ext=1 is stderr
                Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                    stderr.extend_from_slice(&data)
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => exit_code = Some(exit_status),
                Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                    warn!("Remote command terminated by signal {:?}", signal_name);
                    exit_code = Some(SIGNALED_EXIT_CODE);
                }
                Some(ChannelMsg::Close) | None => break,
                Some(_other) => {}
            }
        }

        let exit_code = exit_code.ok_or(ExecError::NoExitStatus)?;

        debug!(
            "exec completed: exit={} stdout_len={} stderr_len={}",
            exit_code,
            stdout.len(),
            stderr.len()
        );

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
        })
    }

    async fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await
            {
                debug!("SSH disconnect reported: {}", e);
            }
            debug!("SSH session closed");
        }
    }
}
