//! Deployment pipeline
//!
//! Strictly sequential: load credentials, connect, back up, rewrite, read
//! back, restart. Backups, cleanup and read-back are best-effort; the write
//! and the restart must succeed, since a change that was never written or
//! never activated would otherwise be reported as applied.
//!
//! Runs against the same host are serialized by an in-process lock.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, field, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use super::command::{
    DeployStep, DhcpCommandSet, RemoteCommand, StepPolicy, MARKER_BEGIN, MARKER_END,
};
use crate::config::{CredentialVault, DeploySettings};
use crate::ssh::{ExecOutput, RemoteSession, SessionConnector, SshConfig};

/// Pipeline states, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployState {
    Idle,
    CredentialsLoaded,
    Connected,
    BackedUp,
    ConfigWritten,
    Verified,
    Restarted,
    Done,
    Failed(DeployFailure),
}

/// Why a deployment stopped
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeployFailure {
    #[error("No server credentials available: {0}")]
    NoCredentials(String),

    #[error("Invalid configuration block: {0}")]
    InvalidBlock(String),

    #[error("Could not connect to the server: {0}")]
    ConnectionError(String),

    #[error("Step '{step}' timed out after {secs} seconds")]
    CommandTimeout { step: DeployStep, secs: u64 },

    #[error("Step '{step}' could not be executed: {reason}")]
    ExecFailed { step: DeployStep, reason: String },

    #[error("Step '{step}' failed with exit code {code}")]
    WriteFailed { step: DeployStep, code: u32 },

    #[error("Service restart failed with exit code {0}")]
    RestartFailed(u32),
}

/// Result handed back to the caller for one deployment attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentOutcome {
    pub success: bool,
    pub message: String,
}

/// Full record of one run: every state entered, last one final
#[derive(Debug, Clone)]
pub struct DeployReport {
    pub run_id: Uuid,
    pub history: Vec<DeployState>,
    state: DeployState,
}

impl DeployReport {
    pub fn final_state(&self) -> &DeployState {
        &self.state
    }

    pub fn outcome(&self) -> DeploymentOutcome {
        match self.final_state() {
            DeployState::Done => DeploymentOutcome {
                success: true,
                message: "Configuration applied successfully".to_string(),
            },
            DeployState::Failed(failure) => DeploymentOutcome {
                success: false,
                message: failure.to_string(),
            },
            other => DeploymentOutcome {
                success: false,
                message: format!("Deployment stopped in state {:?}", other),
            },
        }
    }
}

struct Tracker {
    history: Vec<DeployState>,
}

impl Tracker {
    fn advance(&mut self, state: DeployState) {
        info!("Deploy state -> {:?}", state);
        self.history.push(state);
    }
}

pub struct ConfigDeployer {
    vault: Arc<CredentialVault>,
    connector: Arc<dyn SessionConnector>,
    settings: DeploySettings,
    host_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ConfigDeployer {
    pub fn new(
        vault: Arc<CredentialVault>,
        connector: Arc<dyn SessionConnector>,
        settings: DeploySettings,
    ) -> Self {
        Self {
            vault,
            connector,
            settings,
            host_locks: DashMap::new(),
        }
    }

    /// Deploy `block` and summarize the result
    pub async fn run(&self, block: &str) -> DeploymentOutcome {
        self.deploy(block).await.outcome()
    }

    /// Deploy `block`, returning the state history
    pub async fn deploy(&self, block: &str) -> DeployReport {
        let run_id = Uuid::new_v4();
        let mut tracker = Tracker {
            history: vec![DeployState::Idle],
        };

        let result = self
            .execute(block, &mut tracker)
            .instrument(info_span!("deploy", %run_id, host = field::Empty))
            .await;

        match result {
            Ok(()) => {
                info!(%run_id, "DHCP configuration deployed and service restarted");
                tracker.advance(DeployState::Done);
            }
            Err(failure) => {
                error!(%run_id, "Deployment failed: {}", failure);
                tracker.history.push(DeployState::Failed(failure));
            }
        }

        let state = tracker
            .history
            .last()
            .cloned()
            .unwrap_or(DeployState::Idle);
        DeployReport {
            run_id,
            history: tracker.history,
            state,
        }
    }

    async fn execute(&self, block: &str, tracker: &mut Tracker) -> Result<(), DeployFailure> {
        validate_block(block)?;

        let credentials = self
            .vault
            .load_for_deployment()
            .map_err(|e| DeployFailure::NoCredentials(e.to_string()))?;
        Span::current().record("host", credentials.host.as_str());
        tracker.advance(DeployState::CredentialsLoaded);

        let lock = self
            .host_locks
            .entry(credentials.host.to_lowercase())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        let config = SshConfig::from_settings(
            &credentials.host,
            &credentials.username,
            credentials.password.clone(),
            &self.settings,
        );

        info!(
            "Connecting to {}:{} as {}",
            config.host, config.port, config.username
        );
        let mut session = self
            .connector
            .connect(&config)
            .await
            .map_err(|e| DeployFailure::ConnectionError(e.to_string()))?;
        tracker.advance(DeployState::Connected);

        let commands = DhcpCommandSet::new(&self.settings.dhcp, &credentials.password);
        let result = self
            .run_steps(session.as_mut(), &commands, block, tracker)
            .await;

        session.close().await;
        result
    }

    async fn run_steps(
        &self,
        session: &mut dyn RemoteSession,
        commands: &DhcpCommandSet<'_>,
        block: &str,
        tracker: &mut Tracker,
    ) -> Result<(), DeployFailure> {
        for command in commands.sequence(block) {
            info!("Running step {}", command.step);

            if command.step == DeployStep::ReadBack {
                // Observational only: any failure here is logged and ignored
                match self.exec_step(session, &command).await {
                    Ok(output) => debug!("Remote configuration after write:\n{}", output.stdout),
                    Err(e) => warn!("Could not read back remote configuration: {}", e),
                }
            } else {
                self.exec_step(session, &command).await?;
            }

            if let Some(state) = state_after(command.step) {
                tracker.advance(state);
            }
        }

        Ok(())
    }

    /// Run one command with the per-command timeout and apply its policy
    async fn exec_step(
        &self,
        session: &mut dyn RemoteSession,
        command: &RemoteCommand,
    ) -> Result<ExecOutput, DeployFailure> {
        let step = command.step;
        let secs = self.settings.command_timeout_secs;
        debug!("Step {} command: {}", step, command.command);

        let output = tokio::time::timeout(
            Duration::from_secs(secs),
            session.exec(&command.command, command.stdin()),
        )
        .await
        .map_err(|_| DeployFailure::CommandTimeout { step, secs })?
        .map_err(|e| DeployFailure::ExecFailed {
            step,
            reason: e.to_string(),
        })?;

        if !output.stderr.is_empty() {
            debug!("Step {} stderr: {}", step, output.stderr.trim_end());
        }

        if output.success() {
            return Ok(output);
        }

        match (command.policy, step) {
            (StepPolicy::BestEffort, _) => {
                warn!(
                    "Step {} exited with code {} (continuing)",
                    step, output.exit_code
                );
                Ok(output)
            }
            (StepPolicy::MustSucceed, DeployStep::RestartService) => {
                Err(DeployFailure::RestartFailed(output.exit_code))
            }
            (StepPolicy::MustSucceed, _) => Err(DeployFailure::WriteFailed {
                step,
                code: output.exit_code,
            }),
        }
    }
}

/// State entered once `step` completes, for steps that close a phase
fn state_after(step: DeployStep) -> Option<DeployState> {
    match step {
        DeployStep::BackupInterfaces => Some(DeployState::BackedUp),
        DeployStep::WriteInterfaces => Some(DeployState::ConfigWritten),
        DeployStep::ReadBack => Some(DeployState::Verified),
        DeployStep::RestartService => Some(DeployState::Restarted),
        DeployStep::BackupConfig | DeployStep::RemoveManagedBlock | DeployStep::AppendBlock => {
            None
        }
    }
}

/// The block must be non-empty and must not contain our own marker lines,
/// which would break later cleanup
fn validate_block(block: &str) -> Result<(), DeployFailure> {
    if block.trim().is_empty() {
        return Err(DeployFailure::InvalidBlock("block is empty".to_string()));
    }
    if block
        .lines()
        .any(|line| line.trim() == MARKER_BEGIN || line.trim() == MARKER_END)
    {
        return Err(DeployFailure::InvalidBlock(
            "block contains a reserved marker line".to_string(),
        ));
    }
    Ok(())
}
