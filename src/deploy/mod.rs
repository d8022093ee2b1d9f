//! Remote DHCP configuration deployment
//!
//! `command` builds the privileged command sequence, `pipeline` drives it
//! over a `RemoteSession` and reports a `DeploymentOutcome`.

pub mod command;
pub mod pipeline;

pub use command::{
    managed_block, DeployStep, DhcpCommandSet, RemoteCommand, StepPolicy, MARKER_BEGIN,
    MARKER_END,
};
pub use pipeline::{ConfigDeployer, DeployFailure, DeployReport, DeployState, DeploymentOutcome};
