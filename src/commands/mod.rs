//! Commands module
//!
//! Operations exposed to the UI layer.

pub mod config;

pub use config::{
    deploy_config, load_server_config, save_server_config, AppContext, CommandResult,
    SaveServerConfigRequest, ServerConfigInfo,
};
