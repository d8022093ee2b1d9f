//! Server Configuration Commands
//!
//! The three operations offered to the UI layer. Each one is a thin
//! translation: failures become `{ success: false, message }`, never errors,
//! and remote output stays in the service log.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{CredentialVault, DeploySettings, SettingsStorage, StorageError, VaultStatus};
use crate::deploy::ConfigDeployer;
use crate::ssh::{RusshConnector, SessionConnector};

/// Application context shared by every command
///
/// Owns the vault and the deployer; there is no other global state.
pub struct AppContext {
    vault: Arc<CredentialVault>,
    deployer: ConfigDeployer,
}

impl AppContext {
    /// Context for the default data directory, with settings loaded from disk
    pub async fn new() -> Result<Self, StorageError> {
        let data_dir = crate::config::data_dir()?;
        let settings = SettingsStorage::new()?.load().await?;
        Ok(Self::with_parts(
            &data_dir,
            settings,
            Arc::new(RusshConnector),
        ))
    }

    /// Context from explicit parts (used by tests and embedders)
    pub fn with_parts(
        data_dir: &Path,
        settings: DeploySettings,
        connector: Arc<dyn SessionConnector>,
    ) -> Self {
        let vault = Arc::new(CredentialVault::new(data_dir));
        let deployer = ConfigDeployer::new(vault.clone(), connector, settings);
        Self { vault, deployer }
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    pub fn vault_status(&self) -> VaultStatus {
        self.vault.status()
    }
}

/// Login submitted by the UI
#[derive(Clone, Deserialize)]
pub struct SaveServerConfigRequest {
    #[serde(alias = "ip")]
    pub host: String,
    #[serde(alias = "username")]
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for SaveServerConfigRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveServerConfigRequest")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Stored login without the password
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerConfigInfo {
    pub host: String,
    pub user: String,
}

/// Result shape returned to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
}

impl CommandResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Encrypt and store the server login
pub async fn save_server_config(
    state: &AppContext,
    request: SaveServerConfigRequest,
) -> CommandResult {
    tracing::info!(
        "Saving server configuration: host={} user={} password=***",
        request.host,
        request.user
    );

    if request.host.trim().is_empty() || request.user.trim().is_empty() {
        return CommandResult::err("Host and user are required");
    }

    match state
        .vault
        .save(request.user.trim(), &request.password, request.host.trim())
    {
        Ok(()) => CommandResult::ok("Configuration saved"),
        Err(e) => {
            tracing::error!("Failed to save server configuration: {}", e);
            CommandResult::err(format!("Failed to save configuration: {}", e))
        }
    }
}

/// Stored host and user, or `None` if nothing usable is stored
pub async fn load_server_config(state: &AppContext) -> Option<ServerConfigInfo> {
    state.vault.load().map(|identity| ServerConfigInfo {
        host: identity.host,
        user: identity.username,
    })
}

/// Push a rendered DHCP block to the stored server
pub async fn deploy_config(state: &AppContext, rendered_block: String) -> CommandResult {
    let outcome = state.deployer.run(&rendered_block).await;
    CommandResult {
        success: outcome.success,
        message: outcome.message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::pipeline::tests::{FakeConnector, FakeRemote, PASSWORD};
    use tempfile::TempDir;

    fn context(temp_dir: &TempDir, remote: FakeRemote) -> (AppContext, Arc<FakeConnector>) {
        let connector = Arc::new(FakeConnector::new(remote));
        let ctx = AppContext::with_parts(
            temp_dir.path(),
            DeploySettings::default(),
            connector.clone(),
        );
        (ctx, connector)
    }

    fn request() -> SaveServerConfigRequest {
        SaveServerConfigRequest {
            host: "192.168.101.86".to_string(),
            user: "admin".to_string(),
            password: PASSWORD.to_string(),
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let (ctx, _) = context(&temp_dir, FakeRemote::default());

        assert_eq!(load_server_config(&ctx).await, None);
        assert_eq!(ctx.vault_status(), VaultStatus::Unconfigured);

        let result = save_server_config(&ctx, request()).await;
        assert!(result.success, "{}", result.message);

        assert_eq!(
            load_server_config(&ctx).await,
            Some(ServerConfigInfo {
                host: "192.168.101.86".to_string(),
                user: "admin".to_string(),
            })
        );
        assert_eq!(ctx.vault_status(), VaultStatus::Configured);
    }

    #[tokio::test]
    async fn test_save_rejects_blank_host() {
        let temp_dir = TempDir::new().unwrap();
        let (ctx, _) = context(&temp_dir, FakeRemote::default());

        let mut req = request();
        req.host = "  ".to_string();
        assert!(!save_server_config(&ctx, req).await.success);
        assert_eq!(ctx.vault_status(), VaultStatus::Unconfigured);
    }

    #[tokio::test]
    async fn test_deploy_without_credentials() {
        let temp_dir = TempDir::new().unwrap();
        let (ctx, connector) = context(&temp_dir, FakeRemote::default());

        let result = deploy_config(&ctx, "subnet a {}".to_string()).await;
        assert!(!result.success);
        assert_eq!(connector.remote.lock().connects, 0);
    }

    #[tokio::test]
    async fn test_deploy_does_not_leak_remote_output() {
        let temp_dir = TempDir::new().unwrap();
        let (ctx, _) = context(
            &temp_dir,
            FakeRemote {
                config_file: "option secret-remote-line;\n".to_string(),
                exit_codes: vec![("systemctl", 3)],
                ..Default::default()
            },
        );
        save_server_config(&ctx, request()).await;

        let result = deploy_config(&ctx, "subnet a {}".to_string()).await;
        assert!(!result.success);
        assert!(result.message.contains("exit code 3"));
        assert!(!result.message.contains("secret-remote-line"));
        assert!(!result.message.contains(PASSWORD));
    }

    #[test]
    fn test_request_accepts_ip_alias() {
        let req: SaveServerConfigRequest =
            serde_json::from_str(r#"{"ip": "10.0.0.1", "user": "root", "password": "x"}"#)
                .unwrap();
        assert_eq!(req.host, "10.0.0.1");
        assert!(!format!("{:?}", req).contains("\"x\""));
    }
}
