//! JSON-lines bridge between the UI process and the commands
//!
//! One request per line on stdin, one response per line on stdout:
//!
//! ```text
//! {"cmd":"save_server_config","host":"10.0.0.1","user":"admin","password":"..."}
//! {"cmd":"load_server_config"}
//! {"cmd":"deploy_config","block":"subnet 10.0.0.0 netmask 255.255.255.0 { ... }"}
//! ```
//!
//! Requests are handled one at a time, each to completion.

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::commands::config::{
    deploy_config, load_server_config, save_server_config, AppContext, SaveServerConfigRequest,
};

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum BridgeRequest {
    SaveServerConfig(SaveServerConfigRequest),
    LoadServerConfig,
    DeployConfig { block: String },
}

/// Dispatch one request and build its JSON response
pub async fn handle_request(state: &AppContext, request: BridgeRequest) -> Value {
    match request {
        BridgeRequest::SaveServerConfig(req) => json!(save_server_config(state, req).await),
        BridgeRequest::LoadServerConfig => json!(load_server_config(state).await),
        BridgeRequest::DeployConfig { block } => json!(deploy_config(state, block).await),
    }
}

/// Serve requests from `reader` until EOF, writing responses to `writer`
pub async fn serve<R, W>(state: &AppContext, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<BridgeRequest>(&line) {
            Ok(request) => {
                debug!("Bridge request: {:?}", request);
                handle_request(state, request).await
            }
            Err(e) => {
                warn!("Rejected malformed bridge request: {}", e);
                json!({ "success": false, "message": format!("Invalid request: {}", e) })
            }
        };

        let mut out = response.to_string();
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
        writer.flush().await?;
    }

    info!("Bridge input closed");
    Ok(())
}

/// Serve over the process's stdin/stdout
pub async fn serve_stdio(state: &AppContext) -> std::io::Result<()> {
    serve(
        state,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}
