use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address for the HTTP/WebSocket server.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Root directory for persisted state (memories, sessions, costs).
    #[serde(default = "default_state_path")]
    pub state_path: String,
    /// Workspace root that file skills and `/api/files` are confined to.
    #[serde(default = "default_workspace_path")]
    pub workspace_path: String,
    /// Env var holding the API bearer token. Unset or empty = dev mode
    /// (no auth enforced).
    #[serde(default = "default_token_env")]
    pub api_token_env: String,
    /// Default user id assumed for single-user deployments.
    #[serde(default = "default_user_id")]
    pub default_user_id: String,
}

fn default_listen() -> String {
    "127.0.0.1:8710".into()
}

fn default_state_path() -> String {
    "./data".into()
}

fn default_workspace_path() -> String {
    "./workspace".into()
}

fn default_token_env() -> String {
    "VALET_API_TOKEN".into()
}

fn default_user_id() -> String {
    "default".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            state_path: default_state_path(),
            workspace_path: default_workspace_path(),
            api_token_env: default_token_env(),
            default_user_id: default_user_id(),
        }
    }
}
