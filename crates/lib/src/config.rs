//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.ferry/config.json`) and environment.
//! Slack secrets can be supplied through the environment instead of the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::channels::slack::SLACK_API_BASE;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listeners for the webhook endpoints.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Slack credentials and endpoint paths.
    #[serde(default)]
    pub slack: SlackConfig,
}

/// Bind address and the two webhook ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Bind address (default "0.0.0.0"; Slack must be able to reach the webhooks).
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Port of the Events API endpoint and `/event_health` (default 3000).
    #[serde(default = "default_events_port")]
    pub events_port: u16,

    /// Port of the interactive-message endpoint and `/` (default 4000).
    #[serde(default = "default_interactive_port")]
    pub interactive_port: u16,
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_events_port() -> u16 {
    3000
}

fn default_interactive_port() -> u16 {
    4000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            events_port: default_events_port(),
            interactive_port: default_interactive_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    /// Bot token (`xoxb-…`). Overridden by SLACK_BOT_TOKEN.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// App-level token (`xapp-…`) for Socket Mode. Overridden by SLACK_APP_TOKEN.
    #[serde(default)]
    pub app_token: Option<String>,

    /// Workspace (user) token, needed for user groups. Overridden by SLACK_WORKSPACE_TOKEN.
    #[serde(default)]
    pub workspace_token: Option<String>,

    /// Verification token Slack sends with webhook pushes. Overridden by SLACK_VERIFICATION_TOKEN.
    #[serde(default)]
    pub verification_token: Option<String>,

    #[serde(default = "default_events_callback_path")]
    pub events_callback_path: String,

    #[serde(default = "default_interactions_callback_path")]
    pub interactions_callback_path: String,

    /// Web API base URL (default "https://slack.com/api").
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Seconds to wait before reopening a dropped Socket Mode connection (default 5).
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

fn default_events_callback_path() -> String {
    "/slack_events/v1/events".to_string()
}

fn default_interactions_callback_path() -> String {
    "/slack_events/v1/interactions".to_string()
}

fn default_api_base() -> String {
    SLACK_API_BASE.to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            app_token: None,
            workspace_token: None,
            verification_token: None,
            events_callback_path: default_events_callback_path(),
            interactions_callback_path: default_interactions_callback_path(),
            api_base: default_api_base(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

impl SlackConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// Env value (trimmed, non-empty) wins over the config value (trimmed, non-empty).
fn pick_secret(env_value: Option<String>, config_value: Option<&String>) -> Option<String> {
    env_value
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config_value
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

fn resolve_secret(var: &str, config_value: Option<&String>) -> Option<String> {
    pick_secret(std::env::var(var).ok(), config_value)
}

/// Resolve the bot token: env SLACK_BOT_TOKEN overrides config.
pub fn resolve_bot_token(config: &Config) -> Option<String> {
    resolve_secret("SLACK_BOT_TOKEN", config.slack.bot_token.as_ref())
}

/// Resolve the app-level token: env SLACK_APP_TOKEN overrides config.
pub fn resolve_app_token(config: &Config) -> Option<String> {
    resolve_secret("SLACK_APP_TOKEN", config.slack.app_token.as_ref())
}

/// Resolve the workspace token: env SLACK_WORKSPACE_TOKEN overrides config.
pub fn resolve_workspace_token(config: &Config) -> Option<String> {
    resolve_secret("SLACK_WORKSPACE_TOKEN", config.slack.workspace_token.as_ref())
}

/// Resolve the verification token: env SLACK_VERIFICATION_TOKEN overrides config.
pub fn resolve_verification_token(config: &Config) -> Option<String> {
    resolve_secret(
        "SLACK_VERIFICATION_TOKEN",
        config.slack.verification_token.as_ref(),
    )
}

/// Route paths must be absolute.
pub fn normalize_route_path(path: &str) -> String {
    let p = path.trim();
    if p.starts_with('/') {
        p.to_string()
    } else {
        format!("/{}", p)
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("FERRY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".ferry").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (or FERRY_CONFIG_PATH).
/// Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.gateway.bind, "0.0.0.0");
        assert_eq!(config.gateway.events_port, 3000);
        assert_eq!(config.gateway.interactive_port, 4000);
        assert_eq!(config.slack.events_callback_path, "/slack_events/v1/events");
        assert_eq!(config.slack.api_base, "https://slack.com/api");
        assert_eq!(config.slack.reconnect_delay(), Duration::from_secs(5));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"gateway":{"eventsPort":8080},"slack":{"botToken":"xoxb-1","interactionsCallbackPath":"/buttons"}}"#,
        )
        .unwrap();
        assert_eq!(config.gateway.events_port, 8080);
        assert_eq!(config.gateway.interactive_port, 4000);
        assert_eq!(config.slack.bot_token.as_deref(), Some("xoxb-1"));
        assert_eq!(config.slack.interactions_callback_path, "/buttons");
        assert_eq!(config.slack.events_callback_path, "/slack_events/v1/events");
    }

    #[test]
    fn env_secret_wins_when_non_empty() {
        let file = Some(" from-file ".to_string());
        assert_eq!(
            pick_secret(Some("from-env".to_string()), file.as_ref()).as_deref(),
            Some("from-env")
        );
        assert_eq!(
            pick_secret(Some("  ".to_string()), file.as_ref()).as_deref(),
            Some("from-file")
        );
        assert_eq!(pick_secret(None, Some(&"".to_string())), None);
    }

    #[test]
    fn route_paths_get_leading_slash() {
        assert_eq!(normalize_route_path("hooks/events"), "/hooks/events");
        assert_eq!(normalize_route_path("/x"), "/x");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path =
            std::env::temp_dir().join(format!("ferry-missing-{}.json", uuid::Uuid::new_v4()));
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.gateway.events_port, 3000);
    }
}
