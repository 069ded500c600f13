use serde::{Deserialize, Serialize};

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection before a store call fails
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}
fn default_acquire_timeout() -> u64 {
    5
}

/// Token and session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_key_id")]
    pub key_id: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_audience")]
    pub audience: String,
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl_secs: u64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions_per_user: i64,
}

fn default_key_id() -> String {
    "v1".to_string()
}
fn default_issuer() -> String {
    "auth-service".to_string()
}
fn default_audience() -> String {
    "task-flow".to_string()
}
fn default_access_token_ttl() -> u64 {
    600
}
fn default_max_sessions() -> i64 {
    crate::sessions::MAX_SESSIONS_PER_USER
}

/// Background purge of dead session rows. Expiry is enforced at read time
/// either way; this only keeps the table small.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
    /// How long revoked/expired rows are kept before deletion
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
}

fn default_sweep_interval() -> u64 {
    3600
}
fn default_retention_hours() -> u64 {
    168
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_sweep_interval(),
            retention_hours: default_retention_hours(),
        }
    }
}

fn default_command_timeout() -> u64 {
    10
}

/// Server configuration - loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen: String, // "0.0.0.0:8080"
    pub db: DbConfig,
    pub auth: AuthConfig,
    /// Upper bound on one command, store round-trips included
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

/// Load server config from a YAML file with SESAME__ env var overrides.
pub fn load_config(path: &str) -> anyhow::Result<ServerConfig> {
    use anyhow::Context;
    let config: ServerConfig = config::Config::builder()
        .add_source(config::File::new(path, config::FileFormat::Yaml))
        .add_source(
            config::Environment::with_prefix("SESAME")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()
        .with_context(|| format!("Failed to build config from: {}", path))?
        .try_deserialize()
        .with_context(|| format!("Failed to deserialize config from: {}", path))?;
    Ok(config)
}
