use crate::config::ServerConfig;
use crate::sessions::SessionManager;
use crate::tokens::TokenService;
use anyhow::{bail, Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state. Everything mutable lives in Postgres; this only
/// holds handles and startup-time configuration.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<ServerConfig>,
    pub tokens: Arc<TokenService>,
    pub sessions: SessionManager,
}

impl AppState {
    /// Create a new app state. Fails if the signing key is unusable or the
    /// session cap is below one.
    pub fn new(pool: PgPool, config: ServerConfig) -> Result<Self> {
        if config.auth.max_sessions_per_user < 1 {
            bail!(
                "max_sessions_per_user must be at least 1, got {}",
                config.auth.max_sessions_per_user
            );
        }
        let tokens = Arc::new(
            TokenService::from_config(&config.auth).context("Invalid token configuration")?,
        );
        let sessions = SessionManager::new(
            pool.clone(),
            tokens.clone(),
            config.auth.max_sessions_per_user,
        );
        Ok(Self {
            pool,
            config: Arc::new(config),
            tokens,
            sessions,
        })
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.config.command_timeout_secs)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{AuthConfig, DbConfig, SweeperConfig};

    pub(crate) fn test_config(jwt_secret: &str) -> ServerConfig {
        ServerConfig {
            listen: "127.0.0.1:0".to_string(),
            db: DbConfig {
                url: "postgres://invalid:5432/db".to_string(),
                max_connections: 1,
                acquire_timeout_secs: 1,
            },
            auth: AuthConfig {
                jwt_secret: jwt_secret.to_string(),
                key_id: "v1".to_string(),
                issuer: "auth-service".to_string(),
                audience: "task-flow".to_string(),
                access_token_ttl_secs: 600,
                max_sessions_per_user: 5,
            },
            command_timeout_secs: 10,
            sweeper: SweeperConfig::default(),
        }
    }

    pub(crate) fn test_state() -> AppState {
        let pool = PgPool::connect_lazy("postgres://invalid:5432/db").unwrap();
        AppState::new(pool, test_config("test-secret-ensure-32-bytes-long-string!")).unwrap()
    }

    #[tokio::test]
    async fn test_state_builds_from_config() {
        let state = test_state();
        assert_eq!(state.command_timeout(), Duration::from_secs(10));
        assert_eq!(state.tokens.ttl().num_seconds(), 600);
    }

    #[tokio::test]
    async fn test_state_rejects_short_secret() {
        let pool = PgPool::connect_lazy("postgres://invalid:5432/db").unwrap();
        let result = AppState::new(pool, test_config("short"));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_state_rejects_session_cap_below_one() {
        for cap in [0, -1] {
            let pool = PgPool::connect_lazy("postgres://invalid:5432/db").unwrap();
            let mut config = test_config("test-secret-ensure-32-bytes-long-string!");
            config.auth.max_sessions_per_user = cap;
            let err = AppState::new(pool, config).err().expect("cap should be rejected");
            assert!(err.to_string().contains("max_sessions_per_user"), "{}", err);
        }

        let pool = PgPool::connect_lazy("postgres://invalid:5432/db").unwrap();
        let mut config = test_config("test-secret-ensure-32-bytes-long-string!");
        config.auth.max_sessions_per_user = 1;
        assert!(AppState::new(pool, config).is_ok());
    }
}
