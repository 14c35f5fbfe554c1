use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

pub const DEFAULT_SYNC_INTERVAL_MINUTES: i64 = 15;
pub const DEFAULT_IMAP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_SYNC_CONCURRENCY: usize = 8;
pub const DEFAULT_EMAIL_FOLDER: &str = "eddo";
pub const PROCESSED_FOLDER: &str = "eddo-processed";

/// Top-level config (`eddo.toml` + `EDDO_*` env overrides), the same
/// figment-layered shape the gateway binary this workspace started from
/// uses for its own config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EddoConfig {
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl Default for EddoConfig {
    fn default() -> Self {
        Self {
            environment: EnvironmentConfig::default(),
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
            agent: AgentConfig::default(),
            oauth: OAuthConfig::default(),
            auth: AuthConfig::default(),
            tracing: TracingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_node_env")]
    pub node_env: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            node_env: default_node_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_test_prefix")]
    pub test_prefix: String,
    #[serde(default = "default_couch_url")]
    pub couch_url: String,
    #[serde(default = "default_registry_db_name")]
    pub registry_db_name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            test_prefix: default_test_prefix(),
            couch_url: default_couch_url(),
            registry_db_name: default_registry_db_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_mcp_url")]
    pub url: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_mcp_url(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub persona_id: Option<String>,
    pub llm_model: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            persona_id: None,
            llm_model: None,
        }
    }
}

/// Google OAuth2 client credentials used to refresh a Gmail access token
/// during email ingestion (§4.I). The refresh/access tokens themselves are
/// per-user and live in the tenant registry's preferences, never here.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OAuthConfig {
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub google_redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub otel_sdk_disabled: bool,
    #[serde(default)]
    pub force_console: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            otel_sdk_disabled: false,
            force_console: false,
        }
    }
}

fn default_node_env() -> String {
    "production".to_string()
}
fn default_prefix() -> String {
    "eddo".to_string()
}
fn default_test_prefix() -> String {
    "eddo_test".to_string()
}
fn default_couch_url() -> String {
    "http://localhost:5984".to_string()
}
fn default_registry_db_name() -> String {
    "user_registry".to_string()
}
fn default_mcp_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_cors_origin() -> String {
    "*".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl EddoConfig {
    /// Load config from a TOML file with `EDDO_*` env var overrides.
    ///
    /// Checks, in order: an explicit path argument, then `./eddo.toml`.
    /// Individual fields may also be set purely through environment
    /// variables per §6 (`NODE_ENV`, `DATABASE_PREFIX`, `COUCHDB_URL`, ...),
    /// which is handled by flattening those into the `EDDO_`-prefixed shape
    /// the underlying merge expects.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path.map(String::from).unwrap_or_else(|| "eddo.toml".to_string());

        let config: EddoConfig = Figment::from(figment::providers::Serialized::defaults(EddoConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::raw().only(&["NODE_ENV"]).map(|_| "environment.node_env".into()))
            .merge(
                Env::raw()
                    .only(&["DATABASE_PREFIX"])
                    .map(|_| "database.prefix".into()),
            )
            .merge(
                Env::raw()
                    .only(&["DATABASE_TEST_PREFIX"])
                    .map(|_| "database.test_prefix".into()),
            )
            .merge(Env::raw().only(&["COUCHDB_URL"]).map(|_| "database.couch_url".into()))
            .merge(
                Env::raw()
                    .only(&["COUCHDB_DB_NAME"])
                    .map(|_| "database.registry_db_name".into()),
            )
            .merge(Env::raw().only(&["MCP_SERVER_URL"]).map(|_| "server.url".into()))
            .merge(Env::raw().only(&["PORT"]).map(|_| "server.port".into()))
            .merge(Env::raw().only(&["CORS_ORIGIN"]).map(|_| "server.cors_origin".into()))
            .merge(Env::raw().only(&["BOT_PERSONA_ID"]).map(|_| "agent.persona_id".into()))
            .merge(Env::raw().only(&["LLM_MODEL"]).map(|_| "agent.llm_model".into()))
            .merge(
                Env::raw()
                    .only(&["GOOGLE_CLIENT_ID"])
                    .map(|_| "oauth.google_client_id".into()),
            )
            .merge(
                Env::raw()
                    .only(&["GOOGLE_CLIENT_SECRET"])
                    .map(|_| "oauth.google_client_secret".into()),
            )
            .merge(
                Env::raw()
                    .only(&["GOOGLE_REDIRECT_URI"])
                    .map(|_| "oauth.google_redirect_uri".into()),
            )
            .merge(Env::raw().only(&["JWT_SECRET"]).map(|_| "auth.jwt_secret".into()))
            .merge(Env::raw().only(&["LOG_LEVEL"]).map(|_| "tracing.log_level".into()))
            .merge(
                Env::raw()
                    .only(&["OTEL_SDK_DISABLED"])
                    .map(|_| "tracing.otel_sdk_disabled".into()),
            )
            .merge(
                Env::raw()
                    .only(&["FORCE_CONSOLE"])
                    .map(|_| "tracing.force_console".into()),
            )
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn node_environment(&self) -> crate::naming::Environment {
        crate::naming::Environment::from_node_env(&self.environment.node_env)
    }

    pub fn prefix(&self) -> &str {
        crate::naming::prefix(
            self.node_environment(),
            &self.database.prefix,
            &self.database.test_prefix,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_selects_production_prefix() {
        let cfg = EddoConfig::default();
        assert_eq!(cfg.prefix(), "eddo");
    }

    #[test]
    fn test_environment_selects_test_prefix() {
        let mut cfg = EddoConfig::default();
        cfg.environment.node_env = "test".to_string();
        assert_eq!(cfg.prefix(), "eddo_test");
    }
}
