//! Configuration management
//!
//! YAML-based configuration with environment variable overrides and default
//! values for every setting. The workflow and authorization sections are
//! injected into the engines at startup; nothing in the decision logic reads
//! the environment directly.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub authorization: AuthorizationConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// HMAC secret for signing access tokens
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_token_expiry_secs")]
    pub token_expiry_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_expiry_secs: default_token_expiry_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Optional log file; stdout only when unset
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Batch allocation and sampling policy
///
/// Sampling rates are forwarded to downstream secondary-QC processing; the
/// allocator itself never drops eligible items.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_batch_size_icsr")]
    pub batch_size_icsr: u32,
    #[serde(default = "default_batch_size_aoi")]
    pub batch_size_aoi: u32,
    #[serde(default = "default_batch_size_no_case")]
    pub batch_size_no_case: u32,
    /// Percentage (0-100) of AOI items routed to secondary QC
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate_aoi: u8,
    /// Percentage (0-100) of No-Case items routed to secondary QC
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate_no_case: u8,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            batch_size_icsr: default_batch_size_icsr(),
            batch_size_aoi: default_batch_size_aoi(),
            batch_size_no_case: default_batch_size_no_case(),
            sampling_rate_aoi: default_sampling_rate(),
            sampling_rate_no_case: default_sampling_rate(),
        }
    }
}

impl WorkflowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sampling_rate_aoi > 100 || self.sampling_rate_no_case > 100 {
            anyhow::bail!("Sampling rates must be between 0 and 100");
        }
        if self.batch_size_icsr == 0 || self.batch_size_aoi == 0 || self.batch_size_no_case == 0 {
            anyhow::bail!("Batch sizes must be greater than zero");
        }
        Ok(())
    }
}

/// Authorization engine configuration
///
/// The super-admin organization id is deployment-specific and must come from
/// configuration, never from a literal in business logic.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AuthorizationConfig {
    #[serde(default)]
    pub super_admin_org_id: Option<Uuid>,
}

impl AppConfig {
    /// Load configuration from the first file found, then apply env overrides
    ///
    /// Search order: `VIGILIT_CONFIG`, `./vigilit.yaml`, `./config/vigilit.yaml`.
    /// Missing file means defaults + env only.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match Self::find_config_file() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default_config(),
        };

        config.apply_env_overrides();
        config.workflow.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_norway::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("VIGILIT_CONFIG") {
            return Some(PathBuf::from(path));
        }
        for candidate in ["vigilit.yaml", "config/vigilit.yaml"] {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Some(path);
            }
        }
        None
    }

    fn default_config() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
            workflow: WorkflowConfig::default(),
            authorization: AuthorizationConfig::default(),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("VIGILIT_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("VIGILIT_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(url) = std::env::var("VIGILIT_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(secret) = std::env::var("VIGILIT_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(level) = std::env::var("VIGILIT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(org) = std::env::var("VIGILIT_SUPER_ADMIN_ORG") {
            if let Ok(org) = Uuid::parse_str(&org) {
                self.authorization.super_admin_org_id = Some(org);
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5071
}

fn default_database_url() -> String {
    "sqlite://data/vigilit.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_token_expiry_secs() -> u64 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_batch_size_icsr() -> u32 {
    10
}

fn default_batch_size_aoi() -> u32 {
    25
}

fn default_batch_size_no_case() -> u32 {
    50
}

fn default_sampling_rate() -> u8 {
    10
}
