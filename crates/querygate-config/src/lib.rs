use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config failed: {0}")]
    Read(String),
    #[error("parse config failed: {0}")]
    Parse(String),
    #[error("schema load failed: {0}")]
    SchemaLoad(String),
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: Server,
    pub auth: Auth,
    pub engine: Engine,
    pub audit: Audit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnconfiguredPolicy {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auth {
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_unconfigured_policy")]
    pub unconfigured_policy: UnconfiguredPolicy,
    /// Resolved from `api_key_env` at load time; never read from the file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engine {
    pub conversation_endpoint: String,
    pub chart_endpoint: String,
    #[serde(default = "default_engine_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audit {
    pub log_dir: String,
}

fn default_api_key_env() -> String {
    "APP_API_KEY".to_string()
}

fn default_unconfigured_policy() -> UnconfiguredPolicy {
    UnconfiguredPolicy::Allow
}

fn default_engine_timeout_ms() -> u64 {
    120_000
}

pub fn load_and_validate(path: &str) -> Result<Config, ConfigError> {
    let config_text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&config_text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let instance = serde_json::to_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_against_schema(&instance)?;

    let mut cfg: Config =
        serde_json::from_value(instance).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_runtime_support(&cfg)?;
    cfg.auth.api_key = resolve_api_key(&cfg.auth.api_key_env, |name| std::env::var(name).ok());
    Ok(cfg)
}

/// An empty secret counts as no secret. Anything else is kept byte for byte,
/// surrounding whitespace included.
pub fn resolve_api_key(
    env_name: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    lookup(env_name).filter(|v| !v.is_empty())
}

fn validate_against_schema(instance: &serde_json::Value) -> Result<(), ConfigError> {
    let schema_path = [
        std::path::PathBuf::from("config/config.schema.json"),
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join("config/config.schema.json"),
    ]
    .into_iter()
    .find(|p| p.exists())
    .ok_or_else(|| {
        ConfigError::SchemaLoad(
            "config schema not found at config/config.schema.json or workspace config path"
                .to_string(),
        )
    })?;

    let schema_text =
        std::fs::read_to_string(schema_path).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    let schema: serde_json::Value =
        serde_json::from_str(&schema_text).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;

    let validator =
        jsonschema::validator_for(&schema).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    if let Err(first) = validator.validate(instance) {
        return Err(ConfigError::SchemaValidation(first.to_string()));
    }
    Ok(())
}

fn validate_runtime_support(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.engine.timeout_ms == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "engine.timeout_ms must be >= 1".to_string(),
        ));
    }
    for (name, endpoint) in [
        ("engine.conversation_endpoint", &cfg.engine.conversation_endpoint),
        ("engine.chart_endpoint", &cfg.engine.chart_endpoint),
    ] {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ConfigError::UnsupportedConfig(format!(
                "{name}={endpoint} must be an http(s) URL"
            )));
        }
    }
    if cfg.audit.log_dir.trim().is_empty() {
        return Err(ConfigError::UnsupportedConfig(
            "audit.log_dir must not be empty".to_string(),
        ));
    }
    if cfg.auth.api_key_env.trim().is_empty() {
        return Err(ConfigError::UnsupportedConfig(
            "auth.api_key_env must not be empty".to_string(),
        ));
    }
    Ok(())
}
