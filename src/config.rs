use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Settings {
    #[validate]
    pub application: ApplicationSettings,
    #[validate]
    pub store: StoreSettings,
    #[validate]
    pub caching: CachingSettings,
    #[validate]
    pub gate: GateSettings,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ApplicationSettings {
    pub port: u16,
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Backend selection for the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub url: String,
    #[validate(length(min = 1))]
    pub key_prefix: String,
}

/// Cache windows consumed by the record store, plus the idempotency record
/// TTL consumed by the gate. All three are required and must be positive.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CachingSettings {
    #[validate(range(min = 1))]
    pub sliding_expire_minutes: u64,
    #[validate(range(min = 1))]
    pub absolute_expire_minutes: u64,
    #[validate(range(min = 1))]
    pub idempotency_expiration_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GateSettings {
    #[validate(range(min = 1))]
    pub max_cacheable_body_bytes: u64,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            max_cacheable_body_bytes: 262_144,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        Ok(settings)
    }
}
