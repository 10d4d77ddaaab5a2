//! Provider configuration.
//!
//! One `ProviderConfig` describes one backend deployment. It is injected at
//! construction time; nothing in the crate reads a global base URL.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::types::BulkResultMode;

pub const DEFAULT_API_VERSION: &str = "v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Backend root, e.g. `https://localhost:8080`.
    pub base_url: String,
    /// Version segment appended to `base_url`.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub bulk_result_mode: BulkResultMode,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_version: default_api_version(),
            bulk_result_mode: BulkResultMode::default(),
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_bulk_result_mode(mut self, mode: BulkResultMode) -> Self {
        self.bulk_result_mode = mode;
        self
    }

    /// Read `SANDPIPER_BASE_URL` (required), `SANDPIPER_API_VERSION` and
    /// `SANDPIPER_BULK_RESULT` (`records` or `ids`).
    pub fn from_env() -> Result<Self, ApiError> {
        let base_url = std::env::var("SANDPIPER_BASE_URL")
            .map_err(|_| ApiError::InvalidConfig("SANDPIPER_BASE_URL is not set".to_string()))?;
        let mut config = Self::new(base_url);
        if let Ok(version) = std::env::var("SANDPIPER_API_VERSION") {
            config.api_version = version;
        }
        if let Ok(mode) = std::env::var("SANDPIPER_BULK_RESULT") {
            config.bulk_result_mode = parse_bulk_result_mode(&mode)?;
        }
        Ok(config)
    }
}

fn parse_bulk_result_mode(value: &str) -> Result<BulkResultMode, ApiError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "records" => Ok(BulkResultMode::Records),
        "ids" => Ok(BulkResultMode::Ids),
        other => Err(ApiError::InvalidConfig(format!(
            "SANDPIPER_BULK_RESULT must be `records` or `ids`, got `{other}`"
        ))),
    }
}
