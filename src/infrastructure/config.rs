use crate::infrastructure::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const BACKEND_JSON: &str = "backend.json";
const SCHEMA_VERSION: u64 = 1;

/// Connection settings for the remote slot store. Credentials are not kept
/// here; they are supplied at login time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendConfig {
    pub schema: u64,
    pub base_url: String,
    pub company_id: String,
    pub username: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            schema: SCHEMA_VERSION,
            base_url: "https://api.example.com/v1".to_string(),
            company_id: String::new(),
            username: String::new(),
        }
    }
}

/// Writes a default `backend.json` into `config_dir` unless one exists.
pub fn ensure_default_config(config_dir: &Path) -> Result<(), EngineError> {
    let path = config_dir.join(BACKEND_JSON);
    if !path.exists() {
        fs::create_dir_all(config_dir)?;
        let formatted = serde_json::to_string_pretty(&BackendConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

/// Loads and validates `backend.json` from `config_dir`.
pub fn load_backend_config(config_dir: &Path) -> Result<BackendConfig, EngineError> {
    let path = config_dir.join(BACKEND_JSON);
    let raw = fs::read_to_string(&path)?;
    let config: BackendConfig = serde_json::from_str(&raw)?;

    if config.schema != SCHEMA_VERSION {
        return Err(EngineError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            config.schema,
            path.display()
        )));
    }
    if config.base_url.trim().is_empty() {
        return Err(EngineError::InvalidConfig(format!(
            "base_url must not be empty in {}",
            path.display()
        )));
    }
    if config.company_id.trim().is_empty() {
        return Err(EngineError::InvalidConfig(format!(
            "company_id must not be empty in {}",
            path.display()
        )));
    }
    Ok(config)
}
