use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default)]
    pub use_json: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String,
    /// Emit the per-phase `REMIT::PROC` orchestration logs
    #[serde(default)]
    pub enable_tracing: bool,
    #[serde(default)]
    pub transfer: TransferConfig,
    /// PostgreSQL connection URL for the durable transfer store
    #[serde(default)]
    pub postgres_url: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "./logs".to_string()
}

fn default_log_file() -> String {
    "remit_engine.log".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            log_file: default_log_file(),
            use_json: false,
            rotation: default_rotation(),
            enable_tracing: false,
            transfer: TransferConfig::default(),
            postgres_url: None,
        }
    }
}

/// Transfer engine settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TransferConfig {
    /// Our own bank code in gateway requests
    pub sender_bank_code: String,
    pub currency: String,
    pub transaction_id_prefix: String,
    /// Receiver bank display name for secure external commands that omit it
    pub external_bank_name: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            sender_bank_code: "EASYPAY".to_string(),
            currency: "KRW".to_string(),
            transaction_id_prefix: "TXN".to_string(),
            external_bank_name: "External bank".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}
