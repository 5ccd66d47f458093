//! Configuration types, built from environment variables.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Outbound SMTP settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Credentials are only used when both username and password are set.
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// Address every outreach is sent from.
    pub sender: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1025, // MailHog
            username: None,
            password: None,
            sender: "sales@yourcompany.com".to_string(),
        }
    }
}

/// Campaign configuration.
#[derive(Debug, Clone)]
pub struct CampaignConfig {
    pub llm_backend: LlmBackend,
    /// API key for `llm_backend`; only required by stages that call a model.
    pub llm_api_key: Option<SecretString>,
    pub llm_model: String,
    pub smtp: SmtpConfig,
    /// Directory the conventional `dataset/`, `output/` and `report/`
    /// paths are resolved against.
    pub base_dir: PathBuf,
}

impl CampaignConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let llm_backend = match get("CAMPAIGN_LLM_BACKEND") {
            Some(raw) => raw
                .parse::<LlmBackend>()
                .map_err(|message| ConfigError::InvalidValue {
                    key: "CAMPAIGN_LLM_BACKEND".to_string(),
                    message,
                })?,
            None => LlmBackend::Anthropic,
        };
        let llm_api_key = get(llm_backend.api_key_var()).map(SecretString::from);
        let llm_model =
            get("CAMPAIGN_MODEL").unwrap_or_else(|| llm_backend.default_model().to_string());

        let defaults = SmtpConfig::default();
        let port = match get("SMTP_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "SMTP_PORT".to_string(),
                message: e.to_string(),
            })?,
            None => defaults.port,
        };
        let smtp = SmtpConfig {
            host: get("SMTP_HOST").unwrap_or(defaults.host),
            port,
            username: get("SMTP_USERNAME"),
            password: get("SMTP_PASSWORD").map(SecretString::from),
            sender: get("SENDER_EMAIL").unwrap_or(defaults.sender),
        };

        let base_dir = get("CAMPAIGN_BASE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            llm_backend,
            llm_api_key,
            llm_model,
            smtp,
            base_dir,
        })
    }

    /// Provider configuration; fails when the backend's API key is unset.
    pub fn llm(&self) -> Result<LlmConfig, ConfigError> {
        let api_key = self
            .llm_api_key
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar(self.llm_backend.api_key_var().to_string()))?;
        Ok(LlmConfig {
            backend: self.llm_backend,
            api_key,
            model: self.llm_model.clone(),
        })
    }
}
