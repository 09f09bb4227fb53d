use serde::Deserialize;
use std::fmt;
use std::path::Path;
use cp_core::{Error, Result};

pub mod assistant;
pub mod models;
pub mod prompt;

/// Message shown in place of the assistant when no credential is configured.
pub const MISSING_KEY_MESSAGE: &str =
    "Gemini API key not configured. Please add GEMINI_API_KEY to your secrets.toml file or environment.";

#[derive(Clone, Default)]
pub struct Config {
    pub api_key: Option<String>,
    pub model_name: Option<String>,
    pub base_url: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field("model_name", &self.model_name)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Contents of a `secrets.toml` file.
#[derive(Deserialize, Default)]
pub struct Secrets {
    #[serde(rename = "GEMINI_API_KEY")]
    pub gemini_api_key: Option<String>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("gemini_api_key", &self.gemini_api_key.as_deref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Read a secrets file. A missing file yields empty secrets.
pub fn load_secrets(path: &Path) -> Result<Secrets> {
    if !path.exists() {
        return Ok(Secrets::default());
    }
    let raw = std::fs::read_to_string(path)?;
    toml::from_str(&raw)
        .map_err(|e| Error::Configuration(format!("Invalid secrets file {}: {}", path.display(), e)))
}

/// Pick the API key: an explicit value (flag or environment) wins over the
/// secrets file. Blank values count as absent.
pub fn resolve_api_key(explicit: Option<String>, secrets_path: &Path) -> Result<Option<String>> {
    let non_blank = |key: Option<String>| key.filter(|k| !k.trim().is_empty());
    if let Some(key) = non_blank(explicit) {
        return Ok(Some(key));
    }
    Ok(non_blank(load_secrets(secrets_path)?.gemini_api_key))
}

pub use assistant::{run_reply, AssistantEvent, FragmentSink, ReplyOutcome, TurnState};
pub use models::create_model;

pub mod prelude {
    pub use super::assistant::{run_reply, AssistantEvent, FragmentSink, ReplyOutcome, TurnState};
    pub use super::models::create_model;
    pub use super::Config;
    pub use cp_core::{ChatModel, Error, Result};
}
