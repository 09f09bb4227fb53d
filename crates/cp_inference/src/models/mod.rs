use std::sync::Arc;
use cp_core::{ChatModel, Error, Result};
use super::Config;

pub mod dummy;
pub mod gemini;

pub use dummy::DummyModel;
pub use gemini::GeminiModel;

/// Build the chat model named `kind`.
///
/// Returns `Ok(None)` when the Gemini backend is selected but no API key is
/// configured: the assistant is then unavailable while the rest of the
/// application keeps working.
pub fn create_model(kind: &str, config: &Config) -> Result<Option<Arc<dyn ChatModel>>> {
    match kind {
        "gemini" => {
            if config.api_key.as_deref().map_or(true, |key| key.trim().is_empty()) {
                tracing::warn!("🔑 No Gemini API key configured, assistant disabled");
                return Ok(None);
            }
            let model = GeminiModel::new(config)?;
            tracing::info!("🧠 Using Gemini model {}", model.model_name());
            Ok(Some(Arc::new(model)))
        }
        "dummy" => {
            tracing::info!("🧠 Using offline dummy model");
            Ok(Some(Arc::new(DummyModel::new())))
        }
        other => Err(Error::Configuration(format!(
            "Unknown model '{}'. Available models: gemini (default), dummy",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_disables_gemini() {
        assert!(create_model("gemini", &Config::default()).unwrap().is_none());

        let blank = Config { api_key: Some(" ".to_string()), ..Default::default() };
        assert!(create_model("gemini", &blank).unwrap().is_none());
    }

    #[test]
    fn test_create_model_by_name() {
        let config = Config { api_key: Some("k".to_string()), ..Default::default() };
        assert_eq!(create_model("gemini", &config).unwrap().unwrap().name(), "Gemini");
        assert_eq!(create_model("dummy", &Config::default()).unwrap().unwrap().name(), "Dummy");
        assert!(matches!(create_model("gpt", &config), Err(Error::Configuration(_))));
    }
}
