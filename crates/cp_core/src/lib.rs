pub mod error;
pub mod logging;
pub mod lookup;
pub mod models;
pub mod render;
pub mod types;

pub use error::{Error, Result};
pub use lookup::EncyclopediaLookup;
pub use models::{ChatModel, FragmentStream};
pub use render::DocumentRenderer;
pub use types::{Article, ChatTurn, ExportArtifact, LookupMode, LookupOutcome, Role};

/// Fail with [`Error::InvalidUrl`] unless `url` is an absolute http(s) URL.
pub fn validate_url(url: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(Error::InvalidUrl(format!("unsupported scheme '{}' in {}", other, url))),
    }
}

pub mod prelude {
    pub use crate::{Article, ChatTurn, Error, LookupMode, LookupOutcome, Result, Role};
    pub use crate::{ChatModel, DocumentRenderer, EncyclopediaLookup};
}
