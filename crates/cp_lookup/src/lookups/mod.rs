use std::sync::Arc;
use cp_core::{EncyclopediaLookup, Error, Result};

pub mod scripted;
pub mod wikipedia;

pub use scripted::ScriptedLookup;
pub use wikipedia::WikipediaLookup;

/// Build the lookup backend named on the command line.
pub fn create_lookup(name: &str, api_url: Option<&str>) -> Result<Arc<dyn EncyclopediaLookup>> {
    match name {
        "wikipedia" => {
            let lookup = match api_url {
                Some(url) => WikipediaLookup::with_api_url(url)?,
                None => WikipediaLookup::new()?,
            };
            Ok(Arc::new(lookup))
        }
        other => Err(Error::Configuration(format!(
            "Unknown lookup backend '{}'. Available backends: wikipedia",
            other
        ))),
    }
}

/// Common utilities for lookups
pub(crate) mod utils {
    use scraper::{Html, Selector};
    use cp_core::{Error, Result};

    /// Candidate titles listed on a disambiguation page, in document order.
    ///
    /// Every `<li>` that is not a table-of-contents entry contributes the text
    /// of its first link.
    pub fn disambiguation_options(html: &str) -> Result<Vec<String>> {
        let document = Html::parse_fragment(html);
        let li = Selector::parse("li")
            .map_err(|e| Error::Lookup(format!("Invalid selector: {}", e)))?;
        let link = Selector::parse("a")
            .map_err(|e| Error::Lookup(format!("Invalid selector: {}", e)))?;

        let mut options: Vec<String> = Vec::new();
        for item in document.select(&li) {
            let is_toc = item
                .value()
                .attr("class")
                .map_or(false, |class| class.contains("tocsection"));
            if is_toc {
                continue;
            }
            if let Some(anchor) = item.select(&link).next() {
                let text = anchor.text().collect::<String>().trim().to_string();
                if !text.is_empty() && !options.contains(&text) {
                    options.push(text);
                }
            }
        }
        Ok(options)
    }
}
