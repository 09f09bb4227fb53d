use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use url::Url;
use cp_core::{Article, EncyclopediaLookup, Error, LookupMode, LookupOutcome, Result};
use super::utils;

const USER_AGENT: &str = concat!("chronopedia/", env!("CARGO_PKG_VERSION"), " (https://github.com/chronopedia)");

#[derive(Deserialize)]
struct QueryResponse<T> {
    query: Option<T>,
}

#[derive(Deserialize, Default)]
struct SearchQuery {
    searchinfo: Option<SearchInfo>,
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchInfo {
    suggestion: Option<String>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Deserialize, Default)]
struct PagesQuery {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    fullurl: Option<String>,
    pageprops: Option<PageProps>,
    extract: Option<String>,
}

#[derive(Deserialize)]
struct PageProps {
    disambiguation: Option<serde_json::Value>,
}

impl Page {
    fn exists(&self) -> bool {
        !self.missing && !self.invalid && !self.title.is_empty()
    }

    fn is_disambiguation(&self) -> bool {
        self.pageprops
            .as_ref()
            .map_or(false, |props| props.disambiguation.is_some())
    }
}

#[derive(Deserialize)]
struct ParseResponse {
    parse: Option<ParsedPage>,
}

#[derive(Deserialize)]
struct ParsedPage {
    #[serde(default)]
    text: String,
}

/// Resolves queries against a MediaWiki action API endpoint.
pub struct WikipediaLookup {
    client: Client,
    api_url: Url,
}

impl fmt::Debug for WikipediaLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WikipediaLookup")
            .field("client", &"<reqwest::Client>")
            .field("api_url", &self.api_url.as_str())
            .finish()
    }
}

impl WikipediaLookup {
    pub const DEFAULT_API_URL: &'static str = "https://en.wikipedia.org/w/api.php";

    pub fn new() -> Result<Self> {
        Self::with_api_url(Self::DEFAULT_API_URL)
    }

    pub fn with_api_url(api_url: &str) -> Result<Self> {
        let api_url = cp_core::validate_url(api_url)?;
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client, api_url })
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_str()
    }

    async fn call<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T> {
        let mut url = self.api_url.clone();
        url.query_pairs_mut()
            .append_pair("format", "json")
            .append_pair("formatversion", "2")
            .extend_pairs(params);

        tracing::debug!("🌐 GET {}", url);
        let response = self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await?;
        Ok(response)
    }

    /// Title suggested by full-text search: the spelling suggestion if any,
    /// otherwise the top hit.
    async fn suggest_title(&self, query: &str) -> Result<Option<String>> {
        let response: QueryResponse<SearchQuery> = self
            .call(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", "1"),
                ("srinfo", "suggestion"),
                ("srprop", ""),
            ])
            .await?;
        let search = response.query.unwrap_or_default();
        let suggestion = search
            .searchinfo
            .and_then(|info| info.suggestion)
            .filter(|s| !s.trim().is_empty());
        Ok(suggestion.or_else(|| search.search.into_iter().next().map(|hit| hit.title)))
    }

    async fn page_info(&self, title: &str) -> Result<Option<Page>> {
        let response: QueryResponse<PagesQuery> = self
            .call(&[
                ("action", "query"),
                ("prop", "info|pageprops"),
                ("inprop", "url"),
                ("ppprop", "disambiguation"),
                ("redirects", "1"),
                ("titles", title),
            ])
            .await?;
        Ok(response
            .query
            .unwrap_or_default()
            .pages
            .into_iter()
            .next()
            .filter(Page::exists))
    }

    async fn disambiguation_options(&self, title: &str) -> Result<Vec<String>> {
        let response: ParseResponse = self
            .call(&[
                ("action", "parse"),
                ("page", title),
                ("prop", "text"),
                ("redirects", "1"),
            ])
            .await?;
        let page = response
            .parse
            .ok_or_else(|| Error::Lookup(format!("No parse output for '{}'", title)))?;
        utils::disambiguation_options(&page.text)
    }

    async fn summary(&self, title: &str) -> Result<String> {
        let response: QueryResponse<PagesQuery> = self
            .call(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", title),
            ])
            .await?;
        response
            .query
            .unwrap_or_default()
            .pages
            .into_iter()
            .next()
            .and_then(|page| page.extract)
            .map(|extract| extract.trim().to_string())
            .ok_or_else(|| Error::Lookup(format!("No summary available for '{}'", title)))
    }

    fn page_url(&self, title: &str) -> String {
        let mut url = self.api_url.clone();
        url.set_query(None);
        url.set_path(&format!("/wiki/{}", title.replace(' ', "_")));
        url.to_string()
    }
}

#[async_trait]
impl EncyclopediaLookup for WikipediaLookup {
    fn name(&self) -> &str {
        "Wikipedia"
    }

    async fn lookup(&self, query: &str, mode: LookupMode) -> Result<LookupOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(LookupOutcome::NotFound);
        }

        let title = match mode {
            LookupMode::Exact => query.to_string(),
            LookupMode::Suggest => match self.suggest_title(query).await? {
                Some(title) => title,
                None => {
                    tracing::debug!("🔎 No search results for '{}'", query);
                    return Ok(LookupOutcome::NotFound);
                }
            },
        };

        let Some(page) = self.page_info(&title).await? else {
            tracing::debug!("🔎 Page '{}' does not exist", title);
            return Ok(LookupOutcome::NotFound);
        };

        if page.is_disambiguation() {
            let candidates = self.disambiguation_options(&page.title).await?;
            tracing::debug!("🔀 '{}' is a disambiguation page with {} options", page.title, candidates.len());
            if candidates.is_empty() {
                return Ok(LookupOutcome::NotFound);
            }
            return Ok(LookupOutcome::Ambiguous { candidates });
        }

        let summary = self.summary(&page.title).await?;
        let url = match page.fullurl {
            Some(url) => url,
            None => self.page_url(&page.title),
        };
        Ok(LookupOutcome::Found(Article::new(page.title, summary, url)))
    }
}
