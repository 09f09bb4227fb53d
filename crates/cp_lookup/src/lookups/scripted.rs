use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use cp_core::{Article, EncyclopediaLookup, Error, LookupMode, LookupOutcome, Result};

/// In-process lookup answering from a fixed table of queries.
///
/// Unknown queries resolve to [`LookupOutcome::NotFound`]; queries registered
/// with [`ScriptedLookup::with_failure`] return a lookup error. Every call is
/// recorded so tests can assert on what was asked.
#[derive(Debug, Default)]
pub struct ScriptedLookup {
    outcomes: HashMap<String, LookupOutcome>,
    failures: HashSet<String>,
    calls: Mutex<Vec<(String, LookupMode)>>,
}

impl ScriptedLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_article(mut self, query: &str, article: Article) -> Self {
        self.outcomes.insert(query.to_string(), LookupOutcome::Found(article));
        self
    }

    pub fn with_candidates(mut self, query: &str, candidates: &[&str]) -> Self {
        self.outcomes.insert(
            query.to_string(),
            LookupOutcome::Ambiguous {
                candidates: candidates.iter().map(|c| c.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_failure(mut self, query: &str) -> Self {
        self.failures.insert(query.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, LookupMode)> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EncyclopediaLookup for ScriptedLookup {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn lookup(&self, query: &str, mode: LookupMode) -> Result<LookupOutcome> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((query.to_string(), mode));
        }
        if self.failures.contains(query) {
            return Err(Error::Lookup(format!("scripted failure for '{}'", query)));
        }
        Ok(self.outcomes.get(query).cloned().unwrap_or(LookupOutcome::NotFound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_lookup() {
        let lookup = ScriptedLookup::new()
            .with_article("rust", Article::new("Rust", "A language.", "https://example.org/Rust"))
            .with_candidates("mercury", &["Mercury (planet)", "Mercury (element)"])
            .with_failure("boom");

        assert!(matches!(lookup.lookup("rust", LookupMode::Suggest).await.unwrap(), LookupOutcome::Found(_)));
        assert!(matches!(lookup.lookup("mercury", LookupMode::Suggest).await.unwrap(), LookupOutcome::Ambiguous { .. }));
        assert_eq!(lookup.lookup("other", LookupMode::Exact).await.unwrap(), LookupOutcome::NotFound);
        assert!(lookup.lookup("boom", LookupMode::Suggest).await.is_err());

        let calls = lookup.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[2], ("other".to_string(), LookupMode::Exact));
    }
}
