use async_trait::async_trait;
use crate::types::{LookupMode, LookupOutcome};
use crate::Result;

#[async_trait]
pub trait EncyclopediaLookup: Send + Sync {
    /// Human readable name of the backing service
    fn name(&self) -> &str;

    /// Resolve a query to a single article, a list of candidates, or nothing
    async fn lookup(&self, query: &str, mode: LookupMode) -> Result<LookupOutcome>;
}
