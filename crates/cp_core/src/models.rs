use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use crate::Result;

/// Ordered text fragments of one generated reply.
pub type FragmentStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait ChatModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Start generating a reply to `prompt`, delivered incrementally
    async fn stream(&self, prompt: &str) -> Result<FragmentStream>;
}
