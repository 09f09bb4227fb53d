use crate::types::Article;
use crate::Result;

pub trait DocumentRenderer: Send + Sync {
    /// Render an article into a serialized document
    fn render(&self, article: &Article) -> Result<Vec<u8>>;
}
