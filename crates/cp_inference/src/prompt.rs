use cp_core::Article;

/// Build the prompt sent to the model for one user message.
///
/// With an article loaded the message is wrapped together with the article's
/// summary; otherwise the message goes out as-is.
pub fn compose_prompt(article: Option<&Article>, message: &str) -> String {
    match article {
        Some(article) => format!(
            "Based on this article summary about '{}': '{}', answer the user's question: '{}'",
            article.title, article.summary, message
        ),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_without_article_is_raw_message() {
        assert_eq!(compose_prompt(None, "What is CRISPR?"), "What is CRISPR?");
    }

    #[test]
    fn test_prompt_wraps_article_summary() {
        let article = Article::new("CRISPR", "CRISPR is a family of DNA sequences.", "https://example.org/CRISPR");
        let prompt = compose_prompt(Some(&article), "Who discovered it?");
        assert_eq!(
            prompt,
            "Based on this article summary about 'CRISPR': 'CRISPR is a family of DNA sequences.', answer the user's question: 'Who discovered it?'"
        );
    }
}
