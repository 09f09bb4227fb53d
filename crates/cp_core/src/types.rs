use serde::{Deserialize, Serialize};
use std::fmt;

/// A resolved encyclopedia page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub summary: String,
    pub url: String,
}

impl Article {
    pub fn new(title: impl Into<String>, summary: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            url: url.into(),
        }
    }

    /// Download name for the exported report, e.g. `General_Relativity_Report.pdf`.
    pub fn report_file_name(&self) -> String {
        format!("{}_Report.pdf", self.title.replace(' ', "_"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Capitalised label used when rendering a transcript.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into() }
    }
}

/// Result of resolving a query against the encyclopedia.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LookupOutcome {
    Found(Article),
    Ambiguous { candidates: Vec<String> },
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupMode {
    /// Run the query through full-text search first and use the suggested title.
    #[default]
    Suggest,
    /// Treat the query as an exact page title.
    Exact,
}

/// Rendered export of an [`Article`].
#[derive(Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    pub const PDF_MIME: &'static str = "application/pdf";

    pub fn pdf(article: &Article, bytes: Vec<u8>) -> Self {
        Self {
            file_name: article.report_file_name(),
            mime: Self::PDF_MIME,
            bytes,
        }
    }
}

impl fmt::Debug for ExportArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportArtifact")
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_file_name() {
        let article = Article::new("General Relativity", "", "https://en.wikipedia.org/wiki/General_relativity");
        assert_eq!(article.report_file_name(), "General_Relativity_Report.pdf");
    }

    #[test]
    fn test_lookup_outcome_serializes_with_kind_tag() {
        let outcome = LookupOutcome::Ambiguous { candidates: vec!["Mercury (planet)".to_string()] };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "ambiguous");
        assert_eq!(json["candidates"][0], "Mercury (planet)");

        let json = serde_json::to_value(&LookupOutcome::NotFound).unwrap();
        assert_eq!(json["kind"], "not_found");
    }

    #[test]
    fn test_role_serialization() {
        let turn = ChatTurn::assistant("hello");
        let json = serde_json::to_string(&turn).unwrap();
        assert_eq!(json, r#"{"role":"assistant","text":"hello"}"#);
        assert_eq!(Role::User.label(), "User");
    }
}
