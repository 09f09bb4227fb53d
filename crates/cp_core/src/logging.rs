use std::fmt;
use std::sync::Once;
use tracing::Level;

static INIT: Once = Once::new();

/// Log handle that tags every line, e.g. `[session 1f2e3d4c] [chat] ...`.
#[derive(Debug, Clone, Default)]
pub struct Logger {
    tags: Vec<String>,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tagged(tag: impl fmt::Display) -> Self {
        Self::new().scope(tag)
    }

    /// A child logger with one more tag.
    pub fn scope(&self, tag: impl fmt::Display) -> Self {
        let mut tags = self.tags.clone();
        tags.push(format!("[{}]", tag));
        Self { tags }
    }

    fn line(&self, message: &str) -> String {
        if self.tags.is_empty() {
            message.to_string()
        } else {
            format!("{} {}", self.tags.join(" "), message)
        }
    }

    pub fn info(&self, message: &str) {
        tracing::info!("{}", self.line(message));
    }

    pub fn error(&self, message: &str) {
        tracing::error!("{}", self.line(message));
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!("{}", self.line(message));
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!("{}", self.line(message));
    }
}

/// Parse a level name such as `info` or `DEBUG`.
pub fn parse_level(level: &str) -> crate::Result<Level> {
    level
        .parse::<Level>()
        .map_err(|_| crate::Error::Configuration(format!("Unknown log level: {}", level)))
}

/// Install the fmt subscriber once; later calls and embedders that already
/// installed one are left alone.
pub fn init_logging(level: Level) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    INIT.call_once(|| {
        tracing_subscriber::fmt().with_max_level(level).with_target(false).init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_extend_tags() {
        let session = Logger::tagged("session 1f2e3d4c");
        let chat = session.scope("chat");
        assert_eq!(session.line("hello"), "[session 1f2e3d4c] hello");
        assert_eq!(chat.line("hello"), "[session 1f2e3d4c] [chat] hello");
        assert_eq!(Logger::new().line("plain"), "plain");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_level("WARN").unwrap(), Level::WARN);
        assert!(parse_level("loud").is_err());
    }
}
