use async_trait::async_trait;
use clap::Parser;
use cp_core::logging::{init_logging, parse_level};
use cp_core::{Error, Result};
use cp_export::PdfRenderer;
use cp_inference::{resolve_api_key, AssistantEvent, FragmentSink, ReplyOutcome, MISSING_KEY_MESSAGE};
use cp_session::{ControllerConfig, LookupState, Session, SessionController, SessionStore};
use cp_web::AppState;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// `--session-idle` value: plain seconds, or unit-suffixed parts like `1h30m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IdleTimeout(Duration);

fn unit_seconds(unit: char) -> Option<u64> {
    match unit {
        's' => Some(1),
        'm' => Some(60),
        'h' => Some(60 * 60),
        'd' => Some(24 * 60 * 60),
        _ => None,
    }
}

impl FromStr for IdleTimeout {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let seconds = match compact.parse::<u64>() {
            Ok(seconds) => seconds,
            Err(_) => {
                let mut rest = compact.as_str();
                let mut total = 0u64;
                while !rest.is_empty() {
                    let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
                    let (number, tail) = rest.split_at(digits);
                    let mut chars = tail.chars();
                    let unit = chars
                        .next()
                        .ok_or_else(|| format!("'{}' needs a unit (s, m, h or d)", number))?;
                    let amount: u64 = number
                        .parse()
                        .map_err(|_| format!("Expected a number before '{}'", unit))?;
                    let scale = unit_seconds(unit).ok_or_else(|| format!("Unknown duration unit '{}'", unit))?;
                    total = amount
                        .checked_mul(scale)
                        .and_then(|part| total.checked_add(part))
                        .ok_or_else(|| "Idle timeout is too long".to_string())?;
                    rest = chars.as_str();
                }
                total
            }
        };
        if seconds == 0 {
            return Err("Idle timeout must be longer than zero".to_string());
        }
        Ok(IdleTimeout(Duration::from_secs(seconds)))
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Search the encyclopedia, export reports and chat about articles", long_about = None)]
pub struct Cli {
    /// Gemini API key; falls back to the secrets file when unset
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,
    #[arg(long, default_value = ".chronopedia/secrets.toml", global = true)]
    secrets: PathBuf,
    #[arg(long, default_value = "gemini", global = true, help = "Model to use for the assistant. Available models: gemini (default), dummy")]
    model: String,
    #[arg(long, global = true)]
    model_name: Option<String>,
    #[arg(long, global = true)]
    model_url: Option<String>,
    /// MediaWiki action API endpoint
    #[arg(long, global = true)]
    lookup_url: Option<String>,
    /// TrueType font embedded in PDF reports; without it only WinAnsi text is kept
    #[arg(long, global = true)]
    font: Option<PathBuf>,
    #[arg(long, default_value_t = 5, global = true)]
    max_candidates: usize,
    #[arg(long, default_value_t = 3, global = true)]
    max_hops: usize,
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the web interface
    Serve {
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: String,
        /// Drop sessions idle for longer than this (e.g. 30m, 1h, 1h30m)
        #[arg(long, default_value = "1h")]
        session_idle: IdleTimeout,
    },
    /// Look up an article and print its summary
    Search {
        query: String,
        /// Pick the Nth candidate (1-based) when the query is ambiguous
        #[arg(long)]
        pick: Option<usize>,
    },
    /// Write the PDF report for an article
    Export {
        query: String,
        #[arg(long)]
        pick: Option<usize>,
        /// Output file; defaults to the report's own file name
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Chat with the assistant from the terminal
    Chat {
        /// Load this article first so questions are answered about it
        #[arg(long)]
        topic: Option<String>,
    },
}

/// Prints reply fragments as they arrive.
struct StdoutSink;

#[async_trait]
impl FragmentSink for StdoutSink {
    async fn publish(&mut self, event: AssistantEvent) -> Result<()> {
        let mut out = std::io::stdout();
        match event {
            AssistantEvent::Started => write!(out, "Assistant: ")?,
            AssistantEvent::Fragment { text, .. } => write!(out, "{}", text)?,
            AssistantEvent::Completed { .. } => writeln!(out)?,
            AssistantEvent::Failed { error } => writeln!(out, "\n💥 {}", error)?,
            AssistantEvent::Cancelled => writeln!(out, "\n✋ cancelled")?,
        }
        out.flush()?;
        Ok(())
    }
}

fn build_controller(cli: &Cli) -> Result<SessionController> {
    let api_key = resolve_api_key(cli.api_key.clone(), &cli.secrets)?;
    let config = cp_inference::Config {
        api_key,
        model_name: cli.model_name.clone(),
        base_url: cli.model_url.clone(),
    };
    let model = cp_inference::create_model(&cli.model, &config)?;
    let lookup = cp_lookup::create_lookup("wikipedia", cli.lookup_url.as_deref())?;
    info!("📚 Lookup backend initialized (using {})", lookup.name());
    let renderer = match &cli.font {
        Some(path) => PdfRenderer::with_font_file(path)?,
        None => PdfRenderer::new(),
    };

    Ok(SessionController::new(
        lookup,
        Arc::new(renderer),
        model,
        ControllerConfig {
            max_candidates: cli.max_candidates,
            max_disambiguation_hops: cli.max_hops,
        },
    ))
}

fn print_state(session: &Session) {
    match session.lookup_state() {
        LookupState::Idle => println!("Awaiting your query to access the knowledge archives."),
        LookupState::Loaded => {
            if let Some(article) = session.article() {
                println!("Data Stream: {}\n\n{}\n\nFull data archive available at: {}", article.title, article.summary, article.url);
            }
        }
        LookupState::Ambiguous { candidates, .. } => {
            println!("Ambiguity Detected. Refine your search:");
            for (i, candidate) in candidates.iter().enumerate() {
                println!("  {}. {}", i + 1, candidate);
            }
        }
        LookupState::NotFound { query } => println!("Archive Error: No data found for query '{}'.", query),
    }
}

/// Search, then follow `pick` through one level of ambiguity.
async fn lookup(controller: &SessionController, session: &mut Session, query: &str, pick: Option<usize>) -> Result<()> {
    controller.search(session, query).await;
    let title = match (session.lookup_state(), pick) {
        (LookupState::Ambiguous { candidates, .. }, Some(n)) => n
            .checked_sub(1)
            .and_then(|i| candidates.get(i))
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("--pick {} is out of range (1-{})", n, candidates.len())))?,
        _ => return Ok(()),
    };
    controller.select_candidate(session, &title).await?;
    Ok(())
}

async fn chat(controller: &SessionController, topic: Option<String>) -> Result<()> {
    if !controller.assistant_available() {
        return Err(Error::Configuration(MISSING_KEY_MESSAGE.to_string()));
    }
    let mut session = Session::new();
    if let Some(topic) = topic {
        controller.search(&mut session, &topic).await;
        print_state(&session);
    }
    println!("Type a question, '/search <query>' to switch articles, or '/quit' to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Some(query) = line.strip_prefix("/search ") {
            controller.search(&mut session, query).await;
            print_state(&session);
            continue;
        }

        let cancel = CancellationToken::new();
        let interrupt = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            }
        });
        let outcome = controller.send_message(&mut session, line, &mut StdoutSink, &cancel).await;
        interrupt.abort();
        match outcome {
            Ok(ReplyOutcome::Completed(_)) | Ok(ReplyOutcome::Cancelled) => {}
            Ok(ReplyOutcome::Failed(error)) => warn!("Reply failed: {}", error),
            Err(e) => eprintln!("{}", e),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(parse_level(&cli.log_level)?);

    let controller = build_controller(&cli)?;

    match cli.command {
        Commands::Serve { addr, session_idle } => {
            let sessions = Arc::new(SessionStore::new());
            let state = AppState::new(Arc::new(controller), sessions)?;
            cp_web::serve(&addr, state, session_idle.0).await?;
        }
        Commands::Search { query, pick } => {
            let mut session = Session::new();
            lookup(&controller, &mut session, &query, pick).await?;
            print_state(&session);
        }
        Commands::Export { query, pick, output } => {
            let mut session = Session::new();
            lookup(&controller, &mut session, &query, pick).await?;
            if session.article().is_none() {
                print_state(&session);
                return Err(Error::NotFound(format!("article for '{}'", query)));
            }
            let artifact = controller.export(&mut session)?;
            let path = output.unwrap_or_else(|| PathBuf::from(&artifact.file_name));
            tokio::fs::write(&path, &artifact.bytes).await?;
            info!("📄 Wrote {} ({} bytes)", path.display(), artifact.bytes.len());
        }
        Commands::Chat { topic } => chat(&controller, topic).await?,
    }

    Ok(())
}
