use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use cp_core::{
    ChatModel, ChatTurn, DocumentRenderer, EncyclopediaLookup, Error, ExportArtifact, LookupMode,
    LookupOutcome, Result,
};
use cp_inference::prompt::compose_prompt;
use cp_inference::{run_reply, AssistantEvent, FragmentSink, ReplyOutcome, TurnState, MISSING_KEY_MESSAGE};
use crate::session::{LookupState, Session};

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Candidates offered when a query is ambiguous.
    pub max_candidates: usize,
    /// Consecutive ambiguous selections tolerated before giving up.
    pub max_disambiguation_hops: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_candidates: 5,
            max_disambiguation_hops: 3,
        }
    }
}

/// A user action applied to one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Search { query: String },
    SelectCandidate { title: String },
    Export,
    SendMessage { message: String },
}

#[derive(Debug)]
pub enum EventOutcome {
    Lookup(LookupState),
    Exported(ExportArtifact),
    Reply(ReplyOutcome),
}

/// An assistant turn that has been accepted but not yet streamed.
///
/// Streaming happens outside any session lock; the result is applied with
/// [`SessionController::finish_turn`].
pub struct PendingTurn {
    model: Arc<dyn ChatModel>,
    epoch: u64,
    message: String,
    prompt: String,
}

impl fmt::Debug for PendingTurn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTurn")
            .field("model", &self.model.name())
            .field("epoch", &self.epoch)
            .field("message", &self.message)
            .finish()
    }
}

impl PendingTurn {
    /// Session epoch the turn was accepted under.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub async fn run<S>(&self, sink: &mut S, cancel: &CancellationToken) -> ReplyOutcome
    where
        S: FragmentSink + ?Sized,
    {
        run_reply(self.model.as_ref(), &self.prompt, sink, cancel).await
    }
}

/// Records fragments on the session before forwarding them.
struct ProgressSink<'a, S: ?Sized> {
    session: &'a mut Session,
    epoch: u64,
    inner: &'a mut S,
}

#[async_trait]
impl<'a, S> FragmentSink for ProgressSink<'a, S>
where
    S: FragmentSink + ?Sized,
{
    async fn publish(&mut self, event: AssistantEvent) -> Result<()> {
        self.session.record_progress(self.epoch, &event);
        self.inner.publish(event).await
    }
}

/// Applies [`SessionEvent`]s to sessions using the configured services.
pub struct SessionController {
    lookup: Arc<dyn EncyclopediaLookup>,
    renderer: Arc<dyn DocumentRenderer>,
    model: Option<Arc<dyn ChatModel>>,
    config: ControllerConfig,
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("lookup", &self.lookup.name())
            .field("model", &self.model.as_ref().map(|m| m.name().to_string()))
            .field("config", &self.config)
            .finish()
    }
}

impl SessionController {
    pub fn new(
        lookup: Arc<dyn EncyclopediaLookup>,
        renderer: Arc<dyn DocumentRenderer>,
        model: Option<Arc<dyn ChatModel>>,
        config: ControllerConfig,
    ) -> Self {
        Self { lookup, renderer, model, config }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Whether a text-generation credential was configured.
    pub fn assistant_available(&self) -> bool {
        self.model.is_some()
    }

    pub fn lookup_name(&self) -> &str {
        self.lookup.name()
    }

    /// Dispatch one event. Replies are streamed into `sink`.
    pub async fn handle<S>(
        &self,
        session: &mut Session,
        event: SessionEvent,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<EventOutcome>
    where
        S: FragmentSink + ?Sized,
    {
        match event {
            SessionEvent::Search { query } => {
                Ok(EventOutcome::Lookup(self.search(session, &query).await.clone()))
            }
            SessionEvent::SelectCandidate { title } => {
                Ok(EventOutcome::Lookup(self.select_candidate(session, &title).await?.clone()))
            }
            SessionEvent::Export => Ok(EventOutcome::Exported(self.export(session)?)),
            SessionEvent::SendMessage { message } => {
                Ok(EventOutcome::Reply(self.send_message(session, &message, sink, cancel).await?))
            }
        }
    }

    /// Start a new search. Whatever was loaded before is discarded first.
    pub async fn search<'s>(&self, session: &'s mut Session, query: &str) -> &'s LookupState {
        let query = query.trim();
        session.reset((!query.is_empty()).then(|| query.to_string()));
        if query.is_empty() {
            return &session.lookup;
        }

        let log = session.logger();
        log.info(&format!("🔎 Querying archives for '{}'", query));
        let outcome = self.resolve(session, query, LookupMode::Suggest).await;
        self.apply_outcome(session, query, outcome, 0);
        &session.lookup
    }

    /// Pick one of the pending disambiguation candidates.
    pub async fn select_candidate<'s>(&self, session: &'s mut Session, title: &str) -> Result<&'s LookupState> {
        let hops = match &session.lookup {
            LookupState::Ambiguous { candidates, hops, .. } if candidates.iter().any(|c| c == title) => *hops,
            LookupState::Ambiguous { .. } => {
                return Err(Error::Session(format!("'{}' is not one of the offered candidates", title)))
            }
            _ => return Err(Error::Session("No disambiguation is pending".to_string())),
        };

        session.reset(Some(title.to_string()));
        let log = session.logger();
        log.info(&format!("🔀 Resolving candidate '{}'", title));
        let outcome = self.resolve(session, title, LookupMode::Exact).await;
        self.apply_outcome(session, title, outcome, hops + 1);
        Ok(&session.lookup)
    }

    async fn resolve(&self, session: &Session, query: &str, mode: LookupMode) -> LookupOutcome {
        match self.lookup.lookup(query, mode).await {
            Ok(outcome) => outcome,
            Err(e) => {
                session.logger().debug(&format!("Lookup for '{}' failed: {}", query, e));
                LookupOutcome::NotFound
            }
        }
    }

    fn apply_outcome(&self, session: &mut Session, query: &str, outcome: LookupOutcome, hops: usize) {
        let log = session.logger();
        session.lookup = match outcome {
            LookupOutcome::Found(article) => {
                log.info(&format!("📚 Loaded '{}'", article.title));
                session.article = Some(article);
                LookupState::Loaded
            }
            LookupOutcome::Ambiguous { .. } if hops > self.config.max_disambiguation_hops => {
                log.warn(&format!(
                    "🔁 '{}' is still ambiguous after {} selections, giving up",
                    query, hops
                ));
                LookupState::NotFound { query: query.to_string() }
            }
            LookupOutcome::Ambiguous { mut candidates } if !candidates.is_empty() => {
                candidates.truncate(self.config.max_candidates);
                log.info(&format!("🔀 '{}' is ambiguous, offering {} candidates", query, candidates.len()));
                LookupState::Ambiguous { query: query.to_string(), candidates, hops }
            }
            LookupOutcome::Ambiguous { .. } | LookupOutcome::NotFound => {
                log.info(&format!("🕳️ No data found for '{}'", query));
                LookupState::NotFound { query: query.to_string() }
            }
        };
        session.touch();
    }

    /// Render the loaded article, reusing the cached artifact when present.
    pub fn export(&self, session: &mut Session) -> Result<ExportArtifact> {
        if let Some(artifact) = &session.export {
            return Ok(artifact.clone());
        }
        let article = session
            .article
            .as_ref()
            .ok_or_else(|| Error::Session("Retrieve an article to enable PDF export".to_string()))?;

        let artifact = ExportArtifact::pdf(article, self.renderer.render(article)?);
        session.logger().info(&format!("📄 Compiled report {}", artifact.file_name));
        session.export = Some(artifact.clone());
        session.touch();
        Ok(artifact)
    }

    /// Accept a user message and prepare its prompt.
    pub fn begin_turn(&self, session: &mut Session, message: &str) -> Result<PendingTurn> {
        let model = self
            .model
            .clone()
            .ok_or_else(|| Error::Configuration(MISSING_KEY_MESSAGE.to_string()))?;
        let message = message.trim();
        if message.is_empty() {
            return Err(Error::Session("Message is empty".to_string()));
        }
        if session.turn.is_pending() {
            return Err(Error::Session("A reply is already streaming for this session".to_string()));
        }

        let prompt = compose_prompt(session.article.as_ref(), message);
        session.turn = TurnState::AwaitingFirstFragment;
        session.pending_message = Some(message.to_string());
        session.touch();
        session.logger().scope("chat").debug(&format!("💬 New message ({} chars)", message.len()));

        Ok(PendingTurn {
            model,
            epoch: session.epoch,
            message: message.to_string(),
            prompt,
        })
    }

    /// Record the result of a streamed turn. Returns whether the exchange was
    /// added to the transcript; replies for an article that has since been
    /// replaced are dropped.
    pub fn finish_turn(&self, session: &mut Session, pending: PendingTurn, outcome: &ReplyOutcome) -> bool {
        let log = session.logger().scope("chat");
        if session.epoch != pending.epoch {
            log.debug("Dropping reply for a replaced article");
            return false;
        }

        session.pending_message = None;
        session.turn = outcome.state();
        session.touch();
        match outcome {
            ReplyOutcome::Completed(text) => {
                session.transcript.push(ChatTurn::user(pending.message));
                session.transcript.push(ChatTurn::assistant(text.clone()));
                true
            }
            ReplyOutcome::Failed(error) => {
                log.error(&format!("💥 Reply failed: {}", error));
                false
            }
            ReplyOutcome::Cancelled => {
                log.info("✋ Reply cancelled");
                false
            }
        }
    }

    /// Accept, stream and record one turn while holding the session.
    pub async fn send_message<S>(
        &self,
        session: &mut Session,
        message: &str,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<ReplyOutcome>
    where
        S: FragmentSink + ?Sized,
    {
        let pending = self.begin_turn(session, message)?;
        let mut progress = ProgressSink { session: &mut *session, epoch: pending.epoch, inner: sink };
        let outcome = pending.run(&mut progress, cancel).await;
        self.finish_turn(session, pending, &outcome);
        Ok(outcome)
    }
}
