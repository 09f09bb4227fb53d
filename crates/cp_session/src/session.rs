use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use cp_core::logging::Logger;
use cp_core::{Article, ChatTurn, Error, ExportArtifact};
use cp_inference::{AssistantEvent, TurnState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight characters, used to tag log lines.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| Error::Session(format!("Invalid session id: {}", s)))
    }
}

/// Where the session stands with respect to its current query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LookupState {
    #[default]
    Idle,
    Ambiguous {
        query: String,
        candidates: Vec<String>,
        hops: usize,
    },
    NotFound {
        query: String,
    },
    Loaded,
}

/// Per-user page state: the loaded article and everything derived from it.
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) query: Option<String>,
    pub(crate) lookup: LookupState,
    pub(crate) article: Option<Article>,
    pub(crate) export: Option<ExportArtifact>,
    pub(crate) transcript: Vec<ChatTurn>,
    pub(crate) turn: TurnState,
    pub(crate) pending_message: Option<String>,
    pub(crate) epoch: u64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) last_active: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(SessionId::new())
    }

    pub fn with_id(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            query: None,
            lookup: LookupState::Idle,
            article: None,
            export: None,
            transcript: Vec::new(),
            turn: TurnState::Idle,
            pending_message: None,
            epoch: 0,
            created_at: now,
            last_active: now,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn lookup_state(&self) -> &LookupState {
        &self.lookup
    }

    pub fn article(&self) -> Option<&Article> {
        self.article.as_ref()
    }

    pub fn export_artifact(&self) -> Option<&ExportArtifact> {
        self.export.as_ref()
    }

    pub fn transcript(&self) -> &[ChatTurn] {
        &self.transcript
    }

    pub fn turn_state(&self) -> &TurnState {
        &self.turn
    }

    pub fn pending_message(&self) -> Option<&str> {
        self.pending_message.as_deref()
    }

    /// Incremented every time the article is invalidated.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    pub(crate) fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    pub(crate) fn logger(&self) -> Logger {
        Logger::tagged(format!("session {}", self.id.short()))
    }

    /// Mirror an in-flight reply event onto the turn state. Terminal events
    /// and events for an older epoch are left to `finish_turn`.
    pub fn record_progress(&mut self, epoch: u64, event: &AssistantEvent) -> bool {
        if epoch != self.epoch || event.is_terminal() || !self.turn.is_pending() {
            return false;
        }
        self.turn.advance(event);
        self.touch();
        true
    }

    /// Start over for a new query: drop the article together with its export
    /// and transcript. Replies still streaming for the old article are
    /// orphaned by the epoch bump.
    pub fn reset(&mut self, query: Option<String>) {
        self.query = query;
        self.lookup = LookupState::Idle;
        self.article = None;
        self.export = None;
        self.transcript.clear();
        self.turn = TurnState::Idle;
        self.pending_message = None;
        self.epoch += 1;
        self.touch();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            query: self.query.clone(),
            lookup: self.lookup.clone(),
            article: self.article.clone(),
            export_file_name: self.export.as_ref().map(|e| e.file_name.clone()),
            transcript: self.transcript.clone(),
            turn: self.turn.clone(),
            pending_message: self.pending_message.clone(),
            last_active: self.last_active,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of a session for rendering and the JSON API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub query: Option<String>,
    pub lookup: LookupState,
    pub article: Option<Article>,
    pub export_file_name: Option<String>,
    pub transcript: Vec<ChatTurn>,
    pub turn: TurnState,
    pub pending_message: Option<String>,
    pub last_active: DateTime<Utc>,
}
