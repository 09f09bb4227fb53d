use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Redirect, Response,
    },
    Form, Json,
};
use futures_util::stream::{self, Stream};
use minijinja::context;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use cp_core::{Error, Result};
use cp_inference::{AssistantEvent, FragmentSink, MISSING_KEY_MESSAGE};
use cp_session::{SessionId, SessionSnapshot, SharedSession};
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchForm {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct SelectForm {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

async fn find_session(state: &AppState, id: &str) -> std::result::Result<SharedSession, ApiError> {
    let id: SessionId = id
        .parse()
        .map_err(|_| Error::NotFound(format!("session {}", id)))?;
    Ok(state.sessions.get(&id).await?)
}

fn back_to(id: &str) -> Redirect {
    Redirect::to(&format!("/sessions/{}", id))
}

fn chat_placeholder(snapshot: &SessionSnapshot) -> String {
    match &snapshot.article {
        Some(article) => format!("Ask about '{}'...", article.title),
        None => "Ask me anything...".to_string(),
    }
}

pub async fn index(State(state): State<Arc<AppState>>) -> Redirect {
    let id = state.sessions.create().await;
    back_to(&id.to_string())
}

pub async fn show_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> std::result::Result<Response, ApiError> {
    let shared = match find_session(&state, &id).await {
        Ok(shared) => shared,
        // Expired or unknown sessions start over.
        Err(ApiError(Error::NotFound(_))) => return Ok(Redirect::to("/").into_response()),
        Err(e) => return Err(e),
    };
    let snapshot = shared.lock().await.snapshot();
    let placeholder = chat_placeholder(&snapshot);

    let page = state
        .templates
        .get_template("page.html")
        .and_then(|template| {
            template.render(context! {
                chat_placeholder => placeholder,
                session => snapshot,
                assistant_available => state.controller.assistant_available(),
                missing_key_message => MISSING_KEY_MESSAGE,
            })
        })
        .map_err(|e| Error::External(anyhow::anyhow!("Failed to render page: {}", e)))?;
    Ok(Html(page).into_response())
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> std::result::Result<Json<SessionSnapshot>, ApiError> {
    let shared = find_session(&state, &id).await?;
    let snapshot = shared.lock().await.snapshot();
    Ok(Json(snapshot))
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Form(form): Form<SearchForm>,
) -> std::result::Result<Redirect, ApiError> {
    let shared = find_session(&state, &id).await?;
    let mut session = shared.lock().await;
    state.controller.search(&mut session, &form.query).await;
    Ok(back_to(&id))
}

pub async fn select(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Form(form): Form<SelectForm>,
) -> std::result::Result<Redirect, ApiError> {
    let shared = find_session(&state, &id).await?;
    let mut session = shared.lock().await;
    state.controller.select_candidate(&mut session, &form.title).await?;
    Ok(back_to(&id))
}

pub async fn export(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> std::result::Result<Redirect, ApiError> {
    let shared = find_session(&state, &id).await?;
    let mut session = shared.lock().await;
    state.controller.export(&mut session)?;
    Ok(back_to(&id))
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> std::result::Result<Response, ApiError> {
    let shared = find_session(&state, &id).await?;
    let artifact = {
        let mut session = shared.lock().await;
        state.controller.export(&mut session)?
    };
    let disposition = format!("attachment; filename=\"{}\"", artifact.file_name.replace('"', "'"));
    Ok((
        [
            (header::CONTENT_TYPE, artifact.mime.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response())
}

/// Forwards events to the response stream but holds the terminal one back
/// until the turn has been recorded on the session.
struct ResponseSink {
    tx: mpsc::Sender<AssistantEvent>,
    shared: SharedSession,
    epoch: u64,
    terminal: Option<AssistantEvent>,
}

#[async_trait]
impl FragmentSink for ResponseSink {
    async fn publish(&mut self, event: AssistantEvent) -> Result<()> {
        if event.is_terminal() {
            self.terminal = Some(event);
            return Ok(());
        }
        self.shared.lock().await.record_progress(self.epoch, &event);
        self.tx.publish(event).await
    }
}

fn sse_event(event: &AssistantEvent) -> Event {
    match event {
        AssistantEvent::Started => Event::default().event("started").data("{}"),
        AssistantEvent::Fragment { text, partial } => Event::default()
            .event("fragment")
            .data(json!({ "text": text, "partial": partial }).to_string()),
        AssistantEvent::Completed { text } => Event::default()
            .event("done")
            .data(json!({ "text": text }).to_string()),
        AssistantEvent::Failed { error } => Event::default().event("error").data(error.as_str()),
        AssistantEvent::Cancelled => Event::default().event("cancelled").data("{}"),
    }
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, ApiError> {
    let shared = find_session(&state, &id).await?;
    let pending = {
        let mut session = shared.lock().await;
        state.controller.begin_turn(&mut session, &request.message)?
    };

    let (tx, rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let controller = state.controller.clone();
    let turn_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut sink = ResponseSink {
            tx,
            shared: shared.clone(),
            epoch: pending.epoch(),
            terminal: None,
        };
        let outcome = pending.run(&mut sink, &turn_cancel).await;
        {
            let mut session = shared.lock().await;
            controller.finish_turn(&mut session, pending, &outcome);
        }
        if let Some(event) = sink.terminal.take() {
            let _ = sink.tx.send(event).await;
        }
    });

    // Dropping the response body cancels the turn.
    let guard = cancel.drop_guard();
    let events = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        Some((Ok::<_, Infallible>(sse_event(&event)), (rx, guard)))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
