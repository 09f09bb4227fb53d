use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use cp_core::Result;
use cp_session::SessionStore;

pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

pub async fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/", get(handlers::index))
        .route("/sessions/:id", get(handlers::show_session))
        .route("/sessions/:id/search", post(handlers::search))
        .route("/sessions/:id/select", post(handlers::select))
        .route("/sessions/:id/export", post(handlers::export))
        .route("/sessions/:id/export.pdf", get(handlers::download))
        .route("/sessions/:id/chat", post(handlers::chat))
        .route("/api/sessions/:id", get(handlers::get_session))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Periodically drop sessions idle for longer than `max_idle`.
pub fn spawn_session_reaper(sessions: Arc<SessionStore>, max_idle: Duration) -> tokio::task::JoinHandle<()> {
    let period = (max_idle / 4).max(Duration::from_secs(1));
    let max_idle = chrono::Duration::from_std(max_idle).unwrap_or_else(|_| chrono::Duration::hours(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            sessions.prune_idle(max_idle).await;
        }
    })
}

/// Bind `addr` and serve the app until the process exits.
pub async fn serve(addr: &str, state: AppState, max_idle: Duration) -> Result<()> {
    let reaper = spawn_session_reaper(state.sessions.clone(), max_idle);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("🌐 ChronoPedia listening on http://{}", listener.local_addr()?);

    let app = create_app(state).await;
    let served = axum::serve(listener, app).await;
    reaper.abort();
    Ok(served?)
}

pub mod prelude {
    pub use cp_core::{Article, Error, Result};
    pub use crate::AppState;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use cp_core::{Article, ChatModel};
    use cp_export::PdfRenderer;
    use cp_inference::models::DummyModel;
    use cp_inference::MISSING_KEY_MESSAGE;
    use cp_lookup::ScriptedLookup;
    use cp_session::{ControllerConfig, SessionController, SessionId};
    use futures_util::StreamExt;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    struct TestApp {
        app: Router,
        sessions: Arc<SessionStore>,
    }

    async fn test_app(model: Option<DummyModel>) -> TestApp {
        let lookup = ScriptedLookup::new()
            .with_article(
                "relativity",
                Article::new(
                    "General relativity",
                    "General relativity is the geometric theory of gravitation published by Albert Einstein in 1915.",
                    "https://en.wikipedia.org/wiki/General_relativity",
                ),
            )
            .with_candidates("mercury", &["Mercury (planet)", "Mercury (element)"])
            .with_article(
                "Mercury (planet)",
                Article::new("Mercury (planet)", "Mercury is the first planet from the Sun.", "https://en.wikipedia.org/wiki/Mercury_(planet)"),
            );
        let model = model.map(|m| Arc::new(m) as Arc<dyn ChatModel>);
        let controller = SessionController::new(
            Arc::new(lookup),
            Arc::new(PdfRenderer::new()),
            model,
            ControllerConfig::default(),
        );
        let sessions = Arc::new(SessionStore::new());
        let state = AppState::new(Arc::new(controller), sessions.clone()).unwrap();
        TestApp { app: create_app(state).await, sessions }
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    fn form(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn chat(id: &SessionId, message: &str) -> Request<Body> {
        Request::post(format!("/sessions/{}/chat", id))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::json!({ "message": message }).to_string()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    async fn snapshot(app: &Router, id: &SessionId) -> Value {
        let response = send(app, Request::get(format!("/api/sessions/{}", id)).body(Body::empty()).unwrap()).await;
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    /// Read the event stream until `marker` shows up, leaving the rest unread.
    async fn read_until(body: &mut axum::body::BodyDataStream, marker: &str) -> String {
        let mut seen = String::new();
        while !seen.contains(marker) {
            let chunk = body.next().await.expect("stream ended early").unwrap();
            seen.push_str(&String::from_utf8_lossy(&chunk));
        }
        seen
    }

    async fn page(app: &Router, id: &SessionId) -> String {
        let response = send(app, Request::get(format!("/sessions/{}", id)).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        body_text(response).await
    }

    #[tokio::test]
    async fn test_index_creates_session_and_redirects() {
        let t = test_app(Some(DummyModel::new())).await;
        let response = send(&t.app, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
        assert!(location.starts_with("/sessions/"));
        assert_eq!(t.sessions.len().await, 1);

        let html = body_text(send(&t.app, Request::get(location).body(Body::empty()).unwrap()).await).await;
        assert!(html.contains("Awaiting your query"));
        assert!(html.contains("Retrieve an article to enable PDF export."));
    }

    #[tokio::test]
    async fn test_unknown_session_page_starts_over() {
        let t = test_app(Some(DummyModel::new())).await;
        let response = send(&t.app, Request::get(format!("/sessions/{}", SessionId::new())).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");

        let response = send(&t.app, Request::get("/api/sessions/garbage").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_search_export_and_download() {
        let t = test_app(Some(DummyModel::new())).await;
        let id = t.sessions.create().await;

        let response = send(&t.app, form(&format!("/sessions/{}/search", id), "query=relativity")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let html = page(&t.app, &id).await;
        assert!(html.contains("Data Stream: General relativity"));
        assert!(html.contains("Generate PDF Report"));
        assert!(!html.contains("Download Report"));

        let response = send(&t.app, Request::post(format!("/sessions/{}/export", id)).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(page(&t.app, &id).await.contains("Download Report"));

        let response = send(&t.app, Request::get(format!("/sessions/{}/export.pdf", id)).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"General_relativity_Report.pdf\""
        );
        assert!(body_text(response).await.starts_with("%PDF"));
    }

    #[tokio::test]
    async fn test_export_without_article_conflicts() {
        let t = test_app(Some(DummyModel::new())).await;
        let id = t.sessions.create().await;
        let response = send(&t.app, Request::get(format!("/sessions/{}/export.pdf", id)).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_ambiguous_search_offers_candidates() {
        let t = test_app(Some(DummyModel::new())).await;
        let id = t.sessions.create().await;

        send(&t.app, form(&format!("/sessions/{}/search", id), "query=mercury")).await;
        let html = page(&t.app, &id).await;
        assert!(html.contains("Ambiguity Detected"));
        assert!(html.contains("Mercury (element)"));

        let response = send(&t.app, form(&format!("/sessions/{}/select", id), "title=Venus")).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(&t.app, form(&format!("/sessions/{}/select", id), "title=Mercury+%28planet%29")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let html = page(&t.app, &id).await;
        assert!(html.contains("Data Stream: Mercury (planet)"));
        assert!(!html.contains("Ambiguity Detected"));
    }

    #[tokio::test]
    async fn test_not_found_message() {
        let t = test_app(Some(DummyModel::new())).await;
        let id = t.sessions.create().await;
        send(&t.app, form(&format!("/sessions/{}/search", id), "query=nothing")).await;
        let html = page(&t.app, &id).await;
        assert!(html.contains("Archive Error: No data found for query 'nothing'."));
    }

    #[tokio::test]
    async fn test_chat_streams_and_records_transcript() {
        let t = test_app(Some(DummyModel::new())).await;
        let id = t.sessions.create().await;

        let response = send(&t.app, chat(&id, "Hello")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/event-stream"));
        let body = body_text(response).await;
        assert!(body.contains("event: fragment"));
        assert!(body.contains("event: done"));
        assert!(body.contains("You said: Hello"));

        let response = send(&t.app, Request::get(format!("/api/sessions/{}", id)).body(Body::empty()).unwrap()).await;
        let snapshot: Value = serde_json::from_str(&body_text(response).await).unwrap();
        let transcript = snapshot["transcript"].as_array().unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0]["role"], "user");
        assert_eq!(transcript[1]["text"], "You said: Hello");
        assert_eq!(snapshot["turn"]["state"], "complete");
    }

    #[tokio::test]
    async fn test_chat_without_credential_is_unavailable() {
        let t = test_app(None).await;
        let id = t.sessions.create().await;

        assert!(page(&t.app, &id).await.contains(MISSING_KEY_MESSAGE));

        let response = send(&t.app, chat(&id, "Hello")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let error: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(error["error"], MISSING_KEY_MESSAGE);
    }

    #[tokio::test]
    async fn test_empty_chat_message_is_rejected() {
        let t = test_app(Some(DummyModel::new())).await;
        let id = t.sessions.create().await;
        let response = send(&t.app, chat(&id, "   ")).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_session_reports_streaming_mid_reply() {
        let model = DummyModel::with_reply("one two three four").with_delay(Duration::from_millis(150));
        let t = test_app(Some(model)).await;
        let id = t.sessions.create().await;

        let response = send(&t.app, chat(&id, "Count")).await;
        let mut body = response.into_body().into_data_stream();
        read_until(&mut body, "event: fragment").await;

        let state = snapshot(&t.app, &id).await;
        assert_eq!(state["turn"]["state"], "streaming");
        assert_eq!(state["turn"]["partial"], "one ");
        assert_eq!(state["pending_message"], "Count");

        let rest = read_until(&mut body, "event: done").await;
        assert!(rest.contains("one two three four"));
        assert_eq!(snapshot(&t.app, &id).await["turn"]["state"], "complete");
    }

    #[tokio::test]
    async fn test_disconnect_cancels_reply() {
        let model = DummyModel::with_reply("one two three four").with_delay(Duration::from_millis(150));
        let t = test_app(Some(model)).await;
        let id = t.sessions.create().await;

        let response = send(&t.app, chat(&id, "Count")).await;
        let mut body = response.into_body().into_data_stream();
        read_until(&mut body, "event: fragment").await;
        drop(body);

        let mut state = snapshot(&t.app, &id).await;
        for _ in 0..40 {
            if state["turn"]["state"] == "cancelled" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            state = snapshot(&t.app, &id).await;
        }
        assert_eq!(state["turn"]["state"], "cancelled");
        assert!(state["transcript"].as_array().unwrap().is_empty());
        assert!(state["pending_message"].is_null());
    }

    #[tokio::test]
    async fn test_model_failure_sends_error_event() {
        let model = DummyModel::with_reply("partial answer here").failing_after(1);
        let t = test_app(Some(model)).await;
        let id = t.sessions.create().await;

        let body = body_text(send(&t.app, chat(&id, "Explain")).await).await;
        assert!(body.contains("event: fragment"));
        assert!(body.contains("event: error"));
        assert!(!body.contains("event: done"));

        let state = snapshot(&t.app, &id).await;
        assert_eq!(state["turn"]["state"], "failed");
        assert!(state["transcript"].as_array().unwrap().is_empty());
    }
}
