//! Driving one streamed assistant reply.
//!
//! A reply moves through `Idle → AwaitingFirstFragment → Streaming → Complete`
//! and may end in `Failed` or `Cancelled` instead. Each step is published to a
//! [`FragmentSink`] as an [`AssistantEvent`].

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use cp_core::{ChatModel, Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AssistantEvent {
    Started,
    Fragment { text: String, partial: String },
    Completed { text: String },
    Failed { error: String },
    Cancelled,
}

impl AssistantEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssistantEvent::Completed { .. } | AssistantEvent::Failed { .. } | AssistantEvent::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TurnState {
    #[default]
    Idle,
    AwaitingFirstFragment,
    Streaming { partial: String },
    Complete,
    Failed { error: String },
    Cancelled,
}

impl TurnState {
    pub fn advance(&mut self, event: &AssistantEvent) {
        *self = match event {
            AssistantEvent::Started => TurnState::AwaitingFirstFragment,
            AssistantEvent::Fragment { partial, .. } => TurnState::Streaming { partial: partial.clone() },
            AssistantEvent::Completed { .. } => TurnState::Complete,
            AssistantEvent::Failed { error } => TurnState::Failed { error: error.clone() },
            AssistantEvent::Cancelled => TurnState::Cancelled,
        };
    }

    /// A turn is in flight between `Started` and its terminal event.
    pub fn is_pending(&self) -> bool {
        matches!(self, TurnState::AwaitingFirstFragment | TurnState::Streaming { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Completed(String),
    Failed(String),
    Cancelled,
}

impl ReplyOutcome {
    pub fn state(&self) -> TurnState {
        match self {
            ReplyOutcome::Completed(_) => TurnState::Complete,
            ReplyOutcome::Failed(error) => TurnState::Failed { error: error.clone() },
            ReplyOutcome::Cancelled => TurnState::Cancelled,
        }
    }
}

/// Consumer of reply events. An error means nobody is listening anymore and
/// the reply is abandoned.
#[async_trait]
pub trait FragmentSink: Send {
    async fn publish(&mut self, event: AssistantEvent) -> Result<()>;
}

#[async_trait]
impl FragmentSink for Vec<AssistantEvent> {
    async fn publish(&mut self, event: AssistantEvent) -> Result<()> {
        self.push(event);
        Ok(())
    }
}

#[async_trait]
impl FragmentSink for mpsc::Sender<AssistantEvent> {
    async fn publish(&mut self, event: AssistantEvent) -> Result<()> {
        self.send(event)
            .await
            .map_err(|_| Error::Session("reply listener went away".to_string()))
    }
}

/// Stream one reply from `model` into `sink`, concatenating fragments in
/// arrival order.
pub async fn run_reply<S>(
    model: &dyn ChatModel,
    prompt: &str,
    sink: &mut S,
    cancel: &CancellationToken,
) -> ReplyOutcome
where
    S: FragmentSink + ?Sized,
{
    if sink.publish(AssistantEvent::Started).await.is_err() {
        return ReplyOutcome::Cancelled;
    }

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        opened = model.stream(prompt) => Some(opened),
    };
    let mut stream = match opened {
        None => return cancelled(sink).await,
        Some(Ok(stream)) => stream,
        Some(Err(e)) => return failed(sink, e).await,
    };

    let mut text = String::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled(sink).await,
            next = stream.next() => next,
        };
        match next {
            Some(Ok(fragment)) => {
                if fragment.is_empty() {
                    continue;
                }
                text.push_str(&fragment);
                let event = AssistantEvent::Fragment { text: fragment, partial: text.clone() };
                if sink.publish(event).await.is_err() {
                    tracing::debug!("💬 Reply abandoned by its listener");
                    return ReplyOutcome::Cancelled;
                }
            }
            Some(Err(e)) => return failed(sink, e).await,
            None => break,
        }
    }

    let _ = sink.publish(AssistantEvent::Completed { text: text.clone() }).await;
    ReplyOutcome::Completed(text)
}

async fn cancelled<S: FragmentSink + ?Sized>(sink: &mut S) -> ReplyOutcome {
    let _ = sink.publish(AssistantEvent::Cancelled).await;
    ReplyOutcome::Cancelled
}

async fn failed<S: FragmentSink + ?Sized>(sink: &mut S, error: Error) -> ReplyOutcome {
    tracing::warn!("💥 Assistant reply failed: {}", error);
    let error = error.to_string();
    let _ = sink.publish(AssistantEvent::Failed { error: error.clone() }).await;
    ReplyOutcome::Failed(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dummy::DummyModel;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fragments_concatenate_in_order() {
        let model = DummyModel::with_reply("Light bends near mass.");
        let mut events = Vec::new();
        let outcome = run_reply(&model, "why?", &mut events, &CancellationToken::new()).await;

        assert_eq!(outcome, ReplyOutcome::Completed("Light bends near mass.".to_string()));
        assert_eq!(events.first(), Some(&AssistantEvent::Started));
        assert_eq!(
            events.last(),
            Some(&AssistantEvent::Completed { text: "Light bends near mass.".to_string() })
        );

        let partials: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                AssistantEvent::Fragment { partial, .. } => Some(partial.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(partials, vec!["Light ", "Light bends ", "Light bends near ", "Light bends near mass."]);
    }

    #[tokio::test]
    async fn test_state_machine_follows_events() {
        let mut state = TurnState::default();
        assert!(!state.is_pending());

        state.advance(&AssistantEvent::Started);
        assert_eq!(state, TurnState::AwaitingFirstFragment);
        assert!(state.is_pending());

        state.advance(&AssistantEvent::Fragment { text: "a".to_string(), partial: "a".to_string() });
        assert_eq!(state, TurnState::Streaming { partial: "a".to_string() });

        state.advance(&AssistantEvent::Completed { text: "a".to_string() });
        assert_eq!(state, TurnState::Complete);
        assert!(!state.is_pending());
    }

    #[tokio::test]
    async fn test_stream_error_emits_failed() {
        let model = DummyModel::with_reply("one two three").failing_after(1);
        let mut events = Vec::new();
        let outcome = run_reply(&model, "q", &mut events, &CancellationToken::new()).await;

        assert!(matches!(outcome, ReplyOutcome::Failed(_)));
        assert!(matches!(events.last(), Some(AssistantEvent::Failed { .. })));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_stream() {
        let model = DummyModel::with_reply("slow words that never finish").with_delay(Duration::from_millis(200));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let mut events = Vec::new();
        let outcome = run_reply(&model, "q", &mut events, &cancel).await;
        assert_eq!(outcome, ReplyOutcome::Cancelled);
        assert_eq!(events.last(), Some(&AssistantEvent::Cancelled));
    }

    #[tokio::test]
    async fn test_dropped_listener_abandons_reply() {
        let model = DummyModel::with_reply("nobody hears this");
        let (mut tx, rx) = mpsc::channel(4);
        drop(rx);
        let outcome = run_reply(&model, "q", &mut tx, &CancellationToken::new()).await;
        assert_eq!(outcome, ReplyOutcome::Cancelled);
    }
}
