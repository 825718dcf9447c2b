//! Streaming session controller
//!
//! Owns one model exchange from first chunk to completion or cancellation.
//! Every increment is appended to the session buffer and the whole buffer is
//! re-parsed, because a closing tag may arrive several chunks after its
//! opener. Commands only run once the stream completes.
//!
//! One session is live per controller: starting a new exchange cancels the
//! previous one. Cancellation is observed at the next chunk boundary and
//! before each not-yet-started action, never in the middle of a write.

use crate::parser::parse_response;
use crate::ports::ModelTransport;
use crate::runner::{ArtifactRunner, ProgressSink};
use crate::{
    Artifact, ChatMessage, ModelRequest, OperationProgress, SessionEvent, StreamingResponse,
};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed {
        response: StreamingResponse,
        results: Vec<OperationProgress>,
    },
    Cancelled,
    /// Transport failure; the message is what the user sees
    Failed {
        message: String,
    },
}

/// State of one in-flight exchange
struct StreamingSession {
    id: String,
    buffer: String,
    /// Artifacts already announced to the observer
    announced: HashSet<String>,
    /// Artifacts already handed to the runner
    executed: HashSet<String>,
    cancel: CancellationToken,
}

impl StreamingSession {
    fn new(cancel: CancellationToken) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            buffer: String::new(),
            announced: HashSet::new(),
            executed: HashSet::new(),
            cancel,
        }
    }

    fn snapshot(&self, is_complete: bool) -> StreamingResponse {
        let parsed = parse_response(&self.buffer);
        StreamingResponse {
            content: self.buffer.clone(),
            artifacts: parsed.artifacts,
            actions: parsed.actions,
            is_complete,
        }
    }

    fn newly_closed<'a>(&mut self, artifacts: &'a [Artifact]) -> Vec<&'a Artifact> {
        artifacts
            .iter()
            .filter(|a| self.announced.insert(a.id.clone()))
            .collect()
    }
}

/// Forwards runner progress to the session observer
struct SessionSink<'a> {
    session_id: &'a str,
    events: &'a mpsc::UnboundedSender<SessionEvent>,
}

impl ProgressSink for SessionSink<'_> {
    fn progress(&self, artifact_id: Option<&str>, progress: &OperationProgress) {
        let _ = self.events.send(SessionEvent::Progress {
            session_id: self.session_id.to_string(),
            artifact_id: artifact_id.map(str::to_string),
            progress: progress.clone(),
        });
    }
}

pub struct SessionController {
    transport: Arc<dyn ModelTransport>,
    runner: Arc<ArtifactRunner>,
    system_prompt: String,
    history: Mutex<Vec<ChatMessage>>,
    active: Mutex<Option<(String, CancellationToken)>>,
}

impl SessionController {
    pub fn new(transport: Arc<dyn ModelTransport>, runner: Arc<ArtifactRunner>) -> Self {
        Self {
            transport,
            runner,
            system_prompt: String::new(),
            history: Mutex::new(Vec::new()),
            active: Mutex::new(None),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Completed exchanges so far, oldest first
    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn clear_history(&self) {
        if let Ok(mut history) = self.history.lock() {
            history.clear();
        }
    }

    /// Cancel the live session, if any
    pub fn cancel(&self) {
        if let Ok(active) = self.active.lock() {
            if let Some((id, token)) = active.as_ref() {
                info!("Cancelling session {}", id);
                token.cancel();
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().map(|a| a.is_some()).unwrap_or(false)
    }

    /// Install a new live session, cancelling the one it supersedes
    fn begin(&self) -> StreamingSession {
        let session = StreamingSession::new(CancellationToken::new());
        if let Ok(mut active) = self.active.lock() {
            if let Some((old_id, old_token)) = active.take() {
                info!("Session {} superseded by {}", old_id, session.id);
                old_token.cancel();
            }
            *active = Some((session.id.clone(), session.cancel.clone()));
        }
        session
    }

    fn end(&self, session: &StreamingSession) {
        if let Ok(mut active) = self.active.lock() {
            if active.as_ref().map(|(id, _)| id == &session.id).unwrap_or(false) {
                *active = None;
            }
        }
    }

    /// Run one exchange to its end, reporting to `events` along the way
    pub async fn run(
        &self,
        user_message: impl Into<String>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> SessionOutcome {
        let user_message = user_message.into();
        let mut session = self.begin();
        let outcome = self.drive(&mut session, &user_message, &events).await;
        self.end(&session);

        match &outcome {
            SessionOutcome::Completed { response, .. } => {
                if let Ok(mut history) = self.history.lock() {
                    history.push(ChatMessage::user(user_message));
                    history.push(ChatMessage::assistant(response.content.clone()));
                }
                let _ = events.send(SessionEvent::Finished {
                    session_id: session.id.clone(),
                });
            }
            SessionOutcome::Cancelled => {
                info!("Session {} cancelled", session.id);
                let _ = events.send(SessionEvent::Cancelled {
                    session_id: session.id.clone(),
                });
            }
            SessionOutcome::Failed { message } => {
                let _ = events.send(SessionEvent::Error {
                    session_id: session.id.clone(),
                    message: message.clone(),
                });
            }
        }
        outcome
    }

    async fn drive(
        &self,
        session: &mut StreamingSession,
        user_message: &str,
        events: &mpsc::UnboundedSender<SessionEvent>,
    ) -> SessionOutcome {
        let _ = events.send(SessionEvent::Started {
            session_id: session.id.clone(),
        });

        let request = ModelRequest {
            system_prompt: self.system_prompt.clone(),
            history: self.history(),
            user_message: user_message.to_string(),
        };

        let mut stream = match self.transport.stream(request, session.cancel.clone()).await {
            Ok(stream) => stream,
            Err(e) if e.is_aborted() || session.cancel.is_cancelled() => {
                return SessionOutcome::Cancelled
            }
            Err(e) => {
                error!("Model transport failed: {}", e);
                return SessionOutcome::Failed {
                    message: e.to_string(),
                };
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = session.cancel.cancelled() => return SessionOutcome::Cancelled,
                next = stream.next() => next,
            };

            match next {
                None => break,
                Some(Ok(chunk)) => {
                    session.buffer.push_str(&chunk);
                    let snapshot = session.snapshot(false);
                    debug!(
                        "Session {}: {} bytes, {} artifacts, {} actions",
                        session.id,
                        session.buffer.len(),
                        snapshot.artifacts.len(),
                        snapshot.actions.len()
                    );
                    for artifact in session.newly_closed(&snapshot.artifacts) {
                        let _ = events.send(SessionEvent::ArtifactClosed {
                            session_id: session.id.clone(),
                            artifact_id: artifact.id.clone(),
                            title: artifact.title.clone(),
                        });
                    }
                    let _ = events.send(SessionEvent::Snapshot {
                        session_id: session.id.clone(),
                        response: snapshot,
                    });
                }
                Some(Err(e)) if e.is_aborted() => return SessionOutcome::Cancelled,
                Some(Err(e)) => {
                    error!("Model stream failed: {}", e);
                    return SessionOutcome::Failed {
                        message: e.to_string(),
                    };
                }
            }

            if session.cancel.is_cancelled() {
                return SessionOutcome::Cancelled;
            }
        }

        let response = session.snapshot(true);
        let _ = events.send(SessionEvent::Snapshot {
            session_id: session.id.clone(),
            response: response.clone(),
        });

        let results = self.execute(session, &response, events).await;
        if session.cancel.is_cancelled() {
            return SessionOutcome::Cancelled;
        }
        SessionOutcome::Completed { response, results }
    }

    async fn execute(
        &self,
        session: &mut StreamingSession,
        response: &StreamingResponse,
        events: &mpsc::UnboundedSender<SessionEvent>,
    ) -> Vec<OperationProgress> {
        let sink = SessionSink {
            session_id: &session.id,
            events,
        };
        let mut results = Vec::new();

        for artifact in &response.artifacts {
            if !session.executed.insert(artifact.id.clone()) {
                debug!("Artifact {} already executed, skipping", artifact.id);
                continue;
            }
            if session.cancel.is_cancelled() {
                break;
            }
            results.extend(
                self.runner
                    .run_artifact(artifact, &sink, &session.cancel)
                    .await,
            );
        }

        if !response.actions.is_empty() && !session.cancel.is_cancelled() {
            results.extend(
                self.runner
                    .run_actions(&response.actions, &sink, &session.cancel)
                    .await,
            );
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::HeadlessEditor;
    use crate::executor::ActionExecutor;
    use crate::ports::{ChunkStream, ModelTransport, WorkspaceStorage};
    use crate::storage::MemoryStorage;
    use crate::{AutocodeError, ChatRole, OperationStatus, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;

    type ChunkSender = mpsc::UnboundedSender<Result<String>>;

    /// Hands out one pre-wired channel per request
    #[derive(Default)]
    struct ChannelTransport {
        streams: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<String>>>>,
        requests: Mutex<Vec<ModelRequest>>,
    }

    impl ChannelTransport {
        fn channel(&self) -> ChunkSender {
            let (tx, rx) = mpsc::unbounded_channel();
            self.streams.lock().unwrap().push_back(rx);
            tx
        }

        fn scripted(&self, chunks: &[&str]) {
            let tx = self.channel();
            for chunk in chunks {
                tx.send(Ok(chunk.to_string())).unwrap();
            }
        }
    }

    #[async_trait]
    impl ModelTransport for ChannelTransport {
        async fn stream(
            &self,
            request: ModelRequest,
            _cancel: CancellationToken,
        ) -> Result<ChunkStream> {
            self.requests.lock().unwrap().push(request);
            let rx = self
                .streams
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AutocodeError::Transport("connection refused".into()))?;
            Ok(futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed())
        }
    }

    fn controller(transport: Arc<ChannelTransport>, storage: &MemoryStorage) -> SessionController {
        let executor = ActionExecutor::new(
            "ws",
            Arc::new(storage.clone()),
            Arc::new(HeadlessEditor::new()),
        );
        let runner = ArtifactRunner::new(Arc::new(executor));
        SessionController::new(transport, Arc::new(runner))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn snapshots(events: &[SessionEvent]) -> Vec<StreamingResponse> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Snapshot { response, .. } => Some(response.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_action_appears_once_closing_tag_arrives() {
        let transport = Arc::new(ChannelTransport::default());
        transport.scripted(&[r#"<autoAction type="file" filePath="a.ts">"#, "hello</autoAction>"]);
        let storage = MemoryStorage::new();
        let controller = controller(transport.clone(), &storage);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = controller.run("make a.ts", tx).await;

        let events = drain(&mut rx);
        let snaps = snapshots(&events);
        assert_eq!(snaps.len(), 3);
        assert!(snaps[0].actions.is_empty());
        assert_eq!(snaps[1].actions.len(), 1);
        assert_eq!(snaps[1].actions[0].path(), Some("a.ts"));
        assert_eq!(snaps[1].actions[0].content(), Some("hello"));
        assert!(!snaps[1].is_complete);
        assert!(snaps[2].is_complete);

        match outcome {
            SessionOutcome::Completed { results, .. } => {
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].status, OperationStatus::Completed);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(storage.get("a.ts").as_deref(), Some("hello"));
        assert!(matches!(events.last(), Some(SessionEvent::Finished { .. })));
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn test_artifact_announced_and_run_once() {
        let transport = Arc::new(ChannelTransport::default());
        transport.scripted(&[
            r#"Here you go <autoArtifact id="x" title="X">"#,
            r#"<autoAction type="file" filePath="one.txt">1</autoAction>"#,
            "</autoArtifact> and some trailing prose",
            " that keeps streaming.",
        ]);
        let storage = MemoryStorage::new();
        let controller = controller(transport, &storage);
        let (tx, mut rx) = mpsc::unbounded_channel();

        controller.run("go", tx).await;

        let events = drain(&mut rx);
        let closed = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::ArtifactClosed { .. }))
            .count();
        assert_eq!(closed, 1);

        let progress: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Progress {
                    artifact_id,
                    progress,
                    ..
                } => Some((artifact_id.clone(), progress.status)),
                _ => None,
            })
            .collect();
        assert_eq!(
            progress,
            vec![
                (Some("x".to_string()), OperationStatus::Running),
                (Some("x".to_string()), OperationStatus::Completed),
            ]
        );
        assert_eq!(storage.get("one.txt").as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_truncated_artifact_is_never_applied() {
        let transport = Arc::new(ChannelTransport::default());
        transport.scripted(&[
            r#"<autoArtifact id="x" title="X"><autoAction type="file" filePath="a.ts">a</autoAction>"#,
            r#"<autoAction type="delete" filePath="b.ts"></autoAction>"#,
        ]);
        let storage = MemoryStorage::new();
        storage.write("b.ts", "keep").await.unwrap();
        let controller = controller(transport, &storage);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = controller.run("go", tx).await;

        let snaps = snapshots(&drain(&mut rx));
        assert!(snaps
            .iter()
            .all(|s| s.artifacts.is_empty() && s.actions.is_empty()));
        match outcome {
            SessionOutcome::Completed { results, .. } => assert!(results.is_empty()),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(storage.get("a.ts").is_none());
        assert_eq!(storage.get("b.ts").as_deref(), Some("keep"));
    }

    #[tokio::test]
    async fn test_history_carries_into_next_request() {
        let transport = Arc::new(ChannelTransport::default());
        transport.scripted(&["first answer"]);
        transport.scripted(&["second answer"]);
        let controller =
            controller(transport.clone(), &MemoryStorage::new()).with_system_prompt("be terse");

        controller.run("q1", mpsc::unbounded_channel().0).await;
        controller.run("q2", mpsc::unbounded_channel().0).await;

        let requests = transport.requests.lock().unwrap().clone();
        assert_eq!(requests[0].history.len(), 0);
        assert_eq!(requests[1].system_prompt, "be terse");
        assert_eq!(requests[1].history.len(), 2);
        assert_eq!(requests[1].history[0].role, ChatRole::User);
        assert_eq!(requests[1].history[1].content, "first answer");
        assert_eq!(controller.history().len(), 4);
    }

    #[tokio::test]
    async fn test_transport_error_is_reported_and_nothing_runs() {
        let transport = Arc::new(ChannelTransport::default());
        let tx_chunks = transport.channel();
        tx_chunks
            .send(Ok(r#"<autoAction type="file" filePath="a.ts">x</autoAction>"#.into()))
            .unwrap();
        tx_chunks
            .send(Err(AutocodeError::Transport("401 unauthorized".into())))
            .unwrap();
        let storage = MemoryStorage::new();
        let controller = controller(transport, &storage);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = controller.run("go", tx).await;

        assert!(matches!(
            outcome,
            SessionOutcome::Failed { ref message } if message.contains("401")
        ));
        assert!(matches!(drain(&mut rx).last(), Some(SessionEvent::Error { .. })));
        assert_eq!(storage.file_count(), 0);
        assert!(controller.history().is_empty());
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let controller = controller(Arc::new(ChannelTransport::default()), &MemoryStorage::new());
        let outcome = controller.run("go", mpsc::unbounded_channel().0).await;
        assert!(matches!(outcome, SessionOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_cancel_discards_pending_commands() {
        let transport = Arc::new(ChannelTransport::default());
        let tx_chunks = transport.channel();
        let storage = MemoryStorage::new();
        let controller = Arc::new(controller(transport, &storage));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let task = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.run("go", tx).await })
        };

        tx_chunks
            .send(Ok(r#"<autoAction type="file" filePath="a.ts">x</autoAction>"#.into()))
            .unwrap();
        // Wait for the chunk to be parsed before cancelling
        while !matches!(rx.recv().await, Some(SessionEvent::Snapshot { .. })) {}
        controller.cancel();

        assert_eq!(task.await.unwrap(), SessionOutcome::Cancelled);
        assert_eq!(storage.file_count(), 0);
        assert!(controller.history().is_empty());
    }

    #[tokio::test]
    async fn test_new_session_supersedes_previous() {
        let transport = Arc::new(ChannelTransport::default());
        let _first_chunks = transport.channel();
        transport.scripted(&["done"]);
        let controller = Arc::new(controller(transport, &MemoryStorage::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.run("slow", tx).await })
        };
        while !matches!(rx.recv().await, Some(SessionEvent::Started { .. })) {}

        let second = controller.run("fast", mpsc::unbounded_channel().0).await;

        assert_eq!(first.await.unwrap(), SessionOutcome::Cancelled);
        assert!(matches!(second, SessionOutcome::Completed { .. }));
        assert_eq!(controller.history().len(), 2);
    }
}
