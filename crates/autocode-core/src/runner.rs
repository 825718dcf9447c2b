//! Sequential, fail-fast execution of command batches
//!
//! Actions run strictly in order. The first failure stops the batch; actions
//! already applied stay applied (no rollback). Cancellation is checked before
//! each action, so a write in flight always runs to completion.

use crate::executor::ActionExecutor;
use crate::{Artifact, Command, OperationProgress};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Receives every progress transition as it happens
pub trait ProgressSink: Send + Sync {
    fn progress(&self, artifact_id: Option<&str>, progress: &OperationProgress);
}

/// Sink that drops progress updates
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn progress(&self, _artifact_id: Option<&str>, _progress: &OperationProgress) {}
}

pub struct ArtifactRunner {
    executor: Arc<ActionExecutor>,
    action_delay: Duration,
}

impl ArtifactRunner {
    pub fn new(executor: Arc<ActionExecutor>) -> Self {
        Self {
            executor,
            action_delay: Duration::ZERO,
        }
    }

    /// Pause between actions to go easy on the storage backend
    pub fn with_action_delay(mut self, delay: Duration) -> Self {
        self.action_delay = delay;
        self
    }

    pub fn executor(&self) -> &Arc<ActionExecutor> {
        &self.executor
    }

    /// Run every action of one artifact. Returns final states only, in order.
    pub async fn run_artifact(
        &self,
        artifact: &Artifact,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Vec<OperationProgress> {
        info!(
            "Running artifact '{}' ({} actions)",
            artifact.id,
            artifact.actions.len()
        );
        self.run_sequence(Some(&artifact.id), &artifact.actions, sink, cancel)
            .await
    }

    /// Run standalone actions as one implicit batch
    pub async fn run_actions(
        &self,
        actions: &[Command],
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Vec<OperationProgress> {
        info!("Running {} standalone actions", actions.len());
        self.run_sequence(None, actions, sink, cancel).await
    }

    async fn run_sequence(
        &self,
        artifact_id: Option<&str>,
        actions: &[Command],
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Vec<OperationProgress> {
        let mut results = Vec::with_capacity(actions.len());

        for (idx, command) in actions.iter().enumerate() {
            if idx > 0 && !self.action_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.action_delay) => {}
                }
            }
            if cancel.is_cancelled() {
                info!(
                    "Cancelled, skipping {} remaining actions",
                    actions.len() - idx
                );
                break;
            }

            let mut progress = OperationProgress::new(command);
            progress.start();
            sink.progress(artifact_id, &progress);

            self.executor.execute(command).await.finish(&mut progress);
            sink.progress(artifact_id, &progress);

            let failed = progress.is_failed();
            results.push(progress);
            if failed {
                warn!(
                    "Action {} of {} failed, halting batch",
                    idx + 1,
                    actions.len()
                );
                break;
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::HeadlessEditor;
    use crate::storage::MemoryStorage;
    use crate::OperationStatus;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<(Option<String>, OperationStatus)>>,
    }

    impl ProgressSink for RecordingSink {
        fn progress(&self, artifact_id: Option<&str>, progress: &OperationProgress) {
            self.seen
                .lock()
                .unwrap()
                .push((artifact_id.map(str::to_string), progress.status));
        }
    }

    fn runner(storage: &MemoryStorage) -> ArtifactRunner {
        let executor = ActionExecutor::new(
            "ws",
            Arc::new(storage.clone()),
            Arc::new(HeadlessEditor::new()),
        );
        ArtifactRunner::new(Arc::new(executor))
    }

    #[tokio::test]
    async fn test_fail_fast_stops_before_later_actions() {
        let storage = MemoryStorage::new();
        let artifact = Artifact::new(
            "a1",
            "Three files",
            vec![
                Command::create_file("A.ts", "a"),
                Command::create_file("../B.ts", "b"),
                Command::create_file("C.ts", "c"),
            ],
        );
        let sink = RecordingSink::default();

        let results = runner(&storage)
            .run_artifact(&artifact, &sink, &CancellationToken::new())
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, OperationStatus::Completed);
        assert_eq!(results[1].status, OperationStatus::Failed);
        assert!(results[1].error.is_some());
        assert_eq!(storage.get("A.ts").as_deref(), Some("a"));
        assert!(storage.get("C.ts").is_none());

        let seen = sink.seen.lock().unwrap().clone();
        assert_eq!(
            seen.iter().map(|(_, s)| *s).collect::<Vec<_>>(),
            vec![
                OperationStatus::Running,
                OperationStatus::Completed,
                OperationStatus::Running,
                OperationStatus::Failed,
            ]
        );
        assert!(seen.iter().all(|(id, _)| id.as_deref() == Some("a1")));
    }

    #[tokio::test]
    async fn test_cancelled_batch_starts_nothing() {
        let storage = MemoryStorage::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = runner(&storage)
            .run_actions(&[Command::create_file("x.ts", "x")], &NoProgress, &cancel)
            .await;

        assert!(results.is_empty());
        assert_eq!(storage.file_count(), 0);
    }

    #[tokio::test]
    async fn test_standalone_batch_in_order_with_delay() {
        let storage = MemoryStorage::new();
        let runner = runner(&storage).with_action_delay(Duration::from_millis(1));
        let actions = vec![
            Command::create_file("notes.md", "v1"),
            Command::edit_file("notes.md", "v2"),
            Command::run_shell("npm test"),
        ];

        let results = runner
            .run_actions(&actions, &NoProgress, &CancellationToken::new())
            .await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|p| p.status == OperationStatus::Completed));
        assert_eq!(storage.get("notes.md").as_deref(), Some("v2"));
        assert_eq!(runner.executor().shell_intents(), vec!["npm test".to_string()]);
    }
}
