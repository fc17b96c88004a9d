use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use scrap_common::scrap::Scrap;
use tracing::{error, info};

use crate::error::StageError;

/// A pluggable unit of processing. The worker knows nothing about what a stage
/// does: it asks every registered stage whether it wants the scrap and runs the
/// ones that do, concurrently.
///
/// Stages must tolerate seeing the same scrap more than once, as delivery is at-least-once.
#[async_trait]
pub trait ProcessorStage: Send + Sync {
    fn name(&self) -> &str;

    fn can_process(&self, scrap: &Scrap) -> bool;

    async fn process(&self, scrap: &Scrap) -> Result<(), StageError>;
}

/// The ordered set of stages wired in at start-up.
#[derive(Clone, Default)]
pub struct StageRegistry {
    stages: Vec<Arc<dyn ProcessorStage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: impl ProcessorStage + 'static) -> Self {
        self.register(Arc::new(stage));
        self
    }

    pub fn register(&mut self, stage: Arc<dyn ProcessorStage>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn applicable(&self, scrap: &Scrap) -> Vec<&Arc<dyn ProcessorStage>> {
        self.stages
            .iter()
            .filter(|stage| stage.can_process(scrap))
            .collect()
    }

    /// Run every applicable stage concurrently and wait for all of them. Returns the
    /// number of stages that ran, or the first failure in registration order.
    pub async fn run(&self, scrap: &Scrap) -> Result<usize, StageError> {
        let stages = self.applicable(scrap);
        let results = join_all(stages.iter().map(|stage| stage.process(scrap))).await;

        let mut failures = results.into_iter().filter_map(Result::err);
        let Some(first) = failures.next() else {
            return Ok(stages.len());
        };

        for other in failures {
            error!(
                scrap_id = scrap.id,
                hash = scrap.hash,
                stage = other.stage,
                "additional stage failure: {}",
                other.message
            );
        }

        Err(first)
    }
}

/// Logs every scrap whose payload has been resolved to a local file.
pub struct LogStage;

#[async_trait]
impl ProcessorStage for LogStage {
    fn name(&self) -> &str {
        "log"
    }

    fn can_process(&self, scrap: &Scrap) -> bool {
        scrap.file_path.is_some()
    }

    async fn process(&self, scrap: &Scrap) -> Result<(), StageError> {
        let Some(path) = &scrap.file_path else {
            return Err(StageError::new(self.name(), "scrap has no local file"));
        };

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| StageError::new(self.name(), e))?;

        info!(
            scrap_id = scrap.id,
            hash = scrap.hash,
            path = %path.display(),
            bytes = metadata.len(),
            "scrap payload available"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStage {
        name: &'static str,
        accepts: bool,
        fails: bool,
        calls: Arc<AtomicUsize>,
    }

    impl CountingStage {
        fn new(name: &'static str, accepts: bool, fails: bool) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let stage = Self {
                name,
                accepts,
                fails,
                calls: calls.clone(),
            };
            (stage, calls)
        }
    }

    #[async_trait]
    impl ProcessorStage for CountingStage {
        fn name(&self) -> &str {
            self.name
        }

        fn can_process(&self, _: &Scrap) -> bool {
            self.accepts
        }

        async fn process(&self, _: &Scrap) -> Result<(), StageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fails {
                Err(StageError::new(self.name, "boom"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn only_applicable_stages_run() {
        let (indexer, indexer_calls) = CountingStage::new("indexer", true, false);
        let (skipped, skipped_calls) = CountingStage::new("skipped", false, false);
        let registry = StageRegistry::new().with_stage(indexer).with_stage(skipped);

        let ran = registry.run(&Scrap::new("1", "h")).await.unwrap();

        assert_eq!(ran, 1);
        assert_eq!(indexer_calls.load(Ordering::SeqCst), 1);
        assert_eq!(skipped_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn a_failure_still_waits_for_every_stage() {
        let (broken, broken_calls) = CountingStage::new("broken", true, true);
        let (healthy, healthy_calls) = CountingStage::new("healthy", true, false);
        let registry = StageRegistry::new().with_stage(broken).with_stage(healthy);

        let error = registry.run(&Scrap::new("1", "h")).await.unwrap_err();

        assert_eq!(error, StageError::new("broken", "boom"));
        assert_eq!(broken_calls.load(Ordering::SeqCst), 1);
        assert_eq!(healthy_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_stages_is_not_an_error() {
        assert_eq!(StageRegistry::new().run(&Scrap::new("1", "h")).await, Ok(0));
    }

    #[tokio::test]
    async fn log_stage_needs_a_resolved_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut scrap = Scrap::new("1", "h");
        assert!(!LogStage.can_process(&scrap));

        scrap.file_path = Some(file.path().to_path_buf());
        assert!(LogStage.can_process(&scrap));
        assert!(LogStage.process(&scrap).await.is_ok());
    }
}
