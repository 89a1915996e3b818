//! Latency bound for generation calls.

use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::warn;

use super::{Generator, Prompt};
use crate::error::GenerationError;

/// Runs the wrapped generator on a blocking task and gives up after `limit`.
///
/// A call that times out keeps running in the background; its result is
/// dropped.
pub struct TimeoutGenerator {
    inner: Arc<dyn Generator>,
    limit: Duration,
    runtime: Option<Runtime>,
}

impl TimeoutGenerator {
    pub fn new(inner: Arc<dyn Generator>, limit: Duration) -> Result<Self, GenerationError> {
        let runtime = Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| GenerationError::Unavailable(format!("runtime: {}", e)))?;
        Ok(Self {
            inner,
            limit,
            runtime: Some(runtime),
        })
    }
}

impl Generator for TimeoutGenerator {
    fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| GenerationError::Unavailable("runtime shut down".into()))?;
        let inner = Arc::clone(&self.inner);
        let owned = prompt.clone();
        let limit = self.limit;

        runtime.block_on(async move {
            let task = tokio::task::spawn_blocking(move || inner.generate(&owned));
            match tokio::time::timeout(limit, task).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_error)) => Err(GenerationError::Unavailable(join_error.to_string())),
                Err(_) => {
                    warn!("{:?} generation exceeded {:?}", prompt.kind, limit);
                    Err(GenerationError::Timeout {
                        millis: limit.as_millis() as u64,
                    })
                }
            }
        })
    }
}

impl Drop for TimeoutGenerator {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{OfflineGenerator, PromptKind};

    struct Sleepy(Duration);

    impl Generator for Sleepy {
        fn generate(&self, _prompt: &Prompt) -> Result<String, GenerationError> {
            std::thread::sleep(self.0);
            Ok("late".into())
        }
    }

    #[test]
    fn test_fast_generator_passes_through() {
        let gen = TimeoutGenerator::new(Arc::new(OfflineGenerator::new()), Duration::from_secs(5)).unwrap();
        let prompt = Prompt::new(PromptKind::DecideToReact, "x");
        assert_eq!(gen.generate(&prompt).unwrap(), "continue");
    }

    #[test]
    fn test_slow_generator_times_out() {
        let gen = TimeoutGenerator::new(
            Arc::new(Sleepy(Duration::from_millis(500))),
            Duration::from_millis(20),
        )
        .unwrap();
        let err = gen.generate(&Prompt::new(PromptKind::Utterance, "x")).unwrap_err();
        assert_eq!(err, GenerationError::Timeout { millis: 20 });
    }
}
