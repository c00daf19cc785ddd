//! Batched embedding computation with bounded retries.
//!
//! The batcher owns batching and retry policy; the provider performs one
//! API call per batch. The orchestrator drives batch by batch so it can
//! persist `embedded_chunks` after every successful batch, and the
//! concatenation of batch outputs preserves input order.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use onegraph_domain::error::{Error, Result};
use onegraph_domain::ports::EmbeddingProvider;

/// Batched, retrying front of an [`EmbeddingProvider`].
pub struct EmbeddingBatcher {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    max_attempts: usize,
    backoff: f64,
}

impl EmbeddingBatcher {
    /// Create a batcher with explicit batch/retry parameters.
    #[must_use]
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
        max_attempts: usize,
        backoff: f64,
    ) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// The configured batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Split texts into provider-sized batches, preserving order.
    #[must_use]
    pub fn batches<'a>(&self, texts: &'a [String]) -> std::slice::Chunks<'a, String> {
        texts.chunks(self.batch_size)
    }

    /// Embed one batch, retrying transient failures with linear backoff.
    ///
    /// # Errors
    ///
    /// Returns the provider error once attempts are exhausted, or
    /// immediately for non-transient failures.
    pub async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 1;
        loop {
            match self.provider.embed_batch(batch).await {
                Ok(vectors) => {
                    if vectors.len() != batch.len() {
                        return Err(Error::embedding(format!(
                            "provider returned {} vectors for {} inputs",
                            vectors.len(),
                            batch.len()
                        )));
                    }
                    return Ok(vectors);
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let sleep_for = self.backoff * attempt as f64;
                    warn!(
                        event = "embedding_retry",
                        provider = self.provider.provider_name(),
                        attempt,
                        max_attempts = self.max_attempts,
                        sleep_sec = sleep_for,
                        error = %err,
                    );
                    tokio::time::sleep(Duration::from_secs_f64(sleep_for.max(0.0))).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        event = "embedding_failed",
                        provider = self.provider.provider_name(),
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                    );
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls with a transient error.
    struct FlakyProvider {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(Error::embedding("rate limited"));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn model(&self) -> &str {
            "test-model"
        }

        fn provider_name(&self) -> &str {
            "flaky"
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("chunk {i}")).collect()
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let provider = Arc::new(FlakyProvider {
            failures: 2,
            calls: AtomicUsize::new(0),
        });
        let batcher = EmbeddingBatcher::new(provider.clone(), 8, 3, 0.0);
        let vectors = batcher.embed_batch(&texts(3)).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_propagates_the_error() {
        let provider = Arc::new(FlakyProvider {
            failures: 10,
            calls: AtomicUsize::new(0),
        });
        let batcher = EmbeddingBatcher::new(provider.clone(), 8, 3, 0.0);
        assert!(batcher.embed_batch(&texts(1)).await.is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn batches_preserve_order_and_size() {
        let provider = Arc::new(FlakyProvider {
            failures: 0,
            calls: AtomicUsize::new(0),
        });
        let batcher = EmbeddingBatcher::new(provider, 4, 1, 0.0);
        let input = texts(10);
        let sizes: Vec<usize> = batcher.batches(&input).map(<[String]>::len).collect();
        assert_eq!(sizes, [4, 4, 2]);
        assert_eq!(batcher.batches(&input).next().unwrap()[0], "chunk 0");
    }
}
