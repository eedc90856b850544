use anyhow::Result;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::LlmConfig;

/// Bounds the number of upstream completion calls in flight.
#[derive(Clone)]
pub struct Limiters {
    pub llm_stream: Arc<Semaphore>,
    pub acquire_timeout: Duration,
}

impl Limiters {
    pub fn new(cfg: &LlmConfig) -> Self {
        Self {
            llm_stream: Arc::new(Semaphore::new(cfg.max_concurrent_requests.max(1))),
            acquire_timeout: Duration::from_millis(cfg.acquire_timeout_ms.max(1)),
        }
    }

    pub async fn acquire_timed(
        sem: Arc<Semaphore>,
        acquire_timeout: Duration,
        op: &'static str,
    ) -> Result<(OwnedSemaphorePermit, Duration)> {
        let start = Instant::now();

        let permit = tokio::time::timeout(acquire_timeout, sem.acquire_owned())
            .await
            .map_err(|_| anyhow::anyhow!("Limiter acquire timeout for op={}", op))??;

        Ok((permit, start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_times_out_when_exhausted() {
        let cfg = LlmConfig {
            max_concurrent_requests: 1,
            acquire_timeout_ms: 20,
            ..LlmConfig::default()
        };
        let limiters = Limiters::new(&cfg);

        let (_held, _) = Limiters::acquire_timed(
            limiters.llm_stream.clone(),
            limiters.acquire_timeout,
            "test",
        )
        .await
        .unwrap();

        let second = Limiters::acquire_timed(
            limiters.llm_stream.clone(),
            limiters.acquire_timeout,
            "test",
        )
        .await;
        assert!(second.is_err());
    }
}
