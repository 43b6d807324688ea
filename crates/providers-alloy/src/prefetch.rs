//! Bounded look-ahead prefetching of L1 blocks.
//!
//! The prefetcher speculates reads only: it fetches blocks ahead of the
//! derivation loop, which remains the sole consumer and processes blocks
//! strictly in order. Fetch jobs run as tokio tasks bounded by a semaphore.

use facet_derive::{traits::ChainProvider, types::L1Block};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinHandle};
use tracing::{debug, trace};

/// Configuration for the [Prefetcher].
#[derive(Debug, Clone, Copy)]
pub struct PrefetcherConfig {
    /// How many blocks past the requested one to fetch ahead.
    pub window: u64,
    /// Concurrent fetch jobs.
    pub concurrency: usize,
    /// Per-block wait before reporting [FetchOutcome::NotReady].
    pub timeout: Duration,
    /// How long a cached tip number stays fresh.
    pub tip_ttl: Duration,
}

impl Default for PrefetcherConfig {
    fn default() -> Self {
        Self {
            window: 20,
            concurrency: 2,
            timeout: Duration::from_secs(30),
            tip_ttl: Duration::from_secs(12),
        }
    }
}

/// The outcome of a prefetched block request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The block is available.
    Ready(Box<L1Block>),
    /// The block is not available yet: past the tip, still being fetched, or
    /// not yet served by the RPC. Not an error; try again later.
    NotReady,
}

/// An error for the [Prefetcher].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrefetchError {
    /// The chain provider failed.
    #[error("Provider error: {0}")]
    Provider(String),
    /// A fetch task panicked or was cancelled out from under us.
    #[error("Prefetch task failed: {0}")]
    Task(String),
}

type FetchJob = JoinHandle<Result<Option<L1Block>, String>>;

/// Prefetches `L1Block`s ahead of the derivation loop.
#[derive(Debug)]
pub struct Prefetcher<P>
where
    P: ChainProvider + Clone + Send + 'static,
{
    provider: P,
    cfg: PrefetcherConfig,
    permits: Arc<Semaphore>,
    jobs: HashMap<u64, FetchJob>,
    tip: Option<(u64, Instant)>,
}

impl<P> Prefetcher<P>
where
    P: ChainProvider + Clone + Send + 'static,
    P::Error: Send,
{
    /// Creates a new [Prefetcher] over the given provider.
    pub fn new(provider: P, cfg: PrefetcherConfig) -> Self {
        Self {
            provider,
            permits: Arc::new(Semaphore::new(cfg.concurrency.max(1))),
            cfg,
            jobs: HashMap::new(),
            tip: None,
        }
    }

    /// Returns the L1 tip, cached for [PrefetcherConfig::tip_ttl].
    pub async fn tip(&mut self) -> Result<u64, PrefetchError> {
        if let Some((tip, fetched_at)) = self.tip {
            if fetched_at.elapsed() < self.cfg.tip_ttl {
                return Ok(tip);
            }
        }
        let tip = self
            .provider
            .latest_block_number()
            .await
            .map_err(|e| PrefetchError::Provider(e.to_string()))?;
        self.tip = Some((tip, Instant::now()));
        Ok(tip)
    }

    /// Fetches block `number`, scheduling look-ahead jobs up to the tip.
    pub async fn fetch(&mut self, number: u64) -> Result<FetchOutcome, PrefetchError> {
        let tip = self.tip().await?;
        self.ensure_prefetched(number, tip);

        if number > tip {
            trace!(target: "prefetch", number, tip, "requested block past tip");
            return Ok(FetchOutcome::NotReady);
        }

        let Some(job) = self.jobs.get_mut(&number) else {
            // ensure_prefetched always schedules the requested block when it
            // is at or below the tip.
            return Ok(FetchOutcome::NotReady);
        };

        match tokio::time::timeout(self.cfg.timeout, &mut *job).await {
            Err(_) => {
                debug!(target: "prefetch", number, "fetch timed out; leaving job running");
                Ok(FetchOutcome::NotReady)
            }
            Ok(joined) => {
                self.jobs.remove(&number);
                match joined {
                    Err(join_err) => Err(PrefetchError::Task(join_err.to_string())),
                    Ok(Err(provider_err)) => Err(PrefetchError::Provider(provider_err)),
                    Ok(Ok(None)) => Ok(FetchOutcome::NotReady),
                    Ok(Ok(Some(block))) => Ok(FetchOutcome::Ready(Box::new(block))),
                }
            }
        }
    }

    /// Schedules fetch jobs for `number..=number + window`, capped at the
    /// tip.
    fn ensure_prefetched(&mut self, number: u64, tip: u64) {
        let upper = number.saturating_add(self.cfg.window).min(tip);
        for n in number..=upper {
            if self.jobs.contains_key(&n) {
                continue;
            }
            let provider = self.provider.clone();
            let permits = Arc::clone(&self.permits);
            self.jobs.insert(
                n,
                tokio::spawn(async move {
                    let _permit =
                        permits.acquire_owned().await.map_err(|e| e.to_string())?;
                    let mut provider = provider;
                    provider
                        .block_with_receipts(n)
                        .await
                        .map_err(|e| e.to_string())
                }),
            );
        }
    }

    /// Drops jobs below the given watermark; the derivation loop calls this
    /// once blocks are persisted.
    pub fn evict_below(&mut self, watermark: u64) {
        let stale = self
            .jobs
            .keys()
            .copied()
            .filter(|n| *n < watermark)
            .collect::<Vec<_>>();
        for n in stale {
            if let Some(job) = self.jobs.remove(&n) {
                job.abort();
            }
        }
    }

    /// Drops jobs and cached provider state at or above the given number so
    /// the blocks are refetched; called on reorg.
    pub fn invalidate_from(&mut self, number: u64) {
        let stale = self
            .jobs
            .keys()
            .copied()
            .filter(|n| *n >= number)
            .collect::<Vec<_>>();
        for n in stale {
            if let Some(job) = self.jobs.remove(&n) {
                job.abort();
            }
        }
        self.provider.invalidate_from(number);
        self.tip = None;
    }

    /// Aborts all outstanding jobs. Best effort.
    pub fn shutdown(&mut self) {
        for (_, job) in self.jobs.drain() {
            job.abort();
        }
    }

    /// The number of outstanding jobs.
    pub fn pending(&self) -> usize {
        self.jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_derive::{test_utils::TestChainProvider, types::L1Header};

    fn cfg() -> PrefetcherConfig {
        PrefetcherConfig {
            window: 4,
            concurrency: 2,
            timeout: Duration::from_secs(1),
            tip_ttl: Duration::from_millis(1),
        }
    }

    fn block(number: u64) -> L1Block {
        L1Block {
            header: L1Header { number, ..Default::default() },
            transactions: vec![],
            receipts: vec![],
        }
    }

    #[tokio::test]
    async fn fetches_available_block() {
        let mut provider = TestChainProvider::default();
        for n in 0..10 {
            provider.insert_block(block(n));
        }
        let mut prefetcher = Prefetcher::new(provider, cfg());

        match prefetcher.fetch(3).await.unwrap() {
            FetchOutcome::Ready(block) => assert_eq!(block.header.number, 3),
            FetchOutcome::NotReady => panic!("expected block 3"),
        }
    }

    #[tokio::test]
    async fn past_tip_is_not_ready() {
        let mut provider = TestChainProvider::default();
        provider.insert_block(block(5));
        let mut prefetcher = Prefetcher::new(provider, cfg());

        assert!(matches!(prefetcher.fetch(6).await.unwrap(), FetchOutcome::NotReady));
    }

    #[tokio::test]
    async fn missing_block_below_tip_is_not_ready() {
        let mut provider = TestChainProvider::default();
        provider.insert_block(block(5));
        // Block 3 is below the tip but the provider has no record of it.
        provider.blocks.remove(&3);
        let mut prefetcher = Prefetcher::new(provider, cfg());

        assert!(matches!(prefetcher.fetch(3).await.unwrap(), FetchOutcome::NotReady));
    }

    #[tokio::test]
    async fn provider_errors_propagate() {
        let mut provider = TestChainProvider::default();
        provider.insert_block(block(5));
        let mut prefetcher = Prefetcher::new(provider, cfg());
        // Prime the tip cache, then poison the provider for block fetches.
        let _ = prefetcher.tip().await.unwrap();
        prefetcher.provider.error = Some("boom".to_string());

        assert!(matches!(
            prefetcher.fetch(2).await,
            Err(PrefetchError::Provider(message)) if message == "boom"
        ));
    }

    #[tokio::test]
    async fn eviction_drops_old_jobs() {
        let mut provider = TestChainProvider::default();
        for n in 0..10 {
            provider.insert_block(block(n));
        }
        let mut prefetcher = Prefetcher::new(provider, cfg());
        let _ = prefetcher.fetch(0).await.unwrap();
        assert!(prefetcher.pending() > 0);

        prefetcher.evict_below(100);
        assert_eq!(prefetcher.pending(), 0);
    }

    #[tokio::test]
    async fn shutdown_aborts_everything() {
        let mut provider = TestChainProvider::default();
        for n in 0..10 {
            provider.insert_block(block(n));
        }
        let mut prefetcher = Prefetcher::new(provider, cfg());
        let _ = prefetcher.fetch(0).await.unwrap();
        prefetcher.shutdown();
        assert_eq!(prefetcher.pending(), 0);
    }
}
