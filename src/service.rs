//! Leaderboard service
//!
//! Per request: check the cache, and on a miss (or an authorized forced
//! refresh) reconstruct, build, cache and return. Reconstruction failures
//! never reach the caller: they get the last snapshot this process built
//! successfully, or an empty one.

use crate::cache::{SnapshotCache, DEFAULT_CACHE_KEY, DEFAULT_CACHE_TTL};
use crate::error::{ReconstructionFailure, UnauthorizedRefreshError};
use crate::leaderboard::{now_millis, LeaderboardBuilder, LeaderboardSnapshot};
use crate::reader::ChainReader;
use crate::reconstruct::Reconstructor;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{error, info, warn};

pub const DEFAULT_RECONSTRUCT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Versioned cache key; bump to invalidate old entries
    pub cache_key: String,
    pub cache_ttl: Duration,
    /// Shared secret for forced refreshes; `None` disables them
    pub admin_secret: Option<String>,
    /// Upper bound on one reconstruction pass
    pub reconstruct_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            admin_secret: None,
            reconstruct_timeout: DEFAULT_RECONSTRUCT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LeaderboardRequest {
    /// Bypass the cache and recompute
    pub force: bool,
    /// Admin secret, required when `force` is set
    pub secret: Option<String>,
}

/// Where a served snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Fresh,
    Fallback,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Cache => "cache",
            Source::Fresh => "fresh",
            Source::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Served {
    pub snapshot: LeaderboardSnapshot,
    pub source: Source,
}

pub struct LeaderboardService {
    chain: Arc<dyn ChainReader>,
    reconstructor: Arc<dyn Reconstructor>,
    builder: LeaderboardBuilder,
    cache: SnapshotCache,
    settings: ServiceSettings,
    /// Written only after a successful rebuild, read only by the fallback path
    last_known_good: RwLock<Option<LeaderboardSnapshot>>,
}

/// Compare secrets without short-circuiting on the first differing byte.
fn secrets_match(expected: &str, provided: &str) -> bool {
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl LeaderboardService {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        reconstructor: Arc<dyn Reconstructor>,
        builder: LeaderboardBuilder,
        cache: SnapshotCache,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            chain,
            reconstructor,
            builder,
            cache,
            settings,
            last_known_good: RwLock::new(None),
        }
    }

    fn authorize(&self, provided: Option<&str>) -> Result<(), UnauthorizedRefreshError> {
        match (self.settings.admin_secret.as_deref(), provided) {
            (Some(expected), Some(provided))
                if !expected.is_empty() && secrets_match(expected, provided) =>
            {
                Ok(())
            }
            _ => Err(UnauthorizedRefreshError),
        }
    }

    /// Serve the leaderboard.
    ///
    /// The only error is an unauthorized forced refresh, rejected before any
    /// cache or chain I/O.
    pub async fn leaderboard(
        &self,
        request: &LeaderboardRequest,
    ) -> Result<Served, UnauthorizedRefreshError> {
        if request.force {
            self.authorize(request.secret.as_deref()).map_err(|e| {
                warn!("Rejected forced refresh without a valid secret");
                e
            })?;
            info!("Forced leaderboard refresh");
        } else if let Some(snapshot) = self.cache.get(&self.settings.cache_key).await {
            return Ok(Served {
                snapshot,
                source: Source::Cache,
            });
        }

        match self.rebuild().await {
            Ok(snapshot) => {
                self.cache
                    .set(&self.settings.cache_key, &snapshot, self.settings.cache_ttl)
                    .await;
                if let Ok(mut slot) = self.last_known_good.write() {
                    *slot = Some(snapshot.clone());
                }
                Ok(Served {
                    snapshot,
                    source: Source::Fresh,
                })
            }
            Err(e) => {
                error!("Leaderboard reconstruction failed, serving fallback: {}", e);
                Ok(Served {
                    snapshot: self.fallback(),
                    source: Source::Fallback,
                })
            }
        }
    }

    async fn rebuild(&self) -> Result<LeaderboardSnapshot, ReconstructionFailure> {
        let timeout = self.settings.reconstruct_timeout;
        let reconstruction = tokio::time::timeout(
            timeout,
            self.reconstructor.reconstruct(self.chain.as_ref()),
        )
        .await
        .map_err(|_| ReconstructionFailure::TimedOut(timeout))??;

        let snapshot = self.builder.build(&reconstruction, now_millis());
        info!(
            "Built leaderboard via {}: {} participants, total staked {}",
            self.reconstructor.name(),
            snapshot.participant_count,
            snapshot.total_staked
        );
        Ok(snapshot)
    }

    fn fallback(&self) -> LeaderboardSnapshot {
        self.last_known_good
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| self.builder.empty(now_millis()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::enumeration::{EnumerationParams, EnumerationReconstructor};
    use crate::reconstruct::Reconstruction;
    use crate::testing::{addr, MockChain};
    use alloy_primitives::{Address, U256};
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use std::collections::VecDeque;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    const SECRET: &str = "s3cret";

    fn settings() -> ServiceSettings {
        ServiceSettings {
            admin_secret: Some(SECRET.to_string()),
            ..ServiceSettings::default()
        }
    }

    fn service_over(chain: Arc<MockChain>, cache: SnapshotCache) -> LeaderboardService {
        LeaderboardService::new(
            chain,
            Arc::new(EnumerationReconstructor::new(EnumerationParams::new(Address::ZERO))),
            LeaderboardBuilder::default(),
            cache,
            settings(),
        )
    }

    fn memory_cache() -> SnapshotCache {
        SnapshotCache::new(Arc::new(MemoryCache::new()))
    }

    fn forced(secret: Option<&str>) -> LeaderboardRequest {
        LeaderboardRequest {
            force: true,
            secret: secret.map(str::to_string),
        }
    }

    /// Hands out queued outcomes, then fails.
    struct Scripted {
        outcomes: Mutex<VecDeque<Option<Reconstruction>>>,
        delay: Duration,
    }

    impl Scripted {
        fn new(outcomes: Vec<Option<Reconstruction>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl Reconstructor for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn reconstruct(
            &self,
            _chain: &dyn ChainReader,
        ) -> Result<Reconstruction, ReconstructionFailure> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.outcomes.lock().unwrap().pop_front().flatten();
            next.ok_or(ReconstructionFailure::LogsUnavailable)
        }
    }

    fn one_staker(amount: u64) -> Reconstruction {
        let mut balances = IndexMap::new();
        balances.insert(addr(1), U256::from(amount));
        Reconstruction {
            balances,
            complete: true,
        }
    }

    #[tokio::test]
    async fn test_fresh_then_cache_hit_without_chain_reads() {
        let chain = Arc::new(MockChain::with_stakers(&[(addr(1), 100), (addr(2), 300)]));
        let service = service_over(chain.clone(), memory_cache());

        let first = service.leaderboard(&LeaderboardRequest::default()).await.unwrap();
        assert_eq!(first.source, Source::Fresh);
        assert_eq!(first.snapshot.total_staked, U256::from(400u64));
        let calls_after_first = chain.calls();
        assert!(calls_after_first > 0);

        let second = service.leaderboard(&LeaderboardRequest::default()).await.unwrap();
        assert_eq!(second.source, Source::Cache);
        assert_eq!(second.snapshot, first.snapshot);
        assert_eq!(chain.calls(), calls_after_first);
    }

    #[tokio::test]
    async fn test_unreachable_chain_serves_empty_snapshot() {
        let chain = Arc::new(MockChain::unreachable());
        let service = service_over(chain, memory_cache());

        let served = service.leaderboard(&LeaderboardRequest::default()).await.unwrap();
        assert_eq!(served.source, Source::Fallback);
        assert!(served.snapshot.entries.is_empty());
        assert_eq!(served.snapshot.total_staked, U256::ZERO);
        assert!(served.snapshot.generated_at > 0);
    }

    #[tokio::test]
    async fn test_fallback_is_not_cached() {
        let chain = Arc::new(MockChain::unreachable());
        let cache = memory_cache();
        let service = service_over(chain.clone(), cache.clone());

        service.leaderboard(&LeaderboardRequest::default()).await.unwrap();
        assert_eq!(cache.get(DEFAULT_CACHE_KEY).await, None);

        let calls = chain.calls();
        let again = service.leaderboard(&LeaderboardRequest::default()).await.unwrap();
        assert_eq!(again.source, Source::Fallback);
        assert!(chain.calls() > calls);
    }

    #[tokio::test]
    async fn test_stake_reads_down_keeps_last_known_good_and_cache() {
        let chain = Arc::new(MockChain::with_stakers(&[(addr(1), 100), (addr(2), 50)]));
        let cache = memory_cache();
        let service = service_over(chain.clone(), cache.clone());

        let first = service.leaderboard(&LeaderboardRequest::default()).await.unwrap();
        assert_eq!(first.source, Source::Fresh);
        assert_eq!(first.snapshot.total_staked, U256::from(150u64));

        // Index still answers, every stake read times out
        chain.stakes_unreachable.store(true, Ordering::SeqCst);
        let refreshed = service.leaderboard(&forced(Some(SECRET))).await.unwrap();
        assert_eq!(refreshed.source, Source::Fallback);
        assert_eq!(refreshed.snapshot, first.snapshot);

        // Neither the cache nor the last-known-good slot was clobbered
        assert_eq!(cache.get(DEFAULT_CACHE_KEY).await, Some(first.snapshot.clone()));
        assert_eq!(service.fallback(), first.snapshot);
    }

    #[tokio::test]
    async fn test_empty_fallback_keeps_staking_token() {
        let token = addr(0x65);
        let service = LeaderboardService::new(
            Arc::new(MockChain::unreachable()),
            Arc::new(EnumerationReconstructor::new(EnumerationParams::new(Address::ZERO))),
            LeaderboardBuilder::default().with_staking_token(token),
            SnapshotCache::disabled(),
            settings(),
        );

        let served = service.leaderboard(&LeaderboardRequest::default()).await.unwrap();
        assert_eq!(served.source, Source::Fallback);
        assert_eq!(served.snapshot.staking_token, Some(token));
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected_before_chain_io() {
        let chain = Arc::new(MockChain::with_stakers(&[(addr(1), 100)]));
        let service = service_over(chain.clone(), memory_cache());

        assert_eq!(
            service.leaderboard(&forced(Some("wrong"))).await.unwrap_err(),
            UnauthorizedRefreshError
        );
        assert_eq!(
            service.leaderboard(&forced(None)).await.unwrap_err(),
            UnauthorizedRefreshError
        );
        assert_eq!(chain.calls(), 0);
    }

    #[tokio::test]
    async fn test_forced_refresh_disabled_without_configured_secret() {
        let chain = Arc::new(MockChain::with_stakers(&[(addr(1), 100)]));
        let service = LeaderboardService::new(
            chain.clone(),
            Arc::new(EnumerationReconstructor::new(EnumerationParams::new(Address::ZERO))),
            LeaderboardBuilder::default(),
            memory_cache(),
            ServiceSettings::default(),
        );

        assert!(service.leaderboard(&forced(Some(""))).await.is_err());
        assert!(service.leaderboard(&forced(None)).await.is_err());
        assert_eq!(chain.calls(), 0);
    }

    #[tokio::test]
    async fn test_forced_refresh_bypasses_and_rewrites_cache() {
        let reconstructor = Arc::new(Scripted::new(vec![Some(one_staker(10)), Some(one_staker(20))]));
        let service = LeaderboardService::new(
            Arc::new(MockChain::default()),
            reconstructor,
            LeaderboardBuilder::default(),
            memory_cache(),
            settings(),
        );

        let first = service.leaderboard(&LeaderboardRequest::default()).await.unwrap();
        assert_eq!(first.snapshot.total_staked, U256::from(10u64));

        let refreshed = service.leaderboard(&forced(Some(SECRET))).await.unwrap();
        assert_eq!(refreshed.source, Source::Fresh);
        assert_eq!(refreshed.snapshot.total_staked, U256::from(20u64));

        // Normal reads now see the refreshed entry
        let cached = service.leaderboard(&LeaderboardRequest::default()).await.unwrap();
        assert_eq!(cached.source, Source::Cache);
        assert_eq!(cached.snapshot, refreshed.snapshot);
    }

    #[tokio::test]
    async fn test_fallback_serves_last_known_good() {
        let reconstructor = Arc::new(Scripted::new(vec![Some(one_staker(10)), None]));
        let service = LeaderboardService::new(
            Arc::new(MockChain::default()),
            reconstructor,
            LeaderboardBuilder::default(),
            SnapshotCache::disabled(),
            settings(),
        );

        let good = service.leaderboard(&LeaderboardRequest::default()).await.unwrap();
        assert_eq!(good.source, Source::Fresh);

        let fallback = service.leaderboard(&LeaderboardRequest::default()).await.unwrap();
        assert_eq!(fallback.source, Source::Fallback);
        assert_eq!(fallback.snapshot, good.snapshot);
    }

    #[tokio::test]
    async fn test_slow_reconstruction_times_out_to_fallback() {
        let mut reconstructor = Scripted::new(vec![Some(one_staker(10))]);
        reconstructor.delay = Duration::from_secs(5);
        let service = LeaderboardService::new(
            Arc::new(MockChain::default()),
            Arc::new(reconstructor),
            LeaderboardBuilder::default(),
            SnapshotCache::disabled(),
            ServiceSettings {
                reconstruct_timeout: Duration::from_millis(20),
                ..settings()
            },
        );

        let served = service.leaderboard(&LeaderboardRequest::default()).await.unwrap();
        assert_eq!(served.source, Source::Fallback);
        assert!(served.snapshot.entries.is_empty());
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("abc", "abc"));
        assert!(!secrets_match("abc", "abd"));
        assert!(!secrets_match("abc", "abcd"));
        assert!(!secrets_match("abc", ""));
    }
}
