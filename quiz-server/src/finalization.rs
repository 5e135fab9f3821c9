use anyhow::{Result, anyhow};
use async_trait::async_trait;
use quiz_core::SessionResults;
use quiz_persistence::{ProfileRepository, ProfileUpdate};
use quiz_types::{PlayerId, SessionId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Durable store for committed session results. Implementations must be
/// idempotent per (player, session).
#[async_trait]
pub trait PlayerProfileStore: Send + Sync {
    async fn persist_session(&self, results: &SessionResults) -> Result<()>;
}

#[async_trait]
impl PlayerProfileStore for ProfileRepository {
    async fn persist_session(&self, results: &SessionResults) -> Result<()> {
        let updates: Vec<ProfileUpdate> = results
            .members
            .iter()
            .map(|member| ProfileUpdate {
                player_id: member.player_id,
                display_name: member.display_name.clone(),
                entry: member.entry.clone(),
                stats: member.stats.clone(),
                currency: member.currency,
            })
            .collect();

        self.commit_session(results.session_id, &updates).await?;
        Ok(())
    }
}

/// In-memory store with failure injection. The server always commits through
/// `ProfileRepository`; this one drives the retry path in tests.
#[derive(Default)]
pub struct MemoryProfileStore {
    committed: Mutex<HashSet<(PlayerId, SessionId)>>,
    currency: Mutex<HashMap<PlayerId, u64>>,
    failures_remaining: AtomicU32,
    attempts: AtomicU32,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail.
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn currency_of(&self, player_id: PlayerId) -> u64 {
        self.currency
            .lock()
            .await
            .get(&player_id)
            .copied()
            .unwrap_or(0)
    }

    pub async fn committed_sessions(&self, player_id: PlayerId) -> usize {
        self.committed
            .lock()
            .await
            .iter()
            .filter(|(player, _)| *player == player_id)
            .count()
    }
}

#[async_trait]
impl PlayerProfileStore for MemoryProfileStore {
    async fn persist_session(&self, results: &SessionResults) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if should_fail {
            return Err(anyhow!("injected store failure"));
        }

        let mut committed = self.committed.lock().await;
        let mut currency = self.currency.lock().await;
        for member in &results.members {
            if committed.insert((member.player_id, results.session_id)) {
                *currency.entry(member.player_id).or_default() += u64::from(member.currency);
            }
        }
        Ok(())
    }
}

/// Commits session results with bounded exponential backoff.
pub struct Finalizer {
    store: Arc<dyn PlayerProfileStore>,
    max_attempts: u32,
    base_delay: Duration,
}

impl Finalizer {
    pub fn new(store: Arc<dyn PlayerProfileStore>, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub async fn commit_with_retry(&self, results: &SessionResults) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.store.persist_session(results).await {
                Ok(()) => {
                    info!(
                        "Finalized session {} for lobby {} ({} members, attempt {})",
                        results.session_id,
                        results.lobby_id,
                        results.members.len(),
                        attempt
                    );
                    return Ok(());
                }
                Err(e) if attempt < self.max_attempts => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        "Commit of session {} failed on attempt {}: {}. Retrying in {:?}",
                        results.session_id, attempt, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "Giving up on session {} after {} attempts: {}",
                        results.session_id, attempt, e
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_types::{GameType, LobbyId};
    use uuid::Uuid;

    fn empty_results() -> SessionResults {
        SessionResults {
            session_id: Uuid::new_v4(),
            lobby_id: LobbyId::new("ABC123"),
            game_type: GameType::SoloClassic,
            members: Vec::new(),
            summaries: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let store = Arc::new(MemoryProfileStore::new());
        store.fail_next(2);
        let finalizer = Finalizer::new(store.clone(), 3, Duration::from_millis(1));

        finalizer.commit_with_retry(&empty_results()).await.unwrap();
        assert_eq!(store.attempts(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let store = Arc::new(MemoryProfileStore::new());
        store.fail_next(5);
        let finalizer = Finalizer::new(store.clone(), 3, Duration::from_millis(1));

        assert!(finalizer.commit_with_retry(&empty_results()).await.is_err());
        assert_eq!(store.attempts(), 3);
    }
}
