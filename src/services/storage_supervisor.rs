use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{game_store::GameStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the ledger backend, then keep probing it, flipping the shared state in and
/// out of degraded mode as connectivity comes and goes.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn GameStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        let store = match connect().await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, retry_in = ?delay, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
                continue;
            }
        };

        state.install_game_store(store.clone()).await;
        info!("storage connection established; leaving degraded mode");
        delay = INITIAL_DELAY;

        while monitor(&state, store.as_ref()).await {
            sleep(HEALTH_POLL_INTERVAL).await;
        }

        warn!("exhausted storage reconnect attempts; dropping store handle");
        state.clear_game_store().await;
        sleep(delay).await;
    }
}

/// One health round. Returns `false` once the store is considered lost.
async fn monitor(state: &SharedState, store: &dyn GameStore) -> bool {
    let Err(err) = store.health_check().await else {
        if state.is_degraded() {
            info!("storage healthy again; leaving degraded mode");
            state.update_degraded(false);
        }
        return true;
    };

    warn!(error = %err, "storage health check failed; entering degraded mode");
    state.update_degraded(true);

    let mut reconnect_delay = INITIAL_DELAY;
    for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded");
                state.update_degraded(false);
                return true;
            }
            Err(err) => {
                warn!(attempt, error = %err, "storage reconnect attempt failed");
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use futures::future::{BoxFuture, FutureExt};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            game_store::InMemoryGameStore,
            models::{Commit, CommitStatus, LedgerHead},
            storage::StorageResult,
        },
        state::{
            AppState,
            counting::{HistoryEntry, LeaderboardEntry},
        },
    };

    /// Delegates to the in-memory store but can be told to fail health checks.
    struct FlakyStore {
        inner: InMemoryGameStore,
        healthy: Arc<AtomicBool>,
    }

    impl FlakyStore {
        fn probe(&self) -> StorageResult<()> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(StorageError::unavailable("offline".into(), std::io::Error::other("down")))
            }
        }
    }

    impl GameStore for FlakyStore {
        fn initialize(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.initialize()
        }
        fn load_head(&self) -> BoxFuture<'static, StorageResult<LedgerHead>> {
            self.inner.load_head()
        }
        fn contains_key(&self, key: String) -> BoxFuture<'static, StorageResult<bool>> {
            self.inner.contains_key(key)
        }
        fn commit(&self, commit: Commit) -> BoxFuture<'static, StorageResult<CommitStatus>> {
            self.inner.commit(commit)
        }
        fn top(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<LeaderboardEntry>>> {
            self.inner.top(limit)
        }
        fn recent(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<HistoryEntry>>> {
            self.inner.recent(limit)
        }
        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            let result = self.probe();
            async move { result }.boxed()
        }
        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            let result = self.probe();
            async move { result }.boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_health_check_toggles_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        let healthy = Arc::new(AtomicBool::new(true));
        let store: Arc<dyn GameStore> = Arc::new(FlakyStore {
            inner: InMemoryGameStore::new(),
            healthy: healthy.clone(),
        });

        assert!(monitor(&state, store.as_ref()).await);
        assert!(!state.is_degraded());

        healthy.store(false, Ordering::SeqCst);
        assert!(!monitor(&state, store.as_ref()).await);
        assert!(state.is_degraded());

        healthy.store(true, Ordering::SeqCst);
        assert!(monitor(&state, store.as_ref()).await);
        assert!(!state.is_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_installs_store_after_connect_failures() {
        let state = AppState::new(AppConfig::default());
        let failures = Arc::new(std::sync::atomic::AtomicU32::new(2));

        let counter = failures.clone();
        let task = tokio::spawn(run(state.clone(), move || {
            let counter = counter.clone();
            async move {
                if counter
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    return Err(StorageError::unavailable(
                        "refused".into(),
                        std::io::Error::other("refused"),
                    ));
                }
                Ok(Arc::new(InMemoryGameStore::new()) as Arc<dyn GameStore>)
            }
        }));

        let mut watcher = state.degraded_watcher();
        watcher.wait_for(|degraded| !degraded).await.unwrap();
        assert!(state.game_store().await.is_some());
        assert_eq!(failures.load(Ordering::SeqCst), 0);
        task.abort();
    }
}
