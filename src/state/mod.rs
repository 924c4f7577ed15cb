pub mod counting;

use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::{RwLock, broadcast, watch};
use tokio::time::timeout;

use crate::{
    config::AppConfig,
    dao::game_store::GameStore,
    error::ServiceError,
    state::counting::HistoryEntry,
};

pub type SharedState = Arc<AppState>;

/// Number of committed entries buffered for slow live-feed subscribers.
const FEED_CAPACITY: usize = 64;

/// Central application state: the installed store, degraded flag and live feed.
pub struct AppState {
    config: AppConfig,
    game_store: RwLock<Option<Arc<dyn GameStore>>>,
    feed: broadcast::Sender<HistoryEntry>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let (feed, _rx) = broadcast::channel(FEED_CAPACITY);
        Arc::new(Self {
            config,
            game_store: RwLock::new(None),
            feed,
            degraded: degraded_tx,
        })
    }

    /// Construct a state with `store` already installed.
    pub async fn with_store(config: AppConfig, store: Arc<dyn GameStore>) -> SharedState {
        let state = Self::new(config);
        state.install_game_store(store).await;
        state
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.game_store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the current game store or fail with [`ServiceError::Degraded`].
    pub async fn require_game_store(&self) -> Result<Arc<dyn GameStore>, ServiceError> {
        self.game_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new game store implementation and leave degraded mode.
    pub async fn install_game_store(&self, store: Arc<dyn GameStore>) {
        {
            let mut guard = self.game_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current game store and enter degraded mode.
    pub async fn clear_game_store(&self) {
        {
            let mut guard = self.game_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Register a subscriber to committed history entries.
    pub fn subscribe_feed(&self) -> broadcast::Receiver<HistoryEntry> {
        self.feed.subscribe()
    }

    /// Publish a committed entry to live subscribers, ignoring the no-subscriber case.
    pub fn publish(&self, entry: HistoryEntry) {
        let _ = self.feed.send(entry);
    }

    /// Run `work` under `limit`, or the configured engine deadline when `limit` is `None`.
    ///
    /// The work future is dropped on expiry; callers must keep their mutations inside a
    /// single atomic store call so nothing partial is left behind.
    pub async fn run_with_deadline<Fut, T>(
        &self,
        limit: Option<Duration>,
        work: Fut,
    ) -> Result<T, ServiceError>
    where
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        match limit.or_else(|| self.config.engine.deadline()) {
            Some(limit) => timeout(limit, work)
                .await
                .map_err(|_| ServiceError::Timeout)?,
            None => work.await,
        }
    }
}
