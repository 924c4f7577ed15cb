pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{Commit, CommitStatus, LedgerHead};
use crate::dao::storage::StorageResult;
use crate::state::counting::{HistoryEntry, LeaderboardEntry};
use futures::future::BoxFuture;

pub use memory::InMemoryGameStore;

/// Abstraction over the persistence layer holding the game state, leaderboard and history.
///
/// `commit` is the only mutating call: it applies the whole bundle or nothing, and only when
/// the stored head still matches `commit.expected`.
pub trait GameStore: Send + Sync {
    /// Establish default state if none exists, leaving existing state untouched.
    fn initialize(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn load_head(&self) -> BoxFuture<'static, StorageResult<LedgerHead>>;
    fn contains_key(&self, key: String) -> BoxFuture<'static, StorageResult<bool>>;
    fn commit(&self, commit: Commit) -> BoxFuture<'static, StorageResult<CommitStatus>>;
    /// Leaderboard ordered by count descending, then user id ascending.
    fn top(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<LeaderboardEntry>>>;
    /// History ordered by sequence id descending.
    fn recent(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<HistoryEntry>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
