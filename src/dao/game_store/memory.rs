use std::{
    cmp::Reverse,
    collections::{HashMap, HashSet},
    sync::Arc,
};

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use super::GameStore;
use crate::dao::{
    models::{Commit, CommitStatus, LedgerHead},
    storage::StorageResult,
};
use crate::state::counting::{HistoryEntry, LeaderboardEntry};

/// Process-local ledger used for development, tests and single-instance deployments.
#[derive(Clone, Default)]
pub struct InMemoryGameStore {
    ledger: Arc<RwLock<Ledger>>,
}

#[derive(Default)]
struct Ledger {
    head: LedgerHead,
    leaderboard: HashMap<String, u64>,
    history: Vec<HistoryEntry>,
    claimed_keys: HashSet<String>,
}

impl Ledger {
    fn apply(&mut self, commit: Commit) -> CommitStatus {
        if self.head != commit.expected {
            return CommitStatus::Conflict;
        }
        if let Some(key) = commit.claimed_key() {
            if self.claimed_keys.contains(key) {
                return CommitStatus::Conflict;
            }
            self.claimed_keys.insert(key.to_owned());
        }

        if let Some(user_id) = &commit.credit {
            *self.leaderboard.entry(user_id.clone()).or_default() += 1;
        }
        let entry = commit.history_entry();
        self.history.push(entry.clone());
        self.head = commit.next_head();

        CommitStatus::Committed(entry)
    }

    fn top(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<_> = self
            .leaderboard
            .iter()
            .map(|(user_id, valid_count)| LeaderboardEntry {
                user_id: user_id.clone(),
                valid_count: *valid_count,
            })
            .collect();
        entries.sort_by(|a, b| {
            (Reverse(a.valid_count), &a.user_id).cmp(&(Reverse(b.valid_count), &b.user_id))
        });
        entries.truncate(limit);
        entries
    }

    fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        self.history.iter().rev().take(limit).cloned().collect()
    }
}

impl InMemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GameStore for InMemoryGameStore {
    fn initialize(&self) -> BoxFuture<'static, StorageResult<()>> {
        // Defaults are in place from construction.
        Box::pin(async { Ok(()) })
    }

    fn load_head(&self) -> BoxFuture<'static, StorageResult<LedgerHead>> {
        let ledger = self.ledger.clone();
        Box::pin(async move { Ok(ledger.read().await.head.clone()) })
    }

    fn contains_key(&self, key: String) -> BoxFuture<'static, StorageResult<bool>> {
        let ledger = self.ledger.clone();
        Box::pin(async move { Ok(ledger.read().await.claimed_keys.contains(&key)) })
    }

    fn commit(&self, commit: Commit) -> BoxFuture<'static, StorageResult<CommitStatus>> {
        let ledger = self.ledger.clone();
        Box::pin(async move { Ok(ledger.write().await.apply(commit)) })
    }

    fn top(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<LeaderboardEntry>>> {
        let ledger = self.ledger.clone();
        Box::pin(async move { Ok(ledger.read().await.top(limit)) })
    }

    fn recent(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<HistoryEntry>>> {
        let ledger = self.ledger.clone();
        Box::pin(async move { Ok(ledger.read().await.recent(limit)) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::state::counting::{CountAttempt, Outcome, evaluate};

    fn attempt(sender: &str, number: i64, key: Option<&str>) -> CountAttempt {
        CountAttempt {
            sender_id: sender.into(),
            channel_id: "C1".into(),
            parsed_number: Some(number),
            timestamp: SystemTime::now(),
            idempotency_key: key.map(Into::into),
        }
    }

    async fn commit(store: &InMemoryGameStore, attempt: CountAttempt) -> CommitStatus {
        let head = store.load_head().await.unwrap();
        let transition = evaluate(&head.state, &attempt, false);
        store
            .commit(Commit::new(head, attempt, transition))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn commit_appends_history_and_credits_sender() {
        let store = InMemoryGameStore::new();

        let status = commit(&store, attempt("A", 1, Some("k1"))).await;
        let CommitStatus::Committed(entry) = status else {
            panic!("expected commit, got {status:?}");
        };
        assert_eq!(entry.sequence_id, 1);
        assert_eq!(entry.outcome, Outcome::Accepted);

        let head = store.load_head().await.unwrap();
        assert_eq!(head.state.last_valid_number, 1);
        assert_eq!(head.last_sequence_id, 1);
        assert!(store.contains_key("k1".into()).await.unwrap());
        assert_eq!(
            store.top(10).await.unwrap(),
            vec![LeaderboardEntry {
                user_id: "A".into(),
                valid_count: 1
            }]
        );
    }

    #[tokio::test]
    async fn stale_head_is_rejected_without_side_effects() {
        let store = InMemoryGameStore::new();
        let stale = store.load_head().await.unwrap();

        commit(&store, attempt("A", 1, None)).await;

        let late = attempt("B", 1, Some("k2"));
        let transition = evaluate(&stale.state, &late, false);
        let status = store
            .commit(Commit::new(stale, late, transition))
            .await
            .unwrap();

        assert_eq!(status, CommitStatus::Conflict);
        assert_eq!(store.recent(10).await.unwrap().len(), 1);
        assert!(!store.contains_key("k2".into()).await.unwrap());
        assert_eq!(store.top(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn claimed_key_conflicts_even_with_fresh_head() {
        let store = InMemoryGameStore::new();
        commit(&store, attempt("A", 1, Some("k1"))).await;

        let status = commit(&store, attempt("B", 2, Some("k1"))).await;

        assert_eq!(status, CommitStatus::Conflict);
        assert_eq!(store.load_head().await.unwrap().state.last_valid_number, 1);
    }

    #[tokio::test]
    async fn top_breaks_ties_by_user_id_and_respects_limit() {
        let store = InMemoryGameStore::new();
        for (number, sender) in [(1, "B"), (2, "A"), (3, "B"), (4, "A"), (5, "C")] {
            commit(&store, attempt(sender, number, None)).await;
        }

        let top = store.top(2).await.unwrap();
        assert_eq!(
            top.iter()
                .map(|e| (e.user_id.as_str(), e.valid_count))
                .collect::<Vec<_>>(),
            vec![("A", 2), ("B", 2)]
        );
        assert!(store.top(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recent_is_most_recent_first() {
        let store = InMemoryGameStore::new();
        for (number, sender) in [(1, "A"), (2, "B"), (3, "A")] {
            commit(&store, attempt(sender, number, None)).await;
        }

        let ids: Vec<_> = store
            .recent(2)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.sequence_id)
            .collect();
        assert_eq!(ids, vec![3, 2]);
    }
}
