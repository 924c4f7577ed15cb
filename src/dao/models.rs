use crate::state::counting::{CountAttempt, GameState, HistoryEntry, Outcome, Transition};

/// Committed head of the ledger: the game state plus the last history sequence id.
///
/// Both fields act as the compare-and-swap guard of a commit: `version` moves on every
/// state change, `last_sequence_id` on every appended history entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LedgerHead {
    /// Current committed game state.
    pub state: GameState,
    /// Sequence id of the most recent history entry, 0 when the history is empty.
    pub last_sequence_id: u64,
}

/// Everything a single `submit` writes, applied atomically by a [`GameStore`].
///
/// [`GameStore`]: crate::dao::game_store::GameStore
#[derive(Debug, Clone)]
pub struct Commit {
    /// Head observed when the transition was computed.
    pub expected: LedgerHead,
    /// Attempt as submitted.
    pub attempt: CountAttempt,
    /// Outcome computed against `expected.state`.
    pub outcome: Outcome,
    /// State to install; equal to `expected.state` for non-mutating rejections.
    pub next_state: GameState,
    /// User whose leaderboard tally is incremented.
    pub credit: Option<String>,
}

impl Commit {
    /// Bundle a computed transition with the head it was computed against.
    pub fn new(expected: LedgerHead, attempt: CountAttempt, transition: Transition) -> Self {
        Self {
            expected,
            attempt,
            outcome: transition.outcome,
            next_state: transition.next,
            credit: transition.credit,
        }
    }

    /// Sequence id the appended history entry receives.
    pub fn sequence_id(&self) -> u64 {
        self.expected.last_sequence_id + 1
    }

    /// Idempotency key recorded by this commit. Duplicates never claim their key.
    pub fn claimed_key(&self) -> Option<&str> {
        match self.outcome {
            Outcome::RejectedDuplicate => None,
            _ => self.attempt.idempotency_key.as_deref(),
        }
    }

    /// History entry appended by this commit.
    pub fn history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            sequence_id: self.sequence_id(),
            attempt: self.attempt.clone(),
            outcome: self.outcome,
            resulting_state: self.next_state.clone(),
        }
    }

    /// Head left behind once this commit is applied.
    pub fn next_head(&self) -> LedgerHead {
        LedgerHead {
            state: self.next_state.clone(),
            last_sequence_id: self.sequence_id(),
        }
    }
}

/// Result of a commit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
    /// The bundle was applied; carries the appended history entry.
    Committed(HistoryEntry),
    /// The head moved (or the idempotency key was claimed) since it was read.
    Conflict,
}
