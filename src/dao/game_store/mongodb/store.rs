use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, ClientSession, Collection, Database,
    bson::doc,
    error::{Error as MongoError, ErrorKind, TRANSIENT_TRANSACTION_ERROR, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    connection::{MongoConfig, ping},
    error::{MongoDaoError, MongoResult},
    models::{
        MongoHistoryDocument, MongoKeyDocument, MongoLeaderboardDocument, MongoStateDocument,
        STATE_DOCUMENT_ID,
    },
};
use crate::dao::{
    game_store::GameStore,
    models::{Commit, CommitStatus, LedgerHead},
    storage::StorageResult,
};
use crate::state::counting::{HistoryEntry, LeaderboardEntry};

const STATE_COLLECTION_NAME: &str = "game_state";
const LEADERBOARD_COLLECTION_NAME: &str = "leaderboard";
const HISTORY_COLLECTION_NAME: &str = "history";
const KEY_COLLECTION_NAME: &str = "idempotency_keys";

const DUPLICATE_KEY_CODE: i32 = 11000;
const NAMESPACE_EXISTS_CODE: i32 = 48;

/// MongoDB-backed ledger. Commits run in multi-document transactions, so the
/// deployment must be a replica set (a single-node replica set is enough).
#[derive(Clone)]
pub struct MongoGameStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        ping(&database)
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = self.config.connect().await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoGameStore {
    /// Establish a connection to MongoDB, create collections and indexes, and seed the state.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = config.connect().await?;
        debug!(database = config.database_name(), "connected to MongoDB");

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_collections().await?;
        store.ensure_indexes().await?;
        store.initialize().await?;
        Ok(store)
    }

    /// Collections cannot be created implicitly inside a transaction on older servers.
    async fn ensure_collections(&self) -> MongoResult<()> {
        let database = self.database().await;
        for name in [
            STATE_COLLECTION_NAME,
            LEADERBOARD_COLLECTION_NAME,
            HISTORY_COLLECTION_NAME,
            KEY_COLLECTION_NAME,
        ] {
            match database.create_collection(name).await {
                Ok(()) => debug!(collection = name, "created collection"),
                Err(err) if has_code(&err, NAMESPACE_EXISTS_CODE) => {}
                Err(source) => {
                    return Err(MongoDaoError::CreateCollection {
                        collection: name,
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"valid_count": -1, "_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("leaderboard_rank_idx".to_owned()))
                    .build(),
            )
            .build();

        self.leaderboard_collection()
            .await
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: LEADERBOARD_COLLECTION_NAME,
                index: "valid_count,_id",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn client_and_database(&self) -> (Client, Database) {
        let guard = self.inner.state.read().await;
        (guard.client.clone(), guard.database.clone())
    }

    async fn state_collection(&self) -> Collection<MongoStateDocument> {
        self.database().await.collection(STATE_COLLECTION_NAME)
    }

    async fn leaderboard_collection(&self) -> Collection<MongoLeaderboardDocument> {
        self.database().await.collection(LEADERBOARD_COLLECTION_NAME)
    }

    async fn history_collection(&self) -> Collection<MongoHistoryDocument> {
        self.database().await.collection(HISTORY_COLLECTION_NAME)
    }

    async fn key_collection(&self) -> Collection<MongoKeyDocument> {
        self.database().await.collection(KEY_COLLECTION_NAME)
    }

    async fn initialize(&self) -> MongoResult<()> {
        self.state_collection()
            .await
            .update_one(
                doc! {"_id": STATE_DOCUMENT_ID},
                doc! {"$setOnInsert": MongoStateDocument::defaults()},
            )
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Initialize { source })?;
        Ok(())
    }

    async fn load_head(&self) -> MongoResult<LedgerHead> {
        let find = || async {
            self.state_collection()
                .await
                .find_one(doc! {"_id": STATE_DOCUMENT_ID})
                .await
                .map_err(|source| MongoDaoError::Read {
                    collection: STATE_COLLECTION_NAME,
                    source,
                })
        };

        if let Some(document) = find().await? {
            return document.try_into();
        }

        // The state document was dropped behind our back; seed it again.
        self.initialize().await?;
        match find().await? {
            Some(document) => document.try_into(),
            None => Err(MongoDaoError::Decode {
                collection: STATE_COLLECTION_NAME,
                message: "state document missing after initialization".into(),
            }),
        }
    }

    async fn contains_key(&self, key: String) -> MongoResult<bool> {
        let count = self
            .key_collection()
            .await
            .count_documents(doc! {"_id": key})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: KEY_COLLECTION_NAME,
                source,
            })?;
        Ok(count > 0)
    }

    async fn commit(&self, commit: Commit) -> MongoResult<CommitStatus> {
        let (client, database) = self.client_and_database().await;
        let mut session = client
            .start_session()
            .await
            .map_err(|source| MongoDaoError::Transaction {
                step: "start_session",
                source,
            })?;
        session
            .start_transaction()
            .await
            .map_err(|source| MongoDaoError::Transaction {
                step: "start_transaction",
                source,
            })?;

        match write_commit(&database, &mut session, &commit).await {
            Ok(true) => {}
            Ok(false) => {
                abort(&mut session).await;
                return Ok(CommitStatus::Conflict);
            }
            Err(err) if is_conflict(&err) => {
                debug!(error = %err, "commit lost a write race");
                abort(&mut session).await;
                return Ok(CommitStatus::Conflict);
            }
            Err(source) => {
                abort(&mut session).await;
                return Err(MongoDaoError::Transaction {
                    step: "write",
                    source,
                });
            }
        }

        match session.commit_transaction().await {
            Ok(()) => Ok(CommitStatus::Committed(commit.history_entry())),
            Err(err) if err.contains_label(TRANSIENT_TRANSACTION_ERROR) => {
                Ok(CommitStatus::Conflict)
            }
            Err(source) => Err(MongoDaoError::Transaction {
                step: "commit",
                source,
            }),
        }
    }

    async fn top(&self, limit: usize) -> MongoResult<Vec<LeaderboardEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let documents: Vec<MongoLeaderboardDocument> = self
            .leaderboard_collection()
            .await
            .find(doc! {})
            .sort(doc! {"valid_count": -1, "_id": 1})
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: LEADERBOARD_COLLECTION_NAME,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: LEADERBOARD_COLLECTION_NAME,
                source,
            })?;

        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn recent(&self, limit: usize) -> MongoResult<Vec<HistoryEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let documents: Vec<MongoHistoryDocument> = self
            .history_collection()
            .await
            .find(doc! {})
            .sort(doc! {"_id": -1})
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: HISTORY_COLLECTION_NAME,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: HISTORY_COLLECTION_NAME,
                source,
            })?;

        documents.into_iter().map(TryInto::try_into).collect()
    }
}

/// Apply the commit bundle inside the open transaction.
///
/// Returns `Ok(false)` when the state document no longer matches the expected head.
async fn write_commit(
    database: &Database,
    session: &mut ClientSession,
    commit: &Commit,
) -> Result<bool, MongoError> {
    let updated = database
        .collection::<MongoStateDocument>(STATE_COLLECTION_NAME)
        .update_one(
            MongoStateDocument::guard(&commit.expected),
            MongoStateDocument::advance(commit),
        )
        .session(&mut *session)
        .await?;
    if updated.matched_count == 0 {
        return Ok(false);
    }

    if let Some(key) = commit.claimed_key() {
        database
            .collection::<MongoKeyDocument>(KEY_COLLECTION_NAME)
            .insert_one(MongoKeyDocument::new(key, commit.sequence_id()))
            .session(&mut *session)
            .await?;
    }

    if let Some(user_id) = &commit.credit {
        database
            .collection::<MongoLeaderboardDocument>(LEADERBOARD_COLLECTION_NAME)
            .update_one(
                doc! {"_id": user_id},
                doc! {"$inc": {"valid_count": 1_i64}},
            )
            .upsert(true)
            .session(&mut *session)
            .await?;
    }

    database
        .collection::<MongoHistoryDocument>(HISTORY_COLLECTION_NAME)
        .insert_one(MongoHistoryDocument::from(&commit.history_entry()))
        .session(&mut *session)
        .await?;

    Ok(true)
}

async fn abort(session: &mut ClientSession) {
    if let Err(err) = session.abort_transaction().await {
        debug!(error = %err, "failed to abort transaction");
    }
}

/// Errors meaning another writer got there first; the caller re-reads and retries.
fn is_conflict(err: &MongoError) -> bool {
    err.contains_label(TRANSIENT_TRANSACTION_ERROR) || has_code(err, DUPLICATE_KEY_CODE)
}

fn has_code(err: &MongoError, code: i32) -> bool {
    match &*err.kind {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == code,
        ErrorKind::Command(command_error) => command_error.code == code,
        _ => false,
    }
}

impl GameStore for MongoGameStore {
    fn initialize(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.initialize().await.map_err(Into::into) })
    }

    fn load_head(&self) -> BoxFuture<'static, StorageResult<LedgerHead>> {
        let store = self.clone();
        Box::pin(async move { store.load_head().await.map_err(Into::into) })
    }

    fn contains_key(&self, key: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.contains_key(key).await.map_err(Into::into) })
    }

    fn commit(&self, commit: Commit) -> BoxFuture<'static, StorageResult<CommitStatus>> {
        let store = self.clone();
        Box::pin(async move { store.commit(commit).await.map_err(Into::into) })
    }

    fn top(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<LeaderboardEntry>>> {
        let store = self.clone();
        Box::pin(async move { store.top(limit).await.map_err(Into::into) })
    }

    fn recent(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<HistoryEntry>>> {
        let store = self.clone();
        Box::pin(async move { store.recent(limit).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
