/// Persistence backends for the counting ledger.
pub mod game_store;
/// Commit bundle and ledger head exchanged with the backends.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
