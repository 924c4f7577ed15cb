mod connection;
mod error;
mod models;
pub mod store;

pub use connection::{MongoConfig, RetryPolicy};
pub use error::MongoDaoError;
pub use store::MongoGameStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::Decode { collection, message } => {
                StorageError::corrupted(collection, message)
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
