mod config;
mod connection;
mod error;
mod models;
pub mod store;

pub use config::{ConnectRetry, MongoConfig};
pub use error::MongoDaoError;
pub use store::MongoProgressStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::DuplicateAccount { username } => {
                StorageError::conflict(format!("username `{username}` already taken"))
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
