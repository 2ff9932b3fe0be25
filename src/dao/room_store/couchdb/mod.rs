mod config;
mod error;
mod models;
mod store;

pub use config::{CouchConfig, CouchCredentials};
pub use error::CouchDaoError;
pub use store::CouchRoomStore;

use crate::dao::storage::StorageError;

impl From<CouchDaoError> for StorageError {
    fn from(err: CouchDaoError) -> Self {
        match err {
            CouchDaoError::RevisionConflict { doc_id } => StorageError::conflict(doc_id),
            CouchDaoError::CorruptedDocument { doc_id, source } => {
                StorageError::corrupted(models::room_code(&doc_id), source.to_string())
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
