mod config;
mod connection;
mod error;
mod models;
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoRoomStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::RevisionConflict { code } => StorageError::conflict(code),
            MongoDaoError::CorruptedDocument { code, reason } => {
                StorageError::corrupted(code, reason)
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_document_is_corrupted_not_unavailable() {
        let err = StorageError::from(MongoDaoError::CorruptedDocument {
            code: "CATS".into(),
            reason: "missing field `players`".into(),
        });
        assert!(matches!(err, StorageError::Corrupted { key, .. } if key == "CATS"));
    }

    #[test]
    fn revision_mismatch_is_a_conflict() {
        let err = StorageError::from(MongoDaoError::RevisionConflict {
            code: "CATS".into(),
        });
        assert!(err.is_conflict());
    }
}
