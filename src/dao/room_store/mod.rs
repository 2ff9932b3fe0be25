#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod file;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::{str::FromStr, sync::Arc};

use futures::future::BoxFuture;
use thiserror::Error;

use crate::dao::{models::RoomEntity, storage::StorageResult};

/// Opaque version token handed out by a backend for a stored room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(pub String);

/// A room as read from storage together with its current revision.
#[derive(Debug, Clone)]
pub struct StoredRoom {
    pub room: RoomEntity,
    pub revision: Revision,
}

/// Precondition attached to a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCondition {
    /// Only write if no record exists yet.
    Absent,
    /// Only write if the stored record still has this revision.
    Revision(Revision),
    /// Overwrite whatever is stored (last writer wins).
    Unconditional,
}

/// Abstraction over the persistence layer for tournament rooms.
///
/// A failed [`WriteCondition`] is reported as
/// [`StorageError::Conflict`](crate::dao::storage::StorageError::Conflict).
/// Backends returning `false` from [`RoomStore::supports_conditional_writes`] may
/// ignore `Absent`/`Revision` conditions, in which case concurrent writers to the
/// same room can overwrite each other.
pub trait RoomStore: Send + Sync {
    fn load_room(&self, code: &str) -> BoxFuture<'static, StorageResult<Option<StoredRoom>>>;
    fn store_room(
        &self,
        room: RoomEntity,
        condition: WriteCondition,
    ) -> BoxFuture<'static, StorageResult<Revision>>;
    fn supports_conditional_writes(&self) -> bool;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Environment variable selecting the backend.
const BACKEND_ENV: &str = "ROOM_STORE";

/// `ROOM_STORE` named a backend this build does not know.
#[derive(Debug, Error)]
#[error("unknown room store backend `{0}`; expected one of: {choices}", choices = Backend::CHOICES)]
pub struct UnknownBackend(pub String);

/// Room store backend selected at startup.
#[derive(Clone)]
pub enum Backend {
    /// CouchDB database configured from `COUCH_*` variables.
    #[cfg(feature = "couch-store")]
    CouchDb,
    /// MongoDB database configured from `MONGO_URI` and `MONGO_DB`.
    #[cfg(feature = "mongo-store")]
    MongoDb,
    /// One JSON blob per room under `ROOM_STORE_DIR`.
    File,
    /// Process-local store; rooms vanish on restart.
    Memory(memory::MemoryRoomStore),
}

impl Backend {
    const CHOICES: &'static str = "couchdb, mongodb, file, memory";

    /// Read `ROOM_STORE`, defaulting to the file backend.
    pub fn from_env() -> Result<Self, UnknownBackend> {
        match std::env::var(BACKEND_ENV) {
            Ok(value) if !value.trim().is_empty() => value.parse(),
            _ => Ok(Backend::File),
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "couch-store")]
            Backend::CouchDb => "couchdb",
            #[cfg(feature = "mongo-store")]
            Backend::MongoDb => "mongodb",
            Backend::File => "file",
            Backend::Memory(_) => "memory",
        }
    }

    /// Open a fresh handle to the selected backend.
    pub async fn connect(&self) -> StorageResult<Arc<dyn RoomStore>> {
        let store: Arc<dyn RoomStore> = match self {
            #[cfg(feature = "couch-store")]
            Backend::CouchDb => {
                let config = couchdb::CouchConfig::from_env()?;
                Arc::new(couchdb::CouchRoomStore::connect(config).await?)
            }
            #[cfg(feature = "mongo-store")]
            Backend::MongoDb => {
                let config = self::mongodb::MongoConfig::from_env().await?;
                Arc::new(self::mongodb::MongoRoomStore::connect(config).await?)
            }
            Backend::File => Arc::new(file::FileRoomStore::from_env().await?),
            Backend::Memory(store) => Arc::new(store.clone()),
        };
        Ok(store)
    }
}

impl FromStr for Backend {
    type Err = UnknownBackend;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            #[cfg(feature = "couch-store")]
            "couchdb" | "couch" => Ok(Backend::CouchDb),
            #[cfg(feature = "mongo-store")]
            "mongodb" | "mongo" => Ok(Backend::MongoDb),
            "file" => Ok(Backend::File),
            "memory" => Ok(Backend::Memory(memory::MemoryRoomStore::new())),
            _ => Err(UnknownBackend(value.to_owned())),
        }
    }
}
