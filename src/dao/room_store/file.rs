//! Blob-style backend keeping one JSON document per room on disk.
//!
//! Creation is exclusive: the staged blob is hard-linked into place, which fails
//! if the room already exists. Later writes replace the document atomically
//! (temp file + rename) but carry no version check: two requests that load the
//! same room and both write will keep only the last write.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

use crate::dao::{
    models::RoomEntity,
    room_store::{Revision, RoomStore, StoredRoom, WriteCondition},
    storage::{StorageError, StorageResult},
};

const DEFAULT_DIR: &str = "data/rooms";
const DIR_ENV: &str = "ROOM_STORE_DIR";

/// Failures that can occur while reading or writing room blobs.
#[derive(Debug, Error)]
pub enum FileDaoError {
    /// Filesystem operation failed.
    #[error("i/o error on `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Stored blob is not a valid room document.
    #[error("failed to decode room blob `{path}`")]
    Decode {
        code: String,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// Room could not be encoded to JSON.
    #[error("failed to encode room `{code}`")]
    Encode {
        code: String,
        #[source]
        source: serde_json::Error,
    },
    /// Exclusive create found a blob already in place.
    #[error("room blob `{path}` already exists")]
    AlreadyExists { code: String, path: PathBuf },
    /// Configured root exists but is not a directory.
    #[error("`{path}` is not a directory")]
    NotADirectory { path: PathBuf },
}

impl From<FileDaoError> for StorageError {
    fn from(err: FileDaoError) -> Self {
        match err {
            FileDaoError::AlreadyExists { code, .. } => StorageError::conflict(code),
            FileDaoError::Decode { code, source, .. } => {
                StorageError::corrupted(code, source.to_string())
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}

type FileResult<T> = Result<T, FileDaoError>;

#[derive(Clone)]
pub struct FileRoomStore {
    root: Arc<Path>,
}

impl FileRoomStore {
    /// Open (and create if needed) the directory holding room blobs.
    pub async fn open(root: impl Into<PathBuf>) -> FileResult<Self> {
        let store = Self {
            root: Arc::from(root.into()),
        };
        store.ensure_root().await?;
        Ok(store)
    }

    /// Open the directory named by `ROOM_STORE_DIR`, defaulting to `data/rooms`.
    pub async fn from_env() -> FileResult<Self> {
        let root = std::env::var_os(DIR_ENV)
            .map(PathBuf::from)
            .filter(|path| !path.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR));
        Self::open(root).await
    }

    fn blob_path(&self, code: &str) -> PathBuf {
        self.root.join(format!("{code}.json"))
    }

    async fn ensure_root(&self) -> FileResult<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| FileDaoError::Io {
                path: self.root.to_path_buf(),
                source,
            })
    }

    async fn check_root(&self) -> FileResult<()> {
        let metadata = fs::metadata(&self.root)
            .await
            .map_err(|source| FileDaoError::Io {
                path: self.root.to_path_buf(),
                source,
            })?;
        if metadata.is_dir() {
            Ok(())
        } else {
            Err(FileDaoError::NotADirectory {
                path: self.root.to_path_buf(),
            })
        }
    }

    async fn load(&self, code: &str) -> FileResult<Option<StoredRoom>> {
        let path = self.blob_path(code);
        let contents = match fs::read(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(FileDaoError::Io { path, source }),
        };

        let room = serde_json::from_slice::<RoomEntity>(&contents)
            .map_err(|source| FileDaoError::Decode {
                code: code.to_owned(),
                path,
                source,
            })?;

        Ok(Some(StoredRoom {
            room,
            revision: Revision(String::new()),
        }))
    }

    async fn write(&self, room: RoomEntity, condition: WriteCondition) -> FileResult<Revision> {
        let payload = serde_json::to_vec(&room).map_err(|source| FileDaoError::Encode {
            code: room.code.clone(),
            source,
        })?;

        let path = self.blob_path(&room.code);
        let staging = self
            .root
            .join(format!(".{}.{}.tmp", room.code, Uuid::new_v4()));

        fs::write(&staging, payload)
            .await
            .map_err(|source| FileDaoError::Io {
                path: staging.clone(),
                source,
            })?;

        let placed = match condition {
            WriteCondition::Absent => fs::hard_link(&staging, &path).await,
            WriteCondition::Revision(_) | WriteCondition::Unconditional => {
                fs::rename(&staging, &path).await
            }
        };
        // After a hard link (or a failed rename) the staging name is left over.
        let _ = fs::remove_file(&staging).await;

        match placed {
            Ok(()) => Ok(Revision(String::new())),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(FileDaoError::AlreadyExists {
                code: room.code,
                path,
            }),
            Err(source) => Err(FileDaoError::Io { path, source }),
        }
    }
}

impl RoomStore for FileRoomStore {
    fn load_room(&self, code: &str) -> BoxFuture<'static, StorageResult<Option<StoredRoom>>> {
        let store = self.clone();
        let code = code.to_owned();
        Box::pin(async move { store.load(&code).await.map_err(Into::into) })
    }

    fn store_room(
        &self,
        room: RoomEntity,
        condition: WriteCondition,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move { store.write(room, condition).await.map_err(Into::into) })
    }

    fn supports_conditional_writes(&self) -> bool {
        false
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.check_root().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_root().await.map_err(Into::into) })
    }
}
