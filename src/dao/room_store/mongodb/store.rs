use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{
    Client, Collection, Database,
    bson::doc,
    error::{Error as MongoError, ErrorKind, WriteFailure},
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoRoomDocument, by_code, by_code_and_revision},
};
use crate::dao::{
    models::RoomEntity,
    room_store::{Revision, RoomStore, StoredRoom, WriteCondition},
    storage::StorageResult,
};

const ROOM_COLLECTION_NAME: &str = "rooms";
const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB-backed room store; conditional writes filter on the stored revision.
#[derive(Clone)]
pub struct MongoRoomStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

fn is_undecodable(err: &MongoError) -> bool {
    matches!(err.kind.as_ref(), ErrorKind::BsonDeserialization(_))
}

impl MongoRoomStore {
    /// Establish a connection to MongoDB.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        Ok(Self { inner })
    }

    async fn collection(&self) -> Collection<MongoRoomDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoRoomDocument>(ROOM_COLLECTION_NAME)
    }

    async fn load(&self, code: &str) -> MongoResult<Option<StoredRoom>> {
        let collection = self.collection().await;
        let document = collection
            .find_one(by_code(code))
            .await
            .map_err(|source| {
                if is_undecodable(&source) {
                    MongoDaoError::CorruptedDocument {
                        code: code.to_owned(),
                        reason: source.to_string(),
                    }
                } else {
                    MongoDaoError::RoomQuery {
                        operation: "load",
                        code: code.to_owned(),
                        source,
                    }
                }
            })?;

        Ok(document.map(|doc| StoredRoom {
            room: doc.room,
            revision: Revision(doc.revision),
        }))
    }

    async fn write(&self, room: RoomEntity, condition: WriteCondition) -> MongoResult<Revision> {
        let code = room.code.clone();
        let document = MongoRoomDocument::from(room);
        let revision = Revision(document.revision.clone());
        let collection = self.collection().await;
        let save_error = |source| MongoDaoError::RoomQuery {
            operation: "save",
            code: code.clone(),
            source,
        };

        match condition {
            WriteCondition::Absent => match collection.insert_one(&document).await {
                Ok(_) => Ok(revision),
                Err(err) if is_duplicate_key(&err) => {
                    Err(MongoDaoError::RevisionConflict { code: code.clone() })
                }
                Err(err) => Err(save_error(err)),
            },
            WriteCondition::Revision(Revision(expected)) => {
                let result = collection
                    .replace_one(by_code_and_revision(&code, &expected), &document)
                    .await
                    .map_err(save_error)?;
                if result.matched_count == 0 {
                    Err(MongoDaoError::RevisionConflict { code: code.clone() })
                } else {
                    Ok(revision)
                }
            }
            WriteCondition::Unconditional => {
                collection
                    .replace_one(by_code(&code), &document)
                    .upsert(true)
                    .await
                    .map_err(save_error)?;
                Ok(revision)
            }
        }
    }
}

impl RoomStore for MongoRoomStore {
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
        true
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
