use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::dao::{
    models::RoomEntity,
    room_store::{Revision, RoomStore, StoredRoom, WriteCondition},
    storage::StorageResult,
};

use super::{
    config::{CouchConfig, CouchCredentials},
    error::{CouchDaoError, CouchResult},
    models::{CouchRoomDocument, PutResponse, put_revision, room_doc_id},
};

/// CouchDB-backed room store; `_rev` provides the compare-and-swap.
#[derive(Clone)]
pub struct CouchRoomStore {
    inner: Arc<CouchInner>,
}

struct CouchInner {
    client: Client,
    database_url: String,
    credentials: Option<CouchCredentials>,
}

impl CouchRoomStore {
    /// Build the HTTP client and make sure the room database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let store = Self {
            inner: Arc::new(CouchInner {
                client,
                database_url: format!("{}/{}", config.base_url, config.database),
                credentials: config.credentials,
            }),
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn with_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.inner.credentials {
            Some(creds) => builder.basic_auth(&creds.username, Some(&creds.password)),
            None => builder,
        }
    }

    fn document_url(&self, doc_id: &str) -> String {
        format!("{}/{}", self.inner.database_url, doc_id)
    }

    async fn send(&self, builder: RequestBuilder, target: &str) -> CouchResult<Response> {
        self.with_auth(builder)
            .send()
            .await
            .map_err(CouchDaoError::transport(target))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let url = self.inner.database_url.as_str();
        let lookup = self.send(self.inner.client.get(url), url).await?;

        match lookup.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let created = self.send(self.inner.client.put(url), url).await?;
                // 412: another instance created it first.
                match created.status() {
                    status if status.is_success() => {
                        info!(database = url, "created CouchDB room database");
                        Ok(())
                    }
                    StatusCode::PRECONDITION_FAILED => Ok(()),
                    status => Err(CouchDaoError::UnexpectedStatus {
                        target: url.to_owned(),
                        status,
                    }),
                }
            }
            status => Err(CouchDaoError::UnexpectedStatus {
                target: url.to_owned(),
                status,
            }),
        }
    }

    async fn get_document<T: DeserializeOwned>(&self, doc_id: &str) -> CouchResult<Option<T>> {
        let url = self.document_url(doc_id);
        let response = self.send(self.inner.client.get(&url), &url).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = response.bytes().await.map_err(CouchDaoError::transport(&url))?;
                serde_json::from_slice::<T>(&body).map(Some).map_err(|source| {
                    CouchDaoError::CorruptedDocument {
                        doc_id: doc_id.to_owned(),
                        source,
                    }
                })
            }
            status => Err(CouchDaoError::UnexpectedStatus {
                target: url,
                status,
            }),
        }
    }

    async fn put_document(&self, document: &CouchRoomDocument) -> CouchResult<String> {
        let url = self.document_url(&document.id);
        let response = self
            .send(self.inner.client.put(&url).json(document), &url)
            .await?;

        match response.status() {
            StatusCode::CONFLICT => Err(CouchDaoError::RevisionConflict {
                doc_id: document.id.clone(),
            }),
            status if status.is_success() => response
                .json::<PutResponse>()
                .await
                .map(|body| body.rev)
                .map_err(CouchDaoError::decode(&url)),
            status => Err(CouchDaoError::UnexpectedStatus {
                target: url,
                status,
            }),
        }
    }

    async fn load(&self, code: &str) -> CouchResult<Option<StoredRoom>> {
        let document = self
            .get_document::<CouchRoomDocument>(&room_doc_id(code))
            .await?;
        Ok(document.map(|doc| StoredRoom {
            room: doc.room,
            revision: Revision(doc.rev.unwrap_or_default()),
        }))
    }

    async fn write(&self, room: RoomEntity, condition: WriteCondition) -> CouchResult<Revision> {
        let rev = put_revision(condition);
        let document = CouchRoomDocument::from((room, rev));
        self.put_document(&document).await.map(Revision)
    }

    async fn ping(&self) -> CouchResult<()> {
        let url = self.inner.database_url.as_str();
        let response = self.send(self.inner.client.get(url), url).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::UnexpectedStatus {
                target: url.to_owned(),
                status: response.status(),
            })
        }
    }
}

impl RoomStore for CouchRoomStore {
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
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
