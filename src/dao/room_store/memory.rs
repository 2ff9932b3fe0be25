//! Process-local room store used for development and tests.
//!
//! It is not an authority shared between processes; production deployments use
//! one of the external backends.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;

use crate::dao::{
    models::RoomEntity,
    room_store::{Revision, RoomStore, StoredRoom, WriteCondition},
    storage::{StorageError, StorageResult},
};

#[derive(Clone)]
pub struct MemoryRoomStore {
    rooms: Arc<DashMap<String, (RoomEntity, u64)>>,
    conditional: bool,
    offline: Arc<AtomicBool>,
}

impl Default for MemoryRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRoomStore {
    /// Store honouring write conditions with a per-key compare-and-swap.
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            conditional: true,
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Store ignoring write conditions, like a plain blob store.
    pub fn last_writer_wins() -> Self {
        Self {
            conditional: false,
            ..Self::new()
        }
    }

    /// Simulate an outage: every call fails with [`StorageError::Unavailable`] while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Current stored record for `code`, bypassing revisions.
    pub fn get(&self, code: &str) -> Option<RoomEntity> {
        self.rooms.get(code).map(|entry| entry.0.clone())
    }

    fn ensure_online(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StorageError::unavailable(
                "memory store offline".into(),
                io::Error::new(io::ErrorKind::NotConnected, "offline"),
            ))
        } else {
            Ok(())
        }
    }

    fn load(&self, code: &str) -> StorageResult<Option<StoredRoom>> {
        self.ensure_online()?;
        Ok(self.rooms.get(code).map(|entry| StoredRoom {
            room: entry.0.clone(),
            revision: Revision(entry.1.to_string()),
        }))
    }

    fn write(&self, room: RoomEntity, condition: WriteCondition) -> StorageResult<Revision> {
        self.ensure_online()?;
        let key = room.code.clone();
        let condition = if self.conditional {
            condition
        } else {
            WriteCondition::Unconditional
        };

        let next = match (self.rooms.entry(key.clone()), condition) {
            (Entry::Vacant(slot), WriteCondition::Absent | WriteCondition::Unconditional) => {
                slot.insert((room, 1));
                1
            }
            (Entry::Occupied(mut slot), WriteCondition::Revision(expected))
                if slot.get().1.to_string() == expected.0 =>
            {
                let next = slot.get().1 + 1;
                slot.insert((room, next));
                next
            }
            (Entry::Occupied(mut slot), WriteCondition::Unconditional) => {
                let next = slot.get().1 + 1;
                slot.insert((room, next));
                next
            }
            _ => return Err(StorageError::conflict(key)),
        };

        Ok(Revision(next.to_string()))
    }
}

impl RoomStore for MemoryRoomStore {
    fn load_room(&self, code: &str) -> BoxFuture<'static, StorageResult<Option<StoredRoom>>> {
        let store = self.clone();
        let code = code.to_owned();
        Box::pin(async move { store.load(&code) })
    }

    fn store_room(
        &self,
        room: RoomEntity,
        condition: WriteCondition,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move { store.write(room, condition) })
    }

    fn supports_conditional_writes(&self) -> bool {
        self.conditional
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_online() })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_online() })
    }
}
