//! Room lifecycle operations run against the shared room store.
//!
//! Every mutation is a load -> validate -> write cycle against the freshly
//! loaded record. On backends with conditional writes the write only succeeds
//! if the record is still at the revision that was read; otherwise the whole
//! cycle is retried, up to the configured bound, before reporting a conflict.
//!
//! Backends without conditional writes (the file store) get a single load and a
//! single write with nothing in between. Creation stays exclusive there, but two
//! requests mutating the same room at the same moment can overwrite each other:
//! the last write wins and the other request's join or score is lost even though
//! it was acknowledged.

use std::{sync::Arc, time::Duration};

use rand::Rng;
use time::OffsetDateTime;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::{
    dao::{
        models::RoomEntity,
        room_store::{RoomStore, StoredRoom, WriteCondition},
        storage::StorageError,
    },
    error::ServiceError,
    state::{
        SharedState,
        room::{Mutation, Room, RoomCode, RoomError},
        state_machine::RoomStatus,
    },
};

const BASE_RETRY_DELAY_MS: u64 = 10;
const MAX_RETRY_DELAY_MS: u64 = 200;

/// Create a room hosted by `host`; fails if the code is already in use.
pub async fn create_room(
    state: &SharedState,
    code: &str,
    host: &str,
    name: Option<&str>,
) -> Result<Room, ServiceError> {
    let code = RoomCode::parse(code)?;
    let name = match name {
        Some(name) => name.to_owned(),
        None => state.config().default_room_name(host),
    };
    let room = Room::create(code.clone(), host, &name)?;

    let store = state.require_room_store().await?;
    let limit = state.config().store_timeout();

    if !store.supports_conditional_writes() && load(&*store, &code, limit).await?.is_some() {
        return Err(ServiceError::AlreadyExists(code.to_string()));
    }

    let written = bounded(limit, store.store_room(room.clone().into(), WriteCondition::Absent))
        .await?;
    match written {
        Ok(_) => {
            info!(code = %code, host = %room.host(), "room created");
            Ok(room)
        }
        Err(err) if err.is_conflict() => Err(ServiceError::AlreadyExists(code.to_string())),
        Err(err) => Err(err.into()),
    }
}

/// Add `player` to a waiting room. Re-joining under the same name is a no-op.
pub async fn join_room(state: &SharedState, code: &str, player: &str) -> Result<Room, ServiceError> {
    let code = RoomCode::parse(code)?;
    let room = mutate_room(state, &code, |room, _now| room.join(player)).await?;
    debug!(code = %code, player, players = room.players().len(), "player joined");
    Ok(room)
}

/// Start play; only the host may do this.
pub async fn start_room(
    state: &SharedState,
    code: &str,
    requester: &str,
) -> Result<Room, ServiceError> {
    let code = RoomCode::parse(code)?;
    let rules = *state.config().rules();
    let room = mutate_room(state, &code, |room, now| room.start(requester, &rules, now)).await?;
    info!(code = %code, players = room.players().len(), "room started");
    Ok(room)
}

/// Record `player`'s score, finishing the room when it was the last one missing.
pub async fn submit_score(
    state: &SharedState,
    code: &str,
    player: &str,
    score: f64,
) -> Result<Room, ServiceError> {
    let code = RoomCode::parse(code)?;
    let rules = *state.config().rules();
    let room = mutate_room(state, &code, |room, now| {
        room.submit_score(player, score, &rules, now)
    })
    .await?;

    if room.status() == RoomStatus::Finished {
        info!(code = %code, "all players submitted; room finished");
    } else {
        debug!(code = %code, player, score, "score recorded");
    }
    Ok(room)
}

/// Read the current state of a room without modifying it.
pub async fn get_room(state: &SharedState, code: &str) -> Result<Room, ServiceError> {
    let code = RoomCode::parse(code)?;
    let store = state.require_room_store().await?;
    let stored = load(&*store, &code, state.config().store_timeout())
        .await?
        .ok_or_else(|| ServiceError::NotFound(code.to_string()))?;
    restore(&code, stored)
}

/// Run one optimistic load/apply/write cycle, retrying on revision conflicts.
async fn mutate_room<F>(
    state: &SharedState,
    code: &RoomCode,
    mut apply: F,
) -> Result<Room, ServiceError>
where
    F: FnMut(&mut Room, OffsetDateTime) -> Result<Mutation, RoomError>,
{
    let store: Arc<dyn RoomStore> = state.require_room_store().await?;
    let limit = state.config().store_timeout();
    let conditional = store.supports_conditional_writes();
    let max_attempts = if conditional {
        state.config().max_write_attempts()
    } else {
        1
    };

    for attempt in 1..=max_attempts {
        let stored = load(&*store, code, limit)
            .await?
            .ok_or_else(|| ServiceError::NotFound(code.to_string()))?;
        let revision = stored.revision.clone();
        let mut room = restore(code, stored)?;

        if apply(&mut room, OffsetDateTime::now_utc())? == Mutation::Unchanged {
            return Ok(room);
        }

        let condition = if conditional {
            WriteCondition::Revision(revision)
        } else {
            debug!(code = %code, "backend has no conditional writes; last writer wins");
            WriteCondition::Unconditional
        };

        let entity = RoomEntity::from(room.clone());
        match bounded(limit, store.store_room(entity, condition)).await? {
            Ok(_) => return Ok(room),
            Err(StorageError::Conflict { .. }) if attempt < max_attempts => {
                let delay = retry_delay(attempt);
                debug!(code = %code, attempt, ?delay, "room changed since it was read; retrying");
                sleep(delay).await;
            }
            Err(StorageError::Conflict { .. }) => break,
            Err(err) => return Err(err.into()),
        }
    }

    warn!(code = %code, attempts = max_attempts, "giving up after repeated write conflicts");
    Err(ServiceError::Conflict {
        code: code.to_string(),
        attempts: max_attempts,
    })
}

async fn load(
    store: &dyn RoomStore,
    code: &RoomCode,
    limit: Duration,
) -> Result<Option<StoredRoom>, ServiceError> {
    Ok(bounded(limit, store.load_room(code.as_str())).await??)
}

/// Await a storage call, turning an elapsed timeout into [`ServiceError::Timeout`].
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, StorageError>>,
) -> Result<Result<T, StorageError>, ServiceError> {
    timeout(limit, call).await.map_err(|_| {
        warn!(?limit, "storage call timed out");
        ServiceError::Timeout
    })
}

fn restore(code: &RoomCode, stored: StoredRoom) -> Result<Room, ServiceError> {
    if stored.room.code != code.as_str() {
        error!(code = %code, stored = %stored.room.code, "record stored under another room's key");
        return Err(ServiceError::Room(RoomError::CorruptedRecord {
            code: code.to_string(),
            reason: format!("record holds room `{}`", stored.room.code),
        }));
    }
    Room::try_from(stored.room).map_err(|err| {
        error!(code = %code, error = %err, "refusing to operate on a corrupted room record");
        ServiceError::from(err)
    })
}

/// Exponential backoff with full jitter so racing writers spread out.
fn retry_delay(attempt: u32) -> Duration {
    let ceiling = BASE_RETRY_DELAY_MS
        .saturating_mul(1 << attempt.saturating_sub(1).min(8))
        .min(MAX_RETRY_DELAY_MS);
    Duration::from_millis(rand::rng().random_range(0..=ceiling))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    use futures::future::BoxFuture;
    use tokio::sync::Barrier;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            room_store::{Revision, file::FileRoomStore, memory::MemoryRoomStore},
            storage::StorageResult,
        },
        state::{AppState, leaderboard::Standing, room::RoomRules},
    };

    fn scratch_dir() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("cat-battle-rooms-{}", uuid::Uuid::new_v4()))
    }

    async fn state_with(store: impl RoomStore + 'static) -> SharedState {
        AppState::with_store(AppConfig::default(), Arc::new(store)).await
    }

    async fn started_room(state: &SharedState, code: &str, players: &[&str]) {
        create_room(state, code, players[0], None).await.unwrap();
        for player in &players[1..] {
            join_room(state, code, player).await.unwrap();
        }
        start_room(state, code, players[0]).await.unwrap();
    }

    /// Holds the first two loads until both have read the same revision.
    struct GatedStore<S> {
        inner: S,
        barrier: Arc<Barrier>,
        loads: AtomicUsize,
    }

    impl<S: RoomStore> GatedStore<S> {
        fn new(inner: S) -> Self {
            Self {
                inner,
                barrier: Arc::new(Barrier::new(2)),
                loads: AtomicUsize::new(0),
            }
        }
    }

    impl<S: RoomStore> RoomStore for GatedStore<S> {
        fn load_room(&self, code: &str) -> BoxFuture<'static, StorageResult<Option<StoredRoom>>> {
            let load = self.inner.load_room(code);
            let gated = self.loads.fetch_add(1, Ordering::SeqCst) < 2;
            let barrier = self.barrier.clone();
            Box::pin(async move {
                let result = load.await;
                if gated {
                    barrier.wait().await;
                }
                result
            })
        }

        fn store_room(
            &self,
            room: RoomEntity,
            condition: WriteCondition,
        ) -> BoxFuture<'static, StorageResult<Revision>> {
            self.inner.store_room(room, condition)
        }

        fn supports_conditional_writes(&self) -> bool {
            self.inner.supports_conditional_writes()
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    /// Every conditional write loses the race.
    struct ContendedStore {
        inner: MemoryRoomStore,
        writes: Arc<AtomicU32>,
    }

    impl RoomStore for ContendedStore {
        fn load_room(&self, code: &str) -> BoxFuture<'static, StorageResult<Option<StoredRoom>>> {
            self.inner.load_room(code)
        }

        fn store_room(
            &self,
            room: RoomEntity,
            condition: WriteCondition,
        ) -> BoxFuture<'static, StorageResult<Revision>> {
            if matches!(condition, WriteCondition::Revision(_)) {
                self.writes.fetch_add(1, Ordering::SeqCst);
                let code = room.code.clone();
                return Box::pin(async move { Err(StorageError::conflict(code)) });
            }
            self.inner.store_room(room, condition)
        }

        fn supports_conditional_writes(&self) -> bool {
            true
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    /// Loads never complete.
    struct StalledStore;

    impl RoomStore for StalledStore {
        fn load_room(&self, _code: &str) -> BoxFuture<'static, StorageResult<Option<StoredRoom>>> {
            Box::pin(futures::future::pending())
        }

        fn store_room(
            &self,
            _room: RoomEntity,
            _condition: WriteCondition,
        ) -> BoxFuture<'static, StorageResult<Revision>> {
            Box::pin(futures::future::pending())
        }

        fn supports_conditional_writes(&self) -> bool {
            true
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn two_player_tournament_runs_to_completion() {
        let store = MemoryRoomStore::new();
        let state = state_with(store.clone()).await;
        started_room(&state, "AB12", &["A", "B"]).await;

        let room = submit_score(&state, "AB12", "A", 50.0).await.unwrap();
        assert_eq!(room.status(), RoomStatus::Started);

        let room = submit_score(&state, "AB12", "B", 80.0).await.unwrap();
        assert_eq!(room.status(), RoomStatus::Finished);
        assert!(room.finished_at().is_some());
        assert_eq!(
            room.leaderboard(),
            vec![
                Standing {
                    rank: 1,
                    name: "B".into(),
                    score: 80.0
                },
                Standing {
                    rank: 2,
                    name: "A".into(),
                    score: 50.0
                },
            ]
        );

        let persisted = store.get("AB12").unwrap();
        assert_eq!(persisted.status, RoomStatus::Finished);
        assert_eq!(persisted.played.values().filter(|p| **p).count(), 2);
    }

    #[tokio::test]
    async fn create_uses_default_name_and_rejects_second_create() {
        let state = state_with(MemoryRoomStore::new()).await;
        let room = create_room(&state, "CATS", "Mia", None).await.unwrap();
        assert_eq!(room.name(), "Mia's Cat Battle");

        let err = create_room(&state, "CATS", "Leo", Some("Other")).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyExists(code) if code == "CATS"));
        assert_eq!(get_room(&state, "CATS").await.unwrap().host(), "Mia");
    }

    #[tokio::test]
    async fn create_rejects_existing_code_on_blob_backend() {
        let state = state_with(MemoryRoomStore::last_writer_wins()).await;
        create_room(&state, "CATS", "Mia", None).await.unwrap();
        let err = create_room(&state, "CATS", "Leo", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn malformed_input_is_rejected_before_touching_storage() {
        let store = MemoryRoomStore::new();
        store.set_offline(true);
        let state = state_with(store).await;

        assert!(matches!(
            create_room(&state, "cats", "Mia", None).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            create_room(&state, "CATS", "Mia", Some("   ")).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let state = state_with(MemoryRoomStore::new()).await;
        assert!(matches!(
            join_room(&state, "NOPE", "Mia").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            get_room(&state, "NOPE").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn repeated_join_returns_same_players() {
        let state = state_with(MemoryRoomStore::new()).await;
        create_room(&state, "CATS", "Mia", None).await.unwrap();
        let first = join_room(&state, "CATS", "Leo").await.unwrap();
        let second = join_room(&state, "CATS", "Leo").await.unwrap();
        assert_eq!(first.players(), second.players());
        assert_eq!(second.players(), ["Mia", "Leo"]);
    }

    #[tokio::test]
    async fn late_join_is_invalid_state() {
        let state = state_with(MemoryRoomStore::new()).await;
        started_room(&state, "CATS", &["Mia", "Leo"]).await;
        for name in ["Zoe", "Leo"] {
            let err = join_room(&state, "CATS", name).await.unwrap_err();
            assert!(matches!(
                err,
                ServiceError::Room(RoomError::InvalidState { .. })
            ));
        }
    }

    #[tokio::test]
    async fn non_host_member_cannot_start() {
        let state = state_with(MemoryRoomStore::new()).await;
        create_room(&state, "CATS", "Mia", None).await.unwrap();
        join_room(&state, "CATS", "Leo").await.unwrap();

        let err = start_room(&state, "CATS", "Leo").await.unwrap_err();
        assert!(matches!(err, ServiceError::Room(RoomError::Forbidden { .. })));
        assert_eq!(
            get_room(&state, "CATS").await.unwrap().status(),
            RoomStatus::Waiting
        );
    }

    #[tokio::test]
    async fn start_respects_configured_minimum() {
        let config = AppConfig::default().with_rules(RoomRules {
            min_players: 3,
            ..RoomRules::default()
        });
        let state = AppState::with_store(config, Arc::new(MemoryRoomStore::new())).await;
        create_room(&state, "CATS", "Mia", None).await.unwrap();
        join_room(&state, "CATS", "Leo").await.unwrap();

        let err = start_room(&state, "CATS", "Mia").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Room(RoomError::InsufficientPlayers {
                required: 3,
                actual: 2
            })
        ));
    }

    #[tokio::test]
    async fn second_submission_leaves_record_untouched() {
        let store = MemoryRoomStore::new();
        let state = state_with(store.clone()).await;
        started_room(&state, "CATS", &["Mia", "Leo", "Zoe"]).await;
        submit_score(&state, "CATS", "Mia", 12.0).await.unwrap();
        let before = store.get("CATS").unwrap();

        let err = submit_score(&state, "CATS", "Mia", 99.0).await.unwrap_err();
        assert!(matches!(err, ServiceError::Room(RoomError::AlreadyPlayed { .. })));
        assert_eq!(store.get("CATS").unwrap(), before);
    }

    #[tokio::test]
    async fn concurrent_joins_are_both_kept_with_conditional_writes() {
        let inner = MemoryRoomStore::new();
        let state = state_with(GatedStore::new(inner.clone())).await;
        inner
            .store_room(
                Room::create(RoomCode::parse("CATS").unwrap(), "Mia", "Battle")
                    .unwrap()
                    .into(),
                WriteCondition::Absent,
            )
            .await
            .unwrap();

        let (leo, zoe) = tokio::join!(
            join_room(&state, "CATS", "Leo"),
            join_room(&state, "CATS", "Zoe")
        );
        leo.unwrap();
        zoe.unwrap();

        let players = inner.get("CATS").unwrap().players;
        assert_eq!(players.len(), 3);
        assert!(players.contains(&"Leo".to_string()));
        assert!(players.contains(&"Zoe".to_string()));
    }

    #[tokio::test]
    async fn concurrent_joins_on_blob_backend_may_lose_one() {
        let inner = MemoryRoomStore::last_writer_wins();
        let state = state_with(GatedStore::new(inner.clone())).await;
        inner
            .store_room(
                Room::create(RoomCode::parse("CATS").unwrap(), "Mia", "Battle")
                    .unwrap()
                    .into(),
                WriteCondition::Unconditional,
            )
            .await
            .unwrap();

        let (leo, zoe) = tokio::join!(
            join_room(&state, "CATS", "Leo"),
            join_room(&state, "CATS", "Zoe")
        );
        leo.unwrap();
        zoe.unwrap();

        // Both calls were acknowledged; without a revision check only the last
        // write is guaranteed to survive.
        let room = Room::try_from(inner.get("CATS").unwrap()).unwrap();
        assert!(room.players().len() >= 2);
        assert_eq!(room.players()[0], "Mia");
    }

    #[tokio::test]
    async fn exhausted_retries_report_conflict() {
        let inner = MemoryRoomStore::new();
        let writes = Arc::new(AtomicU32::new(0));
        let store = ContendedStore {
            inner: inner.clone(),
            writes: writes.clone(),
        };
        let config = AppConfig::default().with_max_write_attempts(3);
        let state = AppState::with_store(config, Arc::new(store)).await;
        create_room(&state, "CATS", "Mia", None).await.unwrap();

        let err = join_room(&state, "CATS", "Leo").await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict { attempts: 3, .. }));
        assert_eq!(writes.load(Ordering::SeqCst), 3);
        assert_eq!(inner.get("CATS").unwrap().players, ["Mia"]);
    }

    #[tokio::test]
    async fn slow_store_times_out_without_retry() {
        let config = AppConfig::default().with_store_timeout(Duration::from_millis(20));
        let state = AppState::with_store(config, Arc::new(StalledStore)).await;
        let err = get_room(&state, "CATS").await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn offline_store_is_unavailable() {
        let store = MemoryRoomStore::new();
        let state = state_with(store.clone()).await;
        store.set_offline(true);
        assert!(matches!(
            get_room(&state, "CATS").await,
            Err(ServiceError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn degraded_mode_rejects_requests() {
        let state = AppState::new(AppConfig::default());
        assert!(matches!(
            get_room(&state, "CATS").await,
            Err(ServiceError::Degraded)
        ));
    }

    #[tokio::test]
    async fn corrupted_record_is_never_rewritten() {
        let store = MemoryRoomStore::new();
        let state = state_with(store.clone()).await;
        let mut entity: RoomEntity = Room::create(RoomCode::parse("CATS").unwrap(), "Mia", "B")
            .unwrap()
            .into();
        entity.played.clear();
        store
            .store_room(entity.clone(), WriteCondition::Absent)
            .await
            .unwrap();

        let err = join_room(&state, "CATS", "Leo").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Room(RoomError::CorruptedRecord { .. })
        ));
        assert_eq!(store.get("CATS").unwrap(), entity);
    }

    #[tokio::test]
    async fn concurrent_creates_on_file_backend_keep_exactly_one_host() {
        let root = scratch_dir();
        let files = FileRoomStore::open(&root).await.unwrap();
        let state = state_with(GatedStore::new(files.clone())).await;

        let (mia, leo) = tokio::join!(
            create_room(&state, "CATS", "Mia", None),
            create_room(&state, "CATS", "Leo", None)
        );

        let (winner, loser) = match (mia, leo) {
            (Ok(room), Err(err)) | (Err(err), Ok(room)) => (room, err),
            other => panic!("expected exactly one create to succeed, got {other:?}"),
        };
        assert!(matches!(loser, ServiceError::AlreadyExists(code) if code == "CATS"));

        let persisted = files.load_room("CATS").await.unwrap().unwrap();
        assert_eq!(persisted.room.host, winner.host());
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn unreadable_blob_is_an_internal_error() {
        let root = scratch_dir();
        let files = FileRoomStore::open(&root).await.unwrap();
        std::fs::write(root.join("CATS.json"), b"{ not json").unwrap();
        let state = state_with(files).await;

        let err = get_room(&state, "CATS").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Room(RoomError::CorruptedRecord { ref code, .. }) if code == "CATS"
        ));
        assert_eq!(err.kind(), "internal");
        assert!(!err.is_transient());

        let err = submit_score(&state, "CATS", "Mia", 1.0).await.unwrap_err();
        assert!(matches!(err, ServiceError::Room(RoomError::CorruptedRecord { .. })));
        assert_eq!(
            std::fs::read(root.join("CATS.json")).unwrap(),
            b"{ not json".to_vec()
        );
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn record_under_wrong_key_is_rejected_and_not_copied() {
        let root = scratch_dir();
        let files = FileRoomStore::open(&root).await.unwrap();
        let dogs: RoomEntity = Room::create(RoomCode::parse("DOGS").unwrap(), "Rex", "Dogs")
            .unwrap()
            .into();
        std::fs::write(root.join("CATS.json"), serde_json::to_vec(&dogs).unwrap()).unwrap();
        let state = state_with(files).await;

        let err = join_room(&state, "CATS", "Leo").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Room(RoomError::CorruptedRecord { ref code, .. }) if code == "CATS"
        ));
        assert!(!root.join("DOGS.json").exists());

        let err = get_room(&state, "CATS").await.unwrap_err();
        assert!(matches!(err, ServiceError::Room(RoomError::CorruptedRecord { .. })));
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn retry_delay_is_bounded() {
        for attempt in 1..20 {
            assert!(retry_delay(attempt) <= Duration::from_millis(MAX_RETRY_DELAY_MS));
        }
    }
}
