use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{room_store::RoomStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Keep a room store installed in the shared state, entering degraded mode
/// whenever the backend cannot be reached.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn RoomStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        let store = match connect().await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "room store connection attempt failed");
                sleep(delay).await;
                delay = next_delay(delay);
                continue;
            }
        };

        state.set_room_store(store.clone()).await;
        info!("room store connected; leaving degraded mode");
        delay = INITIAL_DELAY;

        watch_store(&state, store.as_ref()).await;

        warn!("room store lost; dropping it and reconnecting from scratch");
        state.clear_room_store().await;
        sleep(delay).await;
        delay = next_delay(delay);
    }
}

/// Poll `store` until it fails and cannot be revived in place.
async fn watch_store(state: &SharedState, store: &dyn RoomStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded().await {
                    info!("room store healthy again; leaving degraded mode");
                    state.update_degraded(false).await;
                }
            }
            Err(err) => {
                warn!(error = %err, "room store health check failed");
                if !reconnect(state, store).await {
                    return;
                }
                state.update_degraded(false).await;
            }
        }
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

/// Retry [`RoomStore::try_reconnect`] with backoff. Degraded mode is entered on
/// the first failure and left to the caller to clear on success.
async fn reconnect(state: &SharedState, store: &dyn RoomStore) -> bool {
    let mut delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "room store reconnected");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(attempt, error = %err, "room store reconnect failed; entering degraded mode");
                    state.update_degraded(true).await;
                } else {
                    warn!(attempt, error = %err, "room store reconnect failed");
                }
                sleep(delay).await;
                delay = next_delay(delay);
            }
        }
    }
    warn!("exhausted room store reconnect attempts; staying in degraded mode");
    false
}

fn next_delay(delay: Duration) -> Duration {
    (delay * 2).min(MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, dao::room_store::memory::MemoryRoomStore, state::AppState};

    #[tokio::test(start_paused = true)]
    async fn installs_store_and_tracks_outages() {
        let state = AppState::new(AppConfig::default());
        let store = MemoryRoomStore::new();
        let handle = {
            let store = store.clone();
            tokio::spawn(run(state.clone(), move || {
                let store = store.clone();
                async move { Ok(Arc::new(store) as Arc<dyn RoomStore>) }
            }))
        };

        sleep(Duration::from_millis(10)).await;
        assert!(!state.is_degraded().await);
        assert!(state.require_room_store().await.is_ok());

        store.set_offline(true);
        sleep(HEALTH_POLL_INTERVAL + Duration::from_millis(10)).await;
        assert!(state.is_degraded().await);

        store.set_offline(false);
        sleep(MAX_DELAY * 4).await;
        assert!(!state.is_degraded().await);

        handle.abort();
    }
}
