//! Session lifecycle: one isolated match instance per session, a registry
//! with a hard capacity cap, and deferred cleanup of idle empty sessions.
//!
//! Each session spawns one tokio task that is the sole driver of its Game's
//! fixed-tick loop. The registry has its own lock, separate from any Game's
//! lock, so lookups never contend with simulation ticks.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::game::constants::tick::TICK_DURATION_US;
use crate::game::game::Game;
use crate::game::match_state::{GameMode, MatchConfig};
use crate::net::protocol::SessionInfo;
use crate::store::MatchStore;

/// Default idle window before an empty session is torn down
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
/// Hard cap on concurrent sessions
pub const MAX_SESSIONS: usize = 100;

/// Session-level failures, rejected synchronously with no state mutated
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("too many active sessions")]
    RegistryFull,
    #[error("session not found")]
    NotFound,
    #[error("session full")]
    SessionFull,
}

/// Single-slot handle for the deferred cleanup task. Scheduling replaces any
/// pending task; cancellation is idempotent and safe after the task fired.
#[derive(Default)]
struct CleanupSlot {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CleanupSlot {
    /// Replace any pending cleanup with a new one
    fn schedule(&self, handle: JoinHandle<()>) {
        let mut slot = self.task.lock();
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
    }

    /// Cancel a pending cleanup, if any
    fn cancel(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

/// One isolated match instance
pub struct Session {
    pub id: Uuid,
    pub name: String,
    pub game: Arc<RwLock<Game>>,
    stop_tx: watch::Sender<bool>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
    cleanup: CleanupSlot,
}

impl Session {
    fn new(name: String, mode: GameMode) -> Arc<Self> {
        let game = Arc::new(RwLock::new(Game::new(MatchConfig::default_for(mode))));
        let (stop_tx, stop_rx) = watch::channel(false);

        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            name,
            game: game.clone(),
            stop_tx,
            loop_task: Mutex::new(None),
            cleanup: CleanupSlot::default(),
        });

        *session.loop_task.lock() = Some(spawn_game_loop(game, stop_rx));
        session
    }

    pub fn player_count(&self) -> usize {
        self.game.read().player_count()
    }

    /// Signal the tick loop to stop. One-shot; the loop observes it once per
    /// iteration and exits without leaving a partially-applied tick.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
        self.cleanup.cancel();
        // The loop task exits on its own after observing the signal
        drop(self.loop_task.lock().take());
    }
}

/// Run the fixed-tick loop until the stop signal flips
fn spawn_game_loop(game: Arc<RwLock<Game>>, mut stop_rx: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_micros(TICK_DURATION_US));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Each tick is atomic under the game's write lock
                    game.write().update();
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

/// Registry mapping session ids to running sessions
pub struct SessionRegistry {
    sessions: RwLock<hashbrown::HashMap<Uuid, Arc<Session>>>,
    max_sessions: usize,
    idle_timeout: Duration,
    store: Option<Arc<dyn MatchStore>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Self::with_limits(MAX_SESSIONS, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_limits(max_sessions: usize, idle_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(hashbrown::HashMap::new()),
            max_sessions,
            idle_timeout,
            store: None,
        })
    }

    pub fn with_store(
        max_sessions: usize,
        idle_timeout: Duration,
        store: Arc<dyn MatchStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(hashbrown::HashMap::new()),
            max_sessions,
            idle_timeout,
            store: Some(store),
        })
    }

    /// Create a session and start its tick loop. Fails synchronously when
    /// the registry is at capacity.
    pub fn create_session(&self, name: &str, mode: GameMode) -> Result<Arc<Session>, SessionError> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.max_sessions {
            return Err(SessionError::RegistryFull);
        }
        let session = Session::new(name.to_string(), mode);
        if let Some(store) = &self.store {
            session.game.write().set_store(store.clone());
        }
        info!(session = %session.id, name = %session.name, ?mode, "session created");
        sessions.insert(session.id, session.clone());
        Ok(session)
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.read().get(&id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Info rows for the session browser
    pub fn list(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .values()
            .map(|s| SessionInfo {
                id: s.id.to_string(),
                name: s.name.clone(),
                players: s.player_count(),
            })
            .collect()
    }

    /// Cancel any pending cleanup for a session (a player joined or is about
    /// to join)
    pub fn mark_active(&self, id: Uuid) {
        if let Some(session) = self.get(id) {
            session.cleanup.cancel();
        }
    }

    /// Remove a player; an emptied session gets a deferred cleanup that is
    /// cancelled if anyone joins before the idle timeout elapses
    pub fn remove_player(self: &Arc<Self>, session_id: Uuid, player_id: &str) {
        let Some(session) = self.get(session_id) else {
            return;
        };
        session.game.write().remove_player(player_id);

        if session.player_count() == 0 {
            self.schedule_cleanup(&session);
        }
    }

    fn schedule_cleanup(self: &Arc<Self>, session: &Arc<Session>) {
        let registry = Arc::downgrade(self);
        let session_id = session.id;
        let idle = self.idle_timeout;

        debug!(session = %session_id, "scheduling idle cleanup");
        let task = tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            let Some(registry) = registry.upgrade() else {
                return;
            };
            let Some(session) = registry.get(session_id) else {
                return;
            };
            // A player may have rejoined during the idle window
            if session.player_count() != 0 {
                return;
            }
            info!(session = %session_id, "removing idle empty session");
            session.stop();
            registry.sessions.write().remove(&session_id);
        });
        session.cleanup.schedule(task);
    }

    /// Stop every session (server shutdown)
    pub fn shutdown_all(&self) {
        let mut sessions = self.sessions.write();
        for session in sessions.values() {
            session.stop();
        }
        sessions.clear();
    }
}
