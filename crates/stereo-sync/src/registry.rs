//! Process-wide lookup of live pair sessions
//!
//! The two decoder instances of a stereo stream are created independently.
//! Each registers with the same [`PairId`] and its role; the registry hands
//! both a [`SessionHandle`] onto one shared [`PairSession`]. Dropping or
//! finalizing either handle tears the session down and removes it, after
//! which the id can be registered again from scratch.
//!
//! ## Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use stereo_sync::{global_registry, Outcome, PairId, Role};
//!
//! let handle = global_registry().register(PairId(1), Role::Base).unwrap();
//!
//! // Per frame, input side
//! handle.publish_input(Some(Duration::from_millis(40))).unwrap();
//! match handle.wait_input() {
//!     Outcome::Matched | Outcome::Unpaired => { /* submit to decoder */ }
//!     _ => { /* skip this frame */ }
//! }
//!
//! handle.finalize();
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use crate::config::{default_config_path, load_config, SyncConfig};
use crate::error::SyncResult;
use crate::session::PairSession;
use crate::stats::SideStatsSnapshot;
use crate::sync::lock;
use crate::types::{Direction, Outcome, PairId, Rendezvous, Role, SessionState};

/// Process-wide registry, configured from the default config file
static GLOBAL_REGISTRY: OnceLock<PairRegistry> = OnceLock::new();

/// Get the process-wide registry
///
/// Initialized on first use with the config at
/// [`default_config_path`](crate::config::default_config_path), or defaults.
pub fn global_registry() -> &'static PairRegistry {
    GLOBAL_REGISTRY.get_or_init(|| PairRegistry::new(load_config(&default_config_path())))
}

struct RegistryInner {
    sessions: Mutex<HashMap<PairId, Arc<PairSession>>>,
    config: SyncConfig,
}

/// Association from stream-pair identity to its live session
#[derive(Clone)]
pub struct PairRegistry {
    inner: Arc<RegistryInner>,
}

impl PairRegistry {
    /// Create a registry whose sessions use `config`
    pub fn new(config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: Mutex::new(HashMap::new()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Attach a decoder instance to the session for `pair`
    ///
    /// Creates the session on first registration. Fails with
    /// [`SyncError::RoleTaken`](crate::SyncError::RoleTaken) if a live
    /// instance already holds `role`.
    pub fn register(&self, pair: PairId, role: Role) -> SyncResult<SessionHandle> {
        let mut sessions = lock(&self.inner.sessions);

        let session = match sessions.get(&pair) {
            Some(session) if !session.is_torn_down() => Arc::clone(session),
            _ => {
                let session = Arc::new(PairSession::new(pair, self.inner.config.clone()));
                sessions.insert(pair, Arc::clone(&session));
                log::info!("[REGISTRY] Created session for {} ({} live)", pair, sessions.len());
                session
            }
        };
        session.attach(role)?;

        Ok(SessionHandle {
            session,
            role,
            registry: Arc::downgrade(&self.inner),
            finalized: AtomicBool::new(false),
        })
    }

    /// Whether a live session exists for `pair`
    pub fn contains(&self, pair: PairId) -> bool {
        lock(&self.inner.sessions).contains_key(&pair)
    }

    /// State of a registered pair, `None` once it was finalized or never existed
    pub fn session_state(&self, pair: PairId) -> Option<SessionState> {
        lock(&self.inner.sessions).get(&pair).map(|session| session.state())
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One decoder instance's access to its pair session
///
/// Dropping the handle finalizes it.
pub struct SessionHandle {
    session: Arc<PairSession>,
    role: Role,
    registry: Weak<RegistryInner>,
    finalized: AtomicBool,
}

impl SessionHandle {
    pub fn pair(&self) -> PairId {
        self.session.pair()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &Arc<PairSession> {
        &self.session
    }

    /// Publish this frame's decode timestamp (`None` if unknown)
    pub fn publish_input(&self, dts: Option<Duration>) -> SyncResult<()> {
        self.session.publish(self.role, Direction::Input, dts)
    }

    /// Publish this frame's presentation timestamp (`None` if unknown)
    pub fn publish_output(&self, pts: Option<Duration>) -> SyncResult<()> {
        self.session.publish(self.role, Direction::Output, pts)
    }

    /// Decide whether the current frame may be submitted to the decoder
    pub fn wait_input(&self) -> Outcome {
        self.session.rendezvous(self.role, Direction::Input, None).outcome
    }

    /// Decide whether the current frame may be released for display
    pub fn wait_output(&self) -> Outcome {
        self.session.rendezvous(self.role, Direction::Output, None).outcome
    }

    /// Like [`wait_output`](Self::wait_output), also handing `carry` to the
    /// peer and receiving the peer's carried value on a match
    pub fn exchange_output(&self, carry: Option<Duration>) -> Rendezvous {
        self.session.rendezvous(self.role, Direction::Output, carry)
    }

    /// Input-direction counterpart of [`exchange_output`](Self::exchange_output)
    pub fn exchange_input(&self, carry: Option<Duration>) -> Rendezvous {
        self.session.rendezvous(self.role, Direction::Input, carry)
    }

    pub fn notify_flush_start(&self) -> SyncResult<()> {
        self.session.flush_start(self.role)
    }

    pub fn notify_flush_stop(&self) -> SyncResult<()> {
        self.session.flush_stop(self.role)
    }

    pub fn notify_eos(&self) -> SyncResult<()> {
        self.session.eos(self.role)
    }

    pub fn notify_push_aborted(&self) -> SyncResult<()> {
        self.session.push_aborted(self.role)
    }

    /// This side's outcome counters
    pub fn stats(&self) -> SideStatsSnapshot {
        self.session.stats(self.role)
    }

    /// Tear the session down and leave the registry
    ///
    /// Idempotent. Any thread blocked on the session wakes with `Aborted`.
    pub fn finalize(&self) {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return;
        }

        self.session.tear_down(self.role);

        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let pair = self.session.pair();
        let mut sessions = lock(&registry.sessions);
        if sessions
            .get(&pair)
            .is_some_and(|live| Arc::ptr_eq(live, &self.session))
        {
            sessions.remove(&pair);
            log::info!("[REGISTRY] Removed session for {} ({} live)", pair, sessions.len());
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.finalize();
    }
}
