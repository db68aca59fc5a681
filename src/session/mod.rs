//! Firewall session lifecycle
//!
//! A [`FirewallSession`] owns one tunnel device handle and one
//! [`SessionStats`] instance for the duration of a run, bounded by
//! [`FirewallSession::start`] and [`FirewallSession::stop`].
//!
//! # State machine
//!
//! ```text
//! Idle -> Establishing -> Running -> Stopping -> Stopped
//!                            |
//!                            +-----> Stopped   (unrecoverable I/O failure)
//! ```
//!
//! # Concurrency
//!
//! One dedicated worker thread per running session executes the forwarding
//! loop; all packet reads and writes block that thread only. `start()` and
//! `stop()` are serialized by a control lock and never contend with the
//! worker. Observers read counters through atomic snapshots or the `watch`
//! broadcasts; none of these can block the worker.
//!
//! `stop()` sets the stop flag and closes the device handle, which
//! interrupts the blocking read; the handle is closed exactly once even
//! under concurrent `stop()` calls.

mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::TunnelConfig;
use crate::error::{SessionError, TunnelError};
use crate::rules::RuleEngine;
use crate::stats::{SessionStats, StatsSnapshot};
use crate::tun::{TunnelDevice, TunnelProvider};

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No session has run yet
    Idle,
    /// A tunnel device is being requested from the platform
    Establishing,
    /// The worker is processing packets
    Running,
    /// A stop was requested; the worker is winding down
    Stopping,
    /// The session ended; the device handle is released
    Stopped,
}

/// Point-in-time session status, broadcast to observers on every transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Current lifecycle state
    pub state: SessionState,
    /// Error that terminated the session, if it failed
    pub error: Option<String>,
}

impl SessionStatus {
    const fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            error: None,
        }
    }
}

/// State shared between the session handle and its worker thread
pub(crate) struct SessionShared {
    state: Mutex<SessionState>,
    pub(crate) stop_requested: AtomicBool,
    pub(crate) stats: SessionStats,
    device: Mutex<Option<Arc<dyn TunnelDevice>>>,
    status_tx: watch::Sender<SessionStatus>,
    stats_tx: watch::Sender<StatsSnapshot>,
}

impl SessionShared {
    fn set_state(&self, state: SessionState, err: Option<String>) {
        // The broadcast happens under the lock so observers never see the
        // status channel and the state disagree
        let mut guard = self.state.lock();
        *guard = state;
        self.status_tx.send_replace(SessionStatus { state, error: err });
    }

    /// Transition `Running -> Stopping`
    ///
    /// The check and the write share one lock acquisition: a worker that
    /// already reached `Stopped` keeps its terminal state.
    fn begin_stop(&self) {
        let mut guard = self.state.lock();
        if *guard != SessionState::Running {
            return;
        }
        *guard = SessionState::Stopping;
        self.status_tx.send_replace(SessionStatus {
            state: SessionState::Stopping,
            error: None,
        });
    }

    pub(crate) fn publish_stats(&self) {
        self.stats_tx.send_replace(self.stats.snapshot());
    }

    /// Release the device handle; idempotent via the device's own close
    fn release_device(&self) {
        if let Some(device) = self.device.lock().take() {
            device.close();
        }
    }
}

/// One run of the forwarding loop, exposed to the host as an explicit
/// session object with `start`/`stop`/`snapshot` methods
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tun_firewall::config::TunnelConfig;
/// use tun_firewall::rules::RuleEngine;
/// use tun_firewall::session::FirewallSession;
/// use tun_firewall::tun::MemoryTunnelProvider;
///
/// let session = FirewallSession::new(
///     TunnelConfig::default(),
///     Arc::new(MemoryTunnelProvider::new()),
///     Arc::new(RuleEngine::with_defaults()),
/// );
///
/// session.start().unwrap();
/// assert!(session.is_running());
/// session.stop();
/// ```
pub struct FirewallSession {
    config: TunnelConfig,
    provider: Arc<dyn TunnelProvider>,
    engine: Arc<RuleEngine>,
    shared: Arc<SessionShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Serializes start/stop; never held by the worker
    control: Mutex<()>,
    // Keep the channels alive while no external observer subscribes
    _status_rx: watch::Receiver<SessionStatus>,
    _stats_rx: watch::Receiver<StatsSnapshot>,
}

impl FirewallSession {
    /// Create a session in the `Idle` state
    ///
    /// The host controls construction and disposal; nothing is global.
    #[must_use]
    pub fn new(
        config: TunnelConfig,
        provider: Arc<dyn TunnelProvider>,
        engine: Arc<RuleEngine>,
    ) -> Self {
        let (status_tx, status_rx) = watch::channel(SessionStatus::idle());
        let (stats_tx, stats_rx) = watch::channel(StatsSnapshot::default());

        Self {
            config,
            provider,
            engine,
            shared: Arc::new(SessionShared {
                state: Mutex::new(SessionState::Idle),
                stop_requested: AtomicBool::new(false),
                stats: SessionStats::new(),
                device: Mutex::new(None),
                status_tx,
                stats_tx,
            }),
            worker: Mutex::new(None),
            control: Mutex::new(()),
            _status_rx: status_rx,
            _stats_rx: stats_rx,
        }
    }

    /// Start a new session
    ///
    /// Valid only from `Idle` or `Stopped`. Establishes a tunnel device,
    /// resets the counters, and launches the worker thread. The caller never
    /// blocks on packet I/O.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AlreadyRunning`] when called outside `Idle`/`Stopped`
    /// - [`SessionError::Establishment`] when the platform refuses the
    ///   interface; the session stays in its previous state
    pub fn start(&self) -> Result<(), SessionError> {
        let _control = self.control.lock();

        let previous = *self.shared.state.lock();
        match previous {
            SessionState::Idle | SessionState::Stopped => {}
            SessionState::Stopping => return Err(SessionError::Stopping),
            SessionState::Establishing | SessionState::Running => {
                return Err(SessionError::AlreadyRunning)
            }
        }

        self.shared.set_state(SessionState::Establishing, None);
        debug!(address = %self.config.address, "establishing tunnel device");

        let device = match self.provider.establish(&self.config) {
            Ok(device) => device,
            Err(e) => {
                // Stay where we were; restarting requires an explicit start()
                self.shared.set_state(previous, Some(e.to_string()));
                warn!(error = %e, "tunnel establishment failed");
                return Err(SessionError::Establishment(e));
            }
        };

        self.shared.stats.reset();
        self.shared.stop_requested.store(false, Ordering::Release);
        *self.shared.device.lock() = Some(Arc::clone(&device));
        self.shared.publish_stats();
        self.shared.set_state(SessionState::Running, None);

        let shared = Arc::clone(&self.shared);
        let engine = Arc::clone(&self.engine);
        let handle = std::thread::Builder::new()
            .name("tun-firewall-worker".into())
            .spawn(move || {
                let result = worker::run(&device, &engine, &shared);
                shared.release_device();
                match result {
                    Ok(()) => {
                        info!("forwarding loop stopped");
                        shared.set_state(SessionState::Stopped, None);
                    }
                    Err(e) => {
                        error!(error = %e, "forwarding loop failed");
                        shared.set_state(SessionState::Stopped, Some(e.to_string()));
                    }
                }
                shared.publish_stats();
            });

        match handle {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
                info!("session started");
                Ok(())
            }
            Err(e) => {
                self.shared.release_device();
                self.shared.set_state(previous, Some(e.to_string()));
                Err(SessionError::Establishment(TunnelError::establishment(
                    format!("failed to spawn worker: {e}"),
                )))
            }
        }
    }

    /// Stop the running session
    ///
    /// Sets the stop flag, closes the device handle to interrupt the
    /// blocking read, and joins the worker. A no-op when no session is
    /// running; calling it twice leaves the session in `Stopped` with the
    /// handle released exactly once.
    pub fn stop(&self) {
        let _control = self.control.lock();

        self.shared.begin_stop();
        self.shared.stop_requested.store(true, Ordering::Release);
        self.shared.release_device();

        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!("worker thread panicked");
                self.shared.set_state(SessionState::Stopped, None);
            }
            info!("session stopped");
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.shared.state.lock()
    }

    /// Whether the forwarding loop is active
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Consistent point-in-time copy of the session counters
    #[must_use]
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Subscribe to status transitions (state changes and terminal errors)
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Subscribe to the stats broadcast published after each processed packet
    ///
    /// Readers never block the worker; each receiver sees the latest
    /// snapshot.
    #[must_use]
    pub fn subscribe_stats(&self) -> watch::Receiver<StatsSnapshot> {
        self.shared.stats_tx.subscribe()
    }

    /// The rule engine this session evaluates packets against
    #[must_use]
    pub fn engine(&self) -> &Arc<RuleEngine> {
        &self.engine
    }
}

impl Drop for FirewallSession {
    fn drop(&mut self) {
        self.stop();
    }
}
