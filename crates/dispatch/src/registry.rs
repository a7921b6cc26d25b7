//! Key → transport registry.

use crate::session::SessionGuard;
use chrono::{DateTime, Utc};
use pulse_core::{ExecutionContext, ProgressKey, PulseConfig, RegistryConfig, SenderConfig, Transport};
use pulse_progress::ProgressTracker;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time::Instant;
use tracing::{debug, info};

/// Registry of open progress sessions.
///
/// Shared by `Arc`; every method takes `&self`.
pub struct Dispatcher {
    sessions: RwLock<HashMap<ProgressKey, Session>>,
    registry: RegistryConfig,
    sender: SenderConfig,
}

struct Session {
    transport: Arc<dyn Transport>,
    registered_at: DateTime<Utc>,
    expires_at: Option<Instant>,
}

impl Session {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A registered session as listed by [`Dispatcher::sessions`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    /// Session key
    pub key: ProgressKey,
    /// Registration time
    pub registered_at: DateTime<Utc>,
}

impl Dispatcher {
    /// Create a dispatcher with default configuration.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default(), SenderConfig::default())
    }

    /// Create a dispatcher with explicit registry and sender settings.
    pub fn with_config(registry: RegistryConfig, sender: SenderConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            registry,
            sender,
        }
    }

    /// Create a dispatcher from the application configuration.
    pub fn from_config(config: &PulseConfig) -> Self {
        Self::with_config(config.registry.clone(), config.sender.clone())
    }

    // A panic while holding the lock cannot leave the map half-updated.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ProgressKey, Session>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ProgressKey, Session>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `transport` under `key`, returning the transport it replaced.
    pub fn register(&self, key: ProgressKey, transport: Arc<dyn Transport>) -> Option<Arc<dyn Transport>> {
        let session = Session {
            transport,
            registered_at: Utc::now(),
            expires_at: self.registry.ttl().map(|ttl| Instant::now() + ttl),
        };
        debug!("Registered progress session {}", key);
        self.write()
            .insert(key, session)
            .map(|previous| previous.transport)
    }

    /// Transport registered under `key`, unless missing or expired.
    pub fn lookup(&self, key: &ProgressKey) -> Option<Arc<dyn Transport>> {
        let now = Instant::now();
        self.read()
            .get(key)
            .filter(|session| !session.is_expired(now))
            .map(|session| Arc::clone(&session.transport))
    }

    /// Remove the session under `key`.
    pub fn unregister(&self, key: &ProgressKey) -> Option<Arc<dyn Transport>> {
        let removed = self.write().remove(key).map(|session| session.transport);
        if removed.is_some() {
            debug!("Unregistered progress session {}", key);
        }
        removed
    }

    /// Register `transport` under a fresh key for `code`.
    ///
    /// The session is unregistered when the returned guard is dropped.
    /// Expired sessions are purged first.
    pub fn open_session(self: &Arc<Self>, code: &str, transport: Arc<dyn Transport>) -> SessionGuard {
        if self.registry.ttl().is_some() {
            self.purge_expired();
        }
        let key = ProgressKey::generate(code);
        self.register(key.clone(), transport);
        info!("Opened progress session {}", key);
        SessionGuard::new(Arc::clone(self), key)
    }

    /// Tracker reporting to the session under `key`.
    ///
    /// An unknown or expired key yields a tracker that writes to the log.
    pub fn tracker(&self, key: &ProgressKey, code: &str) -> ProgressTracker {
        self.tracker_in(&ExecutionContext::new(), key, code)
    }

    /// Like [`tracker`](Self::tracker), stamping the context's metadata on
    /// the tracker.
    pub fn tracker_in(&self, ctx: &ExecutionContext, key: &ProgressKey, code: &str) -> ProgressTracker {
        let transport = self.lookup(key);
        if transport.is_none() {
            debug!("No progress session {}, {} will be logged", key, code);
        }
        ProgressTracker::builder(code)
            .with_metadata(ctx.metadata().clone())
            .with_transport(transport, &self.sender)
            .build()
    }

    /// Drop every expired session, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        let purged = before - sessions.len();
        if purged > 0 {
            info!("Purged {} expired progress sessions", purged);
        }
        purged
    }

    /// Live sessions, oldest first.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let now = Instant::now();
        let mut list: Vec<SessionInfo> = self
            .read()
            .iter()
            .filter(|(_, session)| !session.is_expired(now))
            .map(|(key, session)| SessionInfo {
                key: key.clone(),
                registered_at: session.registered_at,
            })
            .collect();
        list.sort_by(|a, b| a.registered_at.cmp(&b.registered_at).then_with(|| a.key.cmp(&b.key)));
        list
    }

    /// Number of registered sessions, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
