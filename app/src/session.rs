use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::store::{StateContainer, SubscriptionId};

/// Record produced by a successful wallet authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub address: String,
    pub signed_message: String,
    pub signer_address: String,
    /// Unix milliseconds.
    pub authenticated_at: i64,
}

/// First-seen bookkeeping for an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredUser {
    /// Unix milliseconds.
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl RegisteredUser {
    pub fn new(created_at: i64) -> Self {
        Self {
            created_at,
            email: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Signing,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Signing => "signing",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }

    /// True while an attempt is between `connect` and its outcome.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ConnectionStatus::Connecting | ConnectionStatus::Signing)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the wallet store publishes to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletState {
    pub status: ConnectionStatus,
    pub session: Option<AuthSession>,
    pub error: Option<String>,
    pub registered_users: BTreeMap<String, RegisteredUser>,
    /// Attempt that owns the in-flight status, if any. Not published to storage or JS.
    #[serde(skip)]
    pub(crate) attempt: Option<AttemptId>,
}

impl WalletState {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected && self.session.is_some()
    }

    pub fn is_connecting(&self) -> bool {
        self.status.is_in_flight()
    }

    pub fn address(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.address.as_str())
    }

    pub fn authenticated_at(&self) -> Option<i64> {
        self.session.as_ref().map(|session| session.authenticated_at)
    }
}

/// Token for one connection attempt.
///
/// Sign-out, reset, restore and installing a session all end the current
/// attempt, after which its transitions are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttemptId(u64);

/// Outcome of trying to open a new connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptStart {
    /// A session already exists; nothing changed.
    Existing(AuthSession),
    /// Another attempt is connecting or signing; nothing changed.
    Busy,
    /// Status moved to `connecting`, owned by the returned attempt.
    Started(AttemptId),
}

/// Wallet connection status, session and address registry.
///
/// Every transition keeps `session.is_some() => Connected` and
/// `Error => session.is_none()` inside a single critical section.
#[derive(Debug, Clone)]
pub struct SessionStore {
    state: StateContainer<WalletState>,
    next_attempt: Arc<AtomicU64>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            state: StateContainer::new("WalletStore", WalletState::default()),
            next_attempt: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn snapshot(&self) -> WalletState {
        self.state.get()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.read(|state| state.status)
    }

    pub fn session(&self) -> Option<AuthSession> {
        self.state.read(|state| state.session.clone())
    }

    pub fn error(&self) -> Option<String> {
        self.state.read(|state| state.error.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.state.read(WalletState::is_connected)
    }

    pub fn is_connecting(&self) -> bool {
        self.state.read(WalletState::is_connecting)
    }

    /// Session short-circuit, re-entrancy guard and `connecting` transition as one step.
    pub fn begin_attempt(&self) -> AttemptStart {
        let next_attempt = &self.next_attempt;
        self.state.update_if(|state| {
            if let Some(session) = &state.session {
                return (AttemptStart::Existing(session.clone()), false);
            }
            if state.status.is_in_flight() {
                return (AttemptStart::Busy, false);
            }
            let attempt = AttemptId(next_attempt.fetch_add(1, Ordering::Relaxed));
            state.status = ConnectionStatus::Connecting;
            state.error = None;
            state.attempt = Some(attempt);
            (AttemptStart::Started(attempt), true)
        })
    }

    /// Whether `attempt` still owns the in-flight status.
    pub fn is_current_attempt(&self, attempt: AttemptId) -> bool {
        self.state.read(|state| state.attempt == Some(attempt))
    }

    /// `connecting` -> `signing`. Returns `false` when the attempt was superseded.
    pub fn mark_signing(&self, attempt: AttemptId) -> bool {
        self.state.update_if(|state| {
            if state.attempt != Some(attempt) {
                return (false, false);
            }
            state.status = ConnectionStatus::Signing;
            (true, true)
        })
    }

    /// Install the attempt's session. Returns `false` when the attempt was superseded.
    pub fn finish_attempt(&self, attempt: AttemptId, session: AuthSession) -> bool {
        let address = session.address.clone();
        let applied = self.state.update_if(move |state| {
            if state.attempt != Some(attempt) {
                return (false, false);
            }
            connect(state, session);
            (true, true)
        });
        if applied {
            log::info!("Wallet session established for {}", address);
        } else {
            log::debug!("Dropping session for {} from a superseded attempt", address);
        }
        applied
    }

    /// Fail the attempt. Returns `false` when the attempt was superseded.
    pub fn fail_attempt(&self, attempt: AttemptId, error: impl Into<String>) -> bool {
        let error = error.into();
        let applied = self.state.update_if(|state| {
            if state.attempt != Some(attempt) {
                return (false, false);
            }
            fail(state, error.clone());
            (true, true)
        });
        if applied {
            log::warn!("Wallet connection failed: {}", error);
        } else {
            log::debug!("Ignoring failure of a superseded attempt: {}", error);
        }
        applied
    }

    /// Install `session` as connected, ending any in-flight attempt.
    pub fn complete_connection(&self, session: AuthSession) {
        log::info!("Wallet session established for {}", session.address);
        self.state.update(move |state| connect(state, session));
    }

    /// Move to `error`, ending any in-flight attempt.
    pub fn fail_connection(&self, error: impl Into<String>) {
        let error = error.into();
        log::warn!("Wallet connection failed: {}", error);
        self.state.update(move |state| fail(state, error));
    }

    /// Clears session and error and ends any in-flight attempt; never fails.
    pub fn sign_out(&self) {
        self.state.update(|state| {
            state.session = None;
            state.status = ConnectionStatus::Idle;
            state.error = None;
            state.attempt = None;
        });
    }

    /// `Some` installs the session as connected; `None` signs out.
    pub fn set_session(&self, session: Option<AuthSession>) {
        match session {
            Some(session) => self.complete_connection(session),
            None => self.sign_out(),
        }
    }

    /// Back to the initial state, registry included.
    pub fn reset(&self) {
        self.state.reset();
    }

    pub fn is_address_registered(&self, address: &str) -> bool {
        self.state
            .read(|state| state.registered_users.contains_key(address))
    }

    /// Insert or overwrite the registry record for `address`.
    pub fn register_address(&self, address: impl Into<String>, user: RegisteredUser) {
        let address = address.into();
        self.state.update(move |state| {
            state.registered_users.insert(address, user);
        });
    }

    pub fn registered_user(&self, address: &str) -> Option<RegisteredUser> {
        self.state
            .read(|state| state.registered_users.get(address).cloned())
    }

    pub fn registered_users(&self) -> BTreeMap<String, RegisteredUser> {
        self.state.read(|state| state.registered_users.clone())
    }

    /// Install persisted session and registry. A restored session is connected.
    pub fn restore(
        &self,
        session: Option<AuthSession>,
        registered_users: BTreeMap<String, RegisteredUser>,
    ) {
        self.state.update(move |state| {
            state.status = if session.is_some() {
                ConnectionStatus::Connected
            } else {
                ConnectionStatus::Idle
            };
            state.session = session;
            state.error = None;
            state.attempt = None;
            state.registered_users.extend(registered_users);
        });
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&WalletState) + Send + Sync + 'static,
    {
        self.state.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state.unsubscribe(id)
    }
}

fn connect(state: &mut WalletState, session: AuthSession) {
    state.session = Some(session);
    state.status = ConnectionStatus::Connected;
    state.error = None;
    state.attempt = None;
}

fn fail(state: &mut WalletState, error: String) {
    state.status = ConnectionStatus::Error;
    state.error = Some(error);
    state.session = None;
    state.attempt = None;
}
