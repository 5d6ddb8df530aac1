use std::sync::Arc;

use chrono::Utc;

use crate::bridge::{self, WalletBridge};
use crate::config::ClientConfig;
use crate::errors::{WalletError, WalletResult};
use crate::session::{AttemptId, AttemptStart, AuthSession, RegisteredUser, SessionStore};

/// Message the wallet is asked to sign for `address`.
pub fn build_challenge(label: &str, address: &str, timestamp_millis: i64) -> String {
    format!(
        "{}\nAddress: {}\nTimestamp: {}",
        label, address, timestamp_millis
    )
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Fails the attempt if the `connect` future is dropped before it settles.
struct AttemptGuard<'a> {
    store: &'a SessionStore,
    attempt: AttemptId,
    armed: bool,
}

impl<'a> AttemptGuard<'a> {
    fn arm(store: &'a SessionStore, attempt: AttemptId) -> Self {
        Self {
            store,
            attempt,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.store
                .fail_attempt(self.attempt, WalletError::ConnectionAbandoned.to_string());
        }
    }
}

/// Drives a wallet account through address disclosure and message signing.
pub struct ConnectionController<B> {
    store: SessionStore,
    bridge: Arc<B>,
    challenge_label: String,
}

impl<B> Clone for ConnectionController<B> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            bridge: Arc::clone(&self.bridge),
            challenge_label: self.challenge_label.clone(),
        }
    }
}

impl<B: WalletBridge> ConnectionController<B> {
    pub fn new(store: SessionStore, bridge: B, config: &ClientConfig) -> Self {
        Self::with_shared_bridge(store, Arc::new(bridge), config)
    }

    pub fn with_shared_bridge(store: SessionStore, bridge: Arc<B>, config: &ClientConfig) -> Self {
        Self {
            store,
            bridge,
            challenge_label: config.challenge_label.clone(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    /// Connect and authenticate, or return the session that already exists.
    ///
    /// Rejects with [`WalletError::ConnectionInProgress`] while another
    /// attempt is connecting or signing; the store is left untouched.
    /// An attempt overtaken by sign-out or reset settles with
    /// [`WalletError::ConnectionAbandoned`] and leaves the store alone.
    pub async fn connect(&self) -> WalletResult<AuthSession> {
        let attempt = match self.store.begin_attempt() {
            AttemptStart::Existing(session) => return Ok(session),
            AttemptStart::Busy => return Err(WalletError::ConnectionInProgress),
            AttemptStart::Started(attempt) => attempt,
        };

        let guard = AttemptGuard::arm(&self.store, attempt);
        let outcome = self.authenticate(attempt).await;
        guard.disarm();

        match outcome {
            Ok(session) => {
                if self.store.finish_attempt(attempt, session.clone()) {
                    Ok(session)
                } else {
                    Err(WalletError::ConnectionAbandoned)
                }
            }
            Err(err) => {
                if self.store.fail_attempt(attempt, err.to_string()) {
                    Err(err)
                } else {
                    Err(WalletError::ConnectionAbandoned)
                }
            }
        }
    }

    /// Sign out. Never fails.
    pub fn disconnect(&self) {
        log::info!("Wallet session cleared");
        self.store.sign_out();
    }

    pub fn is_address_registered(&self, address: &str) -> bool {
        self.store.is_address_registered(address)
    }

    pub fn register_address(&self, address: impl Into<String>, user: Option<RegisteredUser>) {
        let user = user.unwrap_or_else(|| RegisteredUser::new(now_millis()));
        self.store.register_address(address, user);
    }

    pub fn registered_user(&self, address: &str) -> Option<RegisteredUser> {
        self.store.registered_user(address)
    }

    async fn authenticate(&self, attempt: AttemptId) -> WalletResult<AuthSession> {
        let address = bridge::request_address(self.bridge.as_ref()).await?;
        log::debug!("Wallet disclosed address {}", address);
        if !self.store.is_current_attempt(attempt) {
            return Err(WalletError::ConnectionAbandoned);
        }

        if !self.store.is_address_registered(&address) {
            self.store
                .register_address(address.clone(), RegisteredUser::new(now_millis()));
        }

        let challenge = build_challenge(&self.challenge_label, &address, now_millis());
        if !self.store.mark_signing(attempt) {
            return Err(WalletError::ConnectionAbandoned);
        }

        let signed = bridge::sign_message(self.bridge.as_ref(), &address, &challenge).await?;
        if signed.signer_address != address {
            return Err(WalletError::SignerMismatch(format!(
                "wallet signed as '{}' but '{}' was requested",
                signed.signer_address, address
            )));
        }

        Ok(AuthSession {
            address,
            signed_message: signed.signed_message,
            signer_address: signed.signer_address,
            authenticated_at: now_millis(),
        })
    }
}
