use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::bridge::WalletBridge;
use crate::config::ClientConfig;
use crate::connection::ConnectionController;
use crate::cookie::{CookieSink, SessionCookie};
use crate::errors::WalletResult;
use crate::persistence::{PersistedWallet, StateStorage, WalletPersistence};
use crate::session::{AuthSession, SessionStore, WalletState};
use crate::ui::{ModalState, UiStore};

/// Point-in-time dump of every store, for debugging tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateExport {
    pub wallet: WalletState,
    pub modals: BTreeMap<String, ModalState>,
    pub sidebar_open: bool,
    pub exported_at: DateTime<Utc>,
}

/// Wires the stores to their bridge, storage and cookie projections.
pub struct ClientContext<B> {
    config: ClientConfig,
    wallet: SessionStore,
    ui: UiStore,
    controller: ConnectionController<B>,
    persistence: WalletPersistence,
}

impl<B: WalletBridge> ClientContext<B> {
    /// Restore persisted state, then keep storage and cookie in sync with the wallet store.
    ///
    /// Unreadable stored state is logged and discarded; startup never fails on it.
    pub fn initialize(
        config: ClientConfig,
        bridge: B,
        storage: Arc<dyn StateStorage>,
        cookies: Arc<dyn CookieSink>,
    ) -> Self {
        let wallet = SessionStore::new();
        let persistence = WalletPersistence::new(storage, config.storage_key.clone());
        let migrated = restore(&persistence, &wallet);

        let initial = wallet.snapshot();
        if migrated {
            if let Err(err) = persistence.save(&PersistedWallet::from(&initial)) {
                log::warn!("Failed to persist migrated wallet state: {}", err);
            }
        }

        attach_persistence(&wallet, persistence.clone(), &initial);
        attach_cookie_mirror(
            &wallet,
            cookies,
            SessionCookie::new(config.cookie_name.clone(), config.cookie_max_age),
            initial.session,
        );

        let controller = ConnectionController::new(wallet.clone(), bridge, &config);
        log::info!(
            "Client context initialized ({:?}, status {})",
            config.environment,
            wallet.status()
        );

        Self {
            config,
            wallet,
            ui: UiStore::new(),
            controller,
            persistence,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn wallet(&self) -> &SessionStore {
        &self.wallet
    }

    pub fn ui(&self) -> &UiStore {
        &self.ui
    }

    pub fn controller(&self) -> &ConnectionController<B> {
        &self.controller
    }

    pub fn persistence(&self) -> &WalletPersistence {
        &self.persistence
    }

    pub async fn connect(&self) -> WalletResult<AuthSession> {
        self.controller.connect().await
    }

    pub fn disconnect(&self) {
        self.controller.disconnect();
    }

    /// Reset every store to its initial state.
    pub fn reset_all(&self) {
        self.wallet.reset();
        self.ui.reset();
        log::info!("All stores reset to initial state");
    }

    pub fn export_state(&self) -> StateExport {
        StateExport {
            wallet: self.wallet.snapshot(),
            modals: self.ui.modals_snapshot(),
            sidebar_open: self.ui.is_sidebar_open(),
            exported_at: Utc::now(),
        }
    }
}

/// Returns whether legacy keys were folded in.
fn restore(persistence: &WalletPersistence, wallet: &SessionStore) -> bool {
    match persistence.load() {
        Ok(Some(saved)) => wallet.restore(saved.session, saved.registered_users),
        Ok(None) => {}
        Err(err) => log::warn!("Discarding unreadable wallet state: {}", err),
    }

    match persistence.migrate_legacy(wallet) {
        Ok(migrated) => migrated,
        Err(err) => {
            log::warn!("Legacy wallet storage migration failed: {}", err);
            false
        }
    }
}

fn attach_persistence(wallet: &SessionStore, persistence: WalletPersistence, initial: &WalletState) {
    let last = Mutex::new(PersistedWallet::from(initial));
    wallet.subscribe(move |state| {
        let next = PersistedWallet::from(state);
        let mut last = last.lock();
        if *last == next {
            return;
        }
        match persistence.save(&next) {
            Ok(()) => *last = next,
            Err(err) => log::warn!("Failed to persist wallet state: {}", err),
        }
    });
}

fn attach_cookie_mirror(
    wallet: &SessionStore,
    sink: Arc<dyn CookieSink>,
    cookie: SessionCookie,
    initial: Option<AuthSession>,
) {
    write_cookie(sink.as_ref(), &cookie, initial.as_ref());

    let last = Mutex::new(initial);
    wallet.subscribe(move |state| {
        let mut last = last.lock();
        if *last == state.session {
            return;
        }
        *last = state.session.clone();
        write_cookie(sink.as_ref(), &cookie, state.session.as_ref());
    });
}

fn write_cookie(sink: &dyn CookieSink, cookie: &SessionCookie, session: Option<&AuthSession>) {
    let result = cookie
        .render(session)
        .and_then(|rendered| sink.write_cookie(&rendered));
    if let Err(err) = result {
        log::warn!("Failed to mirror session cookie {}: {}", cookie.name(), err);
    }
}
