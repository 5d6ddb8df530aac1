use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;

use crate::bridge::{AvailabilityResponse, WalletBridge};
use crate::config::ClientConfig;
use crate::session::SessionStore;

/// What the connect button should show about the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WalletPresence {
    Checking,
    NotInstalled,
    Installed,
    Connected,
}

pub fn presence_from(availability: &AvailabilityResponse, session_connected: bool) -> WalletPresence {
    if availability.error.is_some() || !availability.is_connected {
        WalletPresence::NotInstalled
    } else if session_connected {
        WalletPresence::Connected
    } else {
        WalletPresence::Installed
    }
}

/// One availability probe. A failing probe reads as not installed.
pub async fn detect_presence<B: WalletBridge>(bridge: &B, session_connected: bool) -> WalletPresence {
    match bridge.check_availability().await {
        Ok(availability) => presence_from(&availability, session_connected),
        Err(err) => {
            log::debug!("Wallet availability probe failed: {}", err);
            WalletPresence::NotInstalled
        }
    }
}

/// Stops a running [`PresenceWatcher`] when cancelled or dropped.
#[derive(Debug)]
pub struct WatchCancel(watch::Sender<bool>);

impl WatchCancel {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

impl Drop for WatchCancel {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Cancellation handle and the signal a watcher listens on.
pub fn cancellation() -> (WatchCancel, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (WatchCancel(tx), rx)
}

struct Emitter<F> {
    last: Option<WalletPresence>,
    on_change: F,
}

impl<F: FnMut(WalletPresence)> Emitter<F> {
    fn emit(&mut self, presence: WalletPresence) {
        if self.last != Some(presence) {
            self.last = Some(presence);
            (self.on_change)(presence);
        }
    }
}

/// Tracks extension presence: push events when the provider has them,
/// otherwise polling at a fixed interval.
#[derive(Debug, Clone)]
pub struct PresenceWatcher {
    interval: Duration,
}

impl PresenceWatcher {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.presence_poll_interval)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Report each distinct presence to `on_change` until `shutdown` fires.
    ///
    /// A closed push channel degrades to polling.
    pub async fn run<B, F>(
        &self,
        bridge: &B,
        store: &SessionStore,
        mut shutdown: watch::Receiver<bool>,
        on_change: F,
    ) where
        B: WalletBridge,
        F: FnMut(WalletPresence),
    {
        if *shutdown.borrow() {
            return;
        }

        let mut emitter = Emitter {
            last: None,
            on_change,
        };

        if let Some(events) = bridge.availability_events() {
            if follow_events(events, store, &mut shutdown, &mut emitter).await {
                return;
            }
            log::debug!("Availability channel closed, polling every {:?}", self.interval);
        }

        loop {
            let presence = detect_presence(bridge, store.is_connected()).await;
            emitter.emit(presence);

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => return,
            }
        }
    }
}

/// Returns `true` when stopped by shutdown, `false` when the channel closed.
async fn follow_events<F>(
    mut events: watch::Receiver<AvailabilityResponse>,
    store: &SessionStore,
    shutdown: &mut watch::Receiver<bool>,
    emitter: &mut Emitter<F>,
) -> bool
where
    F: FnMut(WalletPresence),
{
    loop {
        let availability = events.borrow_and_update().clone();
        emitter.emit(presence_from(&availability, store.is_connected()));

        tokio::select! {
            changed = events.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
            _ = shutdown.changed() => return true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{AccessResponse, SignResponse};
    use crate::errors::{WalletError, WalletResult};
    use crate::session::AuthSession;
    use parking_lot::Mutex;

    struct ProbeBridge {
        availability: Mutex<AvailabilityResponse>,
        events: Option<watch::Receiver<AvailabilityResponse>>,
    }

    impl WalletBridge for ProbeBridge {
        async fn check_availability(&self) -> WalletResult<AvailabilityResponse> {
            Ok(self.availability.lock().clone())
        }

        async fn request_access(&self) -> WalletResult<AccessResponse> {
            Err(WalletError::Unknown("not used".into()))
        }

        async fn sign_message(&self, _message: &str, _address: &str) -> WalletResult<SignResponse> {
            Err(WalletError::Unknown("not used".into()))
        }

        fn availability_events(&self) -> Option<watch::Receiver<AvailabilityResponse>> {
            self.events.clone()
        }
    }

    fn session() -> AuthSession {
        AuthSession {
            address: "GW".into(),
            signed_message: "aa".into(),
            signer_address: "GW".into(),
            authenticated_at: 1,
        }
    }

    #[test]
    fn presence_mapping() {
        let installed = AvailabilityResponse::installed();
        assert_eq!(presence_from(&installed, false), WalletPresence::Installed);
        assert_eq!(presence_from(&installed, true), WalletPresence::Connected);
        assert_eq!(
            presence_from(&AvailabilityResponse::missing(), true),
            WalletPresence::NotInstalled
        );
        assert_eq!(
            presence_from(&AvailabilityResponse::failed("boom"), false),
            WalletPresence::NotInstalled
        );
    }

    #[tokio::test]
    async fn polling_reports_distinct_changes_until_cancelled() {
        let bridge = ProbeBridge {
            availability: Mutex::new(AvailabilityResponse::missing()),
            events: None,
        };
        let store = SessionStore::new();
        let watcher = PresenceWatcher::new(Duration::from_millis(10));
        let (cancel, shutdown) = cancellation();
        let seen = Mutex::new(Vec::new());

        let run = watcher.run(&bridge, &store, shutdown, |presence| seen.lock().push(presence));
        let driver = async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            *bridge.availability.lock() = AvailabilityResponse::installed();
            tokio::time::sleep(Duration::from_millis(40)).await;
            store.complete_connection(session());
            tokio::time::sleep(Duration::from_millis(40)).await;
            cancel.cancel();
        };
        tokio::join!(run, driver);

        assert_eq!(
            *seen.lock(),
            vec![
                WalletPresence::NotInstalled,
                WalletPresence::Installed,
                WalletPresence::Connected
            ]
        );
    }

    #[tokio::test]
    async fn push_events_are_preferred_over_polling() {
        let (tx, rx) = watch::channel(AvailabilityResponse::missing());
        let bridge = ProbeBridge {
            // Polling would report installed; only push events should be seen.
            availability: Mutex::new(AvailabilityResponse::installed()),
            events: Some(rx),
        };
        let store = SessionStore::new();
        let watcher = PresenceWatcher::new(Duration::from_millis(5));
        let (cancel, shutdown) = cancellation();
        let seen = Mutex::new(Vec::new());

        let run = watcher.run(&bridge, &store, shutdown, |presence| seen.lock().push(presence));
        let driver = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(*seen.lock(), vec![WalletPresence::NotInstalled]);
            tx.send(AvailabilityResponse::installed()).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(cancel);
        };
        tokio::join!(run, driver);

        assert_eq!(
            *seen.lock(),
            vec![WalletPresence::NotInstalled, WalletPresence::Installed]
        );
    }

    #[tokio::test]
    async fn already_cancelled_watcher_returns_immediately() {
        let bridge = ProbeBridge {
            availability: Mutex::new(AvailabilityResponse::installed()),
            events: None,
        };
        let store = SessionStore::new();
        let (cancel, shutdown) = cancellation();
        cancel.cancel();

        let mut calls = 0;
        PresenceWatcher::new(Duration::from_millis(5))
            .run(&bridge, &store, shutdown, |_| calls += 1)
            .await;
        assert_eq!(calls, 0);
    }
}
