// lib.rs - Core library structure for the wallet session client

pub mod address;
pub mod app_state;
pub mod bridge;
pub mod config;
pub mod connection;
pub mod cookie;
pub mod detection;
pub mod errors;
pub mod persistence;
pub mod session;
pub mod store;
pub mod ui;

// Re-export common types
pub use address::{format_address, is_valid_address, validate_address, DEFAULT_DISPLAY_CHARS};
pub use app_state::{ClientContext, StateExport};
pub use bridge::{
    AccessResponse, AvailabilityResponse, SignResponse, SignaturePayload, SignedMessage,
    WalletBridge, PROVIDER_NAME,
};
pub use config::{ClientConfig, Environment};
pub use connection::{build_challenge, ConnectionController};
pub use cookie::{CookieSink, RecordingCookieSink, SessionCookie};
pub use detection::{cancellation, detect_presence, PresenceWatcher, WalletPresence, WatchCancel};
pub use errors::{WalletError, WalletResult};
pub use persistence::{FileStorage, MemoryStorage, PersistedWallet, StateStorage, WalletPersistence};
pub use session::{
    AttemptId, AttemptStart, AuthSession, ConnectionStatus, RegisteredUser, SessionStore,
    WalletState,
};
pub use store::{KeyedStore, StateContainer, SubscriptionId};
pub use ui::{ModalPayload, ModalState, UiStore, WALLET_INSTALL_GUIDE_MODAL};
