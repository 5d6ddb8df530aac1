use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{WalletError, WalletResult};
use crate::session::{AuthSession, RegisteredUser, SessionStore, WalletState};

const STATE_VERSION: u16 = 1;

/// Keys written by earlier releases of the web client.
pub const LEGACY_SESSION_KEY: &str = "stellar_insured_session";
pub const LEGACY_USERS_KEY: &str = "stellar_insured_users";

/// String key-value storage with `localStorage` semantics.
pub trait StateStorage: Send + Sync {
    fn get_item(&self, key: &str) -> WalletResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> WalletResult<()>;
    fn remove_item(&self, key: &str) -> WalletResult<()>;
}

/// In-process storage, used on native targets without a data directory and in tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> WalletResult<Option<String>> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> WalletResult<()> {
        self.items.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> WalletResult<()> {
        self.items.write().remove(key);
        Ok(())
    }
}

/// One file per key under a root directory, written atomically.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root_dir: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl AsRef<Path>) -> WalletResult<Self> {
        let root_dir = root.as_ref().to_path_buf();
        if root_dir.as_os_str().is_empty() {
            return Err(WalletError::StorageError(
                "Storage root directory cannot be empty".to_string(),
            ));
        }
        fs::create_dir_all(&root_dir)?;
        Ok(Self { root_dir })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn item_path(&self, key: &str) -> WalletResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(WalletError::ValidationError(format!(
                "Invalid storage key '{}'",
                key
            )));
        }
        Ok(self.root_dir.join(format!("{}.json", key)))
    }
}

impl StateStorage for FileStorage {
    fn get_item(&self, key: &str) -> WalletResult<Option<String>> {
        let path = self.item_path(key)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set_item(&self, key: &str, value: &str) -> WalletResult<()> {
        let path = self.item_path(key)?;
        let tmp_path = path.with_extension("new");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(tmp_path, &path)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> WalletResult<()> {
        let path = self.item_path(key)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// The part of wallet state that survives a restart.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedWallet {
    pub session: Option<AuthSession>,
    #[serde(default)]
    pub registered_users: BTreeMap<String, RegisteredUser>,
}

impl From<&WalletState> for PersistedWallet {
    fn from(state: &WalletState) -> Self {
        Self {
            session: state.session.clone(),
            registered_users: state.registered_users.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateEnvelope {
    version: u16,
    checksum: String,
    payload: PersistedWallet,
    modified_at: i64,
}

/// Reads and writes [`PersistedWallet`] under a fixed storage key.
#[derive(Clone)]
pub struct WalletPersistence {
    storage: Arc<dyn StateStorage>,
    key: String,
}

impl std::fmt::Debug for WalletPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletPersistence")
            .field("key", &self.key)
            .finish()
    }
}

impl WalletPersistence {
    pub fn new(storage: Arc<dyn StateStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn storage(&self) -> &Arc<dyn StateStorage> {
        &self.storage
    }

    /// `Ok(None)` when nothing was stored. Malformed or tampered content is an error.
    pub fn load(&self) -> WalletResult<Option<PersistedWallet>> {
        let raw = match self.storage.get_item(&self.key)? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let envelope: StateEnvelope = serde_json::from_str(&raw)?;
        if envelope.version != STATE_VERSION {
            return Err(WalletError::ValidationError(format!(
                "Unsupported wallet state version {}",
                envelope.version
            )));
        }

        if checksum(&envelope.payload)? != envelope.checksum {
            return Err(WalletError::ValidationError(
                "Wallet state integrity verification failed".to_string(),
            ));
        }

        Ok(Some(envelope.payload))
    }

    pub fn save(&self, wallet: &PersistedWallet) -> WalletResult<()> {
        let envelope = StateEnvelope {
            version: STATE_VERSION,
            checksum: checksum(wallet)?,
            payload: wallet.clone(),
            modified_at: Utc::now().timestamp_millis(),
        };
        let serialized = serde_json::to_string(&envelope)?;
        self.storage.set_item(&self.key, &serialized)
    }

    pub fn clear(&self) -> WalletResult<()> {
        self.storage.remove_item(&self.key)
    }

    /// Fold pre-envelope keys into `store` and delete them. Returns whether anything was folded in.
    ///
    /// Each key is handled on its own; one that no longer parses is logged and dropped.
    pub fn migrate_legacy(&self, store: &SessionStore) -> WalletResult<bool> {
        let mut migrated = false;

        if let Some(session) = self.take_legacy::<AuthSession>(LEGACY_SESSION_KEY)? {
            store.set_session(Some(session));
            migrated = true;
        }

        if let Some(users) = self.take_legacy::<BTreeMap<String, RegisteredUser>>(LEGACY_USERS_KEY)? {
            for (address, user) in users {
                store.register_address(address, user);
            }
            migrated = true;
        }

        if migrated {
            log::info!("Migrated legacy wallet storage keys");
        }
        Ok(migrated)
    }

    /// Read and remove a legacy key.
    fn take_legacy<V: DeserializeOwned>(&self, key: &str) -> WalletResult<Option<V>> {
        let Some(raw) = self.storage.get_item(key)? else {
            return Ok(None);
        };
        self.storage.remove_item(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                log::warn!("Dropping unreadable legacy key '{}': {}", key, err);
                Ok(None)
            }
        }
    }
}

fn checksum(wallet: &PersistedWallet) -> WalletResult<String> {
    let encoded = serde_json::to_vec(wallet)?;
    Ok(blake3::hash(&encoded).to_hex().to_string())
}
