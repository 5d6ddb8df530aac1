use stellar_insured_lib::{StateStorage, WalletError, WalletResult};
use web_sys::Storage;

use crate::freighter::js_error;

/// `window.localStorage`, looked up on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl LocalStorage {
    fn storage() -> WalletResult<Storage> {
        web_sys::window()
            .ok_or_else(|| WalletError::StorageError("No window available".to_string()))?
            .local_storage()
            .map_err(js_error)?
            .ok_or_else(|| WalletError::StorageError("localStorage is disabled".to_string()))
    }
}

impl StateStorage for LocalStorage {
    fn get_item(&self, key: &str) -> WalletResult<Option<String>> {
        Self::storage()?
            .get_item(key)
            .map_err(|err| storage_error(err, key))
    }

    fn set_item(&self, key: &str, value: &str) -> WalletResult<()> {
        Self::storage()?
            .set_item(key, value)
            .map_err(|err| storage_error(err, key))
    }

    fn remove_item(&self, key: &str) -> WalletResult<()> {
        Self::storage()?
            .remove_item(key)
            .map_err(|err| storage_error(err, key))
    }
}

fn storage_error(value: wasm_bindgen::JsValue, key: &str) -> WalletError {
    WalletError::StorageError(format!("localStorage '{}': {}", key, js_error(value)))
}
