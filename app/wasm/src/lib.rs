//! Stellar Insured WebAssembly Library
//!
//! Browser bindings for the wallet session client: Freighter as the wallet
//! bridge, `localStorage` for persistence and `document.cookie` for the
//! session mirror.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use js_sys::{Function, Promise, Reflect};
use serde::Serialize;
use stellar_insured_lib::{
    detect_presence, format_address as shorten, ClientConfig, ClientContext, ModalPayload,
    RegisteredUser, SubscriptionId, WalletError, WalletState,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

mod cookie;
mod freighter;
mod logger;
mod storage;
mod watcher;

pub use cookie::DocumentCookieSink;
pub use freighter::FreighterBridge;
pub use storage::LocalStorage;
pub use watcher::PresenceMonitor;

static NEXT_CLIENT: AtomicU32 = AtomicU32::new(1);

thread_local! {
    // Store listeners must be Send + Sync, JS functions are not; they live here
    // and the store listener only carries the client id.
    static LISTENERS: RefCell<HashMap<u32, BTreeMap<u32, Function>>> = RefCell::new(HashMap::new());
}

pub(crate) fn to_js_value<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(JsValue::from)
}

fn to_js_error(err: WalletError) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}

fn notify(client: u32, state: &WalletState) {
    let callbacks: Vec<Function> = LISTENERS.with(|listeners| {
        listeners
            .borrow()
            .get(&client)
            .map(|registered| registered.values().cloned().collect())
            .unwrap_or_default()
    });
    if callbacks.is_empty() {
        return;
    }

    let value = match to_js_value(state) {
        Ok(value) => value,
        Err(err) => {
            log::warn!("Failed to serialize wallet state: {:?}", err);
            return;
        }
    };
    for callback in callbacks {
        if let Err(err) = callback.call1(&JsValue::NULL, &value) {
            log::warn!("Wallet state listener threw: {:?}", err);
        }
    }
}

/// Wallet connect, session and UI state for one page.
#[wasm_bindgen]
pub struct WalletClient {
    id: u32,
    context: Rc<ClientContext<FreighterBridge>>,
    subscription: SubscriptionId,
    next_listener: Cell<u32>,
}

#[wasm_bindgen]
impl WalletClient {
    /// `env` is an optional object of `STELLAR_INSURED_*` settings.
    #[wasm_bindgen(constructor)]
    pub fn new(env: JsValue) -> Result<WalletClient, JsValue> {
        let config = if env.is_undefined() || env.is_null() {
            ClientConfig::default()
        } else {
            ClientConfig::from_lookup(|key| {
                Reflect::get(&env, &JsValue::from_str(key))
                    .ok()
                    .and_then(|value| value.as_string())
            })
            .map_err(to_js_error)?
        };
        logger::init(config.log_level());

        let context = ClientContext::initialize(
            config,
            FreighterBridge,
            Arc::new(LocalStorage),
            Arc::new(DocumentCookieSink),
        );
        let id = NEXT_CLIENT.fetch_add(1, Ordering::Relaxed);
        let subscription = context.wallet().subscribe(move |state| notify(id, state));

        Ok(WalletClient {
            id,
            context: Rc::new(context),
            subscription,
            next_listener: Cell::new(1),
        })
    }

    /// Resolves with the session; rejects with the failure message.
    pub fn connect(&self) -> Promise {
        let context = self.context.clone();
        future_to_promise(async move {
            let session = context.connect().await.map_err(to_js_error)?;
            to_js_value(&session)
        })
    }

    pub fn disconnect(&self) {
        self.context.disconnect();
    }

    pub fn status(&self) -> String {
        self.context.wallet().status().to_string()
    }

    pub fn error(&self) -> Option<String> {
        self.context.wallet().error()
    }

    #[wasm_bindgen(js_name = isConnected)]
    pub fn is_connected(&self) -> bool {
        self.context.wallet().is_connected()
    }

    #[wasm_bindgen(js_name = isConnecting)]
    pub fn is_connecting(&self) -> bool {
        self.context.wallet().is_connecting()
    }

    pub fn session(&self) -> Result<JsValue, JsValue> {
        to_js_value(&self.context.wallet().session())
    }

    pub fn state(&self) -> Result<JsValue, JsValue> {
        to_js_value(&self.context.wallet().snapshot())
    }

    /// Call `callback(state)` after every wallet state change. Returns an id for `unsubscribe`.
    pub fn subscribe(&self, callback: Function) -> u32 {
        let listener = self.next_listener.get();
        self.next_listener.set(listener + 1);
        LISTENERS.with(|listeners| {
            listeners
                .borrow_mut()
                .entry(self.id)
                .or_default()
                .insert(listener, callback);
        });
        listener
    }

    pub fn unsubscribe(&self, listener: u32) -> bool {
        LISTENERS.with(|listeners| {
            listeners
                .borrow_mut()
                .get_mut(&self.id)
                .map(|registered| registered.remove(&listener).is_some())
                .unwrap_or(false)
        })
    }

    #[wasm_bindgen(js_name = isAddressRegistered)]
    pub fn is_address_registered(&self, address: &str) -> bool {
        self.context.controller().is_address_registered(address)
    }

    #[wasm_bindgen(js_name = registerAddress)]
    pub fn register_address(&self, address: &str, email: Option<String>) {
        let user = RegisteredUser {
            created_at: js_sys::Date::now() as i64,
            email,
        };
        self.context
            .controller()
            .register_address(address, Some(user));
    }

    #[wasm_bindgen(js_name = registeredUser)]
    pub fn registered_user(&self, address: &str) -> Result<JsValue, JsValue> {
        to_js_value(&self.context.controller().registered_user(address))
    }

    /// One presence probe; resolves with `"not-installed" | "installed" | "connected"`.
    #[wasm_bindgen(js_name = detectPresence)]
    pub fn detect_presence(&self) -> Promise {
        let store = self.context.wallet().clone();
        future_to_promise(async move {
            let presence = detect_presence(&FreighterBridge, store.is_connected()).await;
            to_js_value(&presence)
        })
    }

    /// Poll presence at the configured interval until the monitor is stopped or freed.
    #[wasm_bindgen(js_name = watchPresence)]
    pub fn watch_presence(&self, callback: Function) -> Result<PresenceMonitor, JsValue> {
        PresenceMonitor::start(
            self.context.wallet().clone(),
            self.context.config().presence_poll_interval,
            callback,
        )
    }

    #[wasm_bindgen(js_name = openModal)]
    pub fn open_modal(&self, id: &str, payload: JsValue) -> Result<(), JsValue> {
        let payload: Option<ModalPayload> = serde_wasm_bindgen::from_value(payload)?;
        self.context.ui().open_modal(id, payload);
        Ok(())
    }

    #[wasm_bindgen(js_name = closeModal)]
    pub fn close_modal(&self, id: &str) {
        self.context.ui().close_modal(id);
    }

    #[wasm_bindgen(js_name = closeAllModals)]
    pub fn close_all_modals(&self) {
        self.context.ui().close_all_modals();
    }

    #[wasm_bindgen(js_name = toggleModal)]
    pub fn toggle_modal(&self, id: &str, payload: JsValue) -> Result<bool, JsValue> {
        let payload: Option<ModalPayload> = serde_wasm_bindgen::from_value(payload)?;
        Ok(self.context.ui().toggle_modal(id, payload))
    }

    #[wasm_bindgen(js_name = isModalOpen)]
    pub fn is_modal_open(&self, id: &str) -> bool {
        self.context.ui().is_modal_open(id)
    }

    #[wasm_bindgen(js_name = modalPayload)]
    pub fn modal_payload(&self, id: &str) -> Result<JsValue, JsValue> {
        to_js_value(&self.context.ui().modal_payload(id))
    }

    #[wasm_bindgen(js_name = setLoading)]
    pub fn set_loading(&self, key: &str, loading: bool) {
        self.context.ui().set_loading(key, loading);
    }

    #[wasm_bindgen(js_name = isLoading)]
    pub fn is_loading(&self, key: &str) -> bool {
        self.context.ui().is_loading(key)
    }

    #[wasm_bindgen(js_name = toggleSidebar)]
    pub fn toggle_sidebar(&self) -> bool {
        self.context.ui().toggle_sidebar()
    }

    #[wasm_bindgen(js_name = isSidebarOpen)]
    pub fn is_sidebar_open(&self) -> bool {
        self.context.ui().is_sidebar_open()
    }

    #[wasm_bindgen(js_name = resetAll)]
    pub fn reset_all(&self) {
        self.context.reset_all();
    }

    #[wasm_bindgen(js_name = exportState)]
    pub fn export_state(&self) -> Result<JsValue, JsValue> {
        to_js_value(&self.context.export_state())
    }

    /// Shorten an address with the configured number of characters on each side.
    #[wasm_bindgen(js_name = formatAddress)]
    pub fn format_address(&self, address: &str) -> String {
        shorten(address, self.context.config().address_display_chars)
    }
}

impl Drop for WalletClient {
    fn drop(&mut self) {
        self.context.wallet().unsubscribe(self.subscription);
        LISTENERS.with(|listeners| {
            listeners.borrow_mut().remove(&self.id);
        });
    }
}

/// Shorten a Stellar address to `head...tail`; invalid input is returned as is.
#[wasm_bindgen(js_name = formatAddress)]
pub fn format_address(address: &str, chars: Option<u32>) -> String {
    let chars = chars
        .map(|chars| chars as usize)
        .unwrap_or(stellar_insured_lib::DEFAULT_DISPLAY_CHARS);
    shorten(address, chars)
}

#[wasm_bindgen(js_name = isValidAddress)]
pub fn is_valid_address(address: &str) -> bool {
    stellar_insured_lib::is_valid_address(address)
}

// Module initialization
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    web_sys::console::log_1(&"Stellar Insured WASM module loaded".into());
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    const ADDRESS: &str = "GBRPYHIL2CI3FNQ4BXLFMNDLFJUNPU2HY3ZMFSHONUCEOASW7QC7OX2H";

    fn client(storage_key: &str) -> WalletClient {
        let env = js_sys::Object::new();
        Reflect::set(
            &env,
            &"STELLAR_INSURED_STORAGE_KEY".into(),
            &JsValue::from_str(storage_key),
        )
        .unwrap();
        Reflect::set(&env, &"STELLAR_INSURED_ENV".into(), &"test".into()).unwrap();
        WalletClient::new(env.into()).unwrap()
    }

    #[wasm_bindgen_test]
    fn formats_addresses() {
        assert_eq!(format_address(ADDRESS, Some(4)), "GBRP...OX2H");
        assert_eq!(format_address("not-an-address", None), "not-an-address");
        assert!(is_valid_address(ADDRESS));
    }

    #[wasm_bindgen_test]
    fn registry_survives_a_new_client() {
        let first = client("wasm-test-registry");
        first.reset_all();
        first.register_address(ADDRESS, Some("ops@example.com".to_string()));
        assert!(first.is_address_registered(ADDRESS));
        drop(first);

        let second = client("wasm-test-registry");
        assert!(second.is_address_registered(ADDRESS));
        assert_eq!(second.status(), "idle");
        second.reset_all();
    }

    #[wasm_bindgen_test]
    fn modals_accept_tagged_payloads() {
        let client = client("wasm-test-modals");
        let payload = to_js_value(&ModalPayload::PolicyDetails {
            policy_id: "pol-1".into(),
        })
        .unwrap();

        client.open_modal("policy", payload).unwrap();
        assert!(client.is_modal_open("policy"));
        client.close_all_modals();
        assert!(!client.is_modal_open("policy"));
        assert!(client.open_modal("bad", JsValue::from_str("nope")).is_err());
    }

    #[wasm_bindgen_test]
    async fn connect_without_freighter_rejects() {
        let client = client("wasm-test-connect");
        client.reset_all();

        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        let callback = Closure::<dyn FnMut(JsValue)>::new(move |_state: JsValue| {
            seen.set(seen.get() + 1);
        });
        let listener = client.subscribe(callback.as_ref().unchecked_ref::<Function>().clone());

        let result = JsFuture::from(client.connect()).await;
        assert!(result.is_err());
        assert_eq!(client.status(), "error");
        assert!(client
            .error()
            .unwrap()
            .contains("Failed to connect to Freighter wallet"));
        assert!(calls.get() >= 2);

        client.disconnect();
        assert_eq!(client.status(), "idle");
        assert!(client.unsubscribe(listener));
    }

    #[wasm_bindgen_test]
    async fn presence_is_not_installed_without_freighter() {
        let client = client("wasm-test-presence");
        let presence = JsFuture::from(client.detect_presence()).await.unwrap();
        assert_eq!(presence.as_string().as_deref(), Some("not-installed"));

        let monitor = client
            .watch_presence(Function::new_no_args("return undefined;"))
            .unwrap();
        assert!(monitor.is_running());
        monitor.stop();
        assert!(!monitor.is_running());
    }
}
