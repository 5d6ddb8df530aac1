use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use js_sys::Function;
use stellar_insured_lib::{detect_presence, SessionStore, WalletPresence};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;

use crate::freighter::FreighterBridge;
use crate::to_js_value;

/// Polls Freighter presence on a `setInterval` timer.
///
/// The timer is cleared by `stop()` or when the monitor is freed, and no
/// callback fires after that even if a probe was still in flight.
#[wasm_bindgen]
pub struct PresenceMonitor {
    handle: i32,
    stopped: Rc<Cell<bool>>,
    _tick: Closure<dyn FnMut()>,
}

impl PresenceMonitor {
    pub(crate) fn start(
        store: SessionStore,
        interval: Duration,
        callback: Function,
    ) -> Result<PresenceMonitor, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window available"))?;
        let stopped = Rc::new(Cell::new(false));
        let last: Rc<Cell<Option<WalletPresence>>> = Rc::new(Cell::new(None));

        let tick = {
            let stopped = stopped.clone();
            move || {
                let store = store.clone();
                let stopped = stopped.clone();
                let last = last.clone();
                let callback = callback.clone();
                spawn_local(async move {
                    let presence = detect_presence(&FreighterBridge, store.is_connected()).await;
                    if stopped.get() || last.get() == Some(presence) {
                        return;
                    }
                    last.set(Some(presence));
                    let notified = to_js_value(&presence)
                        .and_then(|value| callback.call1(&JsValue::NULL, &value));
                    if let Err(err) = notified {
                        log::warn!("Presence callback failed: {:?}", err);
                    }
                });
            }
        };

        tick();
        let tick = Closure::<dyn FnMut()>::new(tick);
        let millis = i32::try_from(interval.as_millis()).unwrap_or(i32::MAX);
        let handle = window.set_interval_with_callback_and_timeout_and_arguments_0(
            tick.as_ref().unchecked_ref(),
            millis,
        )?;
        log::debug!("Polling wallet presence every {}ms", millis);

        Ok(PresenceMonitor {
            handle,
            stopped,
            _tick: tick,
        })
    }
}

#[wasm_bindgen]
impl PresenceMonitor {
    pub fn stop(&self) {
        if self.stopped.replace(true) {
            return;
        }
        if let Some(window) = web_sys::window() {
            window.clear_interval_with_handle(self.handle);
        }
    }

    #[wasm_bindgen(getter, js_name = isRunning)]
    pub fn is_running(&self) -> bool {
        !self.stopped.get()
    }
}

impl Drop for PresenceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
