use stellar_insured_lib::{CookieSink, WalletError, WalletResult};
use wasm_bindgen::JsCast;
use web_sys::HtmlDocument;

use crate::freighter::js_error;

/// Writes to `document.cookie`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentCookieSink;

impl CookieSink for DocumentCookieSink {
    fn write_cookie(&self, cookie: &str) -> WalletResult<()> {
        let document = web_sys::window()
            .and_then(|window| window.document())
            .and_then(|document| document.dyn_into::<HtmlDocument>().ok())
            .ok_or_else(|| WalletError::Unknown("No HTML document available".to_string()))?;
        document.set_cookie(cookie).map_err(js_error)
    }
}
