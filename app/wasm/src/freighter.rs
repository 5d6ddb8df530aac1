//! Freighter extension adapter.
//!
//! Calls go through the `freighterApi` global set by the
//! `@stellar/freighter-api` browser bundle. A page without the bundle gets
//! provider errors at call time instead of a failed module load.

use js_sys::{Object, Promise, Reflect, Uint8Array};
use stellar_insured_lib::{
    AccessResponse, AvailabilityResponse, SignResponse, SignaturePayload, WalletBridge,
    WalletError, WalletResult, PROVIDER_NAME,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = freighterApi, js_name = isConnected, catch)]
    fn freighter_is_connected() -> Result<Promise, JsValue>;

    #[wasm_bindgen(js_namespace = freighterApi, js_name = requestAccess, catch)]
    fn freighter_request_access() -> Result<Promise, JsValue>;

    #[wasm_bindgen(js_namespace = freighterApi, js_name = signMessage, catch)]
    fn freighter_sign_message(message: &str, opts: &JsValue) -> Result<Promise, JsValue>;
}

/// [`WalletBridge`] over the Freighter browser API.
///
/// Freighter has no availability events, so presence is always polled.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreighterBridge;

impl WalletBridge for FreighterBridge {
    async fn check_availability(&self) -> WalletResult<AvailabilityResponse> {
        let value = settle(freighter_is_connected()).await?;
        Ok(AvailabilityResponse {
            is_connected: bool_field(&value, "isConnected"),
            error: error_field(&value),
        })
    }

    async fn request_access(&self) -> WalletResult<AccessResponse> {
        let value = settle(freighter_request_access()).await?;
        Ok(AccessResponse {
            address: string_field(&value, "address").unwrap_or_default(),
            error: error_field(&value),
        })
    }

    async fn sign_message(&self, message: &str, address: &str) -> WalletResult<SignResponse> {
        let opts = Object::new();
        Reflect::set(&opts, &"address".into(), &JsValue::from_str(address)).map_err(js_error)?;

        let value = settle(freighter_sign_message(message, &opts)).await?;
        Ok(SignResponse {
            signed_message: signature_field(&value),
            signer_address: string_field(&value, "signerAddress").unwrap_or_default(),
            error: error_field(&value),
        })
    }
}

async fn settle(call: Result<Promise, JsValue>) -> WalletResult<JsValue> {
    let promise = call.map_err(js_error)?;
    JsFuture::from(promise).await.map_err(js_error)
}

fn field(value: &JsValue, name: &str) -> Option<JsValue> {
    Reflect::get(value, &JsValue::from_str(name))
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
}

fn bool_field(value: &JsValue, name: &str) -> bool {
    field(value, name).and_then(|v| v.as_bool()).unwrap_or(false)
}

fn string_field(value: &JsValue, name: &str) -> Option<String> {
    field(value, name).and_then(|v| v.as_string())
}

/// Freighter reports errors as a string or as `{ message }`.
fn error_field(value: &JsValue) -> Option<String> {
    let error = field(value, "error")?;
    if let Some(text) = error.as_string() {
        return Some(text);
    }
    Some(string_field(&error, "message").unwrap_or_else(|| format!("{:?}", error)))
}

fn signature_field(value: &JsValue) -> Option<SignaturePayload> {
    let signed = field(value, "signedMessage")?;
    if let Some(text) = signed.as_string() {
        return Some(SignaturePayload::Text(text));
    }
    signed
        .dyn_ref::<Uint8Array>()
        .map(|bytes| SignaturePayload::Bytes(bytes.to_vec()))
}

/// Thrown values become provider errors carrying the JS message.
pub(crate) fn js_error(value: JsValue) -> WalletError {
    let message = value
        .dyn_ref::<js_sys::Error>()
        .map(|err| String::from(err.message()))
        .or_else(|| value.as_string())
        .unwrap_or_else(|| format!("{} call failed: {:?}", PROVIDER_NAME, value));
    WalletError::ProviderError(message)
}
