//! Wallet provider seam.
//!
//! [`WalletBridge`] mirrors the raw browser-extension API: every call
//! resolves to a response carrying either a value or a provider error
//! string. The free functions below interpret those responses into
//! [`WalletResult`]s with the messages surfaced to users.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::errors::{WalletError, WalletResult};

/// Display name of the supported extension, used in error messages.
pub const PROVIDER_NAME: &str = "Freighter";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    #[serde(default)]
    pub is_connected: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl AvailabilityResponse {
    pub fn installed() -> Self {
        Self {
            is_connected: true,
            error: None,
        }
    }

    pub fn missing() -> Self {
        Self::default()
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            is_connected: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResponse {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Signature as returned by the extension: text, or raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignaturePayload {
    Text(String),
    Bytes(Vec<u8>),
}

impl SignaturePayload {
    pub fn is_empty(&self) -> bool {
        match self {
            SignaturePayload::Text(text) => text.is_empty(),
            SignaturePayload::Bytes(bytes) => bytes.is_empty(),
        }
    }

    /// Text is kept verbatim; bytes become lowercase hex.
    pub fn into_text(self) -> String {
        match self {
            SignaturePayload::Text(text) => text,
            SignaturePayload::Bytes(bytes) => hex::encode(bytes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    #[serde(default)]
    pub signed_message: Option<SignaturePayload>,
    #[serde(default)]
    pub signer_address: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Interpreted result of a successful signing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedMessage {
    pub signed_message: String,
    pub signer_address: String,
}

/// Browser-extension wallet capability.
///
/// `Err` results are transport failures (the call itself threw); provider
/// level refusals come back inside the response's `error` field.
#[allow(async_fn_in_trait)]
pub trait WalletBridge {
    async fn check_availability(&self) -> WalletResult<AvailabilityResponse>;

    async fn request_access(&self) -> WalletResult<AccessResponse>;

    async fn sign_message(&self, message: &str, address: &str) -> WalletResult<SignResponse>;

    /// Push notifications of availability changes, when the provider has them.
    fn availability_events(&self) -> Option<watch::Receiver<AvailabilityResponse>> {
        None
    }
}

/// Check the extension is installed, then ask it for the account address.
pub async fn request_address<B>(bridge: &B) -> WalletResult<String>
where
    B: WalletBridge,
{
    let context = format!("Failed to connect to {} wallet", PROVIDER_NAME);
    access_address(bridge)
        .await
        .map_err(|err| err.with_context(&context))
}

async fn access_address<B>(bridge: &B) -> WalletResult<String>
where
    B: WalletBridge,
{
    let availability = bridge.check_availability().await?;
    if let Some(error) = availability.error {
        return Err(WalletError::ProviderError(format!(
            "Connection error: {}",
            error
        )));
    }
    if !availability.is_connected {
        return Err(WalletError::ProviderUnavailable(format!(
            "{} wallet extension not detected",
            PROVIDER_NAME
        )));
    }

    let access = bridge.request_access().await?;
    if let Some(error) = access.error {
        return Err(WalletError::ProviderError(format!("Access error: {}", error)));
    }
    if access.address.is_empty() {
        return Err(WalletError::ProviderError(
            "Unable to retrieve wallet address".to_string(),
        ));
    }

    Ok(access.address)
}

/// Ask the extension to sign `message` with `address`.
pub async fn sign_message<B>(bridge: &B, address: &str, message: &str) -> WalletResult<SignedMessage>
where
    B: WalletBridge,
{
    signed(bridge, address, message)
        .await
        .map_err(|err| err.with_context("Failed to sign message"))
}

async fn signed<B>(bridge: &B, address: &str, message: &str) -> WalletResult<SignedMessage>
where
    B: WalletBridge,
{
    let response = bridge.sign_message(message, address).await?;
    if let Some(error) = response.error {
        return Err(WalletError::SignatureError(format!("Signing error: {}", error)));
    }

    let payload = response
        .signed_message
        .filter(|payload| !payload.is_empty())
        .ok_or_else(|| WalletError::SignatureError("Failed to sign message".to_string()))?;

    Ok(SignedMessage {
        signed_message: payload.into_text(),
        signer_address: response.signer_address,
    })
}
