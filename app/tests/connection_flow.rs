use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use stellar_insured_lib::{
    format_address, AccessResponse, AvailabilityResponse, ClientConfig, ClientContext,
    ConnectionStatus, Environment, FileStorage, RecordingCookieSink, SignResponse,
    SignaturePayload, WalletBridge, WalletError, WalletResult,
};
use tempfile::TempDir;
use tokio::sync::Notify;

const ADDRESS: &str = "GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

#[derive(Clone)]
struct ScriptedBridge {
    installed: bool,
    signer: String,
    access_calls: Arc<AtomicUsize>,
    sign_calls: Arc<AtomicUsize>,
    /// When set, `request_access` waits here, like a user sitting on the popup.
    gate: Option<Arc<Notify>>,
}

impl ScriptedBridge {
    fn new(installed: bool) -> Self {
        Self {
            installed,
            signer: ADDRESS.to_string(),
            access_calls: Arc::new(AtomicUsize::new(0)),
            sign_calls: Arc::new(AtomicUsize::new(0)),
            gate: None,
        }
    }
}

impl WalletBridge for ScriptedBridge {
    async fn check_availability(&self) -> WalletResult<AvailabilityResponse> {
        Ok(if self.installed {
            AvailabilityResponse::installed()
        } else {
            AvailabilityResponse::missing()
        })
    }

    async fn request_access(&self) -> WalletResult<AccessResponse> {
        self.access_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(AccessResponse {
            address: ADDRESS.to_string(),
            error: None,
        })
    }

    async fn sign_message(&self, message: &str, address: &str) -> WalletResult<SignResponse> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        assert!(message.contains(address));
        Ok(SignResponse {
            signed_message: Some(SignaturePayload::Bytes(vec![0xde, 0xad, 0xbe, 0xef])),
            signer_address: self.signer.clone(),
            error: None,
        })
    }
}

fn open(
    dir: &TempDir,
    bridge: ScriptedBridge,
    cookies: Arc<RecordingCookieSink>,
) -> WalletResult<ClientContext<ScriptedBridge>> {
    let storage = Arc::new(FileStorage::new(dir.path())?);
    Ok(ClientContext::initialize(
        ClientConfig::new(Environment::Test),
        bridge,
        storage,
        cookies,
    ))
}

#[tokio::test]
async fn connect_persist_restore_disconnect() -> WalletResult<()> {
    let temp_dir = TempDir::new().expect("create temp dir");
    let cookies = Arc::new(RecordingCookieSink::new());
    let bridge = ScriptedBridge::new(true);

    let before = Utc::now().timestamp_millis();
    let session = {
        let context = open(&temp_dir, bridge.clone(), cookies.clone())?;
        assert!(!context.wallet().is_address_registered(ADDRESS));

        let session = context.connect().await?;
        assert_eq!(session.address, ADDRESS);
        assert_eq!(session.signer_address, ADDRESS);
        assert_eq!(session.signed_message, "deadbeef");
        assert!(session.authenticated_at >= before);
        assert_eq!(context.wallet().status(), ConnectionStatus::Connected);

        let registered = context
            .wallet()
            .registered_user(ADDRESS)
            .expect("address registered on first sight");
        assert!(registered.created_at >= before);
        assert!(registered.created_at <= Utc::now().timestamp_millis());

        // A second connect is answered from the existing session.
        assert_eq!(context.connect().await?, session);
        assert_eq!(bridge.access_calls.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.sign_calls.load(Ordering::SeqCst), 1);
        session
    };
    assert!(cookies
        .last()
        .expect("session cookie written")
        .contains("max-age=604800"));

    let context = open(&temp_dir, bridge.clone(), Arc::new(RecordingCookieSink::new()))?;
    assert_eq!(context.wallet().status(), ConnectionStatus::Connected);
    assert_eq!(context.wallet().session(), Some(session));
    assert_eq!(
        format_address(ADDRESS, context.config().address_display_chars),
        "GAAAAAAA...AAAAAAAA"
    );

    context.disconnect();
    let state = context.wallet().snapshot();
    assert_eq!(state.status, ConnectionStatus::Idle);
    assert!(state.session.is_none());
    assert!(state.error.is_none());
    assert!(state.registered_users.contains_key(ADDRESS));

    let context = open(&temp_dir, bridge, Arc::new(RecordingCookieSink::new()))?;
    assert_eq!(context.wallet().status(), ConnectionStatus::Idle);
    assert!(context.wallet().is_address_registered(ADDRESS));
    Ok(())
}

#[tokio::test]
async fn missing_extension_fails_without_signing() -> WalletResult<()> {
    let temp_dir = TempDir::new().expect("create temp dir");
    let bridge = ScriptedBridge::new(false);
    let context = open(&temp_dir, bridge.clone(), Arc::new(RecordingCookieSink::new()))?;

    let err = context.connect().await.expect_err("extension is missing");
    assert!(matches!(err, WalletError::ProviderUnavailable(_)));
    assert!(err.to_string().contains("extension not detected"));

    let state = context.wallet().snapshot();
    assert_eq!(state.status, ConnectionStatus::Error);
    assert!(state.error.unwrap().contains("extension not detected"));
    assert!(state.session.is_none());
    assert_eq!(bridge.sign_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn mismatched_signer_is_not_persisted() -> WalletResult<()> {
    let temp_dir = TempDir::new().expect("create temp dir");
    let mut bridge = ScriptedBridge::new(true);
    bridge.signer = "GBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB".to_string();

    let context = open(&temp_dir, bridge.clone(), Arc::new(RecordingCookieSink::new()))?;
    let err = context.connect().await.expect_err("signer differs");
    assert!(matches!(err, WalletError::SignerMismatch(_)));
    assert_eq!(context.wallet().status(), ConnectionStatus::Error);

    let reopened = open(&temp_dir, bridge, Arc::new(RecordingCookieSink::new()))?;
    assert!(reopened.wallet().session().is_none());
    assert_eq!(reopened.wallet().status(), ConnectionStatus::Idle);
    Ok(())
}

#[tokio::test]
async fn disconnect_while_approving_leaves_nothing_behind() -> WalletResult<()> {
    let temp_dir = TempDir::new().expect("create temp dir");
    let cookies = Arc::new(RecordingCookieSink::new());
    let gate = Arc::new(Notify::new());
    let mut bridge = ScriptedBridge::new(true);
    bridge.gate = Some(Arc::clone(&gate));

    let context = open(&temp_dir, bridge.clone(), cookies.clone())?;
    let pending = context.connect();
    tokio::pin!(pending);
    assert!(tokio::time::timeout(Duration::from_millis(20), &mut pending)
        .await
        .is_err());
    assert_eq!(context.wallet().status(), ConnectionStatus::Connecting);

    context.disconnect();
    assert_eq!(context.wallet().status(), ConnectionStatus::Idle);

    gate.notify_one();
    let err = pending.await.expect_err("attempt was abandoned");
    assert_eq!(err, WalletError::ConnectionAbandoned);

    let state = context.wallet().snapshot();
    assert_eq!(state.status, ConnectionStatus::Idle);
    assert!(state.session.is_none());
    assert!(state.error.is_none());
    assert_eq!(bridge.sign_calls.load(Ordering::SeqCst), 0);
    assert!(cookies
        .written()
        .iter()
        .all(|cookie| !cookie.contains("max-age=604800")));

    let reopened = open(&temp_dir, ScriptedBridge::new(true), Arc::new(RecordingCookieSink::new()))?;
    assert_eq!(reopened.wallet().status(), ConnectionStatus::Idle);
    assert!(reopened.wallet().session().is_none());
    Ok(())
}

#[tokio::test]
async fn reset_all_while_approving_lets_the_next_attempt_win() -> WalletResult<()> {
    let temp_dir = TempDir::new().expect("create temp dir");
    let gate = Arc::new(Notify::new());
    let mut bridge = ScriptedBridge::new(true);
    bridge.gate = Some(Arc::clone(&gate));
    let context = open(&temp_dir, bridge.clone(), Arc::new(RecordingCookieSink::new()))?;

    let first = context.connect();
    tokio::pin!(first);
    assert!(tokio::time::timeout(Duration::from_millis(20), &mut first)
        .await
        .is_err());

    context.reset_all();
    assert_eq!(context.wallet().status(), ConnectionStatus::Idle);

    let second = context.connect();
    tokio::pin!(second);
    assert!(tokio::time::timeout(Duration::from_millis(20), &mut second)
        .await
        .is_err());

    gate.notify_one();
    gate.notify_one();
    let (first, second) = tokio::join!(first, second);
    assert_eq!(first.expect_err("superseded"), WalletError::ConnectionAbandoned);
    let session = second?;
    assert_eq!(context.wallet().session(), Some(session.clone()));
    assert_eq!(bridge.sign_calls.load(Ordering::SeqCst), 1);

    let reopened = open(&temp_dir, ScriptedBridge::new(true), Arc::new(RecordingCookieSink::new()))?;
    assert_eq!(reopened.wallet().session(), Some(session));
    Ok(())
}
