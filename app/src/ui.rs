use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::store::{KeyedStore, StateContainer, SubscriptionId};

/// Modal id used by the wallet connect button for the install guide.
pub const WALLET_INSTALL_GUIDE_MODAL: &str = "wallet-install-guide";

/// Data handed to a modal when it opens.
///
/// `Custom` is the escape hatch: an arbitrary JSON value tagged with the
/// schema name the receiving component expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ModalPayload {
    WalletInstallGuide,
    #[serde(rename_all = "camelCase")]
    PolicyDetails { policy_id: String },
    #[serde(rename_all = "camelCase")]
    ClaimDetails { claim_id: String },
    Confirmation { title: String, message: String },
    Custom {
        schema: String,
        value: serde_json::Value,
    },
}

impl ModalPayload {
    pub fn kind(&self) -> &str {
        match self {
            ModalPayload::WalletInstallGuide => "walletInstallGuide",
            ModalPayload::PolicyDetails { .. } => "policyDetails",
            ModalPayload::ClaimDetails { .. } => "claimDetails",
            ModalPayload::Confirmation { .. } => "confirmation",
            ModalPayload::Custom { schema, .. } => schema,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalState {
    pub is_open: bool,
    pub payload: Option<ModalPayload>,
}

/// Modal visibility, named loading flags and the sidebar toggle.
#[derive(Debug, Clone)]
pub struct UiStore {
    modals: KeyedStore<String, ModalState>,
    loading: KeyedStore<String, bool>,
    sidebar_open: StateContainer<bool>,
}

impl Default for UiStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UiStore {
    pub fn new() -> Self {
        Self {
            modals: KeyedStore::new("UIStore.modals", ModalState::default()),
            loading: KeyedStore::new("UIStore.loading", false),
            sidebar_open: StateContainer::new("UIStore.sidebar", false),
        }
    }

    pub fn open_modal(&self, id: impl Into<String>, payload: Option<ModalPayload>) {
        self.modals.set(
            id.into(),
            ModalState {
                is_open: true,
                payload,
            },
        );
    }

    /// Hide the modal; its payload stays readable.
    pub fn close_modal(&self, id: impl Into<String>) {
        self.modals.update(id.into(), |modal| modal.is_open = false);
    }

    pub fn close_all_modals(&self) {
        self.modals.update_all(|_, modal| modal.is_open = false);
    }

    /// Flip visibility; `payload` is used only when opening. Returns the new visibility.
    pub fn toggle_modal(&self, id: impl Into<String>, payload: Option<ModalPayload>) -> bool {
        self.modals.update(id.into(), move |modal| {
            if modal.is_open {
                modal.is_open = false;
            } else {
                *modal = ModalState {
                    is_open: true,
                    payload,
                };
            }
            modal.is_open
        })
    }

    pub fn is_modal_open(&self, id: &str) -> bool {
        self.modals.get(id).is_open
    }

    pub fn modal(&self, id: &str) -> ModalState {
        self.modals.get(id)
    }

    pub fn modal_payload(&self, id: &str) -> Option<ModalPayload> {
        self.modals.get(id).payload
    }

    pub fn modals_snapshot(&self) -> BTreeMap<String, ModalState> {
        self.modals.snapshot()
    }

    pub fn set_loading(&self, key: impl Into<String>, loading: bool) {
        self.loading.set(key.into(), loading);
    }

    pub fn is_loading(&self, key: &str) -> bool {
        self.loading.get(key)
    }

    pub fn toggle_sidebar(&self) -> bool {
        self.sidebar_open.update(|open| {
            *open = !*open;
            *open
        })
    }

    pub fn set_sidebar_open(&self, open: bool) {
        self.sidebar_open.set(open);
    }

    pub fn is_sidebar_open(&self) -> bool {
        self.sidebar_open.get()
    }

    pub fn reset(&self) {
        self.modals.reset_all();
        self.loading.reset_all();
        self.sidebar_open.reset();
    }

    pub fn subscribe_modals<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&BTreeMap<String, ModalState>) + Send + Sync + 'static,
    {
        self.modals.subscribe(listener)
    }

    pub fn unsubscribe_modals(&self, id: SubscriptionId) -> bool {
        self.modals.unsubscribe(id)
    }
}
