//! Public facade tying the pairing engine and the request correlator
//! together, plus the two lifecycle hooks a host SDK calls.

use std::any::Any;
use std::sync::Arc;

use crate::artifact::{ArtifactPresenter, NullPresenter};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::pairing::{CancelHandle, PairingEngine, PairingStatus};
use crate::protocol::Network;
use crate::relay::{HttpRelay, Relay};
use crate::signer::PocketSigner;
use crate::store::{FileSessionStore, SessionStore};

/// A wallet address presented as a local key record, for API parity with
/// key-holding signing managers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalKey {
    pub name: String,
    pub public_key: String,
    pub address: String,
}

/// The engine's public entry point: pair once, then submit any number of
/// concurrent signing requests.
pub struct PocketSigningManager {
    pairing: PairingEngine,
    signer: PocketSigner,
    node_url: Option<String>,
    /// Opaque handle supplied by the host SDK once its own handshake is
    /// done. Retained, never inspected.
    host_handle: Option<Box<dyn Any + Send + Sync>>,
}

impl PocketSigningManager {
    /// Build a manager with explicit collaborators. The session id is
    /// resumed from `store` when the stored app name matches, otherwise
    /// freshly generated.
    pub fn new(
        app_name: impl Into<String>,
        config: EngineConfig,
        relay: Arc<dyn Relay>,
        store: Box<dyn SessionStore>,
        presenter: Arc<dyn ArtifactPresenter>,
    ) -> Self {
        let pairing = PairingEngine::new(app_name, config.clone(), Arc::clone(&relay), store, presenter);
        let signer = PocketSigner::new(
            pairing.session_id().to_string(),
            pairing.network(),
            config,
            relay,
        );
        Self {
            pairing,
            signer,
            node_url: None,
            host_handle: None,
        }
    }

    /// Production wiring: HTTP relay, file-backed store, headless presenter.
    pub fn with_defaults(app_name: impl Into<String>) -> Self {
        let config = EngineConfig::default();
        let relay: Arc<dyn Relay> = Arc::new(HttpRelay::new(config.relay_url.clone()));
        Self::new(
            app_name,
            config,
            relay,
            Box::new(FileSessionStore::default()),
            Arc::new(NullPresenter),
        )
    }

    pub fn session_id(&self) -> &str {
        self.pairing.session_id()
    }

    pub fn network(&self) -> Network {
        self.pairing.network()
    }

    pub fn status(&self) -> PairingStatus {
        self.pairing.status()
    }

    /// Handle for cancelling an in-flight pairing wait from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.pairing.cancel_handle()
    }

    /// Switch the active network. Rejects anything other than `testnet` or
    /// `mainnet` before touching the relay, leaving the prior network in
    /// place.
    pub async fn select_network(&mut self, name: &str) -> Result<()> {
        let network: Network = name.parse()?;
        self.pairing.select_network(network).await;
        self.signer.set_network(network);
        Ok(())
    }

    /// Host hook: called before connecting, with the chain node URL. The
    /// network is inferred from the URL and the signing requests carry the
    /// URL so the wallet knows which node to submit against.
    pub async fn set_node_url(&mut self, url: &str) -> Result<()> {
        self.node_url = Some(url.to_string());
        self.signer.set_node_url(url);
        let network = if url.contains("mainnet") {
            Network::Mainnet
        } else {
            Network::Testnet
        };
        self.pairing.select_network(network).await;
        self.signer.set_network(network);
        Ok(())
    }

    /// Host hook: called once the host's own connection is established.
    pub fn register_host_handle(&mut self, handle: Box<dyn Any + Send + Sync>) {
        self.host_handle = Some(handle);
    }

    /// The handle registered by the host, if any.
    pub fn host_handle(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.host_handle.as_deref()
    }

    /// The node URL most recently supplied by the host.
    pub fn node_url(&self) -> Option<&str> {
        self.node_url.as_deref()
    }

    /// Wallet addresses for the active network, pairing first if needed.
    /// Idempotent and side-effect-free once connected.
    pub async fn accounts(&mut self) -> Result<Vec<String>> {
        self.pairing.resolve_wallets().await
    }

    /// The paired wallets presented as key records. Pocket never exposes
    /// key material, so public key and address coincide.
    pub async fn local_keys(&mut self) -> Result<Vec<LocalKey>> {
        Ok(self
            .accounts()
            .await?
            .into_iter()
            .map(|address| LocalKey {
                name: "wallet".to_string(),
                public_key: address.clone(),
                address,
            })
            .collect())
    }

    /// Sign raw bytes with the given address. Resolves when the wallet
    /// signs, fails when it rejects or the signing window elapses.
    pub async fn sign_raw(&self, address: &str, payload: &[u8]) -> Result<String> {
        self.signer.submit(payload, address).await
    }

    /// Sign an already-encoded transaction payload (hex string).
    pub async fn sign_payload_hex(&self, address: &str, payload_hex: String) -> Result<String> {
        self.signer.submit_hex(payload_hex, address).await
    }

    /// The correlator, for callers that want to share it across tasks.
    pub fn signer(&self) -> PocketSigner {
        self.signer.clone()
    }
}
