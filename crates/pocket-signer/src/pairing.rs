//! Pairing state machine.
//!
//! Owns session identity and the approval wait loop: a session is created
//! (or resumed from the local store), the pairing artifact is shown to the
//! user, and the remote session row is polled until the wallet app approves
//! the pairing and publishes a wallet list for the active network.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use crate::artifact::{ArtifactPresenter, PairingArtifact};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::protocol::{Network, SessionRow, SessionStatus};
use crate::relay::{Relay, SessionUpdate};
use crate::store::{SessionStore, StoredSession};

/// Local pairing status. Distinct from the remote row's status: `Unpaired`
/// exists only before the first `create_session` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingStatus {
    Unpaired,
    Pending,
    Connected,
}

/// Cancels an in-flight `await_approval` from another task. Observed at the
/// wait loop's next check.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

pub struct PairingEngine {
    session_id: String,
    app_name: String,
    network: Network,
    status: PairingStatus,
    session_created: bool,
    wallets: HashMap<Network, Vec<String>>,
    config: EngineConfig,
    relay: Arc<dyn Relay>,
    store: Box<dyn SessionStore>,
    presenter: Arc<dyn ArtifactPresenter>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl PairingEngine {
    /// Create an engine, resuming the stored session when its app name
    /// matches and generating a fresh session id otherwise.
    pub fn new(
        app_name: impl Into<String>,
        config: EngineConfig,
        relay: Arc<dyn Relay>,
        store: Box<dyn SessionStore>,
        presenter: Arc<dyn ArtifactPresenter>,
    ) -> Self {
        let app_name = app_name.into();
        let resumed = store.load().filter(|s| s.app_name == app_name);
        let (session_id, network, session_created, status) = match resumed {
            Some(stored) => {
                tracing::info!(
                    session_id = %stored.session_id,
                    network = %stored.network,
                    "resuming stored session"
                );
                (stored.session_id, stored.network, true, PairingStatus::Pending)
            }
            None => (
                uuid::Uuid::new_v4().to_string(),
                Network::Testnet,
                false,
                PairingStatus::Unpaired,
            ),
        };

        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            session_id,
            app_name,
            network,
            status,
            session_created,
            wallets: HashMap::new(),
            config,
            relay,
            store,
            presenter,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn status(&self) -> PairingStatus {
        self.status
    }

    /// Handle for cancelling a pairing wait from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Switch the active network. If the session already exists remotely,
    /// push the new network to the relay best-effort; a failure there is
    /// logged and the local switch still takes effect.
    pub async fn select_network(&mut self, network: Network) {
        self.network = network;
        tracing::debug!(%network, "active network set");
        if self.session_created {
            if let Err(e) = self
                .relay
                .update_session(&self.session_id, SessionUpdate::network(network))
                .await
            {
                tracing::warn!(error = %e, "failed to update session network on relay");
            }
        }
    }

    /// Return the wallet list for the active network, establishing or
    /// resuming the pairing as needed.
    ///
    /// Fast path: wallets already cached for the active network. Otherwise
    /// the engine resumes a stored session (reconnecting if the remote row
    /// lacks wallets for this network), or bootstraps a brand-new session,
    /// and then blocks until the wallet approves, the caller cancels, or the
    /// pairing window elapses.
    pub async fn resolve_wallets(&mut self) -> Result<Vec<String>> {
        if let Some(wallets) = self.wallets.get(&self.network) {
            if !wallets.is_empty() {
                return Ok(wallets.clone());
            }
        }

        if self.session_created {
            match self.relay.get_session(&self.session_id).await {
                Ok(Some(row)) => {
                    if let Some(wallets) = self.adopt_wallets(&row).await {
                        tracing::info!(
                            network = %self.network,
                            count = wallets.len(),
                            "using previously connected wallets"
                        );
                        self.status = PairingStatus::Connected;
                        return Ok(wallets);
                    }
                    // Row exists but has no wallets for this network: the
                    // user must approve again, under the same session id.
                    self.reconnect().await;
                }
                Ok(None) => {
                    tracing::info!("stored session unknown to relay; creating a new row");
                    self.bootstrap().await?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to fetch stored session; reconnecting");
                    self.reconnect().await;
                }
            }
        } else {
            self.bootstrap().await?;
        }

        if let Err(e) = self.await_approval().await {
            // Session identity survives, but the pairing must be redone.
            self.status = PairingStatus::Unpaired;
            return Err(e);
        }
        Ok(self.wallets.get(&self.network).cloned().unwrap_or_default())
    }

    /// Create the remote session row and emit the pairing artifact.
    /// A relay failure is fatal for this call; the session stays un-created
    /// and the operation can be retried.
    pub async fn bootstrap(&mut self) -> Result<()> {
        self.relay
            .create_session(&self.session_id, &self.config.origin_tag, self.network)
            .await?;
        self.session_created = true;
        self.status = PairingStatus::Pending;
        self.present_artifact();
        Ok(())
    }

    /// Re-emit the pairing artifact for the existing session id, upserting
    /// the remote row. Errors are logged, not fatal: the approval wait that
    /// follows decides the outcome.
    pub async fn reconnect(&mut self) {
        match self
            .relay
            .create_session(&self.session_id, &self.config.origin_tag, self.network)
            .await
        {
            Ok(()) => {
                self.session_created = true;
                self.status = PairingStatus::Pending;
            }
            Err(e) => tracing::warn!(error = %e, "failed to recreate session row"),
        }
        self.present_artifact();
    }

    /// Poll the session row until the wallet approves the pairing for the
    /// active network, the caller cancels, or the pairing window elapses.
    /// Individual poll failures are retried on the next tick.
    pub async fn await_approval(&mut self) -> Result<()> {
        tracing::info!(network = %self.network, "waiting for wallet approval");
        // A cancellation from an earlier wait must not abort this one.
        let _ = self.cancel_tx.send(false);
        let started = Instant::now();
        let mut cancel_rx = self.cancel_rx.clone();

        loop {
            if *cancel_rx.borrow() {
                return Err(Error::UserCancelled);
            }
            if started.elapsed() >= self.config.pairing_timeout {
                return Err(Error::PairingTimeout);
            }

            match self.relay.get_session(&self.session_id).await {
                Ok(Some(row)) if row.status == SessionStatus::Connected => {
                    if let Some(wallets) = self.adopt_wallets(&row).await {
                        tracing::info!(
                            network = %self.network,
                            count = wallets.len(),
                            "wallet connected"
                        );
                        self.status = PairingStatus::Connected;
                        let stored = StoredSession {
                            session_id: self.session_id.clone(),
                            app_name: self.app_name.clone(),
                            network: self.network,
                        };
                        if let Err(e) = self.store.save(&stored) {
                            tracing::warn!(error = %e, "failed to persist session");
                        }
                        return Ok(());
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "session poll failed; retrying"),
            }

            let poll = self.config.poll_interval;
            tokio::select! {
                _ = cancel_rx.changed() => {}
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }

    /// Pick the wallet list for the active network off a session row and
    /// cache it. Falls back to the legacy undifferentiated list, migrating
    /// it into the network-specific column so the fallback is not needed on
    /// later fetches. Returns `None` when the row has no usable wallets.
    async fn adopt_wallets(&mut self, row: &SessionRow) -> Option<Vec<String>> {
        let network_list = row.wallets_for(self.network);
        let adopted = if !network_list.is_empty() {
            network_list.to_vec()
        } else if !row.wallets.is_empty() {
            tracing::debug!(
                field = self.network.wallet_field(),
                "migrating legacy wallet list"
            );
            if let Err(e) = self
                .relay
                .update_session(
                    &self.session_id,
                    SessionUpdate::wallets(self.network, row.wallets.clone()),
                )
                .await
            {
                tracing::warn!(error = %e, "legacy wallet migration failed; will retry on next sighting");
            }
            row.wallets.clone()
        } else {
            return None;
        };

        self.wallets.insert(self.network, adopted.clone());
        Some(adopted)
    }

    fn present_artifact(&self) {
        let artifact =
            PairingArtifact::new(self.app_name.clone(), self.session_id.clone(), self.network);
        self.presenter.present(&artifact);
    }
}
