//! Request correlator and polling scheduler.
//!
//! Each signing request is a row on the relay that the paired wallet fills
//! in out of band; the only completion signal is the periodically re-fetched
//! request history. The correlator maps every outstanding request to exactly
//! one outcome: signed, rejected, or timed out.
//!
//! Settlement discipline: a pending entry holds a oneshot sender, consumed
//! under the state mutex. Whichever side takes the sender first — a history
//! match or the submit-side timeout — wins; the other finds it gone. Double
//! settlement is unrepresentable.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::oneshot;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::protocol::{Network, RequestStatus, SigningRequestRow};
use crate::relay::{NewSigningRequest, Relay};

/// Cap on the processed-id set; exceeding it evicts the oldest entries.
const PROCESSED_CAP: usize = 100;
const PROCESSED_EVICT: usize = 50;

enum Settlement {
    Signed(String),
    Rejected,
}

struct PendingEntry {
    settle: Option<oneshot::Sender<Settlement>>,
    created_at: Instant,
}

struct SignerState {
    pending: HashMap<String, PendingEntry>,
    /// Terminal request ids already acted on, so a record seen by two fetch
    /// cycles (e.g. the immediate check racing the first tick) settles once.
    processed: VecDeque<String>,
    processed_set: HashSet<String>,
    network: Network,
    node_url: String,
    polling: bool,
}

struct SignerInner {
    session_id: String,
    config: EngineConfig,
    relay: Arc<dyn Relay>,
    state: Mutex<SignerState>,
}

/// Submits signing requests and reconciles them against polled history.
/// Cheap to clone; clones share the same outstanding-request state.
#[derive(Clone)]
pub struct PocketSigner {
    inner: Arc<SignerInner>,
}

impl PocketSigner {
    pub fn new(
        session_id: impl Into<String>,
        network: Network,
        config: EngineConfig,
        relay: Arc<dyn Relay>,
    ) -> Self {
        Self {
            inner: Arc::new(SignerInner {
                session_id: session_id.into(),
                config,
                relay,
                state: Mutex::new(SignerState {
                    pending: HashMap::new(),
                    processed: VecDeque::new(),
                    processed_set: HashSet::new(),
                    network,
                    node_url: String::new(),
                    polling: false,
                }),
            }),
        }
    }

    /// Switch the network filter. In-flight requests submitted under the old
    /// network stop matching history records tagged with it.
    pub fn set_network(&self, network: Network) {
        self.lock().network = network;
    }

    /// Record the node URL forwarded to the wallet on each request.
    pub fn set_node_url(&self, url: impl Into<String>) {
        self.lock().node_url = url.into();
    }

    /// Number of outstanding signing requests.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Submit raw payload bytes for signing; hex-encodes them on the wire.
    pub async fn submit(&self, payload: &[u8], address: &str) -> Result<String> {
        self.submit_hex(format!("0x{}", hex::encode(payload)), address)
            .await
    }

    /// Submit an already-hex-encoded payload and wait for the wallet's
    /// signature. Any number of submissions may be outstanding at once.
    pub async fn submit_hex(&self, payload_hex: String, address: &str) -> Result<String> {
        let req_id = uuid::Uuid::new_v4().to_string();
        let (network, node_url) = {
            let state = self.lock();
            (state.network, state.node_url.clone())
        };
        tracing::debug!(%req_id, %network, "creating signing request");

        self.inner
            .relay
            .create_signing_request(&NewSigningRequest {
                session_id: self.inner.session_id.clone(),
                req_id: req_id.clone(),
                payload_hex,
                address: address.to_string(),
                node_url,
                network,
            })
            .await?;

        let (tx, rx) = oneshot::channel();
        self.lock().pending.insert(
            req_id.clone(),
            PendingEntry {
                settle: Some(tx),
                created_at: Instant::now(),
            },
        );

        // Check history right away in case the wallet signed before we
        // started waiting, then keep the shared poll loop running.
        if let Err(e) = self.poll_once().await {
            tracing::warn!(%req_id, error = %e, "initial history check failed");
        }
        self.ensure_polling();

        match tokio::time::timeout(self.inner.config.signing_timeout, rx).await {
            Ok(Ok(Settlement::Signed(signature))) => Ok(signature),
            Ok(Ok(Settlement::Rejected)) => Err(Error::UserRejected(req_id)),
            // Sender dropped without settling; nothing can arrive any more.
            Ok(Err(_)) => Err(Error::SigningTimeout(req_id)),
            Err(_) => {
                self.lock().pending.remove(&req_id);
                tracing::debug!(%req_id, "signing request timed out");
                Err(Error::SigningTimeout(req_id))
            }
        }
    }

    /// One full fetch/reconcile pass over the request history.
    async fn poll_once(&self) -> Result<()> {
        let network = self.lock().network;
        let records = self
            .inner
            .relay
            .request_history(&self.inner.session_id, network)
            .await?;
        self.reconcile(&records);
        Ok(())
    }

    /// Match history records against outstanding entries. Idempotent and
    /// order-independent: settled ids land in the processed set and later
    /// sightings are ignored.
    fn reconcile(&self, records: &[SigningRequestRow]) {
        let mut state = self.lock();
        let active = state.network;

        for record in records {
            if state.processed_set.contains(&record.req_id) {
                continue;
            }
            // A record without a network predates network tagging and
            // matches anything; a mismatched one never does, even on id.
            if record.network.is_some_and(|n| n != active) {
                continue;
            }
            let Some(entry) = state.pending.get_mut(&record.req_id) else {
                continue;
            };

            let settlement = match record.status {
                RequestStatus::Signed => match record.signature_hex.as_deref() {
                    Some(sig) if !sig.is_empty() => Settlement::Signed(sig.to_string()),
                    _ => continue,
                },
                RequestStatus::Rejected => Settlement::Rejected,
                RequestStatus::Pending | RequestStatus::Unknown => continue,
            };

            if let Some(tx) = entry.settle.take() {
                tracing::debug!(
                    req_id = %record.req_id,
                    elapsed = ?entry.created_at.elapsed(),
                    signed = matches!(settlement, Settlement::Signed(_)),
                    "settling signing request"
                );
                // The waiter may have timed out and gone away already.
                let _ = tx.send(settlement);
            }
            state.pending.remove(&record.req_id);
            mark_processed(&mut state, record.req_id.clone());
        }
    }

    /// Start the shared poll loop if it is not already running. The loop
    /// stops itself once no requests are outstanding and is restarted lazily
    /// by the next submission.
    fn ensure_polling(&self) {
        {
            let mut state = self.lock();
            if state.polling {
                return;
            }
            state.polling = true;
        }

        let signer = self.clone();
        tokio::spawn(async move {
            tracing::debug!("signature poll loop started");
            loop {
                tokio::time::sleep(signer.inner.config.poll_interval).await;
                if let Err(e) = signer.poll_once().await {
                    tracing::warn!(error = %e, "history poll failed; retrying");
                }
                let mut state = signer.lock();
                if state.pending.is_empty() {
                    state.polling = false;
                    break;
                }
            }
            tracing::debug!("signature poll loop stopped; no pending requests");
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SignerState> {
        self.inner.state.lock().expect("signer state lock poisoned")
    }
}

fn mark_processed(state: &mut SignerState, req_id: String) {
    state.processed_set.insert(req_id.clone());
    state.processed.push_back(req_id);
    if state.processed.len() > PROCESSED_CAP {
        for _ in 0..PROCESSED_EVICT {
            if let Some(old) = state.processed.pop_front() {
                state.processed_set.remove(&old);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::protocol::SessionRow;
    use crate::relay::SessionUpdate;
    use std::time::Duration;

    /// Relay stub for reconcile-level tests; no call should reach it.
    struct UnusedRelay;

    #[async_trait]
    impl Relay for UnusedRelay {
        async fn create_session(&self, _: &str, _: &str, _: Network) -> Result<()> {
            unreachable!("relay should not be called")
        }
        async fn get_session(&self, _: &str) -> Result<Option<SessionRow>> {
            unreachable!("relay should not be called")
        }
        async fn update_session(&self, _: &str, _: SessionUpdate) -> Result<()> {
            unreachable!("relay should not be called")
        }
        async fn create_signing_request(&self, _: &NewSigningRequest) -> Result<()> {
            unreachable!("relay should not be called")
        }
        async fn request_history(&self, _: &str, _: Network) -> Result<Vec<SigningRequestRow>> {
            unreachable!("relay should not be called")
        }
    }

    fn signer() -> PocketSigner {
        PocketSigner::new(
            "session-1",
            Network::Testnet,
            EngineConfig::default(),
            Arc::new(UnusedRelay),
        )
    }

    fn register(signer: &PocketSigner, req_id: &str) -> oneshot::Receiver<Settlement> {
        let (tx, rx) = oneshot::channel();
        signer.lock().pending.insert(
            req_id.to_string(),
            PendingEntry {
                settle: Some(tx),
                created_at: Instant::now(),
            },
        );
        rx
    }

    fn signed_row(req_id: &str, network: Option<Network>, sig: &str) -> SigningRequestRow {
        SigningRequestRow {
            req_id: req_id.to_string(),
            session_id: Some("session-1".to_string()),
            payload_hex: None,
            address: None,
            node_url: None,
            network,
            status: RequestStatus::Signed,
            signature_hex: Some(sig.to_string()),
        }
    }

    #[test]
    fn reconcile_settles_a_matching_signed_record() {
        let signer = signer();
        let mut rx = register(&signer, "r1");
        signer.reconcile(&[signed_row("r1", Some(Network::Testnet), "0xabc123")]);
        match rx.try_recv().unwrap() {
            Settlement::Signed(sig) => assert_eq!(sig, "0xabc123"),
            Settlement::Rejected => panic!("expected signed settlement"),
        }
        assert_eq!(signer.pending_count(), 0);
    }

    #[test]
    fn reconcile_is_idempotent_across_repeat_sightings() {
        let signer = signer();
        let mut rx = register(&signer, "r1");
        let row = signed_row("r1", None, "0xabc123");
        signer.reconcile(std::slice::from_ref(&row));
        signer.reconcile(std::slice::from_ref(&row));
        // First sighting settles; second is a no-op against the processed set.
        assert!(matches!(rx.try_recv(), Ok(Settlement::Signed(_))));
        assert!(rx.try_recv().is_err());
        assert!(signer.lock().processed_set.contains("r1"));
    }

    #[test]
    fn cross_network_record_never_settles() {
        let signer = signer();
        let mut rx = register(&signer, "r1");
        signer.reconcile(&[signed_row("r1", Some(Network::Mainnet), "0xabc123")]);
        assert!(rx.try_recv().is_err());
        assert_eq!(signer.pending_count(), 1);
        // And it is not burned into the processed set either: once the
        // record shows up under the right network it still settles.
        signer.reconcile(&[signed_row("r1", Some(Network::Testnet), "0xabc123")]);
        assert!(matches!(rx.try_recv(), Ok(Settlement::Signed(_))));
    }

    #[test]
    fn untagged_record_matches_any_network() {
        let signer = signer();
        signer.set_network(Network::Mainnet);
        let mut rx = register(&signer, "r1");
        signer.reconcile(&[signed_row("r1", None, "0xfeed")]);
        assert!(matches!(rx.try_recv(), Ok(Settlement::Signed(_))));
    }

    #[test]
    fn pending_and_empty_signature_records_leave_entry_outstanding() {
        let signer = signer();
        let mut rx = register(&signer, "r1");

        let mut pending = signed_row("r1", None, "0x");
        pending.status = RequestStatus::Pending;
        pending.signature_hex = None;
        signer.reconcile(&[pending]);
        assert_eq!(signer.pending_count(), 1);

        // "signed" with an empty signature is not a terminal sighting.
        signer.reconcile(&[signed_row("r1", None, "")]);
        assert_eq!(signer.pending_count(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn rejected_record_settles_as_rejection() {
        let signer = signer();
        let mut rx = register(&signer, "r1");
        let mut row = signed_row("r1", None, "");
        row.status = RequestStatus::Rejected;
        row.signature_hex = None;
        signer.reconcile(&[row]);
        assert!(matches!(rx.try_recv(), Ok(Settlement::Rejected)));
        assert_eq!(signer.pending_count(), 0);
    }

    #[test]
    fn records_for_unknown_ids_are_ignored() {
        let signer = signer();
        signer.reconcile(&[signed_row("stale", None, "0x01")]);
        assert_eq!(signer.pending_count(), 0);
        assert!(signer.lock().processed_set.is_empty());
    }

    /// Relay that accepts requests but never reports them back.
    struct SilentRelay;

    #[async_trait]
    impl Relay for SilentRelay {
        async fn create_session(&self, _: &str, _: &str, _: Network) -> Result<()> {
            unreachable!("relay should not be called")
        }
        async fn get_session(&self, _: &str) -> Result<Option<SessionRow>> {
            unreachable!("relay should not be called")
        }
        async fn update_session(&self, _: &str, _: SessionUpdate) -> Result<()> {
            unreachable!("relay should not be called")
        }
        async fn create_signing_request(&self, _: &NewSigningRequest) -> Result<()> {
            Ok(())
        }
        async fn request_history(&self, _: &str, _: Network) -> Result<Vec<SigningRequestRow>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn late_signature_after_timeout_never_settles_twice() {
        let config = EngineConfig {
            relay_url: "http://relay.invalid".to_string(),
            poll_interval: Duration::from_millis(10),
            pairing_timeout: Duration::from_millis(100),
            signing_timeout: Duration::from_millis(60),
            origin_tag: "cli".to_string(),
        };
        let signer =
            PocketSigner::new("session-1", Network::Testnet, config, Arc::new(SilentRelay));

        let err = signer.submit(b"payload", "5Grw").await.unwrap_err();
        let Error::SigningTimeout(req_id) = err else {
            panic!("expected signing timeout, got {err:?}");
        };
        assert_eq!(signer.pending_count(), 0);

        // The wallet signs after the waiter gave up: the record must be
        // ignored, not resurrected into a second resolution.
        signer.reconcile(&[signed_row(&req_id, Some(Network::Testnet), "0xlate")]);
        assert_eq!(signer.pending_count(), 0);
        // Nothing settled, so the id was not marked processed either; only
        // actual settlements land in that set.
        assert!(signer.lock().processed_set.is_empty());
    }

    #[test]
    fn processed_set_is_bounded() {
        let signer = signer();
        let mut state = signer.lock();
        for i in 0..=PROCESSED_CAP {
            mark_processed(&mut state, format!("req-{i}"));
        }
        assert_eq!(state.processed.len(), PROCESSED_CAP + 1 - PROCESSED_EVICT);
        assert_eq!(state.processed.len(), state.processed_set.len());
        // Oldest ids are the evicted ones.
        assert!(!state.processed_set.contains("req-0"));
        assert!(state.processed_set.contains(&format!("req-{PROCESSED_CAP}")));
    }
}
