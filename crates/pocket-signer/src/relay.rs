//! Relay RPC client.
//!
//! The relay is a single HTTP endpoint that multiplexes operations via a
//! `?endpoint=` query parameter and JSON POST bodies. It is treated as
//! correct but slow; every call is independent and stateless.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::protocol::{
    AckResponse, HistoryResponse, Network, SessionResponse, SessionRow, SigningRequestRow,
};

/// Fields for `create_signing_request`.
#[derive(Debug, Clone, Serialize)]
pub struct NewSigningRequest {
    pub session_id: String,
    pub req_id: String,
    pub payload_hex: String,
    pub address: String,
    pub node_url: String,
    pub network: Network,
}

/// Partial update for `update_session`. `None` fields are left untouched
/// on the remote row.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testnet_wallets: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mainnet_wallets: Option<Vec<String>>,
}

impl SessionUpdate {
    /// An update that sets the wallet list for `network`.
    pub fn wallets(network: Network, wallets: Vec<String>) -> Self {
        match network {
            Network::Testnet => Self {
                testnet_wallets: Some(wallets),
                ..Self::default()
            },
            Network::Mainnet => Self {
                mainnet_wallets: Some(wallets),
                ..Self::default()
            },
        }
    }

    /// An update that changes the session's network field.
    pub fn network(network: Network) -> Self {
        Self {
            network: Some(network),
            ..Self::default()
        }
    }
}

/// The relay RPC surface the engine depends on. Mocked in tests.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Create (or upsert) the remote session row.
    async fn create_session(
        &self,
        session_id: &str,
        origin_hash: &str,
        network: Network,
    ) -> Result<()>;

    /// Fetch the session row, or `None` if the relay does not know the id.
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRow>>;

    /// Apply a partial update to the session row.
    async fn update_session(&self, session_id: &str, update: SessionUpdate) -> Result<()>;

    /// Create a signing request row for the paired wallet to pick up.
    async fn create_signing_request(&self, request: &NewSigningRequest) -> Result<()>;

    /// Fetch the full request history for a session on one network.
    async fn request_history(
        &self,
        session_id: &str,
        network: Network,
    ) -> Result<Vec<SigningRequestRow>>;
}

/// `Relay` implementation over HTTP POST + JSON.
pub struct HttpRelay {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRelay {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let url = format!("{}?endpoint={endpoint}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::relay(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::relay(endpoint, format!("HTTP {status}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| Error::relay(endpoint, format!("bad JSON: {e}")))
    }
}

#[async_trait]
impl Relay for HttpRelay {
    async fn create_session(
        &self,
        session_id: &str,
        origin_hash: &str,
        network: Network,
    ) -> Result<()> {
        let ack: AckResponse = self
            .call(
                "create_session",
                &json!({
                    "session_id": session_id,
                    "origin_hash": origin_hash,
                    "network": network,
                }),
            )
            .await?;
        ack_to_result("create_session", ack)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRow>> {
        let resp: SessionResponse = self
            .call("get_session", &json!({ "session_id": session_id }))
            .await?;
        // The relay reports success: false for unknown session ids; that is
        // "no row", not a failure.
        if !resp.success {
            return Ok(None);
        }
        Ok(resp.session)
    }

    async fn update_session(&self, session_id: &str, update: SessionUpdate) -> Result<()> {
        let mut body = serde_json::to_value(&update)
            .map_err(|e| Error::relay("update_session", e))?;
        body["session_id"] = json!(session_id);
        let ack: AckResponse = self.call("update_session", &body).await?;
        ack_to_result("update_session", ack)
    }

    async fn create_signing_request(&self, request: &NewSigningRequest) -> Result<()> {
        let ack: AckResponse = self.call("create_signing_request", request).await?;
        ack_to_result("create_signing_request", ack)
    }

    async fn request_history(
        &self,
        session_id: &str,
        network: Network,
    ) -> Result<Vec<SigningRequestRow>> {
        let resp: HistoryResponse = self
            .call(
                "get_request_history",
                &json!({ "session_id": session_id, "network": network }),
            )
            .await?;
        if !resp.success {
            return Err(Error::relay(
                "get_request_history",
                resp.error.unwrap_or_else(|| "success: false".to_string()),
            ));
        }
        Ok(resp.request_history.unwrap_or_default())
    }
}

fn ack_to_result(endpoint: &str, ack: AckResponse) -> Result<()> {
    if ack.success {
        Ok(())
    } else {
        Err(Error::relay(
            endpoint,
            ack.error.unwrap_or_else(|| "success: false".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_update_skips_unset_fields() {
        let update = SessionUpdate::network(Network::Mainnet);
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value, serde_json::json!({ "network": "mainnet" }));
    }

    #[test]
    fn session_update_targets_the_right_wallet_column() {
        let update = SessionUpdate::wallets(Network::Testnet, vec!["5Grw".to_string()]);
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value, serde_json::json!({ "testnet_wallets": ["5Grw"] }));
    }

    #[test]
    fn new_signing_request_wire_shape() {
        let req = NewSigningRequest {
            session_id: "sid".to_string(),
            req_id: "rid".to_string(),
            payload_hex: "0xdead".to_string(),
            address: "5Grw".to_string(),
            node_url: String::new(),
            network: Network::Testnet,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["network"], "testnet");
        assert_eq!(value["payload_hex"], "0xdead");
    }
}
