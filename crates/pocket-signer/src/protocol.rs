use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

// ---------------------------------------------------------------------------
// Typed enums for wire format safety
// ---------------------------------------------------------------------------

/// Which Polymesh network a session or request is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Testnet,
    Mainnet,
}

impl Network {
    /// Name of the per-network wallet column on the relay's session row.
    pub fn wallet_field(self) -> &'static str {
        match self {
            Network::Testnet => "testnet_wallets",
            Network::Mainnet => "mainnet_wallets",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Testnet => write!(f, "testnet"),
            Network::Mainnet => write!(f, "mainnet"),
        }
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            other => Err(Error::InvalidNetwork(other.to_string())),
        }
    }
}

/// Remote session status as reported by the relay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Pending,
    Connected,
    /// Any status this client version does not know about.
    #[serde(other)]
    Unknown,
}

/// Signing request status as reported by the relay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
    Signed,
    Rejected,
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// Relay rows
// ---------------------------------------------------------------------------

/// One session row from `get_session`.
///
/// The relay stores wallet lists as JSON text inside a JSON column, so each
/// list field may arrive as an array, as a JSON-encoded string, or not at
/// all. All three decode; a malformed embedded string decodes to an empty
/// list rather than failing the whole row.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SessionRow {
    pub session_id: String,
    #[serde(default)]
    pub origin_hash: Option<String>,
    #[serde(default)]
    pub network: Option<Network>,
    #[serde(default)]
    pub status: SessionStatus,
    /// Legacy undifferentiated wallet list, predating per-network columns.
    #[serde(default, deserialize_with = "wallet_list")]
    pub wallets: Vec<String>,
    #[serde(default, deserialize_with = "wallet_list")]
    pub testnet_wallets: Vec<String>,
    #[serde(default, deserialize_with = "wallet_list")]
    pub mainnet_wallets: Vec<String>,
}

impl SessionRow {
    /// The authoritative wallet list for `network`.
    pub fn wallets_for(&self, network: Network) -> &[String] {
        match network {
            Network::Testnet => &self.testnet_wallets,
            Network::Mainnet => &self.mainnet_wallets,
        }
    }
}

/// One signing request row from `get_request_history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningRequestRow {
    pub req_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub payload_hex: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub node_url: Option<String>,
    /// Absent on rows created before the relay tracked networks; an absent
    /// network matches any correlator.
    #[serde(default)]
    pub network: Option<Network>,
    #[serde(default)]
    pub status: RequestStatus,
    #[serde(default)]
    pub signature_hex: Option<String>,
}

// ---------------------------------------------------------------------------
// Response envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct AckResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub session: Option<SessionRow>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub request_history: Option<Vec<SigningRequestRow>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Decode a wallet list that may be an array, a JSON-encoded string, or null.
fn wallet_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Json(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::List(list)) => Ok(list),
        Some(Raw::Json(text)) => Ok(serde_json::from_str(&text).unwrap_or_default()),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_parses_known_values() {
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!("mainnet".parse::<Network>().unwrap(), Network::Mainnet);
    }

    #[test]
    fn network_rejects_everything_else() {
        for bad in ["", "Testnet", "devnet", "main"] {
            assert!(matches!(
                bad.parse::<Network>(),
                Err(Error::InvalidNetwork(_))
            ));
        }
    }

    #[test]
    fn session_row_wallets_as_array() {
        let row: SessionRow = serde_json::from_str(
            r#"{"session_id":"s1","status":"connected","testnet_wallets":["5Grw"]}"#,
        )
        .unwrap();
        assert_eq!(row.wallets_for(Network::Testnet), ["5Grw".to_string()]);
        assert!(row.wallets_for(Network::Mainnet).is_empty());
    }

    #[test]
    fn session_row_wallets_double_encoded() {
        let row: SessionRow = serde_json::from_str(
            r#"{"session_id":"s1","status":"pending","wallets":"[\"a\",\"b\"]"}"#,
        )
        .unwrap();
        assert_eq!(row.wallets, ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn session_row_malformed_wallet_string_is_empty() {
        let row: SessionRow =
            serde_json::from_str(r#"{"session_id":"s1","wallets":"not json"}"#).unwrap();
        assert!(row.wallets.is_empty());
    }

    #[test]
    fn unknown_statuses_do_not_fail_decoding() {
        let row: SessionRow =
            serde_json::from_str(r#"{"session_id":"s1","status":"archived"}"#).unwrap();
        assert_eq!(row.status, SessionStatus::Unknown);

        let req: SigningRequestRow =
            serde_json::from_str(r#"{"req_id":"r1","status":"expired"}"#).unwrap();
        assert_eq!(req.status, RequestStatus::Unknown);
    }
}
