//! The pairing artifact: the encoded bundle a human scans or pastes into the
//! wallet app to approve a pairing.
//!
//! The encoding — base64 of `{"appName", "sid", "network"}` JSON — is a
//! stable contract with the wallet app and must not change shape.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::Network;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingArtifact {
    #[serde(rename = "appName")]
    pub app_name: String,
    pub sid: String,
    pub network: Network,
}

impl PairingArtifact {
    pub fn new(app_name: impl Into<String>, sid: impl Into<String>, network: Network) -> Self {
        Self {
            app_name: app_name.into(),
            sid: sid.into(),
            network,
        }
    }

    /// Encode for display as a QR code or copyable pairing code.
    pub fn encode(&self) -> String {
        // Serialization of a three-string struct cannot fail.
        let json = serde_json::to_vec(self).expect("artifact serialization");
        STANDARD.encode(json)
    }

    /// Decode a pairing code back into its parts.
    pub fn decode(encoded: &str) -> Result<Self> {
        let json = STANDARD
            .decode(encoded)
            .map_err(|e| Error::InvalidArtifact(format!("not valid base64: {e}")))?;
        serde_json::from_slice(&json)
            .map_err(|e| Error::InvalidArtifact(format!("not valid JSON: {e}")))
    }
}

/// How a pairing artifact reaches the user. The core engine is headless;
/// hosts render a terminal QR, a DOM popup, or nothing at all.
pub trait ArtifactPresenter: Send + Sync {
    fn present(&self, artifact: &PairingArtifact);
}

/// Presenter that drops the artifact, for headless embedders and tests.
pub struct NullPresenter;

impl ArtifactPresenter for NullPresenter {
    fn present(&self, _artifact: &PairingArtifact) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let artifact = PairingArtifact::new("testApp", "abc-123", Network::Mainnet);
        let decoded = PairingArtifact::decode(&artifact.encode()).unwrap();
        assert_eq!(decoded, artifact);
    }

    #[test]
    fn encoded_json_field_names_are_stable() {
        let artifact = PairingArtifact::new("testApp", "abc-123", Network::Testnet);
        let json = STANDARD.decode(artifact.encode()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["appName"], "testApp");
        assert_eq!(value["sid"], "abc-123");
        assert_eq!(value["network"], "testnet");
    }

    #[test]
    fn garbage_pairing_code_is_rejected() {
        assert!(matches!(
            PairingArtifact::decode("%%%not-base64%%%"),
            Err(Error::InvalidArtifact(_))
        ));
        let not_json = STANDARD.encode(b"plain text");
        assert!(matches!(
            PairingArtifact::decode(&not_json),
            Err(Error::InvalidArtifact(_))
        ));
    }
}
