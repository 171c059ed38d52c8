//! pocket-signer — remote-wallet signing over a polled relay.
//!
//! A process that cannot hold private keys pairs with a user's Pocket
//! wallet app by showing a QR/pairing code, then submits signing requests
//! that the wallet fulfils asynchronously. There is no push channel: the
//! engine correlates outstanding requests against a periodically fetched
//! history feed on a shared HTTP relay.

pub mod artifact;
pub mod config;
pub mod error;
pub mod manager;
pub mod pairing;
pub mod protocol;
pub mod relay;
pub mod signer;
pub mod store;

pub use artifact::{ArtifactPresenter, NullPresenter, PairingArtifact};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use manager::{LocalKey, PocketSigningManager};
pub use pairing::{CancelHandle, PairingEngine, PairingStatus};
pub use protocol::{Network, RequestStatus, SessionRow, SessionStatus, SigningRequestRow};
pub use relay::{HttpRelay, NewSigningRequest, Relay, SessionUpdate};
pub use signer::PocketSigner;
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, StoredSession};
