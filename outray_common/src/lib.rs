//! Outray Common - Shared control-plane protocol library
//!
//! This crate contains the control-channel signal format and well-known
//! constants shared by the control plane and the data-plane nodes, plus the
//! URL safety guard applied to any externally supplied network target.

pub mod guard;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Signal protocol errors
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Unknown signal kind: {0}")]
    UnknownKind(String),

    #[error("Invalid signal format")]
    InvalidFormat,
}

/// Control signal - an ephemeral directive broadcast from the control plane
/// to data-plane nodes. Never persisted; exists only on the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlSignal {
    /// Tear down the live tunnel serving this hostname
    Kill {
        /// Public hostname of the tunnel (e.g., "acme.outray.app")
        hostname: String,
    },
}

impl ControlSignal {
    /// Encode to the wire payload consumed by data-plane subscribers
    /// (e.g., "kill:acme.outray.app")
    pub fn encode(&self) -> String {
        match self {
            ControlSignal::Kill { hostname } => format!("kill:{}", hostname),
        }
    }

    /// Parse a wire payload received on the control channel
    pub fn parse(payload: &str) -> Result<Self, SignalError> {
        let (kind, rest) = payload.split_once(':').ok_or(SignalError::InvalidFormat)?;
        match kind {
            "kill" => Ok(ControlSignal::Kill {
                hostname: rest.to_string(),
            }),
            other => Err(SignalError::UnknownKind(other.to_string())),
        }
    }
}

/// Generate an opaque, namespaced, collision-resistant id
/// (e.g., "tunnel_67e55044f81d4a9c8f3db1925ad43fa2")
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// Constants for the control plane
pub mod constants {
    /// Pub/sub topic carrying control signals to data-plane nodes
    pub const CONTROL_CHANNEL: &str = "tunnel:control";

    /// DNS label prefixed to a custom domain for the TXT ownership challenge
    pub const CHALLENGE_LABEL: &str = "_outray-challenge";

    /// Header carrying the authenticated user id, injected by the auth layer
    pub const USER_HEADER: &str = "x-outray-user";

    /// Header carrying the caller's organization memberships (comma separated)
    pub const ORGANIZATIONS_HEADER: &str = "x-outray-organizations";

    /// Full record name for the TXT ownership challenge of a custom domain
    pub fn challenge_record_name(domain: &str) -> String {
        format!("{}.{}", CHALLENGE_LABEL, domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kill_signal_encode() {
        let signal = ControlSignal::Kill {
            hostname: "acme.outray.app".to_string(),
        };
        assert_eq!(signal.encode(), "kill:acme.outray.app");
    }

    #[test]
    fn test_kill_signal_parse() {
        let signal = ControlSignal::parse("kill:acme.outray.app").unwrap();
        assert_eq!(
            signal,
            ControlSignal::Kill {
                hostname: "acme.outray.app".to_string()
            }
        );
    }

    #[test]
    fn test_signal_parse_rejects_garbage() {
        assert!(matches!(
            ControlSignal::parse("no-separator"),
            Err(SignalError::InvalidFormat)
        ));
        assert!(matches!(
            ControlSignal::parse("restart:acme.outray.app"),
            Err(SignalError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_new_id_is_namespaced_and_unique() {
        let a = new_id("tunnel");
        let b = new_id("tunnel");
        assert!(a.starts_with("tunnel_"));
        assert_ne!(a, b);
        assert_eq!(a.len(), "tunnel_".len() + 32);
    }

    #[test]
    fn test_challenge_record_name() {
        assert_eq!(
            constants::challenge_record_name("example.com"),
            "_outray-challenge.example.com"
        );
    }
}
