/*! Relays and relay groups as known to a sender.

A relay becomes usable once its UUID and public key have been learned
through the out-of-band identity exchange (`GetIdentityRequest`).
*/

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::endpoint::Endpoint;

/// Maximum number of relays sharing one hop position.
pub const MAX_GROUP_RELAYS: usize = 3;

/// A single relay: where to reach it and its identity material.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Relay {
    /// Address the relay listens on.
    pub ep: Endpoint,
    /// Long-term UUID of the relay.
    pub uuid: Uuid,
    /// Long-term X25519 public key of the relay.
    pub pub_key: [u8; 32],
}

impl fmt::Display for Relay {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ep={} uuid={} pub={}}}",
            self.ep,
            hex::encode(&self.uuid.as_bytes()[..4]),
            hex::encode(&self.pub_key[..4]),
        )
    }
}

/// Error returned when assembling an invalid relay group.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum RelayGroupError {
    #[error("relay group has no relays")]
    Empty,
    #[error("too many relays in group: {0} (max {max})", max = MAX_GROUP_RELAYS)]
    TooManyRelays(usize),
}

/// An ordered list of 1 to [`MAX_GROUP_RELAYS`] relays sharing the same hop
/// position. The sender picks one real recipient at send time; the others
/// are decoys.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RelayGroup {
    /// Relays of the group.
    pub relays: Vec<Relay>,
}

impl RelayGroup {
    /// Create a group, enforcing the 1..=3 size bound.
    pub fn new(relays: Vec<Relay>) -> Result<RelayGroup, RelayGroupError> {
        if relays.is_empty() {
            return Err(RelayGroupError::Empty);
        }
        if relays.len() > MAX_GROUP_RELAYS {
            return Err(RelayGroupError::TooManyRelays(relays.len()));
        }
        Ok(RelayGroup { relays })
    }
}

impl fmt::Display for RelayGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[")?;
        for (i, relay) in self.relays.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", relay.ep)?;
        }
        write!(f, "]")
    }
}
