/*! Parsing of the textual onion-path grammar.

`group ( "|" group )*` where `group = endpoint ( "," endpoint )*`, an
endpoint being `ipv4:port` or `[ipv6]:port`. Whitespace around components
is trimmed; empty groups or endpoints are an error. At most
[`MAX_JUMP`] groups of at most [`MAX_GROUP_RELAYS`] endpoints each.
*/

use thiserror::Error;

use dor_packet::endpoint::{Endpoint, EndpointError};
use dor_packet::onion::MAX_JUMP;
use dor_packet::relay::MAX_GROUP_RELAYS;

/// Error parsing an onion-path string.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ParsePathError {
    #[error("empty relay path")]
    EmptyPath,
    #[error("too many jumps: {0} (max {max})", max = MAX_JUMP)]
    TooManyJumps(usize),
    #[error("empty relay group at index {0}")]
    EmptyGroup(usize),
    #[error("too many relays in group {group}: {count} (max {max})", max = MAX_GROUP_RELAYS)]
    TooManyRelays { group: usize, count: usize },
    #[error("empty relay in group {group} at index {index}")]
    EmptyRelay { group: usize, index: usize },
    #[error("invalid relay {relay:?} in group {group}: {error}")]
    InvalidEndpoint {
        relay: String,
        group: usize,
        error: EndpointError,
    },
}

/// Parse an onion-path string into groups of endpoints.
pub fn parse_relay_path(raw: &str) -> Result<Vec<Vec<Endpoint>>, ParsePathError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ParsePathError::EmptyPath);
    }

    let group_strs: Vec<&str> = raw.split('|').collect();
    if group_strs.len() > MAX_JUMP {
        return Err(ParsePathError::TooManyJumps(group_strs.len()));
    }

    let mut groups = Vec::with_capacity(group_strs.len());
    for (group_index, group_str) in group_strs.iter().enumerate() {
        let group_str = group_str.trim();
        if group_str.is_empty() {
            return Err(ParsePathError::EmptyGroup(group_index));
        }

        let relay_strs: Vec<&str> = group_str.split(',').collect();
        if relay_strs.len() > MAX_GROUP_RELAYS {
            return Err(ParsePathError::TooManyRelays {
                group: group_index,
                count: relay_strs.len(),
            });
        }

        let mut endpoints = Vec::with_capacity(relay_strs.len());
        for (relay_index, relay_str) in relay_strs.iter().enumerate() {
            let relay_str = relay_str.trim();
            if relay_str.is_empty() {
                return Err(ParsePathError::EmptyRelay {
                    group: group_index,
                    index: relay_index,
                });
            }

            let endpoint = relay_str
                .parse()
                .map_err(|error| ParsePathError::InvalidEndpoint {
                    relay: relay_str.to_string(),
                    group: group_index,
                    error,
                })?;
            endpoints.push(endpoint);
        }

        groups.push(endpoints);
    }

    Ok(groups)
}
