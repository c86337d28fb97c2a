/*! Core runtime of the DOR (Dynamic Onion Routing) protocol.

Builds on [`dor_packet`] and [`dor_crypto`] to provide the pieces a relay
daemon and a client share: the on-disk identity store, the length-prefixed
packet codec, the timeout-bounded transport, the relay server loop with its
onion processor, and the client send path.
*/

#![forbid(unsafe_code)]

#[macro_use]
extern crate log;

pub mod client;
pub mod codec;
pub mod identity;
pub mod server;
pub mod stats;
pub mod transport;
