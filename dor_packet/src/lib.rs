/*! Wire formats of the DOR (Dynamic Onion Routing) protocol.

This crate defines the bit-exact serialized forms exchanged between DOR
clients and relays: endpoints, top-level typed packets, and the fixed-size
onion frame with its nested encrypted layers, together with the client-side
onion construction.
*/

#![forbid(unsafe_code)]

#[cfg(test)]
#[macro_use]
mod macros;

pub mod crypto_group;
pub mod endpoint;
pub mod onion;
pub mod packet;
pub mod relay;
