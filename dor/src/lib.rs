//! This crate re-exports all DOR crates.

pub use dor_core as core;
pub use dor_crypto as crypto;
pub use dor_packet as packet;

pub fn crate_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
