/*! Handler for the identity exchange request.
*/

use dor_packet::packet::{GetIdentityResponse, Packet};

use super::Server;

/// Reply with this relay's UUID and public key.
pub(super) fn handle_get_identity(server: &Server) -> Packet {
    debug!("identity requested");

    let identity = server.identity();
    Packet::GetIdentityResponse(GetIdentityResponse {
        uuid: identity.uuid,
        public_key: identity.pub_key,
    })
}
