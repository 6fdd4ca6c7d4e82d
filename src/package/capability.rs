//! `Capability` (§3, §4.6): the wire package carrying a
//! [`crate::capability::Capabilities`] bitmap. Sent once by the client
//! at login and once by the server in reply; immutable afterward.

use crate::byte_channel::ByteChannel;
use crate::capability::Capabilities;
use crate::error::Result;

/// Block-type tags preceding each capability bitfield on the wire.
const BLOCK_REQUEST: u8 = 1;
const BLOCK_RESPONSE: u8 = 2;

#[derive(Debug, Clone, Copy)]
pub struct CapabilityPackage {
    pub capabilities: Capabilities,
}

impl CapabilityPackage {
    pub fn new(capabilities: Capabilities) -> Self {
        CapabilityPackage { capabilities }
    }

    pub fn decode(ch: &mut ByteChannel) -> Result<Self> {
        let mut body = super::read_variable_body_u16(ch)?;

        let mut request_bits = 0u32;
        let mut response_bits = 0u32;
        while !body.is_empty() {
            let block_type = body.read_u8()?;
            let len = body.read_u8()? as usize;
            let bytes = body.read_bytes(len)?;
            let mut padded = [0u8; 4];
            let take = bytes.len().min(4);
            padded[4 - take..].copy_from_slice(&bytes[bytes.len() - take..]);
            let bits = u32::from_be_bytes(padded);
            match block_type {
                BLOCK_REQUEST => request_bits = bits,
                BLOCK_RESPONSE => response_bits = bits,
                _ => {}
            }
        }

        Ok(CapabilityPackage {
            capabilities: Capabilities::from_wire(request_bits, response_bits),
        })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        let req = self.capabilities.request_bytes();
        let resp = self.capabilities.response_bytes();

        let mut body = ByteChannel::new(ch.order());
        body.write_u8(BLOCK_REQUEST);
        body.write_u8(req.len() as u8);
        body.write_bytes(&req);
        body.write_u8(BLOCK_RESPONSE);
        body.write_u8(resp.len() as u8);
        body.write_bytes(&resp);

        let body = body.into_inner();
        ch.write_u16(body.len() as u16);
        ch.write_bytes(&body);
    }
}
