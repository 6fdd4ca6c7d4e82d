//! `Logout` (§3): the client's session-teardown notice. Fixed-length:
//! a single reserved status byte, unused by this driver but carried to
//! stay wire-compatible with servers that check it.

use crate::byte_channel::ByteChannel;
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct LogoutPackage {
    pub status: u8,
}

impl LogoutPackage {
    pub fn decode(ch: &mut ByteChannel) -> Result<Self> {
        Ok(LogoutPackage {
            status: ch.read_u8()?,
        })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        ch.write_u8(self.status);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::byte_channel::Endianness;

    #[test]
    fn round_trips() {
        let pkg = LogoutPackage { status: 0 };
        let mut ch = ByteChannel::new(Endianness::Big);
        pkg.encode(&mut ch);
        let mut reader = ByteChannel::from_bytes(ch.into_inner(), Endianness::Big);
        assert_eq!(LogoutPackage::decode(&mut reader).unwrap().status, 0);
    }
}
