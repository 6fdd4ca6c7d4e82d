//! `Msg` (§4.6): the negotiation-message package the server and client
//! exchange during encrypted login to announce which step of the RSA
//! handshake a following `ParamFmt`/`Params` pair belongs to.

use enumflags2::{bitflags, BitFlags};

use crate::byte_channel::ByteChannel;
use crate::error::Result;

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgStatusBit {
    HasArgs = 0x01,
}

pub type MsgStatus = BitFlags<MsgStatusBit>;

/// Well-known message ids used during the encrypted login handshake
/// (§4.6). Values follow the historical TDS 5.0 `TDS_MSG_SEC_*`
/// assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgId {
    SecEncrypt,
    SecLogPwd,
    SecRemPwd,
    SecEncrypt2,
    SecLogPwd2,
    SecRemPwd2,
    SecEncrypt3,
    SecLogPwd3,
    SecRemPwd3,
    SecEncrypt4,
    SecSymKey,
    SecEncryptChgPwd,
    Other(u8),
}

impl MsgId {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => MsgId::SecEncrypt,
            2 => MsgId::SecLogPwd,
            3 => MsgId::SecRemPwd,
            4 => MsgId::SecEncrypt2,
            5 => MsgId::SecLogPwd2,
            6 => MsgId::SecRemPwd2,
            7 => MsgId::SecEncrypt3,
            8 => MsgId::SecLogPwd3,
            9 => MsgId::SecRemPwd3,
            10 => MsgId::SecEncrypt4,
            11 => MsgId::SecSymKey,
            12 => MsgId::SecEncryptChgPwd,
            other => MsgId::Other(other),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            MsgId::SecEncrypt => 1,
            MsgId::SecLogPwd => 2,
            MsgId::SecRemPwd => 3,
            MsgId::SecEncrypt2 => 4,
            MsgId::SecLogPwd2 => 5,
            MsgId::SecRemPwd2 => 6,
            MsgId::SecEncrypt3 => 7,
            MsgId::SecLogPwd3 => 8,
            MsgId::SecRemPwd3 => 9,
            MsgId::SecEncrypt4 => 10,
            MsgId::SecSymKey => 11,
            MsgId::SecEncryptChgPwd => 12,
            MsgId::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MsgPackage {
    pub status: MsgStatus,
    pub msg_id: MsgId,
}

impl MsgPackage {
    pub fn new(status: MsgStatus, msg_id: MsgId) -> Self {
        MsgPackage { status, msg_id }
    }

    pub fn decode(ch: &mut ByteChannel) -> Result<Self> {
        let mut body = super::read_variable_body_u16(ch)?;
        let status = MsgStatus::from_bits_truncate(body.read_u8()?);
        let msg_id = MsgId::from_u8(body.read_u8()?);
        Ok(MsgPackage { status, msg_id })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        ch.write_u16(2);
        ch.write_u8(self.status.bits());
        ch.write_u8(self.msg_id.to_u8());
    }
}
