//! `EnvChange` (§3, §4.8): a server-driven notification that a session
//! attribute changed. Delivered to [`crate::hooks::EnvChangeHook`]
//! before the caller sees whatever package follows it.

use crate::byte_channel::ByteChannel;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvChangeType {
    Database,
    Language,
    CharacterSet,
    PacketSize,
    Locale,
}

impl EnvChangeType {
    fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            1 => EnvChangeType::Database,
            2 => EnvChangeType::Language,
            3 => EnvChangeType::CharacterSet,
            4 => EnvChangeType::PacketSize,
            5 => EnvChangeType::Locale,
            other => {
                return Err(Error::ProtocolViolation(format!(
                    "unknown envchange type {other}"
                )))
            }
        })
    }

    fn to_u8(self) -> u8 {
        match self {
            EnvChangeType::Database => 1,
            EnvChangeType::Language => 2,
            EnvChangeType::CharacterSet => 3,
            EnvChangeType::PacketSize => 4,
            EnvChangeType::Locale => 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvChangePackage {
    pub kind: EnvChangeType,
    pub old_value: String,
    pub new_value: String,
}

impl EnvChangePackage {
    pub fn decode(ch: &mut ByteChannel) -> Result<Self> {
        let declared = ch.read_u16()? as usize;
        let bytes = ch.read_bytes(declared)?;
        let mut body = ByteChannel::from_bytes(bytes, ch.order());
        let before = body.len();

        let kind = EnvChangeType::from_u8(body.read_u8()?)?;
        let new_len = body.read_u8()? as usize;
        let new_value = body.read_string(new_len)?;
        let old_len = body.read_u8()? as usize;
        let old_value = body.read_string(old_len)?;

        let consumed = before - body.len();
        if consumed != declared {
            return Err(Error::FramingMismatch {
                context: "EnvChangePackage",
                declared,
                consumed,
            });
        }

        Ok(EnvChangePackage {
            kind,
            old_value,
            new_value,
        })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        let mut body = ByteChannel::new(ch.order());
        body.write_u8(self.kind.to_u8());
        body.write_u8(self.new_value.len() as u8);
        body.write_string(&self.new_value);
        body.write_u8(self.old_value.len() as u8);
        body.write_string(&self.old_value);
        let body = body.into_inner();
        ch.write_u16(body.len() as u16);
        ch.write_bytes(&body);
    }

    /// The new packet size as a negotiated MTU, when `kind` is
    /// `PacketSize`; the value is carried on the wire as a decimal
    /// ASCII string rather than a binary integer.
    pub fn packet_size(&self) -> Option<usize> {
        if self.kind != EnvChangeType::PacketSize {
            return None;
        }
        self.new_value.trim().parse().ok()
    }
}
