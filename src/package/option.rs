//! `Option` (TDS_OPTION, §3): get/set/clear of a session option, e.g.
//! `arithabort`, date format, or quoted identifiers.

use crate::byte_channel::ByteChannel;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionCommand {
    Set,
    Default,
    List,
    Info,
}

impl OptionCommand {
    fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            1 => OptionCommand::Set,
            2 => OptionCommand::Default,
            3 => OptionCommand::List,
            4 => OptionCommand::Info,
            other => {
                return Err(Error::ProtocolViolation(format!(
                    "unknown option command {other}"
                )))
            }
        })
    }

    fn to_u8(self) -> u8 {
        match self {
            OptionCommand::Set => 1,
            OptionCommand::Default => 2,
            OptionCommand::List => 3,
            OptionCommand::Info => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptionPackage {
    pub command: OptionCommand,
    pub option: u8,
    pub arg: Vec<u8>,
}

impl OptionPackage {
    pub fn decode(ch: &mut ByteChannel) -> Result<Self> {
        let declared = ch.read_u16()? as usize;
        let bytes = ch.read_bytes(declared)?;
        let mut body = ByteChannel::from_bytes(bytes, ch.order());
        let before = body.len();

        let command = OptionCommand::from_u8(body.read_u8()?)?;
        let option = body.read_u8()?;
        let arg_len = body.read_u8()? as usize;
        let arg = body.read_bytes(arg_len)?.to_vec();

        let consumed = before - body.len();
        if consumed != declared {
            return Err(Error::FramingMismatch {
                context: "OptionPackage",
                declared,
                consumed,
            });
        }

        Ok(OptionPackage {
            command,
            option,
            arg,
        })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        let mut body = ByteChannel::new(ch.order());
        body.write_u8(self.command.to_u8());
        body.write_u8(self.option);
        body.write_u8(self.arg.len() as u8);
        body.write_bytes(&self.arg);
        let body = body.into_inner();
        ch.write_u16(body.len() as u16);
        ch.write_bytes(&body);
    }
}
