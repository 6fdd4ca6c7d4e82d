//! `Language` (§3): a plain SQL-text request, the package kind used for
//! un-prepared `exec`/`direct_exec` calls and `use <database>`.

use crate::byte_channel::ByteChannel;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct LanguagePackage {
    /// True when the statement carries bound parameters (a `ParamFmt`/
    /// `Params` pair follows in the same message).
    pub has_args: bool,
    pub text: String,
}

impl LanguagePackage {
    pub fn new(text: impl Into<String>) -> Self {
        LanguagePackage {
            has_args: false,
            text: text.into(),
        }
    }

    pub fn decode(ch: &mut ByteChannel) -> Result<Self> {
        let declared = ch.read_u32()? as usize;
        if declared == 0 {
            return Err(Error::ProtocolViolation(
                "Language package declares an empty body".into(),
            ));
        }
        let status = ch.read_u8()?;
        let text = ch.read_string(declared - 1)?;
        Ok(LanguagePackage {
            has_args: status & 0x01 != 0,
            text,
        })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        ch.write_u32((1 + self.text.len()) as u32);
        ch.write_u8(self.has_args as u8);
        ch.write_string(&self.text);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::byte_channel::Endianness;

    #[test]
    fn round_trips_plain_statement() {
        let pkg = LanguagePackage::new("select 'ping'");
        let mut ch = ByteChannel::new(Endianness::Big);
        pkg.encode(&mut ch);
        let mut reader = ByteChannel::from_bytes(ch.into_inner(), Endianness::Big);
        let decoded = LanguagePackage::decode(&mut reader).unwrap();
        assert_eq!(decoded.text, "select 'ping'");
        assert!(!decoded.has_args);
    }

    #[test]
    fn has_args_flag_round_trips() {
        let pkg = LanguagePackage {
            has_args: true,
            text: "select * from t where id = ?".into(),
        };
        let mut ch = ByteChannel::new(Endianness::Big);
        pkg.encode(&mut ch);
        let mut reader = ByteChannel::from_bytes(ch.into_inner(), Endianness::Big);
        assert!(LanguagePackage::decode(&mut reader).unwrap().has_args);
    }
}
