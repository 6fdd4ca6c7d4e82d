//! `Error` and `EED` (extended error data, §3). Both carry the same
//! [`ServerDiagnostic`](crate::error::ServerDiagnostic) shape; `EED`
//! additionally wraps it for delivery to [`crate::hooks::EedHook`].
//!
//! Two competing `ErrorPackage` wire shapes exist in the wild -- one
//! with a stored `Length` field, one without. This adopts the
//! computed-length form: `encode` always recomputes the length prefix
//! from the serialized body, and `decode` verifies the declared length
//! against bytes actually consumed rather than trusting it as ground
//! truth.

use crate::byte_channel::ByteChannel;
use crate::error::{Error, Result, ServerDiagnostic};

fn decode_diagnostic(body: &mut ByteChannel) -> Result<ServerDiagnostic> {
    let number = body.read_i32()?;
    let state = body.read_u8()?;
    let severity = body.read_u8()?;
    let msg_len = body.read_u16()? as usize;
    let message = body.read_string(msg_len)?;
    let server_len = body.read_u8()? as usize;
    let server_name = body.read_string(server_len)?;
    let proc_len = body.read_u8()? as usize;
    let proc_name = body.read_string(proc_len)?;
    let line = body.read_u16()?;
    Ok(ServerDiagnostic {
        number,
        state,
        severity,
        message,
        server_name,
        proc_name,
        line,
    })
}

fn encode_diagnostic(diag: &ServerDiagnostic, body: &mut ByteChannel) {
    body.write_i32(diag.number);
    body.write_u8(diag.state);
    body.write_u8(diag.severity);
    body.write_u16(diag.message.len() as u16);
    body.write_string(&diag.message);
    body.write_u8(diag.server_name.len() as u8);
    body.write_string(&diag.server_name);
    body.write_u8(diag.proc_name.len() as u8);
    body.write_string(&diag.proc_name);
    body.write_u16(diag.line);
}

#[derive(Debug, Clone)]
pub struct ErrorPackage {
    pub diagnostic: ServerDiagnostic,
}

impl ErrorPackage {
    pub fn decode(ch: &mut ByteChannel) -> Result<Self> {
        let declared = ch.read_u16()? as usize;
        let bytes = ch.read_bytes(declared)?;
        let mut body = ByteChannel::from_bytes(bytes, ch.order());
        let before = body.len();
        let diagnostic = decode_diagnostic(&mut body)?;
        let consumed = before - body.len();
        if consumed != declared {
            return Err(Error::FramingMismatch {
                context: "ErrorPackage",
                declared,
                consumed,
            });
        }
        Ok(ErrorPackage { diagnostic })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        let mut body = ByteChannel::new(ch.order());
        encode_diagnostic(&self.diagnostic, &mut body);
        let body = body.into_inner();
        ch.write_u16(body.len() as u16);
        ch.write_bytes(&body);
    }
}

/// Extended error data: informational/diagnostic messages the server
/// emits outside of a failed `Error` reply (e.g. during login).
#[derive(Debug, Clone)]
pub struct EedPackage {
    pub diagnostic: ServerDiagnostic,
}

impl EedPackage {
    pub fn decode(ch: &mut ByteChannel) -> Result<Self> {
        let declared = ch.read_u16()? as usize;
        let bytes = ch.read_bytes(declared)?;
        let mut body = ByteChannel::from_bytes(bytes, ch.order());
        let before = body.len();
        let diagnostic = decode_diagnostic(&mut body)?;
        let consumed = before - body.len();
        if consumed != declared {
            return Err(Error::FramingMismatch {
                context: "EedPackage",
                declared,
                consumed,
            });
        }
        Ok(EedPackage { diagnostic })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        let mut body = ByteChannel::new(ch.order());
        encode_diagnostic(&self.diagnostic, &mut body);
        let body = body.into_inner();
        ch.write_u16(body.len() as u16);
        ch.write_bytes(&body);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::byte_channel::Endianness;

    fn sample() -> ServerDiagnostic {
        ServerDiagnostic {
            number: 1205,
            state: 1,
            severity: 13,
            message: "deadlock".into(),
            server_name: "ASE".into(),
            proc_name: String::new(),
            line: 42,
        }
    }

    #[test]
    fn error_package_round_trips() {
        let pkg = ErrorPackage {
            diagnostic: sample(),
        };
        let mut ch = ByteChannel::new(Endianness::Big);
        pkg.encode(&mut ch);
        let mut reader = ByteChannel::from_bytes(ch.into_inner(), Endianness::Big);
        let decoded = ErrorPackage::decode(&mut reader).unwrap();
        assert_eq!(decoded.diagnostic.number, 1205);
        assert_eq!(decoded.diagnostic.message, "deadlock");
    }

    #[test]
    fn length_mismatch_is_framing_error() {
        let mut ch = ByteChannel::new(Endianness::Big);
        ch.write_u16(4); // declares 4 bytes but body below is shorter than a diagnostic needs
        ch.write_bytes(&[0, 0, 0, 0]);
        let mut reader = ByteChannel::from_bytes(ch.into_inner(), Endianness::Big);
        let err = ErrorPackage::decode(&mut reader).unwrap_err();
        assert!(matches!(err, Error::NotEnoughBytes { .. }));
    }

    #[test]
    fn eed_package_round_trips() {
        let pkg = EedPackage {
            diagnostic: sample(),
        };
        let mut ch = ByteChannel::new(Endianness::Big);
        pkg.encode(&mut ch);
        let mut reader = ByteChannel::from_bytes(ch.into_inner(), Endianness::Big);
        let decoded = EedPackage::decode(&mut reader).unwrap();
        assert_eq!(decoded.diagnostic.severity, 13);
    }
}
