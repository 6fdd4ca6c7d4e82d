//! `Dynamic`/`Dynamic2` (§3, §4.9): prepare/execute/deallocate requests
//! for server-side dynamic statements. Narrow (`Dynamic`) and wide
//! (`Dynamic2`) forms share this same struct, differing only in the
//! width of their length prefixes (§4.4's wide-mode rule) -- tracked
//! here as the `wide` field rather than as two separate types.

use enumflags2::{bitflags, BitFlags};

use crate::byte_channel::ByteChannel;
use crate::error::{Error, Result};

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicOperation {
    Prepare = 0x01,
    Exec = 0x02,
    Dealloc = 0x04,
    ExecImmediate = 0x08,
    ProcName = 0x10,
    Ack = 0x20,
    DescIn = 0x40,
    DescOut = 0x80,
}

pub type DynamicOperationType = BitFlags<DynamicOperation>;

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicStatus {
    HasArgs = 0x01,
    SuppressFmt = 0x02,
    BatchParams = 0x04,
    SuppressParamFmt = 0x08,
}

pub type DynamicStatusType = BitFlags<DynamicStatus>;

/// A server-side prepared statement identified by a driver-assigned
/// decimal string id (§3, §4.9).
#[derive(Debug, Clone)]
pub struct DynamicPackage {
    pub operation: DynamicOperationType,
    pub status: DynamicStatusType,
    pub id: u32,
    /// SQL text: only present (and only written) for `Prepare` and
    /// `ExecImmediate` operations.
    pub stmt: String,
    pub wide: bool,
}

fn carries_stmt(operation: DynamicOperationType) -> bool {
    operation.contains(DynamicOperation::Prepare)
        || operation.contains(DynamicOperation::ExecImmediate)
}

impl DynamicPackage {
    pub fn decode(ch: &mut ByteChannel, wide: bool) -> Result<Self> {
        let declared = if wide {
            ch.read_u32()? as usize
        } else {
            ch.read_u16()? as usize
        };
        let bytes = ch.read_bytes(declared)?;
        let mut body = ByteChannel::from_bytes(bytes, ch.order());
        let before = body.len();

        let operation = DynamicOperationType::from_bits_truncate(body.read_u8()?);
        let status = DynamicStatusType::from_bits_truncate(body.read_u8()?);

        let id_len = body.read_u8()? as usize;
        let id_str = body.read_string(id_len)?;
        let id: u32 = id_str.parse().map_err(|_| {
            Error::ProtocolViolation(format!("dynamic statement id '{id_str}' isn't decimal"))
        })?;

        let stmt = if carries_stmt(operation) {
            let stmt_len = if wide {
                body.read_u32()? as usize
            } else {
                body.read_u16()? as usize
            };
            body.read_string(stmt_len)?
        } else {
            String::new()
        };

        let consumed = before - body.len();
        if consumed != declared {
            return Err(Error::FramingMismatch {
                context: "DynamicPackage",
                declared,
                consumed,
            });
        }

        Ok(DynamicPackage {
            operation,
            status,
            id,
            stmt,
            wide,
        })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        let id_str = self.id.to_string();
        let mut body = ByteChannel::new(ch.order());
        body.write_u8(self.operation.bits());
        body.write_u8(self.status.bits());
        body.write_u8(id_str.len() as u8);
        body.write_string(&id_str);
        if carries_stmt(self.operation) {
            if self.wide {
                body.write_u32(self.stmt.len() as u32);
            } else {
                body.write_u16(self.stmt.len() as u16);
            }
            body.write_string(&self.stmt);
        }
        let body = body.into_inner();
        if self.wide {
            ch.write_u32(body.len() as u32);
        } else {
            ch.write_u16(body.len() as u16);
        }
        ch.write_bytes(&body);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::byte_channel::Endianness;

    #[test]
    fn prepare_round_trip_narrow() {
        let pkg = DynamicPackage {
            operation: DynamicOperation::Prepare.into(),
            status: DynamicStatusType::empty(),
            id: 42,
            stmt: "select 1".into(),
            wide: false,
        };
        let mut ch = ByteChannel::new(Endianness::Big);
        pkg.encode(&mut ch);
        let bytes = ch.into_inner();
        // 2 (len prefix) + 5 (op/status/idlen/id) + 2 (stmt len) + 8 (stmt)
        assert_eq!(bytes.len(), 2 + 5 + "42".len() + 2 + "select 1".len());

        let mut reader = ByteChannel::from_bytes(bytes, Endianness::Big);
        let decoded = DynamicPackage::decode(&mut reader, false).unwrap();
        assert_eq!(decoded.id, 42);
        assert_eq!(decoded.stmt, "select 1");
        assert!(decoded.operation.contains(DynamicOperation::Prepare));
    }

    #[test]
    fn exec_round_trip_omits_stmt() {
        let pkg = DynamicPackage {
            operation: DynamicOperation::Exec.into(),
            status: DynamicStatus::HasArgs.into(),
            id: 7,
            stmt: String::new(),
            wide: false,
        };
        let mut ch = ByteChannel::new(Endianness::Big);
        pkg.encode(&mut ch);
        let mut reader = ByteChannel::from_bytes(ch.into_inner(), Endianness::Big);
        let decoded = DynamicPackage::decode(&mut reader, false).unwrap();
        assert_eq!(decoded.id, 7);
        assert!(decoded.stmt.is_empty());
        assert!(decoded.status.contains(DynamicStatus::HasArgs));
    }

    #[test]
    fn wide_form_round_trips() {
        let pkg = DynamicPackage {
            operation: DynamicOperation::Prepare.into(),
            status: DynamicStatusType::empty(),
            id: 1000,
            stmt: "select * from t".into(),
            wide: true,
        };
        let mut ch = ByteChannel::new(Endianness::Big);
        pkg.encode(&mut ch);
        let mut reader = ByteChannel::from_bytes(ch.into_inner(), Endianness::Big);
        let decoded = DynamicPackage::decode(&mut reader, true).unwrap();
        assert_eq!(decoded.stmt, "select * from t");
    }

    #[test]
    fn rejects_non_decimal_id() {
        let mut ch = ByteChannel::new(Endianness::Big);
        let mut body = ByteChannel::new(Endianness::Big);
        body.write_u8(DynamicOperation::Exec as u8);
        body.write_u8(0);
        body.write_u8(2);
        body.write_string("ab");
        let body = body.into_inner();
        ch.write_u16(body.len() as u16);
        ch.write_bytes(&body);
        let mut reader = ByteChannel::from_bytes(ch.into_inner(), Endianness::Big);
        let err = DynamicPackage::decode(&mut reader, false).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }
}
