//! `Return`, `Order`, and `Control` (§3): minor packages carried by a
//! result-set message alongside rows -- a stored procedure's return
//! status, the ORDER BY column list a result set was sorted by, and
//! assorted session control directives.

use crate::byte_channel::ByteChannel;
use crate::error::{Error, Result};

/// `Return` (TDS_RETSTAT): fixed-length, the integer status a stored
/// procedure returned.
#[derive(Debug, Clone, Copy)]
pub struct ReturnPackage {
    pub status: i32,
}

impl ReturnPackage {
    pub fn decode(ch: &mut ByteChannel) -> Result<Self> {
        Ok(ReturnPackage {
            status: ch.read_i32()?,
        })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        ch.write_i32(self.status);
    }
}

/// `Order` (TDS_ORDER): the column positions (1-based) a result set is
/// sorted by, variable-length with a 2-byte byte-count prefix (two
/// bytes per column).
#[derive(Debug, Clone)]
pub struct OrderPackage {
    pub columns: Vec<u16>,
}

impl OrderPackage {
    pub fn decode(ch: &mut ByteChannel) -> Result<Self> {
        let declared = ch.read_u16()? as usize;
        if declared % 2 != 0 {
            return Err(Error::ProtocolViolation(format!(
                "Order package byte count {declared} isn't a multiple of 2"
            )));
        }
        let mut columns = Vec::with_capacity(declared / 2);
        let mut consumed = 0;
        while consumed < declared {
            columns.push(ch.read_u16()?);
            consumed += 2;
        }
        Ok(OrderPackage { columns })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        ch.write_u16((self.columns.len() * 2) as u16);
        for col in &self.columns {
            ch.write_u16(*col);
        }
    }
}

/// `Control` (TDS_CONTROL): an opaque, variable-length control
/// directive. This driver neither sends nor needs to interpret any
/// particular control command, so the body is kept as raw bytes.
#[derive(Debug, Clone)]
pub struct ControlPackage {
    pub data: Vec<u8>,
}

impl ControlPackage {
    pub fn decode(ch: &mut ByteChannel) -> Result<Self> {
        let declared = ch.read_u16()? as usize;
        let data = ch.read_bytes(declared)?.to_vec();
        Ok(ControlPackage { data })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        ch.write_u16(self.data.len() as u16);
        ch.write_bytes(&self.data);
    }
}
