//! Server-side cursor packages (§3): `CurDeclare`, `CurOpen`,
//! `CurFetch`, `CurClose`, `CurInfo`. These aren't needed by the
//! `Client` surface in §4.10 (which only ever issues plain language
//! requests and dynamic statements), but the wire format is implemented
//! so a caller driving cursors directly against a channel can do so.

use enumflags2::{bitflags, BitFlags};

use crate::byte_channel::ByteChannel;
use crate::error::{Error, Result};

#[bitflags]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorOption {
    ReadOnly = 0x01,
    Updatable = 0x02,
    Sensitive = 0x04,
    Dynamic = 0x08,
}

pub type CursorOptions = BitFlags<CursorOption>;

fn read_name(ch: &mut ByteChannel) -> Result<String> {
    let len = ch.read_u8()? as usize;
    ch.read_string(len)
}

fn write_name(ch: &mut ByteChannel, name: &str) {
    ch.write_u8(name.len() as u8);
    ch.write_string(name);
}

#[derive(Debug, Clone)]
pub struct CurDeclarePackage {
    pub name: String,
    pub stmt: String,
    pub options: CursorOptions,
}

impl CurDeclarePackage {
    pub fn decode(ch: &mut ByteChannel) -> Result<Self> {
        let mut body = super::read_variable_body_u16(ch)?;
        let name = read_name(&mut body)?;
        let options = CursorOptions::from_bits_truncate(body.read_u16()?);
        let stmt_len = body.read_u32()? as usize;
        let stmt = body.read_string(stmt_len)?;
        Ok(CurDeclarePackage {
            name,
            stmt,
            options,
        })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        let mut body = ByteChannel::new(ch.order());
        write_name(&mut body, &self.name);
        body.write_u16(self.options.bits());
        body.write_u32(self.stmt.len() as u32);
        body.write_string(&self.stmt);
        let body = body.into_inner();
        ch.write_u16(body.len() as u16);
        ch.write_bytes(&body);
    }
}

#[derive(Debug, Clone)]
pub struct CurOpenPackage {
    pub name: String,
    pub has_args: bool,
}

impl CurOpenPackage {
    pub fn decode(ch: &mut ByteChannel) -> Result<Self> {
        let mut body = super::read_variable_body_u16(ch)?;
        let name = read_name(&mut body)?;
        let has_args = body.read_u8()? != 0;
        Ok(CurOpenPackage { name, has_args })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        let mut body = ByteChannel::new(ch.order());
        write_name(&mut body, &self.name);
        body.write_u8(self.has_args as u8);
        let body = body.into_inner();
        ch.write_u16(body.len() as u16);
        ch.write_bytes(&body);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorFetchType {
    Next,
    Prev,
    First,
    Last,
    Absolute(i32),
    Relative(i32),
}

impl CursorFetchType {
    fn tag(self) -> u8 {
        match self {
            CursorFetchType::Next => 1,
            CursorFetchType::Prev => 2,
            CursorFetchType::First => 3,
            CursorFetchType::Last => 4,
            CursorFetchType::Absolute(_) => 5,
            CursorFetchType::Relative(_) => 6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CurFetchPackage {
    pub name: String,
    pub fetch_type: CursorFetchType,
    pub row_count: u16,
}

impl CurFetchPackage {
    pub fn decode(ch: &mut ByteChannel) -> Result<Self> {
        let mut body = super::read_variable_body_u16(ch)?;
        let name = read_name(&mut body)?;
        let tag = body.read_u8()?;
        let fetch_type = match tag {
            1 => CursorFetchType::Next,
            2 => CursorFetchType::Prev,
            3 => CursorFetchType::First,
            4 => CursorFetchType::Last,
            5 => CursorFetchType::Absolute(body.read_i32()?),
            6 => CursorFetchType::Relative(body.read_i32()?),
            other => {
                return Err(Error::ProtocolViolation(format!(
                    "unknown cursor fetch type {other}"
                )))
            }
        };
        let row_count = body.read_u16()?;
        Ok(CurFetchPackage {
            name,
            fetch_type,
            row_count,
        })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        let mut body = ByteChannel::new(ch.order());
        write_name(&mut body, &self.name);
        body.write_u8(self.fetch_type.tag());
        match self.fetch_type {
            CursorFetchType::Absolute(n) | CursorFetchType::Relative(n) => body.write_i32(n),
            _ => {}
        }
        body.write_u16(self.row_count);
        let body = body.into_inner();
        ch.write_u16(body.len() as u16);
        ch.write_bytes(&body);
    }
}

#[derive(Debug, Clone)]
pub struct CurClosePackage {
    pub name: String,
    pub dealloc: bool,
}

impl CurClosePackage {
    pub fn decode(ch: &mut ByteChannel) -> Result<Self> {
        let mut body = super::read_variable_body_u16(ch)?;
        let name = read_name(&mut body)?;
        let dealloc = body.read_u8()? != 0;
        Ok(CurClosePackage { name, dealloc })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        let mut body = ByteChannel::new(ch.order());
        write_name(&mut body, &self.name);
        body.write_u8(self.dealloc as u8);
        let body = body.into_inner();
        ch.write_u16(body.len() as u16);
        ch.write_bytes(&body);
    }
}

#[bitflags]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorInfoStatus {
    Open = 0x01,
    RowDeleted = 0x02,
    RowUpdated = 0x04,
    NoData = 0x08,
}

#[derive(Debug, Clone)]
pub struct CurInfoPackage {
    pub name: String,
    pub status: BitFlags<CursorInfoStatus>,
    pub row_count: u32,
}

impl CurInfoPackage {
    pub fn decode(ch: &mut ByteChannel) -> Result<Self> {
        let mut body = super::read_variable_body_u16(ch)?;
        let name = read_name(&mut body)?;
        let status = BitFlags::<CursorInfoStatus>::from_bits_truncate(body.read_u16()?);
        let row_count = body.read_u32()?;
        Ok(CurInfoPackage {
            name,
            status,
            row_count,
        })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        let mut body = ByteChannel::new(ch.order());
        write_name(&mut body, &self.name);
        body.write_u16(self.status.bits());
        body.write_u32(self.row_count);
        let body = body.into_inner();
        ch.write_u16(body.len() as u16);
        ch.write_bytes(&body);
    }
}
