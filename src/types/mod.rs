//! The field-format/field-data codec (§4.5): per-datatype wire shapes,
//! the `FieldFmt`/`FieldData` pair every `RowFmt`/`Row` column carries,
//! and the conversion table used when a caller's Rust value needs to be
//! coerced into a server-declared column type.

mod convert;
mod data;
mod datetime;

pub use convert::convert;
pub use data::FieldData;
pub use datetime::{DateTimeForm, TDS_EPOCH};

use crate::byte_channel::ByteChannel;
use crate::error::{Error, Result};

/// The TDS 5.0 datatype tokens this driver understands. Values match the
/// historical Sybase/FreeTDS datatype token byte space; representative
/// rather than guaranteed byte-identical to a specific server build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    TinyInt = 0x30,
    SmallInt = 0x34,
    Int = 0x38,
    BigInt = 0xbf,
    IntN = 0x26,
    Float4 = 0x3b,
    Float8 = 0x3e,
    FloatN = 0x6d,
    Bit = 0x32,
    BitN = 0x68,
    Char = 0x2f,
    Varchar = 0x27,
    Binary = 0x2d,
    Varbinary = 0x25,
    Longchar = 0xaf,
    Longbinary = 0xe1,
    Decimal = 0x6a,
    Numeric = 0x6c,
    Money = 0x3c,
    SmallMoney = 0x7a,
    MoneyN = 0x6e,
    DateTime = 0x3d,
    SmallDateTime = 0x3a,
    DateTimeN = 0x6f,
    Text = 0x23,
    Image = 0x22,
    Unitext = 0xae,
}

impl DataType {
    pub fn from_u8(value: u8) -> Result<Self> {
        use DataType::*;
        Ok(match value {
            0x30 => TinyInt,
            0x34 => SmallInt,
            0x38 => Int,
            0xbf => BigInt,
            0x26 => IntN,
            0x3b => Float4,
            0x3e => Float8,
            0x6d => FloatN,
            0x32 => Bit,
            0x68 => BitN,
            0x2f => Char,
            0x27 => Varchar,
            0x2d => Binary,
            0x25 => Varbinary,
            0xaf => Longchar,
            0xe1 => Longbinary,
            0x6a => Decimal,
            0x6c => Numeric,
            0x3c => Money,
            0x7a => SmallMoney,
            0x6e => MoneyN,
            0x3d => DateTime,
            0x3a => SmallDateTime,
            0x6f => DateTimeN,
            0x23 => Text,
            0x22 => Image,
            0xae => Unitext,
            other => {
                return Err(Error::ProtocolViolation(format!(
                    "unknown datatype token 0x{:02x}",
                    other
                )))
            }
        })
    }

    /// True for the nullable "N" family of types, whose field data is
    /// always preceded by a one-byte length (0 meaning NULL) regardless
    /// of the underlying type's normally fixed width.
    pub fn is_nullable_family(self) -> bool {
        matches!(
            self,
            DataType::IntN
                | DataType::FloatN
                | DataType::BitN
                | DataType::MoneyN
                | DataType::DateTimeN
                | DataType::Decimal
                | DataType::Numeric
        )
    }

    /// Fixed wire width in bytes for types whose length never varies
    /// (everything except the char/binary/text/decimal families, which
    /// carry their own length prefix or use `FieldFmt::length`).
    pub fn fixed_width(self) -> Option<usize> {
        use DataType::*;
        Some(match self {
            TinyInt | Bit => 1,
            SmallInt => 2,
            Int | Float4 | SmallMoney | SmallDateTime => 4,
            BigInt | Float8 | Money | DateTime => 8,
            _ => return None,
        })
    }
}

/// Column metadata as carried by `RowFmt`/`RowFmt2`/`ParamFmt`/`ParamFmt2`
/// (§4.5). `length` is the declared maximum width for variable-length
/// types and is ignored for fixed-width types.
#[derive(Debug, Clone)]
pub struct FieldFmt {
    pub column_name: String,
    pub data_type: DataType,
    pub length: u32,
    pub precision: u8,
    pub scale: u8,
    pub nullable: bool,
    pub updatable: bool,
    pub identity: bool,
    pub key: bool,
}

impl FieldFmt {
    pub fn new(column_name: impl Into<String>, data_type: DataType) -> Self {
        FieldFmt {
            column_name: column_name.into(),
            data_type,
            length: data_type.fixed_width().unwrap_or(0) as u32,
            precision: 0,
            scale: 0,
            nullable: data_type.is_nullable_family(),
            updatable: false,
            identity: false,
            key: false,
        }
    }

    pub(crate) fn write_name(&self, ch: &mut ByteChannel) {
        let name_bytes = self.column_name.as_bytes();
        ch.write_u8(name_bytes.len() as u8);
        ch.write_bytes(name_bytes);
    }

    pub(crate) fn read_name(ch: &mut ByteChannel) -> Result<String> {
        let len = ch.read_u8()? as usize;
        ch.read_string(len)
    }
}
