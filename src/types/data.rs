//! `FieldData`: the decoded value for a single column, and its
//! per-datatype wire encode/decode rules (§4.5).

use bytes::Bytes;
use chrono::NaiveDateTime;

use crate::byte_channel::ByteChannel;
use crate::error::{Error, Result};

use super::datetime::DateTimeForm;
use super::{DataType, FieldFmt};

/// A Decimal/Numeric value: sign-magnitude, big-endian digit bytes, with
/// the precision/scale carried separately on the owning `FieldFmt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decimal {
    pub positive: bool,
    pub magnitude: Vec<u8>,
}

impl Decimal {
    #[cfg(feature = "rust_decimal")]
    pub fn to_rust_decimal(&self, scale: u8) -> rust_decimal::Decimal {
        let mut value: i128 = 0;
        for byte in &self.magnitude {
            value = (value << 8) | *byte as i128;
        }
        if !self.positive {
            value = -value;
        }
        rust_decimal::Decimal::from_i128_with_scale(value, scale as u32)
    }
}

/// The decoded value of one column within a `Row`/`Params` package.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldData {
    Null,
    TinyInt(u8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float4(f32),
    Float8(f64),
    Bit(bool),
    Char(String),
    Varchar(String),
    Binary(Bytes),
    Varbinary(Bytes),
    Longchar(String),
    Longbinary(Bytes),
    Decimal(Decimal),
    Money(i64),
    DateTime(NaiveDateTime),
    SmallDateTime(NaiveDateTime),
    Text { object_id: [u8; 8], value: String },
    Image { object_id: [u8; 8], value: Bytes },
    Unitext(String),
}

impl FieldData {
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldData::Null => "null",
            FieldData::TinyInt(_) => "tinyint",
            FieldData::SmallInt(_) => "smallint",
            FieldData::Int(_) => "int",
            FieldData::BigInt(_) => "bigint",
            FieldData::Float4(_) => "float4",
            FieldData::Float8(_) => "float8",
            FieldData::Bit(_) => "bit",
            FieldData::Char(_) => "char",
            FieldData::Varchar(_) => "varchar",
            FieldData::Binary(_) => "binary",
            FieldData::Varbinary(_) => "varbinary",
            FieldData::Longchar(_) => "longchar",
            FieldData::Longbinary(_) => "longbinary",
            FieldData::Decimal(_) => "decimal",
            FieldData::Money(_) => "money",
            FieldData::DateTime(_) => "datetime",
            FieldData::SmallDateTime(_) => "smalldatetime",
            FieldData::Text { .. } => "text",
            FieldData::Image { .. } => "image",
            FieldData::Unitext(_) => "unitext",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldData::Null)
    }

    /// Decodes one field's data given the column's declared format.
    pub fn decode(ch: &mut ByteChannel, fmt: &FieldFmt) -> Result<Self> {
        use DataType::*;
        Ok(match fmt.data_type {
            TinyInt => FieldData::TinyInt(ch.read_u8()?),
            SmallInt => FieldData::SmallInt(ch.read_i16()?),
            Int => FieldData::Int(ch.read_i32()?),
            BigInt => FieldData::BigInt(ch.read_i64()?),
            Float4 => FieldData::Float4(ch.read_f32()?),
            Float8 => FieldData::Float8(ch.read_f64()?),
            Bit => FieldData::Bit(ch.read_u8()? != 0),
            Char => {
                let len = ch.read_u8()? as usize;
                FieldData::Char(ch.read_string(len)?)
            }
            Varchar => {
                let len = ch.read_u8()? as usize;
                FieldData::Varchar(ch.read_string(len)?)
            }
            Binary => {
                let len = ch.read_u8()? as usize;
                FieldData::Binary(ch.read_bytes(len)?)
            }
            Varbinary => {
                let len = ch.read_u8()? as usize;
                FieldData::Varbinary(ch.read_bytes(len)?)
            }
            Longchar => {
                let len = ch.read_u32()? as usize;
                FieldData::Longchar(ch.read_string(len)?)
            }
            Longbinary => {
                let len = ch.read_u32()? as usize;
                FieldData::Longbinary(ch.read_bytes(len)?)
            }
            Unitext => {
                let len = ch.read_u32()? as usize;
                FieldData::Unitext(ch.read_string(len)?)
            }
            Decimal | Numeric => {
                let len = ch.read_u8()? as usize;
                if len == 0 {
                    FieldData::Null
                } else {
                    let sign_byte = ch.read_u8()?;
                    let magnitude = ch.read_bytes(len - 1)?.to_vec();
                    FieldData::Decimal(super::data::Decimal {
                        positive: sign_byte == 0,
                        magnitude,
                    })
                }
            }
            IntN => {
                let len = ch.read_u8()?;
                match len {
                    0 => FieldData::Null,
                    1 => FieldData::TinyInt(ch.read_u8()?),
                    2 => FieldData::SmallInt(ch.read_i16()?),
                    4 => FieldData::Int(ch.read_i32()?),
                    8 => FieldData::BigInt(ch.read_i64()?),
                    other => {
                        return Err(Error::ProtocolViolation(format!(
                            "invalid IntN width {other}"
                        )))
                    }
                }
            }
            FloatN => {
                let len = ch.read_u8()?;
                match len {
                    0 => FieldData::Null,
                    4 => FieldData::Float4(ch.read_f32()?),
                    8 => FieldData::Float8(ch.read_f64()?),
                    other => {
                        return Err(Error::ProtocolViolation(format!(
                            "invalid FloatN width {other}"
                        )))
                    }
                }
            }
            BitN => {
                let len = ch.read_u8()?;
                match len {
                    0 => FieldData::Null,
                    1 => FieldData::Bit(ch.read_u8()? != 0),
                    other => {
                        return Err(Error::ProtocolViolation(format!(
                            "invalid BitN width {other}"
                        )))
                    }
                }
            }
            Money => FieldData::Money(ch.read_i64()?),
            SmallMoney => FieldData::Money(ch.read_i32()? as i64),
            MoneyN => {
                let len = ch.read_u8()?;
                match len {
                    0 => FieldData::Null,
                    4 => FieldData::Money(ch.read_i32()? as i64),
                    8 => FieldData::Money(ch.read_i64()?),
                    other => {
                        return Err(Error::ProtocolViolation(format!(
                            "invalid MoneyN width {other}"
                        )))
                    }
                }
            }
            DateTime => {
                let days = ch.read_i32()?;
                let ticks = ch.read_u32()?;
                FieldData::DateTime(DateTimeForm::Legacy { days, ticks }.to_naive())
            }
            SmallDateTime => {
                let days = ch.read_u16()?;
                let minutes = ch.read_u16()?;
                FieldData::SmallDateTime(DateTimeForm::Small { days, minutes }.to_naive())
            }
            DateTimeN => {
                let len = ch.read_u8()?;
                match len {
                    0 => FieldData::Null,
                    4 => {
                        let days = ch.read_u16()?;
                        let minutes = ch.read_u16()?;
                        FieldData::SmallDateTime(DateTimeForm::Small { days, minutes }.to_naive())
                    }
                    8 => {
                        let days = ch.read_i32()?;
                        let ticks = ch.read_u32()?;
                        FieldData::DateTime(DateTimeForm::Legacy { days, ticks }.to_naive())
                    }
                    other => {
                        return Err(Error::ProtocolViolation(format!(
                            "invalid DateTimeN width {other}"
                        )))
                    }
                }
            }
            Text => {
                let object_id = read_blob_object_id(ch)?;
                let len = ch.read_u32()? as usize;
                if len == 0 {
                    FieldData::Null
                } else {
                    FieldData::Text {
                        object_id,
                        value: ch.read_string(len)?,
                    }
                }
            }
            Image => {
                let object_id = read_blob_object_id(ch)?;
                let len = ch.read_u32()? as usize;
                if len == 0 {
                    FieldData::Null
                } else {
                    FieldData::Image {
                        object_id,
                        value: ch.read_bytes(len)?,
                    }
                }
            }
        })
    }

    /// Encodes against `fmt`'s declared type, since the "N" nullable
    /// family (§4.5) needs a 1-byte length prefix ahead of the same
    /// value a plain fixed-width column writes bare -- that distinction
    /// lives on the format, not on the value itself.
    pub fn encode(&self, ch: &mut ByteChannel, fmt: &FieldFmt) -> Result<()> {
        let nullable = fmt.data_type.is_nullable_family();
        match self {
            FieldData::Null => match fmt.data_type {
                DataType::Text | DataType::Image => {
                    ch.write_u8(0);
                    ch.write_u32(0);
                }
                _ if nullable => ch.write_u8(0),
                _ => {
                    return Err(Error::CannotConvert {
                        target: fmt.data_type,
                        source_kind: "null",
                    })
                }
            },
            FieldData::TinyInt(v) => {
                if nullable {
                    ch.write_u8(1);
                }
                ch.write_u8(*v);
            }
            FieldData::SmallInt(v) => {
                if nullable {
                    ch.write_u8(2);
                }
                ch.write_i16(*v);
            }
            FieldData::Int(v) => {
                if nullable {
                    ch.write_u8(4);
                }
                ch.write_i32(*v);
            }
            FieldData::BigInt(v) => {
                if nullable {
                    ch.write_u8(8);
                }
                ch.write_i64(*v);
            }
            FieldData::Float4(v) => {
                if nullable {
                    ch.write_u8(4);
                }
                ch.write_f32(*v);
            }
            FieldData::Float8(v) => {
                if nullable {
                    ch.write_u8(8);
                }
                ch.write_f64(*v);
            }
            FieldData::Bit(v) => {
                if nullable {
                    ch.write_u8(1);
                }
                ch.write_u8(*v as u8);
            }
            FieldData::Char(s) | FieldData::Varchar(s) => {
                ch.write_u8(s.len() as u8);
                ch.write_string(s);
            }
            FieldData::Binary(b) | FieldData::Varbinary(b) => {
                ch.write_u8(b.len() as u8);
                ch.write_bytes(b);
            }
            FieldData::Longchar(s) | FieldData::Unitext(s) => {
                ch.write_u32(s.len() as u32);
                ch.write_string(s);
            }
            FieldData::Longbinary(b) => {
                ch.write_u32(b.len() as u32);
                ch.write_bytes(b);
            }
            FieldData::Decimal(d) => {
                ch.write_u8((d.magnitude.len() + 1) as u8);
                ch.write_u8(if d.positive { 0 } else { 1 });
                ch.write_bytes(&d.magnitude);
            }
            FieldData::Money(v) => {
                if nullable {
                    ch.write_u8(8);
                }
                ch.write_i64(*v);
            }
            FieldData::DateTime(naive) => {
                let form = DateTimeForm::from_naive_legacy(*naive);
                if let DateTimeForm::Legacy { days, ticks } = form {
                    if nullable {
                        ch.write_u8(8);
                    }
                    ch.write_i32(days);
                    ch.write_u32(ticks);
                }
            }
            FieldData::SmallDateTime(naive) => {
                let form = DateTimeForm::from_naive_small(*naive);
                if let DateTimeForm::Small { days, minutes } = form {
                    if nullable {
                        ch.write_u8(4);
                    }
                    ch.write_u16(days);
                    ch.write_u16(minutes);
                }
            }
            FieldData::Text { object_id, value } => {
                write_blob_object_id(ch, object_id);
                ch.write_u32(value.len() as u32);
                ch.write_string(value);
            }
            FieldData::Image { object_id, value } => {
                write_blob_object_id(ch, object_id);
                ch.write_u32(value.len() as u32);
                ch.write_bytes(value);
            }
        }
        Ok(())
    }
}

/// `Text`/`Image`/`Unitext` fields carry an 8-byte object id ahead of
/// their timestamp and length-prefixed payload; this driver treats it as
/// an opaque blob (it's only meaningful for server-side text-pointer
/// update operations, out of scope here).
fn read_blob_object_id(ch: &mut ByteChannel) -> Result<[u8; 8]> {
    let prefix = ch.read_u8()?;
    if prefix == 0 {
        return Ok([0; 8]);
    }
    // `bytes` holds the object id followed by a timestamp; both are
    // opaque to this driver, so only the leading 8 bytes are kept.
    let bytes = ch.read_bytes(prefix as usize)?;
    let mut id = [0u8; 8];
    let take = bytes.len().min(8);
    id[..take].copy_from_slice(&bytes[..take]);
    Ok(id)
}

fn write_blob_object_id(ch: &mut ByteChannel, object_id: &[u8; 8]) {
    ch.write_u8(8);
    ch.write_bytes(object_id);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::byte_channel::Endianness;

    fn round_trip(value: FieldData, fmt: &FieldFmt) -> FieldData {
        let mut ch = ByteChannel::new(Endianness::Big);
        value.encode(&mut ch, fmt).unwrap();
        let mut reader = ByteChannel::from_bytes(ch.into_inner(), Endianness::Big);
        FieldData::decode(&mut reader, fmt).unwrap()
    }

    #[test]
    fn intn_non_null_value_carries_its_length_prefix() {
        let fmt = FieldFmt::new("n", DataType::IntN);
        assert_eq!(round_trip(FieldData::Int(42), &fmt), FieldData::Int(42));
    }

    #[test]
    fn intn_null_round_trips() {
        let fmt = FieldFmt::new("n", DataType::IntN);
        assert_eq!(round_trip(FieldData::Null, &fmt), FieldData::Null);
    }

    #[test]
    fn plain_int_has_no_length_prefix() {
        let fmt = FieldFmt::new("n", DataType::Int);
        let mut ch = ByteChannel::new(Endianness::Big);
        FieldData::Int(7).encode(&mut ch, &fmt).unwrap();
        assert_eq!(ch.into_inner().len(), 4);
    }

    #[test]
    fn floatn_non_null_value_round_trips() {
        let fmt = FieldFmt::new("f", DataType::FloatN);
        assert_eq!(
            round_trip(FieldData::Float8(1.5), &fmt),
            FieldData::Float8(1.5)
        );
    }

    #[test]
    fn moneyn_non_null_value_round_trips() {
        let fmt = FieldFmt::new("m", DataType::MoneyN);
        assert_eq!(round_trip(FieldData::Money(500), &fmt), FieldData::Money(500));
    }

    #[test]
    fn datetimen_legacy_width_round_trips() {
        use chrono::NaiveDate;
        let fmt = FieldFmt::new("d", DataType::DateTimeN);
        let naive = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(13, 30, 0)
            .unwrap();
        let decoded = round_trip(FieldData::DateTime(naive), &fmt);
        match decoded {
            FieldData::DateTime(got) => {
                assert!((got - naive).num_milliseconds().abs() <= 4);
            }
            other => panic!("expected DateTime, got {other:?}"),
        }
    }

    #[test]
    fn text_null_round_trips() {
        let fmt = FieldFmt::new("t", DataType::Text);
        assert_eq!(round_trip(FieldData::Null, &fmt), FieldData::Null);
    }

    #[test]
    fn null_against_non_nullable_fixed_column_is_rejected() {
        let fmt = FieldFmt::new("n", DataType::Int);
        let mut ch = ByteChannel::new(Endianness::Big);
        let err = FieldData::Null.encode(&mut ch, &fmt).unwrap_err();
        assert!(matches!(err, Error::CannotConvert { .. }));
    }
}
