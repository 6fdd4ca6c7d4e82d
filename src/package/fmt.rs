//! `ParamFmt`/`ParamFmt2` and `RowFmt`/`RowFmt2` (§3, §4.5): the column
//! metadata packages that precede every `Params`/`Row` package on a
//! channel. Narrow and wide forms share this struct, differing only in
//! the width of the field-count and body length prefixes (§4.4).

use enumflags2::{bitflags, BitFlags};

use crate::byte_channel::ByteChannel;
use crate::error::Result;
use crate::types::{DataType, FieldFmt};

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFmtStatusBit {
    Nullable = 0x01,
    CaseSensitive = 0x02,
    Updatable = 0x04,
    Identity = 0x08,
    Key = 0x10,
}

fn status_bits(fmt: &FieldFmt) -> u8 {
    let mut status = BitFlags::<FieldFmtStatusBit>::empty();
    if fmt.nullable {
        status |= FieldFmtStatusBit::Nullable;
    }
    if fmt.updatable {
        status |= FieldFmtStatusBit::Updatable;
    }
    if fmt.identity {
        status |= FieldFmtStatusBit::Identity;
    }
    if fmt.key {
        status |= FieldFmtStatusBit::Key;
    }
    status.bits()
}

fn apply_status(fmt: &mut FieldFmt, bits: u8) {
    let status = BitFlags::<FieldFmtStatusBit>::from_bits_truncate(bits);
    fmt.nullable = status.contains(FieldFmtStatusBit::Nullable);
    fmt.updatable = status.contains(FieldFmtStatusBit::Updatable);
    fmt.identity = status.contains(FieldFmtStatusBit::Identity);
    fmt.key = status.contains(FieldFmtStatusBit::Key);
}

fn write_field_fmt(body: &mut ByteChannel, fmt: &FieldFmt) {
    fmt.write_name(body);
    body.write_u8(status_bits(fmt));
    body.write_u16(0); // user type: unused by this driver
    body.write_u8(fmt.data_type as u8);

    match fmt.data_type {
        DataType::Char | DataType::Varchar | DataType::Binary | DataType::Varbinary => {
            body.write_u8(fmt.length as u8);
        }
        DataType::Longchar | DataType::Longbinary | DataType::Unitext => {
            body.write_u32(fmt.length);
        }
        DataType::Text | DataType::Image => {
            body.write_u32(fmt.length);
        }
        DataType::Decimal | DataType::Numeric => {
            body.write_u8(fmt.precision);
            body.write_u8(fmt.scale);
        }
        DataType::IntN | DataType::FloatN | DataType::BitN | DataType::MoneyN | DataType::DateTimeN => {
            body.write_u8(fmt.length as u8);
        }
        _ => {
            // Truly fixed-width types (Int, SmallInt, TinyInt, BigInt,
            // Float4, Float8, Bit, Money, SmallMoney, DateTime,
            // SmallDateTime) carry no length on the wire.
        }
    }
}

fn read_field_fmt(body: &mut ByteChannel) -> Result<FieldFmt> {
    let column_name = FieldFmt::read_name(body)?;
    let status = body.read_u8()?;
    let _user_type = body.read_u16()?;
    let data_type = DataType::from_u8(body.read_u8()?)?;

    let mut fmt = FieldFmt::new(column_name, data_type);
    apply_status(&mut fmt, status);

    match data_type {
        DataType::Char | DataType::Varchar | DataType::Binary | DataType::Varbinary => {
            fmt.length = body.read_u8()? as u32;
        }
        DataType::Longchar | DataType::Longbinary | DataType::Unitext => {
            fmt.length = body.read_u32()?;
        }
        DataType::Text | DataType::Image => {
            fmt.length = body.read_u32()?;
        }
        DataType::Decimal | DataType::Numeric => {
            fmt.precision = body.read_u8()?;
            fmt.scale = body.read_u8()?;
        }
        DataType::IntN | DataType::FloatN | DataType::BitN | DataType::MoneyN | DataType::DateTimeN => {
            fmt.length = body.read_u8()? as u32;
        }
        _ => {}
    }

    Ok(fmt)
}

fn decode_fmts(ch: &mut ByteChannel, wide: bool) -> Result<Vec<FieldFmt>> {
    let declared = if wide {
        ch.read_u32()? as usize
    } else {
        ch.read_u16()? as usize
    };
    let bytes = ch.read_bytes(declared)?;
    let mut body = ByteChannel::from_bytes(bytes, ch.order());

    let count = if wide {
        body.read_u32()? as usize
    } else {
        body.read_u16()? as usize
    };
    let mut fmts = Vec::with_capacity(count);
    for _ in 0..count {
        fmts.push(read_field_fmt(&mut body)?);
    }
    Ok(fmts)
}

fn encode_fmts(ch: &mut ByteChannel, fmts: &[FieldFmt], wide: bool) {
    let mut body = ByteChannel::new(ch.order());
    if wide {
        body.write_u32(fmts.len() as u32);
    } else {
        body.write_u16(fmts.len() as u16);
    }
    for fmt in fmts {
        write_field_fmt(&mut body, fmt);
    }
    let body = body.into_inner();
    if wide {
        ch.write_u32(body.len() as u32);
    } else {
        ch.write_u16(body.len() as u16);
    }
    ch.write_bytes(&body);
}

#[derive(Debug, Clone)]
pub struct ParamFmtPackage {
    pub fmts: Vec<FieldFmt>,
    pub wide: bool,
}

impl ParamFmtPackage {
    pub fn decode(ch: &mut ByteChannel, wide: bool) -> Result<Self> {
        Ok(ParamFmtPackage {
            fmts: decode_fmts(ch, wide)?,
            wide,
        })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        encode_fmts(ch, &self.fmts, self.wide);
    }
}

#[derive(Debug, Clone)]
pub struct RowFmtPackage {
    pub fmts: Vec<FieldFmt>,
    pub wide: bool,
}

impl RowFmtPackage {
    pub fn decode(ch: &mut ByteChannel, wide: bool) -> Result<Self> {
        Ok(RowFmtPackage {
            fmts: decode_fmts(ch, wide)?,
            wide,
        })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        encode_fmts(ch, &self.fmts, self.wide);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::byte_channel::Endianness;

    #[test]
    fn round_trips_mixed_column_formats() {
        let mut int_col = FieldFmt::new("id", DataType::Int);
        int_col.key = true;
        let mut name_col = FieldFmt::new("name", DataType::Varchar);
        name_col.length = 255;
        name_col.nullable = true;
        let mut amount_col = FieldFmt::new("amount", DataType::Decimal);
        amount_col.precision = 10;
        amount_col.scale = 2;

        let pkg = RowFmtPackage {
            fmts: vec![int_col, name_col, amount_col],
            wide: false,
        };
        let mut ch = ByteChannel::new(Endianness::Big);
        pkg.encode(&mut ch);
        let mut reader = ByteChannel::from_bytes(ch.into_inner(), Endianness::Big);
        let decoded = RowFmtPackage::decode(&mut reader, false).unwrap();

        assert_eq!(decoded.fmts.len(), 3);
        assert_eq!(decoded.fmts[0].column_name, "id");
        assert!(decoded.fmts[0].key);
        assert_eq!(decoded.fmts[1].length, 255);
        assert!(decoded.fmts[1].nullable);
        assert_eq!(decoded.fmts[2].precision, 10);
        assert_eq!(decoded.fmts[2].scale, 2);
    }

    #[test]
    fn wide_form_round_trips() {
        let pkg = ParamFmtPackage {
            fmts: vec![FieldFmt::new("p1", DataType::BigInt)],
            wide: true,
        };
        let mut ch = ByteChannel::new(Endianness::Big);
        pkg.encode(&mut ch);
        let mut reader = ByteChannel::from_bytes(ch.into_inner(), Endianness::Big);
        let decoded = ParamFmtPackage::decode(&mut reader, true).unwrap();
        assert_eq!(decoded.fmts[0].column_name, "p1");
    }
}
