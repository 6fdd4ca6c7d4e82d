//! `Row` and `Params` (§3): the data packages that follow a `RowFmt`/
//! `ParamFmt` on the same channel. Per §3's invariant, a `Row`'s field
//! count and order must match the last-seen `RowFmt` (and `Params` the
//! last-seen `ParamFmt`) -- so decoding either needs that format handed
//! in by the caller rather than being self-describing.

use crate::byte_channel::ByteChannel;
use crate::error::{Error, Result};
use crate::types::{FieldData, FieldFmt};

fn decode_fields(ch: &mut ByteChannel, fmts: &[FieldFmt]) -> Result<Vec<FieldData>> {
    fmts.iter().map(|fmt| FieldData::decode(ch, fmt)).collect()
}

fn encode_fields(ch: &mut ByteChannel, fields: &[FieldData], fmts: &[FieldFmt]) -> Result<()> {
    for (field, fmt) in fields.iter().zip(fmts) {
        field.encode(ch, fmt)?;
    }
    Ok(())
}

fn check_arity(fields: &[FieldData], fmts: &[FieldFmt], context: &'static str) -> Result<()> {
    if fields.len() != fmts.len() {
        return Err(Error::ProtocolViolation(format!(
            "{context}: {} fields but format declares {}",
            fields.len(),
            fmts.len()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct RowPackage {
    pub fields: Vec<FieldData>,
}

impl RowPackage {
    pub fn decode(ch: &mut ByteChannel, fmts: &[FieldFmt]) -> Result<Self> {
        Ok(RowPackage {
            fields: decode_fields(ch, fmts)?,
        })
    }

    pub fn encode(&self, ch: &mut ByteChannel, fmts: &[FieldFmt]) -> Result<()> {
        check_arity(&self.fields, fmts, "Row")?;
        encode_fields(ch, &self.fields, fmts)
    }
}

#[derive(Debug, Clone)]
pub struct ParamsPackage {
    pub fields: Vec<FieldData>,
}

impl ParamsPackage {
    pub fn decode(ch: &mut ByteChannel, fmts: &[FieldFmt]) -> Result<Self> {
        Ok(ParamsPackage {
            fields: decode_fields(ch, fmts)?,
        })
    }

    pub fn encode(&self, ch: &mut ByteChannel, fmts: &[FieldFmt]) -> Result<()> {
        check_arity(&self.fields, fmts, "Params")?;
        encode_fields(ch, &self.fields, fmts)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::byte_channel::Endianness;
    use crate::types::DataType;

    #[test]
    fn row_round_trips_against_its_format() {
        let fmts = vec![
            FieldFmt::new("id", DataType::Int),
            FieldFmt::new("name", DataType::Varchar),
        ];
        let row = RowPackage {
            fields: vec![FieldData::Int(7), FieldData::Varchar("hi".into())],
        };
        let mut ch = ByteChannel::new(Endianness::Big);
        row.encode(&mut ch, &fmts).unwrap();
        let mut reader = ByteChannel::from_bytes(ch.into_inner(), Endianness::Big);
        let decoded = RowPackage::decode(&mut reader, &fmts).unwrap();
        assert_eq!(decoded.fields, row.fields);
    }

    #[test]
    fn arity_mismatch_is_rejected_on_encode() {
        let fmts = vec![FieldFmt::new("id", DataType::Int)];
        let row = RowPackage {
            fields: vec![FieldData::Int(1), FieldData::Int(2)],
        };
        let mut ch = ByteChannel::new(Endianness::Big);
        let err = row.encode(&mut ch, &fmts).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[test]
    fn params_round_trips_nulls() {
        let fmts = vec![FieldFmt::new("p1", DataType::IntN)];
        let params = ParamsPackage {
            fields: vec![FieldData::Null],
        };
        let mut ch = ByteChannel::new(Endianness::Big);
        params.encode(&mut ch, &fmts).unwrap();
        let mut reader = ByteChannel::from_bytes(ch.into_inner(), Endianness::Big);
        let decoded = ParamsPackage::decode(&mut reader, &fmts).unwrap();
        assert_eq!(decoded.fields, vec![FieldData::Null]);
    }
}
