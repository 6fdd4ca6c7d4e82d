//! The closed conversion table: coercions this driver is willing to
//! perform between a caller-supplied `FieldData` and a server-declared
//! target `DataType`, when binding parameters (§4.5's conversion
//! precedence rules, §9's "closed conversion table" redesign).
//!
//! Deliberately closed: an entry not in this table is a hard error
//! rather than a best-effort guess, since silently lossy numeric or
//! string coercions are a worse failure mode than rejecting the bind.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::data::Decimal;
use super::{DataType, FieldData};
use crate::error::{Error, Result};

type ConvertFn = fn(&FieldData) -> Result<FieldData>;

static TABLE: Lazy<HashMap<(&'static str, DataType), ConvertFn>> = Lazy::new(|| {
    let mut m: HashMap<(&'static str, DataType), ConvertFn> = HashMap::new();

    // Numeric widening, narrowest source accepted at each wider target.
    m.insert(("tinyint", DataType::SmallInt), |v| match v {
        FieldData::TinyInt(x) => Ok(FieldData::SmallInt(*x as i16)),
        _ => unreachable!(),
    });
    m.insert(("tinyint", DataType::Int), |v| match v {
        FieldData::TinyInt(x) => Ok(FieldData::Int(*x as i32)),
        _ => unreachable!(),
    });
    m.insert(("tinyint", DataType::BigInt), |v| match v {
        FieldData::TinyInt(x) => Ok(FieldData::BigInt(*x as i64)),
        _ => unreachable!(),
    });
    m.insert(("smallint", DataType::Int), |v| match v {
        FieldData::SmallInt(x) => Ok(FieldData::Int(*x as i32)),
        _ => unreachable!(),
    });
    m.insert(("smallint", DataType::BigInt), |v| match v {
        FieldData::SmallInt(x) => Ok(FieldData::BigInt(*x as i64)),
        _ => unreachable!(),
    });
    m.insert(("int", DataType::BigInt), |v| match v {
        FieldData::Int(x) => Ok(FieldData::BigInt(*x as i64)),
        _ => unreachable!(),
    });
    m.insert(("int", DataType::Float8), |v| match v {
        FieldData::Int(x) => Ok(FieldData::Float8(*x as f64)),
        _ => unreachable!(),
    });
    m.insert(("float4", DataType::Float8), |v| match v {
        FieldData::Float4(x) => Ok(FieldData::Float8(*x as f64)),
        _ => unreachable!(),
    });
    m.insert(("bit", DataType::TinyInt), |v| match v {
        FieldData::Bit(x) => Ok(FieldData::TinyInt(*x as u8)),
        _ => unreachable!(),
    });

    // Integer narrowing: a wider caller-supplied kind binding against a
    // narrower server-declared column, mirroring the original driver's
    // INT1/INT2/INT4 arms, which accept any integer kind and truncate.
    m.insert(("bigint", DataType::Int), |v| match v {
        FieldData::BigInt(x) => Ok(FieldData::Int(*x as i32)),
        _ => unreachable!(),
    });
    m.insert(("bigint", DataType::SmallInt), |v| match v {
        FieldData::BigInt(x) => Ok(FieldData::SmallInt(*x as i16)),
        _ => unreachable!(),
    });
    m.insert(("bigint", DataType::TinyInt), |v| match v {
        FieldData::BigInt(x) => Ok(FieldData::TinyInt(*x as u8)),
        _ => unreachable!(),
    });
    m.insert(("int", DataType::SmallInt), |v| match v {
        FieldData::Int(x) => Ok(FieldData::SmallInt(*x as i16)),
        _ => unreachable!(),
    });
    m.insert(("int", DataType::TinyInt), |v| match v {
        FieldData::Int(x) => Ok(FieldData::TinyInt(*x as u8)),
        _ => unreachable!(),
    });
    m.insert(("smallint", DataType::TinyInt), |v| match v {
        FieldData::SmallInt(x) => Ok(FieldData::TinyInt(*x as u8)),
        _ => unreachable!(),
    });

    // Float narrowing: float8 -> float4, the other half of the widening
    // pair already registered above.
    m.insert(("float8", DataType::Float4), |v| match v {
        FieldData::Float8(x) => Ok(FieldData::Float4(*x as f32)),
        _ => unreachable!(),
    });

    // The nullable "N" families (§4.5): a server-declared IntN/FloatN/
    // MoneyN/BitN column accepts the same concrete kinds its fixed-width
    // counterpart would, unchanged -- the N-ness only affects the wire
    // length prefix `FieldData::encode` writes, not the value itself.
    m.insert(("tinyint", DataType::IntN), |v| Ok(v.clone()));
    m.insert(("smallint", DataType::IntN), |v| Ok(v.clone()));
    m.insert(("int", DataType::IntN), |v| Ok(v.clone()));
    m.insert(("bigint", DataType::IntN), |v| Ok(v.clone()));
    m.insert(("float4", DataType::FloatN), |v| Ok(v.clone()));
    m.insert(("float8", DataType::FloatN), |v| Ok(v.clone()));
    m.insert(("money", DataType::MoneyN), |v| Ok(v.clone()));
    m.insert(("bit", DataType::BitN), |v| Ok(v.clone()));

    // Numeric -> string, the common "bind as text" escape hatch.
    m.insert(("int", DataType::Varchar), |v| match v {
        FieldData::Int(x) => Ok(FieldData::Varchar(x.to_string())),
        _ => unreachable!(),
    });
    m.insert(("bigint", DataType::Varchar), |v| match v {
        FieldData::BigInt(x) => Ok(FieldData::Varchar(x.to_string())),
        _ => unreachable!(),
    });
    m.insert(("float8", DataType::Varchar), |v| match v {
        FieldData::Float8(x) => Ok(FieldData::Varchar(x.to_string())),
        _ => unreachable!(),
    });

    // String -> numeric, parsed; failure here is a caller bug, not a
    // conversion-table gap, so it surfaces as CannotConvert too.
    m.insert(("varchar", DataType::Int), |v| match v {
        FieldData::Varchar(s) => s
            .trim()
            .parse::<i32>()
            .map(FieldData::Int)
            .map_err(|_| Error::CannotConvert {
                target: DataType::Int,
                source_kind: "varchar",
            }),
        _ => unreachable!(),
    });
    m.insert(("varchar", DataType::Float8), |v| match v {
        FieldData::Varchar(s) => s
            .trim()
            .parse::<f64>()
            .map(FieldData::Float8)
            .map_err(|_| Error::CannotConvert {
                target: DataType::Float8,
                source_kind: "varchar",
            }),
        _ => unreachable!(),
    });
    m.insert(("varchar", DataType::Decimal), |v| match v {
        FieldData::Varchar(s) => parse_decimal(s),
        _ => unreachable!(),
    });
    m.insert(("char", DataType::Varchar), |v| match v {
        FieldData::Char(s) => Ok(FieldData::Varchar(s.clone())),
        _ => unreachable!(),
    });
    m.insert(("varchar", DataType::Longchar), |v| match v {
        FieldData::Varchar(s) => Ok(FieldData::Longchar(s.clone())),
        _ => unreachable!(),
    });

    m
});

fn parse_decimal(s: &str) -> Result<FieldData> {
    let (positive, digits) = match s.strip_prefix('-') {
        Some(rest) => (false, rest),
        None => (true, s),
    };
    let digits: String = digits.chars().filter(|c| *c != '.').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::CannotConvert {
            target: DataType::Decimal,
            source_kind: "varchar",
        });
    }
    let mut value: u128 = 0;
    for c in digits.chars() {
        value = value * 10 + c.to_digit(10).unwrap() as u128;
    }
    let mut magnitude = value.to_be_bytes().to_vec();
    while magnitude.len() > 1 && magnitude[0] == 0 {
        magnitude.remove(0);
    }
    Ok(FieldData::Decimal(Decimal { positive, magnitude }))
}

/// Converts `value` to `target`, consulting the closed table above.
/// Converting a value to its own type is always a no-op identity, and
/// `Null` converts to `Null` for any target.
pub fn convert(value: &FieldData, target: DataType) -> Result<FieldData> {
    if value.is_null() {
        return Ok(FieldData::Null);
    }
    if same_kind(value, target) {
        return Ok(value.clone());
    }
    match TABLE.get(&(value.kind_name(), target)) {
        Some(f) => f(value),
        None => Err(Error::CannotConvert {
            target,
            source_kind: value.kind_name(),
        }),
    }
}

fn same_kind(value: &FieldData, target: DataType) -> bool {
    matches!(
        (value, target),
        (FieldData::TinyInt(_), DataType::TinyInt)
            | (FieldData::SmallInt(_), DataType::SmallInt)
            | (FieldData::Int(_), DataType::Int)
            | (FieldData::BigInt(_), DataType::BigInt)
            | (FieldData::Float4(_), DataType::Float4)
            | (FieldData::Float8(_), DataType::Float8)
            | (FieldData::Bit(_), DataType::Bit)
            | (FieldData::Char(_), DataType::Char)
            | (FieldData::Varchar(_), DataType::Varchar)
            | (FieldData::Longchar(_), DataType::Longchar)
            | (FieldData::Decimal(_), DataType::Decimal)
            | (FieldData::Decimal(_), DataType::Numeric)
    )
}
