//! Datetime wire forms (§4.5): Sybase ASE's epoch and the two ways a
//! datetime value is split across bytes on the wire.

use chrono::NaiveDate;
use once_cell::sync::Lazy;

/// The TDS epoch: day zero for every `DateTime`/`SmallDateTime` value.
pub static TDS_EPOCH: Lazy<NaiveDate> =
    Lazy::new(|| NaiveDate::from_ymd_opt(1900, 1, 1).expect("valid calendar date"));

/// The two wire layouts a datetime value can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeForm {
    /// `DateTime`/`DateTimeN` (8 bytes): i32 days since epoch (signed,
    /// allows dates before 1900), u32 ticks since midnight at 1/300s
    /// resolution.
    Legacy { days: i32, ticks: u32 },
    /// `SmallDateTime` (4 bytes): u16 days since epoch, u16 minutes since
    /// midnight -- no sub-minute resolution.
    Small { days: u16, minutes: u16 },
}

impl DateTimeForm {
    pub fn to_naive(self) -> chrono::NaiveDateTime {
        match self {
            DateTimeForm::Legacy { days, ticks } => {
                let date = *TDS_EPOCH + chrono::Duration::days(days as i64);
                let millis = (ticks as i64 * 1000) / 300;
                date.and_hms_opt(0, 0, 0).unwrap() + chrono::Duration::milliseconds(millis)
            }
            DateTimeForm::Small { days, minutes } => {
                let date = *TDS_EPOCH + chrono::Duration::days(days as i64);
                date.and_hms_opt(0, 0, 0).unwrap() + chrono::Duration::minutes(minutes as i64)
            }
        }
    }

    pub fn from_naive_legacy(value: chrono::NaiveDateTime) -> Self {
        let days = (value.date() - *TDS_EPOCH).num_days() as i32;
        let midnight = value.date().and_hms_opt(0, 0, 0).unwrap();
        let millis_since_midnight = (value - midnight).num_milliseconds();
        let ticks = ((millis_since_midnight * 300) / 1000) as u32;
        DateTimeForm::Legacy { days, ticks }
    }

    pub fn from_naive_small(value: chrono::NaiveDateTime) -> Self {
        let days = (value.date() - *TDS_EPOCH).num_days() as u16;
        let midnight = value.date().and_hms_opt(0, 0, 0).unwrap();
        let minutes = ((value - midnight).num_minutes()) as u16;
        DateTimeForm::Small { days, minutes }
    }
}
