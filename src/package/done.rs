//! `Done`/`DoneProc`/`DoneInProc` (§3): all three share one wire layout
//! and differ only in their token byte, which signals whether the
//! terminator closes a whole message, a stored-procedure call, or one
//! statement within a procedure.

use enumflags2::{bitflags, BitFlags};

use crate::byte_channel::ByteChannel;
use crate::error::Result;

#[bitflags]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneStatusBit {
    More = 0x1,
    Error = 0x2,
    InXact = 0x4,
    Proc = 0x8,
    Count = 0x10,
    Attn = 0x20,
    Event = 0x1000,
}

pub type DoneStatus = BitFlags<DoneStatusBit>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranState {
    NotInTran,
    InProgress,
    Completed,
    Aborted,
}

impl TranState {
    fn from_u16(value: u16) -> Self {
        match value {
            1 => TranState::InProgress,
            2 => TranState::Completed,
            3 => TranState::Aborted,
            _ => TranState::NotInTran,
        }
    }

    fn to_u16(self) -> u16 {
        match self {
            TranState::NotInTran => 0,
            TranState::InProgress => 1,
            TranState::Completed => 2,
            TranState::Aborted => 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DonePackage {
    pub status: DoneStatus,
    pub tran_state: TranState,
    pub count: u32,
}

impl DonePackage {
    /// True once this is the terminator for the whole message: no
    /// `More` bit, no pending error.
    pub fn is_final(&self) -> bool {
        !self.status.contains(DoneStatusBit::More)
    }

    pub fn decode(ch: &mut ByteChannel) -> Result<Self> {
        let status_bits = ch.read_u16()?;
        let status = DoneStatus::from_bits_truncate(status_bits);
        let tran_state = TranState::from_u16(ch.read_u16()?);
        let count = ch.read_u32()?;
        Ok(DonePackage {
            status,
            tran_state,
            count,
        })
    }

    pub fn encode(&self, ch: &mut ByteChannel) {
        ch.write_u16(self.status.bits());
        ch.write_u16(self.tran_state.to_u16());
        ch.write_u32(self.count);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::byte_channel::Endianness;

    #[test]
    fn round_trips_final_done() {
        let pkg = DonePackage {
            status: DoneStatus::empty(),
            tran_state: TranState::Completed,
            count: 0,
        };
        let mut ch = ByteChannel::new(Endianness::Big);
        pkg.encode(&mut ch);
        let mut reader = ByteChannel::from_bytes(ch.into_inner(), Endianness::Big);
        let decoded = DonePackage::decode(&mut reader).unwrap();
        assert!(decoded.is_final());
        assert_eq!(decoded.tran_state, TranState::Completed);
    }

    #[test]
    fn more_bit_means_not_final() {
        let pkg = DonePackage {
            status: DoneStatusBit::More | DoneStatusBit::Count,
            tran_state: TranState::InProgress,
            count: 12,
        };
        let mut ch = ByteChannel::new(Endianness::Big);
        pkg.encode(&mut ch);
        let mut reader = ByteChannel::from_bytes(ch.into_inner(), Endianness::Big);
        let decoded = DonePackage::decode(&mut reader).unwrap();
        assert!(!decoded.is_final());
        assert_eq!(decoded.count, 12);
    }
}
