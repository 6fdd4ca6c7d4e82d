//! The capability bitmap exchanged once per connection at login (§3).
//!
//! TDS capabilities are carried on the wire as two variable-length byte
//! arrays -- a "request" set (what the client/server will send) and a
//! "response" set (what the client/server will accept back) -- each a
//! plain bitfield. The bit assignments below follow the Sybase ASE TDS
//! capability token's established layout for the subset of capabilities
//! this driver cares about declaring; servers tolerate a client
//! requesting a narrower capability set than they support.

use enumflags2::{bitflags, BitFlags};

/// Bits in the "request" capability block: features the side sending
/// this block may use.
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestCapability {
    Language = 1 << 0,
    Rpc = 1 << 1,
    Event = 1 << 2,
    MultiStatement = 1 << 3,
    Bcp = 1 << 4,
    Cursor = 1 << 5,
    Dynamic = 1 << 6,
    Message = 1 << 7,
    Param = 1 << 8,
    InbandConnection = 1 << 9,
    WideTables = 1 << 10,
    Data64bitInt = 1 << 11,
}

/// Bits in the "response" capability block: wire shapes the side sending
/// this block knows how to decode.
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCapability {
    DataInt1 = 1 << 0,
    DataInt2 = 1 << 1,
    DataInt4 = 1 << 2,
    DataInt8 = 1 << 3,
    DataBit = 1 << 4,
    DataChar = 1 << 5,
    DataVarchar = 1 << 6,
    DataBinary = 1 << 7,
    DataVarbinary = 1 << 8,
    DataMoney = 1 << 9,
    DataDatetime = 1 << 10,
    DataFloat4 = 1 << 11,
    DataFloat8 = 1 << 12,
    DataNumeric = 1 << 13,
    DataText = 1 << 14,
    DataImage = 1 << 15,
    DataDecimal = 1 << 16,
    DataLongchar = 1 << 17,
    DataLongbinary = 1 << 18,
    DataIntn = 1 << 19,
    DataDatetimen = 1 << 20,
    DataMoneyn = 1 << 21,
    DataFloatn = 1 << 22,
    DataBitn = 1 << 23,
}

/// A fully assembled capability set: what this side of the connection
/// both requests and can respond with. Immutable once exchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub request: BitFlags<RequestCapability>,
    pub response: BitFlags<ResponseCapability>,
}

impl Capabilities {
    /// The capability set this driver declares at login.
    pub fn driver_default() -> Self {
        Capabilities {
            request: RequestCapability::Language
                | RequestCapability::Rpc
                | RequestCapability::MultiStatement
                | RequestCapability::Dynamic
                | RequestCapability::Param
                | RequestCapability::Message
                | RequestCapability::Data64bitInt,
            response: ResponseCapability::DataInt1
                | ResponseCapability::DataInt2
                | ResponseCapability::DataInt4
                | ResponseCapability::DataInt8
                | ResponseCapability::DataBit
                | ResponseCapability::DataChar
                | ResponseCapability::DataVarchar
                | ResponseCapability::DataBinary
                | ResponseCapability::DataVarbinary
                | ResponseCapability::DataMoney
                | ResponseCapability::DataDatetime
                | ResponseCapability::DataFloat4
                | ResponseCapability::DataFloat8
                | ResponseCapability::DataNumeric
                | ResponseCapability::DataText
                | ResponseCapability::DataImage
                | ResponseCapability::DataDecimal
                | ResponseCapability::DataLongchar
                | ResponseCapability::DataLongbinary
                | ResponseCapability::DataIntn
                | ResponseCapability::DataDatetimen
                | ResponseCapability::DataMoneyn
                | ResponseCapability::DataFloatn
                | ResponseCapability::DataBitn,
        }
    }

    pub fn request_bytes(&self) -> Vec<u8> {
        self.request.bits().to_be_bytes().to_vec()
    }

    pub fn response_bytes(&self) -> Vec<u8> {
        self.response.bits().to_be_bytes().to_vec()
    }

    pub fn from_wire(request_bits: u32, response_bits: u32) -> Self {
        Capabilities {
            request: BitFlags::from_bits_truncate(request_bits),
            response: BitFlags::from_bits_truncate(response_bits),
        }
    }
}
