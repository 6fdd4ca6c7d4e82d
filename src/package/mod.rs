//! The typed package layer (§4.4): one message body decodes into a
//! sequence of token-tagged packages. Each submodule owns one or a
//! closely related group of package kinds; this module owns the token
//! byte table and the top-level `Package` sum type callers match on.

pub mod capability;
pub mod control;
pub mod cursor;
pub mod done;
pub mod dynamic;
pub mod envchange;
pub mod error;
pub mod fmt;
pub mod language;
pub mod login;
pub mod logout;
pub mod msg;
pub mod option;
pub mod row;

use crate::byte_channel::ByteChannel;
use crate::error::Result;
use crate::types::FieldFmt;

/// Token byte identifying a package's wire shape. `Login` has no token
/// byte of its own -- the whole Login packet body is the login record,
/// dispatched by packet type rather than token -- so it's excluded here
/// and handled directly by the login state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Token {
    LoginAck = 0xad,
    Capability = 0xe2,
    Eed = 0xe5,
    Msg = 0x65,
    Language = 0x21,
    ParamFmt = 0xec,
    ParamFmt2 = 0x20,
    Params = 0xd7,
    RowFmt = 0xee,
    RowFmt2 = 0x61,
    Row = 0xd1,
    Done = 0xfd,
    DoneProc = 0xfe,
    DoneInProc = 0xff,
    Return = 0x79,
    Order = 0xa9,
    Control = 0xae,
    Error = 0xaa,
    EnvChange = 0xe3,
    Dynamic = 0xe7,
    Dynamic2 = 0xa3,
    Option = 0xa6,
    CurDeclare = 0x86,
    CurOpen = 0x87,
    CurFetch = 0x88,
    CurClose = 0x89,
    CurInfo = 0x8a,
    Logout = 0x71,
}

impl Token {
    pub fn from_u8(value: u8) -> Result<Self> {
        use Token::*;
        Ok(match value {
            0xad => LoginAck,
            0xe2 => Capability,
            0xe5 => Eed,
            0x65 => Msg,
            0x21 => Language,
            0xec => ParamFmt,
            0x20 => ParamFmt2,
            0xd7 => Params,
            0xee => RowFmt,
            0x61 => RowFmt2,
            0xd1 => Row,
            0xfd => Done,
            0xfe => DoneProc,
            0xff => DoneInProc,
            0x79 => Return,
            0xa9 => Order,
            0xae => Control,
            0xaa => Error,
            0xe3 => EnvChange,
            0xe7 => Dynamic,
            0xa3 => Dynamic2,
            0xa6 => Option,
            0x86 => CurDeclare,
            0x87 => CurOpen,
            0x88 => CurFetch,
            0x89 => CurClose,
            0x8a => CurInfo,
            0x71 => Logout,
            other => {
                return Err(crate::error::Error::ProtocolViolation(format!(
                    "unknown token byte 0x{:02x}",
                    other
                )))
            }
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// One decoded package. A message is a `Vec<Package>` (§3).
#[derive(Debug, Clone)]
pub enum Package {
    LoginAck(login::LoginAckPackage),
    Capability(capability::CapabilityPackage),
    Eed(error::EedPackage),
    Msg(msg::MsgPackage),
    Language(language::LanguagePackage),
    ParamFmt(fmt::ParamFmtPackage),
    Params(row::ParamsPackage),
    RowFmt(fmt::RowFmtPackage),
    Row(row::RowPackage),
    Done(done::DonePackage),
    DoneProc(done::DonePackage),
    DoneInProc(done::DonePackage),
    Return(control::ReturnPackage),
    Order(control::OrderPackage),
    Control(control::ControlPackage),
    Error(error::ErrorPackage),
    EnvChange(envchange::EnvChangePackage),
    Dynamic(dynamic::DynamicPackage),
    Option(option::OptionPackage),
    CurDeclare(cursor::CurDeclarePackage),
    CurOpen(cursor::CurOpenPackage),
    CurFetch(cursor::CurFetchPackage),
    CurClose(cursor::CurClosePackage),
    CurInfo(cursor::CurInfoPackage),
    Logout(logout::LogoutPackage),
}

impl Package {
    /// The token byte this package encodes under. `Dynamic`/`Dynamic2`
    /// and the narrow/wide `ParamFmt`/`RowFmt` pairs share one Rust type
    /// distinguished by an internal `wide` flag (§4.4), so the token is
    /// derived from that flag rather than the variant alone.
    pub fn token(&self) -> Token {
        match self {
            Package::LoginAck(_) => Token::LoginAck,
            Package::Capability(_) => Token::Capability,
            Package::Eed(_) => Token::Eed,
            Package::Msg(_) => Token::Msg,
            Package::Language(_) => Token::Language,
            Package::ParamFmt(p) => {
                if p.wide {
                    Token::ParamFmt2
                } else {
                    Token::ParamFmt
                }
            }
            Package::Params(_) => Token::Params,
            Package::RowFmt(p) => {
                if p.wide {
                    Token::RowFmt2
                } else {
                    Token::RowFmt
                }
            }
            Package::Row(_) => Token::Row,
            Package::Done(_) => Token::Done,
            Package::DoneProc(_) => Token::DoneProc,
            Package::DoneInProc(_) => Token::DoneInProc,
            Package::Return(_) => Token::Return,
            Package::Order(_) => Token::Order,
            Package::Control(_) => Token::Control,
            Package::Error(_) => Token::Error,
            Package::EnvChange(_) => Token::EnvChange,
            Package::Dynamic(p) => {
                if p.wide {
                    Token::Dynamic2
                } else {
                    Token::Dynamic
                }
            }
            Package::Option(_) => Token::Option,
            Package::CurDeclare(_) => Token::CurDeclare,
            Package::CurOpen(_) => Token::CurOpen,
            Package::CurFetch(_) => Token::CurFetch,
            Package::CurClose(_) => Token::CurClose,
            Package::CurInfo(_) => Token::CurInfo,
            Package::Logout(_) => Token::Logout,
        }
    }
}

/// The last-seen `RowFmt`/`ParamFmt` on a channel, needed to decode the
/// `Row`/`Params` package that follows it (§3's format-then-data
/// invariant). Supplied by the channel multiplexer, which is the only
/// thing that remembers message-to-message state.
#[derive(Default)]
pub struct DecodeContext<'a> {
    pub row_fmt: Option<&'a [FieldFmt]>,
    pub param_fmt: Option<&'a [FieldFmt]>,
}

/// Decodes the package whose token byte was just read off `ch`.
pub fn decode(token: Token, ch: &mut ByteChannel, ctx: &DecodeContext) -> Result<Package> {
    Ok(match token {
        Token::LoginAck => Package::LoginAck(login::LoginAckPackage::decode(ch)?),
        Token::Capability => Package::Capability(capability::CapabilityPackage::decode(ch)?),
        Token::Eed => Package::Eed(error::EedPackage::decode(ch)?),
        Token::Msg => Package::Msg(msg::MsgPackage::decode(ch)?),
        Token::Language => Package::Language(language::LanguagePackage::decode(ch)?),
        Token::ParamFmt => Package::ParamFmt(fmt::ParamFmtPackage::decode(ch, false)?),
        Token::ParamFmt2 => Package::ParamFmt(fmt::ParamFmtPackage::decode(ch, true)?),
        Token::Params => {
            let param_fmt = ctx.param_fmt.ok_or_else(|| {
                crate::error::Error::ProtocolViolation(
                    "Params package with no preceding ParamFmt on this channel".into(),
                )
            })?;
            Package::Params(row::ParamsPackage::decode(ch, param_fmt)?)
        }
        Token::RowFmt => Package::RowFmt(fmt::RowFmtPackage::decode(ch, false)?),
        Token::RowFmt2 => Package::RowFmt(fmt::RowFmtPackage::decode(ch, true)?),
        Token::Row => {
            let row_fmt = ctx.row_fmt.ok_or_else(|| {
                crate::error::Error::ProtocolViolation(
                    "Row package with no preceding RowFmt on this channel".into(),
                )
            })?;
            Package::Row(row::RowPackage::decode(ch, row_fmt)?)
        }
        Token::Done => Package::Done(done::DonePackage::decode(ch)?),
        Token::DoneProc => Package::DoneProc(done::DonePackage::decode(ch)?),
        Token::DoneInProc => Package::DoneInProc(done::DonePackage::decode(ch)?),
        Token::Return => Package::Return(control::ReturnPackage::decode(ch)?),
        Token::Order => Package::Order(control::OrderPackage::decode(ch)?),
        Token::Control => Package::Control(control::ControlPackage::decode(ch)?),
        Token::Error => Package::Error(error::ErrorPackage::decode(ch)?),
        Token::EnvChange => Package::EnvChange(envchange::EnvChangePackage::decode(ch)?),
        Token::Dynamic => Package::Dynamic(dynamic::DynamicPackage::decode(ch, false)?),
        Token::Dynamic2 => Package::Dynamic(dynamic::DynamicPackage::decode(ch, true)?),
        Token::Option => Package::Option(option::OptionPackage::decode(ch)?),
        Token::CurDeclare => Package::CurDeclare(cursor::CurDeclarePackage::decode(ch)?),
        Token::CurOpen => Package::CurOpen(cursor::CurOpenPackage::decode(ch)?),
        Token::CurFetch => Package::CurFetch(cursor::CurFetchPackage::decode(ch)?),
        Token::CurClose => Package::CurClose(cursor::CurClosePackage::decode(ch)?),
        Token::CurInfo => Package::CurInfo(cursor::CurInfoPackage::decode(ch)?),
        Token::Logout => Package::Logout(logout::LogoutPackage::decode(ch)?),
    })
}

/// Writes `pkg`'s token byte followed by its encoded body. `Row` and
/// `Params` additionally need the format they're being checked against
/// (§3's invariant), so they're excluded here -- callers encode those
/// two kinds directly via `RowPackage::encode`/`ParamsPackage::encode`.
pub fn encode(pkg: &Package, ch: &mut ByteChannel) -> Result<()> {
    ch.write_u8(pkg.token().as_u8());
    match pkg {
        Package::LoginAck(_) => {
            return Err(crate::error::Error::ProtocolViolation(
                "encoding a server-originated LoginAck is not supported".into(),
            ))
        }
        Package::Capability(p) => p.encode(ch),
        Package::Eed(p) => p.encode(ch),
        Package::Msg(p) => p.encode(ch),
        Package::Language(p) => p.encode(ch),
        Package::ParamFmt(p) => p.encode(ch),
        Package::RowFmt(p) => p.encode(ch),
        Package::Done(p) | Package::DoneProc(p) | Package::DoneInProc(p) => p.encode(ch),
        Package::Return(p) => p.encode(ch),
        Package::Order(p) => p.encode(ch),
        Package::Control(p) => p.encode(ch),
        Package::Error(p) => p.encode(ch),
        Package::EnvChange(p) => p.encode(ch),
        Package::Dynamic(p) => p.encode(ch),
        Package::Option(p) => p.encode(ch),
        Package::CurDeclare(p) => p.encode(ch),
        Package::CurOpen(p) => p.encode(ch),
        Package::CurFetch(p) => p.encode(ch),
        Package::CurClose(p) => p.encode(ch),
        Package::CurInfo(p) => p.encode(ch),
        Package::Logout(p) => p.encode(ch),
        Package::Params(_) | Package::Row(_) => {
            return Err(crate::error::Error::ProtocolViolation(
                "Row/Params encode via their own encode(ch, fmts) -- use the typed helper directly"
                    .into(),
            ))
        }
    }
    Ok(())
}

/// Reads the one-byte-length-prefixed body used by the "variable"
/// length class (§4.4), returning a fresh `ByteChannel` scoped to just
/// that body so each package decoder can't overrun into the next token.
pub(crate) fn read_variable_body(ch: &mut ByteChannel) -> Result<ByteChannel> {
    let len = ch.read_u8()? as usize;
    let bytes = ch.read_bytes(len)?;
    Ok(ByteChannel::from_bytes(bytes, ch.order()))
}

/// As above, for the two-byte length-prefix class.
pub(crate) fn read_variable_body_u16(ch: &mut ByteChannel) -> Result<ByteChannel> {
    let len = ch.read_u16()? as usize;
    let bytes = ch.read_bytes(len)?;
    Ok(ByteChannel::from_bytes(bytes, ch.order()))
}

/// As above, for the four-byte "long variable" length-prefix class.
pub(crate) fn read_variable_body_u32(ch: &mut ByteChannel) -> Result<ByteChannel> {
    let len = ch.read_u32()? as usize;
    let bytes = ch.read_bytes(len)?;
    Ok(ByteChannel::from_bytes(bytes, ch.order()))
}
