//! Packet framing: splitting a message into fixed-size packets on write,
//! and reassembling packets sharing `(type, channel)` into a message on
//! read (§4.2).

use bytes::{Bytes, BytesMut};
use enumflags2::{bitflags, BitFlags};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{Error, Result};

pub const HEADER_LEN: usize = 8;
pub const DEFAULT_MTU: usize = 512;
pub const MAX_MTU: usize = 16 * 1024;

/// Packet buffer type, the TDS wire's `type` header byte. Values follow
/// the historical TDS 5.0 buffer-type assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Language = 0x01,
    Login = 0x02,
    Rpc = 0x03,
    Response = 0x04,
    Attention = 0x06,
    Bulk = 0x07,
    Setup = 0x08,
    Close = 0x09,
    Error = 0x0a,
    ProtocolAck = 0x0b,
    Echo = 0x0c,
    Logout = 0x0d,
    EndParam = 0x0e,
    Normal = 0x0f,
}

impl PacketType {
    pub fn from_u8(value: u8) -> Result<Self> {
        use PacketType::*;
        Ok(match value {
            0x01 => Language,
            0x02 => Login,
            0x03 => Rpc,
            0x04 => Response,
            0x06 => Attention,
            0x07 => Bulk,
            0x08 => Setup,
            0x09 => Close,
            0x0a => Error,
            0x0b => ProtocolAck,
            0x0c => Echo,
            0x0d => Logout,
            0x0e => EndParam,
            0x0f => Normal,
            other => {
                return Err(Error::ProtocolViolation(format!(
                    "unknown packet type 0x{:02x}",
                    other
                )))
            }
        })
    }
}

/// Packet status bits. More than one bit may be set at once (§4.4's
/// bitmask rendering rule applies here too).
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketStatusBit {
    EndOfMessage = 0x01,
    AttentionAck = 0x02,
    Attention = 0x04,
    Event = 0x08,
    Seal = 0x10,
    Encrypt = 0x20,
}

pub type PacketStatus = BitFlags<PacketStatusBit>;

/// The 8-byte packet header (§3).
#[derive(Debug, Clone, Copy)]
pub struct PacketHeader {
    pub ptype: PacketType,
    pub status: PacketStatus,
    pub length: u16,
    pub channel: u16,
    pub packet_seq: u8,
    pub window: u8,
}

impl PacketHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = self.ptype as u8;
        buf[1] = self.status.bits();
        buf[2..4].copy_from_slice(&self.length.to_be_bytes());
        buf[4..6].copy_from_slice(&self.channel.to_be_bytes());
        buf[6] = self.packet_seq;
        buf[7] = self.window;
        buf
    }

    pub fn decode(buf: &[u8; HEADER_LEN]) -> Result<Self> {
        let ptype = PacketType::from_u8(buf[0])?;
        let status = PacketStatus::from_bits(buf[1])
            .map_err(|_| Error::ProtocolViolation(format!("invalid status bits 0x{:02x}", buf[1])))?;
        let length = u16::from_be_bytes([buf[2], buf[3]]);
        let channel = u16::from_be_bytes([buf[4], buf[5]]);
        Ok(PacketHeader {
            ptype,
            status,
            length,
            channel,
            packet_seq: buf[6],
            window: buf[7],
        })
    }
}

/// Splits outbound message bodies into packets and reassembles inbound
/// packets into messages, over a single underlying stream.
///
/// The framer does not arbitrate *who* may write when -- that's the
/// channel multiplexer's job (§4.3) -- it only knows how to turn bytes
/// into packets and back.
pub struct Framer<S> {
    stream: S,
    mtu: usize,
}

impl<S> Framer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Framer {
            stream,
            mtu: DEFAULT_MTU,
        }
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Applied when an EnvChange(packet size) notification arrives.
    pub fn set_mtu(&mut self, mtu: usize) -> Result<()> {
        if !(HEADER_LEN..=MAX_MTU).contains(&mtu) {
            return Err(Error::ProtocolViolation(format!(
                "requested mtu {} out of range",
                mtu
            )));
        }
        self.mtu = mtu;
        Ok(())
    }

    /// Reads exactly one packet off the wire.
    pub async fn read_packet(&mut self) -> Result<(PacketHeader, Bytes)> {
        let mut header_buf = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut header_buf).await?;
        let header = PacketHeader::decode(&header_buf)?;

        if (header.length as usize) < HEADER_LEN || header.length as usize > MAX_MTU {
            return Err(Error::ProtocolViolation(format!(
                "malformed packet length {}",
                header.length
            )));
        }

        let body_len = header.length as usize - HEADER_LEN;
        let mut body = BytesMut::zeroed(body_len);
        self.stream.read_exact(&mut body).await?;

        trace!(
            ptype = ?header.ptype,
            channel = header.channel,
            len = header.length,
            eom = header.status.contains(PacketStatusBit::EndOfMessage),
            "{}",
            pretty_hex::pretty_hex(&body)
        );

        Ok((header, body.freeze()))
    }

    /// Writes a single already-sized packet.
    pub async fn write_packet(&mut self, header: &PacketHeader, body: &[u8]) -> Result<()> {
        debug_assert_eq!(header.length as usize, HEADER_LEN + body.len());
        self.stream.write_all(&header.encode()).await?;
        self.stream.write_all(body).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.stream.flush().await?;
        Ok(())
    }

    /// Number of `mtu`-sized chunks a body of `body_len` splits into
    /// (always at least one, even for an empty body, so that an empty
    /// message still sends one end-of-message packet).
    pub fn chunk_count(&self, body_len: usize) -> usize {
        let capacity = self.mtu - HEADER_LEN;
        if body_len == 0 {
            1
        } else {
            (body_len + capacity - 1) / capacity
        }
    }

    pub fn chunk_capacity(&self) -> usize {
        self.mtu - HEADER_LEN
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}
