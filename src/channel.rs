//! Logical channel multiplexer (§4.3): per-channel outbound/inbound
//! package queues layered over a [`Framer`]. Packages are queued as
//! typed values and only rendered to bytes at flush time, so the
//! end-of-message bit can be set correctly on the last packet of a
//! message regardless of how many packages it carries.
//!
//! This driver opens one channel per connection (§5: "a single
//! connection is not concurrency-safe for overlapping logical
//! requests"), so `Channel` owns its `Framer` outright rather than
//! arbitrating it against sibling channels.

use std::collections::VecDeque;

use crate::byte_channel::ByteChannel;
use crate::cancel::Context;
use crate::error::{Error, Result};
use crate::hooks::HookRegistry;
use crate::packet::{Framer, PacketHeader, PacketStatusBit, PacketType};
use crate::package::{self, done::DonePackage, row, DecodeContext, Package, Token};
use crate::types::FieldFmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// A package queued for send. `Row`/`Params` carry the format they were
/// queued against, since encoding them needs that context and the
/// channel's own last-seen format may have moved on by flush time.
enum Outbound {
    Package(Package),
    Row(row::RowPackage, Vec<FieldFmt>),
    Params(row::ParamsPackage, Vec<FieldFmt>),
    /// Pre-encoded bytes with no token byte of their own -- used for the
    /// `Login` packet body (§4.6), which is dispatched by packet type
    /// rather than a package token.
    Raw(Vec<u8>),
}

/// One logical channel over a TDS connection (§3, §4.3).
pub struct Channel<S> {
    framer: Framer<S>,
    id: u16,
    outbound: VecDeque<Outbound>,
    inbound: VecDeque<Package>,
    recv_buf: ByteChannel,
    hooks: HookRegistry,
    wide: bool,
    header_type: PacketType,
    write_seq: u8,
    row_fmt: Option<Vec<FieldFmt>>,
    param_fmt: Option<Vec<FieldFmt>>,
    closed: bool,
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, id: u16, hooks: HookRegistry) -> Self {
        Channel {
            framer: Framer::new(stream),
            id,
            outbound: VecDeque::new(),
            inbound: VecDeque::new(),
            recv_buf: ByteChannel::new(crate::byte_channel::Endianness::default()),
            hooks,
            wide: false,
            header_type: PacketType::Normal,
            write_seq: 0,
            row_fmt: None,
            param_fmt: None,
            closed: false,
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    /// Whether wide-mode (32-bit length prefixes for the `Dynamic`/
    /// `ParamFmt`/`RowFmt` variant families) is in effect for this
    /// session, negotiated from capabilities (§4.4).
    pub fn wide(&self) -> bool {
        self.wide
    }

    pub fn set_wide(&mut self, wide: bool) {
        self.wide = wide;
    }

    /// Which packet `type` byte outbound messages on this channel use
    /// until changed -- `Login` during the login exchange, `Normal`
    /// afterward (§4.6 step 10).
    pub fn set_header_type(&mut self, ptype: PacketType) {
        self.header_type = ptype;
    }

    pub fn header_type(&self) -> PacketType {
        self.header_type
    }

    pub fn byte_order(&self) -> crate::byte_channel::Endianness {
        self.recv_buf.order()
    }

    pub fn set_byte_order(&mut self, order: crate::byte_channel::Endianness) {
        self.recv_buf.set_order(order);
    }

    /// Appends a package to the outbound queue (§4.3's `QueuePackage`).
    /// Nothing is written to the wire until [`Channel::send_remaining_packets`].
    pub fn queue_package(&mut self, pkg: Package) {
        self.outbound.push_back(Outbound::Package(pkg));
    }

    /// Queues a `Row` against the format it must match (§3's invariant);
    /// checked again at flush time in case the channel's own row format
    /// changed in the meantime.
    pub fn queue_row(&mut self, row: row::RowPackage, fmts: Vec<FieldFmt>) {
        self.outbound.push_back(Outbound::Row(row, fmts));
    }

    pub fn queue_params(&mut self, params: row::ParamsPackage, fmts: Vec<FieldFmt>) {
        self.outbound.push_back(Outbound::Params(params, fmts));
    }

    /// Queues raw, already-encoded bytes ahead of the token-tagged
    /// packages that follow in the same message -- only the `Login`
    /// packet body (§4.6) needs this, since it has no token byte.
    pub fn queue_raw(&mut self, bytes: Vec<u8>) {
        self.outbound.push_back(Outbound::Raw(bytes));
    }

    /// Renders every queued package into one message body and splits it
    /// into packets, setting the end-of-message bit only on the last
    /// one (§4.3, §4.4). `ctx` is polled at each packet boundary (§5);
    /// a caller with no cancellation/deadline needs passes
    /// [`Context::background`].
    pub async fn send_remaining_packets(&mut self, ctx: &Context) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        let mut body = ByteChannel::new(self.recv_buf.order());
        while let Some(item) = self.outbound.pop_front() {
            match item {
                Outbound::Package(pkg) => package::encode(&pkg, &mut body)?,
                Outbound::Row(row, fmts) => {
                    body.write_u8(Token::Row.as_u8());
                    row.encode(&mut body, &fmts)?;
                }
                Outbound::Params(params, fmts) => {
                    body.write_u8(Token::Params.as_u8());
                    params.encode(&mut body, &fmts)?;
                }
                Outbound::Raw(bytes) => body.write_bytes(&bytes),
            }
        }

        let bytes = body.into_inner();
        let chunk_count = self.framer.chunk_count(bytes.len());
        let capacity = self.framer.chunk_capacity();

        for i in 0..chunk_count {
            let start = i * capacity;
            let end = (start + capacity).min(bytes.len());
            let chunk = &bytes[start..end];

            let mut status = crate::packet::PacketStatus::empty();
            if i + 1 == chunk_count {
                status |= PacketStatusBit::EndOfMessage;
            }
            let header = PacketHeader {
                ptype: self.header_type,
                status,
                length: (crate::packet::HEADER_LEN + chunk.len()) as u16,
                channel: self.id,
                packet_seq: self.write_seq,
                window: 0,
            };
            tokio::select! {
                res = self.framer.write_packet(&header, chunk) => res?,
                _ = ctx.stopped() => return Err(ctx.stop_error()),
            }
            self.write_seq = self.write_seq.wrapping_add(1);
        }
        tokio::select! {
            res = self.framer.flush() => res?,
            _ = ctx.stopped() => return Err(ctx.stop_error()),
        }
        Ok(())
    }

    /// Decodes and returns one package from the inbound stream (§4.3's
    /// `NextPackage`). When `wait` is true and no complete package is
    /// buffered, pulls additional packets off the wire until one decodes
    /// or the connection closes; when false, only packets already
    /// buffered are consulted and `NotEnoughBytes` propagates if that's
    /// not enough.
    ///
    /// `ctx` races each pull against cancellation/deadline (§5). If it
    /// fires while a message is in flight, the current request is
    /// canceled cleanly (attention packet, drain to `Done(Attn)`, see
    /// [`Channel::cancel`]) before the stop error is returned, leaving
    /// the channel idle and reusable.
    pub async fn next_package(&mut self, wait: bool, ctx: &Context) -> Result<Package> {
        if let Some(pkg) = self.inbound.pop_front() {
            return Ok(pkg);
        }

        loop {
            match self.try_decode_one()? {
                Some(pkg) => return Ok(self.deliver(pkg)),
                None => {
                    if !wait {
                        return Err(Error::NotEnoughBytes {
                            wanted: 1,
                            available: 0,
                        });
                    }
                    tokio::select! {
                        res = self.pull_packet() => res?,
                        _ = ctx.stopped() => {
                            let stop_err = ctx.stop_error();
                            self.cancel().await?;
                            return Err(stop_err);
                        }
                    }
                }
            }
        }
    }

    /// Reads exactly one more packet off the wire and appends its body
    /// to the receive buffer, updating the framer's MTU hint from the
    /// header's own `window`/`length` is not applicable here (that comes
    /// from EnvChange, handled in `deliver`).
    async fn pull_packet(&mut self) -> Result<()> {
        let (header, bytes) = self.framer.read_packet().await?;
        self.recv_buf.feed(&bytes);
        let _ = header;
        Ok(())
    }

    /// Like [`Channel::next_package`] but never subject to cancellation
    /// -- used by [`Channel::cancel`] itself to drain the server's
    /// response to the attention packet it just sent, where racing
    /// against the very context that triggered the cancel would just
    /// immediately fire again.
    async fn next_package_uncancelable(&mut self) -> Result<Package> {
        if let Some(pkg) = self.inbound.pop_front() {
            return Ok(pkg);
        }
        loop {
            match self.try_decode_one()? {
                Some(pkg) => return Ok(self.deliver(pkg)),
                None => self.pull_packet().await?,
            }
        }
    }

    fn try_decode_one(&mut self) -> Result<Option<Package>> {
        let mut probe = ByteChannel::from_bytes(
            self.recv_buf.clone_remaining(),
            self.recv_buf.order(),
        );
        let token_byte = match probe.read_u8() {
            Ok(b) => b,
            Err(_) => return Ok(None),
        };
        let token = Token::from_u8(token_byte)?;
        let ctx = DecodeContext {
            row_fmt: self.row_fmt.as_deref(),
            param_fmt: self.param_fmt.as_deref(),
        };
        match package::decode(token, &mut probe, &ctx) {
            Ok(pkg) => {
                let consumed = self.recv_buf.len() - probe.len();
                self.recv_buf.advance(consumed);
                Ok(Some(pkg))
            }
            Err(Error::NotEnoughBytes { .. }) => Ok(None),
            Err(other) => Err(other),
        }
    }

    /// Applies side effects (format tracking, hook firing, MTU updates)
    /// before handing a decoded package back to the caller.
    fn deliver(&mut self, pkg: Package) -> Package {
        match &pkg {
            Package::RowFmt(fmt) => self.row_fmt = Some(fmt.fmts.clone()),
            Package::ParamFmt(fmt) => self.param_fmt = Some(fmt.fmts.clone()),
            Package::EnvChange(change) => {
                self.hooks.fire_env_change(change);
                if let Some(mtu) = change.packet_size() {
                    let _ = self.framer.set_mtu(mtu);
                }
            }
            Package::Eed(eed) => self.hooks.fire_eed(eed),
            _ => {}
        }
        pkg
    }

    /// Clears queues and per-message format tracking and returns the
    /// channel to `Normal` header mode (§4.6 step 10).
    pub fn reset(&mut self) {
        self.outbound.clear();
        self.inbound.clear();
        self.row_fmt = None;
        self.param_fmt = None;
        self.header_type = PacketType::Normal;
        self.write_seq = 0;
    }

    /// Cancels the current in-flight message (§5): sends an attention
    /// packet with end-of-message set, then drains packages until the
    /// server's matching `Done` with the `Attn` bit arrives.
    pub async fn cancel(&mut self) -> Result<()> {
        let header = PacketHeader {
            ptype: PacketType::Attention,
            status: PacketStatusBit::EndOfMessage.into(),
            length: crate::packet::HEADER_LEN as u16,
            channel: self.id,
            packet_seq: self.write_seq,
            window: 0,
        };
        self.framer.write_packet(&header, &[]).await?;
        self.framer.flush().await?;
        self.write_seq = self.write_seq.wrapping_add(1);

        loop {
            let pkg = self.next_package_uncancelable().await?;
            if let Package::Done(DonePackage { status, .. }) = &pkg {
                if status.contains(crate::package::done::DoneStatusBit::Attn) {
                    self.reset();
                    return Ok(());
                }
            }
        }
    }

    pub fn mark_closed(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn into_inner(self) -> S {
        self.framer.into_inner()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::byte_channel::Endianness;
    use crate::package::done::{DonePackage, DoneStatus, DoneStatusBit, TranState};
    use crate::package::login::LoginStatus;

    fn test_channel(stream: tokio::io::DuplexStream) -> Channel<tokio::io::DuplexStream> {
        Channel::new(stream, 0, HookRegistry::with_tracing_defaults())
    }

    #[tokio::test]
    async fn queue_then_flush_then_receive_round_trips_done() {
        let (client, mut server) = tokio::io::duplex(8192);
        let mut ch = test_channel(client);
        ch.set_byte_order(Endianness::Big);

        let done = DonePackage {
            status: DoneStatus::empty(),
            tran_state: TranState::Completed,
            count: 0,
        };
        ch.queue_package(Package::Done(done));
        ch.send_remaining_packets(&crate::cancel::Context::background()).await.unwrap();

        // drain what the channel wrote and play it back as if the
        // server had sent it, to exercise next_package on the same channel.
        let mut header_buf = [0u8; crate::packet::HEADER_LEN];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut header_buf)
            .await
            .unwrap();
        let header = PacketHeader::decode(&header_buf).unwrap();
        assert!(header.status.contains(PacketStatusBit::EndOfMessage));
        let mut body = vec![0u8; header.length as usize - crate::packet::HEADER_LEN];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut body)
            .await
            .unwrap();
        assert_eq!(body[0], Token::Done.as_u8());
    }

    #[tokio::test]
    async fn next_package_waits_for_more_packets() {
        let (client, mut server) = tokio::io::duplex(8192);
        let mut ch = test_channel(client);
        ch.set_byte_order(Endianness::Big);

        let mut body = ByteChannel::new(Endianness::Big);
        let ack = Package::LoginAck(crate::package::login::LoginAckPackage {
            status: LoginStatus::Succeed,
            tds_version: [5, 0, 0, 0],
            server_name: "ASE".into(),
            server_version: [15, 0, 0, 0],
        });
        // LoginAck has no encoder (server-originated only); build its
        // wire form by hand to exercise decode through the channel.
        body.write_u8(Token::LoginAck.as_u8());
        let mut ack_body = ByteChannel::new(Endianness::Big);
        ack_body.write_u8(5);
        ack_body.write_bytes(&[5, 0, 0, 0]);
        ack_body.write_u8(3);
        ack_body.write_string("ASE");
        ack_body.write_bytes(&[15, 0, 0, 0]);
        let ack_bytes = ack_body.into_inner();
        body.write_u8(ack_bytes.len() as u8);
        body.write_bytes(&ack_bytes);
        let _ = ack;

        let bytes = body.into_inner();
        let header = PacketHeader {
            ptype: PacketType::Normal,
            status: PacketStatusBit::EndOfMessage.into(),
            length: (crate::packet::HEADER_LEN + bytes.len()) as u16,
            channel: 0,
            packet_seq: 0,
            window: 0,
        };
        tokio::io::AsyncWriteExt::write_all(&mut server, &header.encode())
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut server, &bytes)
            .await
            .unwrap();

        let decoded = ch.next_package(true, &crate::cancel::Context::background()).await.unwrap();
        match decoded {
            Package::LoginAck(ack) => {
                assert_eq!(ack.status, LoginStatus::Succeed);
                assert_eq!(ack.server_name, "ASE");
            }
            other => panic!("expected LoginAck, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reset_clears_format_tracking_and_header_type() {
        let (client, _server) = tokio::io::duplex(1024);
        let mut ch = test_channel(client);
        ch.set_header_type(PacketType::Login);
        ch.row_fmt = Some(vec![FieldFmt::new("id", crate::types::DataType::Int)]);
        ch.reset();
        assert_eq!(ch.header_type(), PacketType::Normal);
        assert!(ch.row_fmt.is_none());
    }

    /// §5/§8's cancellation scenario: a deadline fires while `next_package`
    /// is waiting on a server that never answers, the channel writes an
    /// attention packet and drains to the server's `Done(Attn)`, and is
    /// left idle and reusable for the next request afterward.
    #[tokio::test]
    async fn deadline_sends_attention_and_leaves_channel_reusable() {
        let (client, mut server) = tokio::io::duplex(8192);
        let mut ch = test_channel(client);
        ch.set_byte_order(Endianness::Big);

        let fake_server = tokio::spawn(async move {
            // Read the attention packet the driver sends once its
            // deadline elapses, and answer with Done(Attn).
            let mut header_buf = [0u8; crate::packet::HEADER_LEN];
            tokio::io::AsyncReadExt::read_exact(&mut server, &mut header_buf)
                .await
                .unwrap();
            let header = PacketHeader::decode(&header_buf).unwrap();
            assert_eq!(header.ptype, PacketType::Attention);

            let mut done_body = ByteChannel::new(Endianness::Big);
            done_body.write_u8(Token::Done.as_u8());
            DonePackage {
                status: DoneStatusBit::Attn.into(),
                tran_state: TranState::Completed,
                count: 0,
            }
            .encode(&mut done_body);
            let done_bytes = done_body.into_inner();
            let reply_header = PacketHeader {
                ptype: PacketType::Normal,
                status: PacketStatusBit::EndOfMessage.into(),
                length: (crate::packet::HEADER_LEN + done_bytes.len()) as u16,
                channel: 0,
                packet_seq: 0,
                window: 0,
            };
            tokio::io::AsyncWriteExt::write_all(&mut server, &reply_header.encode())
                .await
                .unwrap();
            tokio::io::AsyncWriteExt::write_all(&mut server, &done_bytes)
                .await
                .unwrap();

            // Next, the reusable channel's follow-up ping: just a final Done.
            let mut ping_done = ByteChannel::new(Endianness::Big);
            ping_done.write_u8(Token::Done.as_u8());
            DonePackage {
                status: DoneStatus::empty(),
                tran_state: TranState::Completed,
                count: 0,
            }
            .encode(&mut ping_done);
            let ping_bytes = ping_done.into_inner();
            let ping_header = PacketHeader {
                ptype: PacketType::Normal,
                status: PacketStatusBit::EndOfMessage.into(),
                length: (crate::packet::HEADER_LEN + ping_bytes.len()) as u16,
                channel: 0,
                packet_seq: 0,
                window: 0,
            };
            tokio::io::AsyncWriteExt::write_all(&mut server, &ping_header.encode())
                .await
                .unwrap();
            tokio::io::AsyncWriteExt::write_all(&mut server, &ping_bytes)
                .await
                .unwrap();
        });

        let ctx = crate::cancel::Context::with_timeout(std::time::Duration::from_millis(20));
        let err = ch.next_package(true, &ctx).await.unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded));
        assert!(!ch.is_closed());

        let reused = ch
            .next_package(true, &crate::cancel::Context::background())
            .await
            .unwrap();
        assert!(matches!(reused, Package::Done(_)));

        fake_server.await.unwrap();
    }
}
