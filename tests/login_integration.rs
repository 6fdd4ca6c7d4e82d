//! End-to-end coverage of `Connection::connect` against a real TCP
//! socket: a fake server accepts the dial, drains the login packet(s)
//! without needing to parse them, and answers with a `LoginAck`/`Done`
//! pair -- exercising the dial -> login -> capability-negotiation path
//! that the in-memory `tokio::io::duplex` unit tests in `login.rs`
//! cannot reach (those drive `login::run` directly against an
//! already-established channel).

use ase_tds::byte_channel::{ByteChannel, Endianness};
use ase_tds::package::done::{DonePackage, DoneStatus, TranState};
use ase_tds::package::Token;
use ase_tds::packet::{Framer, PacketHeader, PacketStatusBit, PacketType};
use ase_tds::{Connection, ConnectionInfo};
use tokio::net::{TcpListener, TcpStream};

fn encode_login_ack(status: u8) -> Vec<u8> {
    let mut body = ByteChannel::new(Endianness::Big);
    body.write_u8(status);
    body.write_bytes(&[5, 0, 0, 0]);
    body.write_u8(3);
    body.write_string("ASE");
    body.write_bytes(&[15, 0, 0, 0]);
    let inner = body.into_inner();
    let mut wire = Vec::new();
    wire.push(Token::LoginAck.as_u8());
    wire.push(inner.len() as u8);
    wire.extend_from_slice(&inner);
    wire
}

fn encode_done_final() -> Vec<u8> {
    let mut ch = ByteChannel::new(Endianness::Big);
    ch.write_u8(Token::Done.as_u8());
    DonePackage {
        status: DoneStatus::empty(),
        tran_state: TranState::Completed,
        count: 0,
    }
    .encode(&mut ch);
    ch.into_inner().to_vec()
}

/// Reads (and discards) packets off `stream` until one carries the
/// end-of-message bit, then writes `reply_body` back as a single
/// `Response` packet.
async fn drain_request_and_reply(stream: TcpStream, reply_body: Vec<u8>) {
    let mut framer = Framer::new(stream);
    loop {
        let (header, _body) = framer.read_packet().await.unwrap();
        if header.status.contains(PacketStatusBit::EndOfMessage) {
            break;
        }
    }
    let header = PacketHeader {
        ptype: PacketType::Response,
        status: PacketStatusBit::EndOfMessage.into(),
        length: (ase_tds::packet::HEADER_LEN + reply_body.len()) as u16,
        channel: 0,
        packet_seq: 0,
        window: 0,
    };
    framer.write_packet(&header, &reply_body).await.unwrap();
    framer.flush().await.unwrap();
}

#[tokio::test]
async fn connect_succeeds_against_a_fake_server_answering_login() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut reply = encode_login_ack(5); // LoginStatus::Succeed
    reply.extend(encode_done_final());

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drain_request_and_reply(stream, reply).await;
    });

    let info = ConnectionInfo::new(addr.ip().to_string(), addr.port(), "sa", "hunter2");
    let conn = Connection::connect(&info).await.unwrap();
    assert!(!conn.is_closed());

    server.await.unwrap();
}

#[tokio::test]
async fn connect_fails_when_server_denies_login() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let reply = encode_login_ack(6); // LoginStatus::Fail

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drain_request_and_reply(stream, reply).await;
    });

    let info = ConnectionInfo::new(addr.ip().to_string(), addr.port(), "sa", "wrong");
    let err = Connection::connect(&info).await.unwrap_err();
    assert!(matches!(err, ase_tds::Error::LoginFailed(_)));

    server.await.unwrap();
}
