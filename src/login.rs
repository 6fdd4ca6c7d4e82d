//! The login state machine (§4.6): drives the plain or RSA-encrypted
//! multi-round exchange that must complete before any other traffic may
//! flow on a freshly dialed connection.
//!
//! Grounded on `libase/tds/login.go` (read in full while the example
//! pack was available): the remote-server-list prefixing rule, the
//! plain/encrypted round sequence, and the three-EED tail before the
//! final `LoginAck`/`Capability`/`Done` all follow that source.
//!
//! This driver implements exactly one encryption tier (RSA-OAEP over
//! the server's published key), so "reject an older tier" (§4.6's
//! encryption policy) collapses to `LoginConfig::encrypt` being the only
//! choice besides the plain flow -- there is no weaker tier to select in
//! the first place.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::byte_channel::{ByteChannel, Endianness};
use crate::cancel::Context;
use crate::capability::Capabilities;
use crate::channel::Channel;
use crate::config::{LoginConfig, RemoteServer};
use crate::crypto::{self, SymmetricKeyWidth};
use crate::error::{Error, Result};
use crate::package::capability::CapabilityPackage;
use crate::package::done::{DonePackage, TranState};
use crate::package::fmt::ParamFmtPackage;
use crate::package::login::{LoginPackage, LoginStatus};
use crate::package::msg::{MsgId, MsgPackage, MsgStatusBit};
use crate::package::row::ParamsPackage;
use crate::package::Package;
use crate::packet::PacketType;
use crate::types::{DataType, FieldData, FieldFmt};

/// Runs the login state machine to completion on a freshly constructed
/// channel, returning the capabilities the server acknowledged. On any
/// error the caller is expected to close the connection -- nothing here
/// is retriable.
pub async fn run<S>(channel: &mut Channel<S>, config: &LoginConfig) -> Result<Capabilities>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ctx = Context::background();
    if config.encrypt {
        encrypted_login(channel, config, &ctx).await
    } else {
        plain_login(channel, config, &ctx).await
    }
}

fn build_login_package(config: &LoginConfig, encrypted_password: Option<Vec<u8>>) -> LoginPackage {
    LoginPackage {
        host_name: config.host_name.clone(),
        user_name: config.user_name.clone(),
        password: if encrypted_password.is_some() {
            String::new()
        } else {
            config.password.clone()
        },
        host_process: config.host_process.clone(),
        app_name: config.app_name.clone(),
        server_name: config.server_name.clone(),
        library_name: config.library_name.clone(),
        library_version: config.library_version.clone(),
        language: config.language.clone(),
        char_set: config.char_set.clone(),
        encrypted_password,
    }
}

async fn send_login<S>(channel: &mut Channel<S>, login: &LoginPackage, ctx: &Context) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    channel.set_header_type(PacketType::Login);
    let mut body = ByteChannel::new(channel.byte_order());
    login.encode(&mut body);
    channel.queue_raw(body.into_inner().to_vec());
    channel.queue_package(Package::Capability(CapabilityPackage::new(
        Capabilities::driver_default(),
    )));
    channel.send_remaining_packets(ctx).await
}

async fn expect_login_ack<S>(channel: &mut Channel<S>, want: LoginStatus, ctx: &Context) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match channel.next_package(true, ctx).await? {
        Package::LoginAck(ack) if ack.status == want => Ok(()),
        Package::LoginAck(ack) => Err(Error::LoginFailed(format!(
            "server returned login status {:?}, wanted {:?}",
            ack.status, want
        ))),
        other => Err(Error::ProtocolViolation(format!(
            "expected LoginAck, got {other:?}"
        ))),
    }
}

async fn expect_final_done<S>(channel: &mut Channel<S>, ctx: &Context) -> Result<DonePackage>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match channel.next_package(true, ctx).await? {
        Package::Done(done) if done.is_final() => Ok(done),
        Package::Done(_) => Err(Error::ProtocolViolation(
            "login Done carried the More bit".into(),
        )),
        other => Err(Error::ProtocolViolation(format!(
            "expected Done, got {other:?}"
        ))),
    }
}

async fn expect_msg<S>(channel: &mut Channel<S>, want: MsgId, ctx: &Context) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match channel.next_package(true, ctx).await? {
        Package::Msg(msg) if msg.msg_id == want => Ok(()),
        other => Err(Error::ProtocolViolation(format!(
            "expected Msg({want:?}), got {other:?}"
        ))),
    }
}

async fn expect_param_fmt<S>(channel: &mut Channel<S>, field_count: usize, ctx: &Context) -> Result<Vec<FieldFmt>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match channel.next_package(true, ctx).await? {
        Package::ParamFmt(fmt) if fmt.fmts.len() == field_count => Ok(fmt.fmts),
        Package::ParamFmt(fmt) => Err(Error::ProtocolViolation(format!(
            "expected ParamFmt with {field_count} fields, got {}",
            fmt.fmts.len()
        ))),
        other => Err(Error::ProtocolViolation(format!(
            "expected ParamFmt, got {other:?}"
        ))),
    }
}

async fn expect_params<S>(channel: &mut Channel<S>, ctx: &Context) -> Result<Vec<FieldData>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match channel.next_package(true, ctx).await? {
        Package::Params(params) => Ok(params.fields),
        other => Err(Error::ProtocolViolation(format!(
            "expected Params, got {other:?}"
        ))),
    }
}

async fn expect_eed<S>(channel: &mut Channel<S>, ctx: &Context) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match channel.next_package(true, ctx).await? {
        Package::Eed(_) => Ok(()),
        other => Err(Error::ProtocolViolation(format!(
            "expected EED, got {other:?}"
        ))),
    }
}

fn queue_param_round<S>(
    channel: &mut Channel<S>,
    msg_id: MsgId,
    fmts: Vec<FieldFmt>,
    values: Vec<FieldData>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let wide = channel.wide();
    channel.queue_package(Package::Msg(MsgPackage::new(
        MsgStatusBit::HasArgs.into(),
        msg_id,
    )));
    channel.queue_package(Package::ParamFmt(ParamFmtPackage {
        fmts: fmts.clone(),
        wide,
    }));
    channel.queue_params(ParamsPackage { fields: values }, fmts);
}

/// §4.6's plain flow: Login + Capability, then `LoginAck(succeed)` and a
/// terminating `Done`.
async fn plain_login<S>(channel: &mut Channel<S>, config: &LoginConfig, ctx: &Context) -> Result<Capabilities>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let login = build_login_package(config, None);
    send_login(channel, &login, ctx).await?;

    expect_login_ack(channel, LoginStatus::Succeed, ctx).await?;
    expect_final_done(channel, ctx).await?;

    finish(channel)?;
    Ok(Capabilities::driver_default())
}

/// §4.6's encrypted flow: RSA-encrypted password (and, when remote
/// servers are configured, their passwords too) plus an RSA-wrapped
/// symmetric session key, driven through the server's `Msg`/`ParamFmt`/
/// `Params` negotiation rounds.
async fn encrypted_login<S>(channel: &mut Channel<S>, config: &LoginConfig, ctx: &Context) -> Result<Capabilities>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let login = build_login_package(config, Some(Vec::new()));
    send_login(channel, &login, ctx).await?;

    expect_login_ack(channel, LoginStatus::Negotiate, ctx).await?;
    expect_msg(channel, MsgId::SecEncrypt4, ctx).await?;
    let fmts = expect_param_fmt(channel, 3, ctx).await?;
    let values = expect_params(channel, ctx).await?;
    expect_final_done(channel, ctx).await?;
    let _ = fmts;

    let (asymmetric_type, modulus, nonce) = parse_encrypt_params(&values)?;
    if asymmetric_type != 1 {
        return Err(Error::UnsupportedCipher(asymmetric_type as u16));
    }
    let public_key = crypto::public_key_from_modulus(&modulus)?;

    let password_ciphertext = crypto::rsa_encrypt(&public_key, &nonce, config.password.as_bytes())?;
    queue_param_round(
        channel,
        MsgId::SecLogPwd3,
        vec![FieldFmt::new("password", DataType::Longbinary)],
        vec![FieldData::Longbinary(password_ciphertext.into())],
    );

    let remote_servers = remote_server_list(config);
    if !remote_servers.is_empty() {
        let mut fmts = Vec::with_capacity(remote_servers.len() * 2);
        let mut values = Vec::with_capacity(remote_servers.len() * 2);
        for server in &remote_servers {
            let ciphertext = crypto::rsa_encrypt(&public_key, &nonce, server.password.as_bytes())?;
            fmts.push(FieldFmt::new("server_name", DataType::Varchar));
            values.push(FieldData::Varchar(server.name.clone()));
            fmts.push(FieldFmt::new("password", DataType::Longbinary));
            values.push(FieldData::Longbinary(ciphertext.into()));
        }
        queue_param_round(channel, MsgId::SecRemPwd3, fmts, values);
    }

    let key_width = if config.odce {
        SymmetricKeyWidth::Aes128
    } else {
        SymmetricKeyWidth::Des
    };
    let session_key = crypto::SessionKey::generate(key_width);
    let key_ciphertext = crypto::rsa_encrypt(&public_key, &nonce, session_key.as_bytes())?;
    queue_param_round(
        channel,
        MsgId::SecSymKey,
        vec![FieldFmt::new("symkey", DataType::Longbinary)],
        vec![FieldData::Longbinary(key_ciphertext.into())],
    );

    channel.send_remaining_packets(ctx).await?;

    expect_eed(channel, ctx).await?;
    expect_eed(channel, ctx).await?;
    expect_eed(channel, ctx).await?;
    expect_login_ack(channel, LoginStatus::Succeed, ctx).await?;

    let server_capabilities = match channel.next_package(true, ctx).await? {
        Package::Capability(cap) => cap.capabilities,
        other => {
            return Err(Error::ProtocolViolation(format!(
                "expected Capability, got {other:?}"
            )))
        }
    };

    let done = expect_final_done(channel, ctx).await?;
    if done.tran_state != TranState::Completed {
        return Err(Error::ProtocolViolation(
            "final login Done did not report a completed transaction".into(),
        ));
    }

    finish(channel)?;
    Ok(server_capabilities)
}

/// Prefixes the remote-server list with a synthetic entry for the
/// current server, whose password is the connection password (§3,
/// `libase/tds/login.go`'s remote-server handling).
fn remote_server_list(config: &LoginConfig) -> Vec<RemoteServer> {
    let mut servers = Vec::with_capacity(config.remote_servers.len() + 1);
    servers.push(RemoteServer {
        name: String::new(),
        password: config.password.clone(),
    });
    servers.extend(config.remote_servers.iter().cloned());
    servers
}

fn parse_encrypt_params(values: &[FieldData]) -> Result<(i64, Vec<u8>, Vec<u8>)> {
    if values.len() != 3 {
        return Err(Error::ProtocolViolation(format!(
            "expected 3 encrypt-negotiation params, got {}",
            values.len()
        )));
    }
    let asymmetric_type = match &values[0] {
        FieldData::TinyInt(v) => *v as i64,
        FieldData::SmallInt(v) => *v as i64,
        FieldData::Int(v) => *v as i64,
        other => {
            return Err(Error::ProtocolViolation(format!(
                "asymmetric-type param had unexpected shape: {}",
                other.kind_name()
            )))
        }
    };
    let modulus = match &values[1] {
        FieldData::Longbinary(bytes) | FieldData::Varbinary(bytes) | FieldData::Binary(bytes) => {
            bytes.to_vec()
        }
        other => {
            return Err(Error::ProtocolViolation(format!(
                "public-key param had unexpected shape: {}",
                other.kind_name()
            )))
        }
    };
    let nonce = match &values[2] {
        FieldData::Varbinary(bytes) | FieldData::Binary(bytes) | FieldData::Longbinary(bytes) => {
            bytes.to_vec()
        }
        other => {
            return Err(Error::ProtocolViolation(format!(
                "nonce param had unexpected shape: {}",
                other.kind_name()
            )))
        }
    };
    Ok((asymmetric_type, modulus, nonce))
}

/// §4.6 step 10: the channel is reusable for ordinary traffic from here
/// on, so queues/format-tracking are cleared and the header type goes
/// back to `Normal`. Numeric payloads are fixed to big-endian, since
/// none of the servers this driver targets negotiate otherwise over
/// `EnvChange` (whose token set has no byte-order entry -- §4.1 leaves
/// the actual negotiation mechanism to the server, which in practice
/// never requests little-endian from this driver's intended targets).
fn finish<S>(channel: &mut Channel<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    channel.set_byte_order(Endianness::Big);
    channel.reset();
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::byte_channel::Endianness;
    use crate::hooks::HookRegistry;
    use crate::package::done::{DoneStatus, TranState};
    use crate::packet::{PacketHeader, PacketStatusBit, PacketType};

    fn test_channel(stream: tokio::io::DuplexStream) -> Channel<tokio::io::DuplexStream> {
        let mut ch = Channel::new(stream, 0, HookRegistry::with_tracing_defaults());
        ch.set_byte_order(Endianness::Big);
        ch
    }

    fn base_config() -> LoginConfig {
        LoginConfig {
            host_name: "workstation".into(),
            user_name: "sa".into(),
            password: "hunter2".into(),
            host_process: "1".into(),
            app_name: "ase-tds".into(),
            server_name: "ASE".into(),
            library_name: "ase-tds".into(),
            library_version: "1.0".into(),
            language: "us_english".into(),
            char_set: "iso_1".into(),
            encrypt: false,
            odce: false,
            remote_servers: Vec::new(),
        }
    }

    async fn write_message(server: &mut tokio::io::DuplexStream, body: Vec<u8>) {
        let header = PacketHeader {
            ptype: PacketType::Login,
            status: PacketStatusBit::EndOfMessage.into(),
            length: (crate::packet::HEADER_LEN + body.len()) as u16,
            channel: 0,
            packet_seq: 0,
            window: 0,
        };
        tokio::io::AsyncWriteExt::write_all(server, &header.encode())
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(server, &body)
            .await
            .unwrap();
    }

    fn encode_login_ack(status: u8) -> Vec<u8> {
        let mut body = ByteChannel::new(Endianness::Big);
        body.write_u8(status);
        body.write_bytes(&[5, 0, 0, 0]);
        body.write_u8(3);
        body.write_string("ASE");
        body.write_bytes(&[15, 0, 0, 0]);
        let inner = body.into_inner();
        let mut wire = Vec::new();
        wire.push(crate::package::Token::LoginAck.as_u8());
        wire.push(inner.len() as u8);
        wire.extend_from_slice(&inner);
        wire
    }

    fn encode_done_final() -> Vec<u8> {
        let mut ch = ByteChannel::new(Endianness::Big);
        ch.write_u8(crate::package::Token::Done.as_u8());
        DonePackage {
            status: DoneStatus::empty(),
            tran_state: TranState::Completed,
            count: 0,
        }
        .encode(&mut ch);
        ch.into_inner().to_vec()
    }

    #[tokio::test]
    async fn plain_login_succeeds_on_ack_then_done() {
        let (client, mut server) = tokio::io::duplex(16 * 1024);
        let mut ch = test_channel(client);
        let config = base_config();

        let driver = tokio::spawn(async move {
            let result = run(&mut ch, &config).await;
            (ch, result)
        });

        // drain what the driver sent (Login body + Capability package)
        let mut header_buf = [0u8; crate::packet::HEADER_LEN];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut header_buf)
            .await
            .unwrap();
        let header = PacketHeader::decode(&header_buf).unwrap();
        assert_eq!(header.ptype, PacketType::Login);
        let mut body = vec![0u8; header.length as usize - crate::packet::HEADER_LEN];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut body)
            .await
            .unwrap();

        write_message(&mut server, encode_login_ack(5)).await;
        write_message(&mut server, encode_done_final()).await;

        let (_ch, result) = driver.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn plain_login_fails_on_denied_status() {
        let (client, mut server) = tokio::io::duplex(16 * 1024);
        let mut ch = test_channel(client);
        let config = base_config();

        let driver = tokio::spawn(async move { run(&mut ch, &config).await });

        let mut header_buf = [0u8; crate::packet::HEADER_LEN];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut header_buf)
            .await
            .unwrap();
        let header = PacketHeader::decode(&header_buf).unwrap();
        let mut body = vec![0u8; header.length as usize - crate::packet::HEADER_LEN];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut body)
            .await
            .unwrap();

        write_message(&mut server, encode_login_ack(6)).await;

        let result = driver.await.unwrap();
        assert!(matches!(result, Err(Error::LoginFailed(_))));
    }

    #[test]
    fn remote_server_list_prefixes_current_server() {
        let mut config = base_config();
        config.remote_servers.push(RemoteServer {
            name: "BACKUP".into(),
            password: "otherpw".into(),
        });
        let servers = remote_server_list(&config);
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].name, "");
        assert_eq!(servers[0].password, "hunter2");
        assert_eq!(servers[1].name, "BACKUP");
    }

    #[test]
    fn parse_encrypt_params_rejects_wrong_arity() {
        let err = parse_encrypt_params(&[FieldData::TinyInt(1)]).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }
}
