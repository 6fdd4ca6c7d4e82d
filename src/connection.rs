//! The connection facade (§4.7): dials the TCP socket, constructs the
//! first channel, runs the login state machine, and optionally selects
//! a database -- the one entry point everything else in this crate is
//! built on top of.
//!
//! Grounded on `go-ase/conn.go`'s `NewConn`/`Close` (read in full while
//! the example pack was available): dial, then login, then an optional
//! `use <database>`, closing the socket on any failure past the dial.

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::capability::Capabilities;
use crate::channel::Channel;
use crate::config::ConnectionInfo;
use crate::error::{Error, Result};
use crate::hooks::HookRegistry;
use crate::login;
use crate::package::language::LanguagePackage;
use crate::package::Package;

/// A live TDS connection: one TCP socket, one logical channel, post
/// the login handshake (§4.3's single-channel-per-connection design for
/// this driver).
///
/// `channel` is `None` only once [`Connection::close`] has run; every
/// other method requires it and returns `connection-closed` otherwise.
pub struct Connection {
    channel: Option<Channel<TcpStream>>,
    capabilities: Capabilities,
}

impl Connection {
    /// Dials `info.host:info.port`, logs in, and selects `info.database`
    /// if non-empty. The socket is closed before returning on any error
    /// past the point it was established (§4.7).
    pub async fn connect(info: &ConnectionInfo) -> Result<Self> {
        Self::connect_with_hooks(info, HookRegistry::with_tracing_defaults()).await
    }

    pub async fn connect_with_hooks(info: &ConnectionInfo, hooks: HookRegistry) -> Result<Self> {
        let stream = TcpStream::connect((info.host.as_str(), info.port)).await?;
        let mut channel = Channel::new(stream, 0, hooks);

        let login_config = info.login_config();
        let capabilities = match login::run(&mut channel, &login_config).await {
            Ok(caps) => caps,
            Err(err) => {
                let _ = channel.into_inner().shutdown().await;
                return Err(err);
            }
        };

        let mut conn = Connection {
            channel: Some(channel),
            capabilities,
        };

        if !info.database.is_empty() {
            if let Err(err) = conn.use_database(&info.database).await {
                let _ = conn.close().await;
                return Err(err);
            }
        }

        Ok(conn)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn channel_mut(&mut self) -> Result<&mut Channel<TcpStream>> {
        self.channel.as_mut().ok_or(Error::ConnectionClosed)
    }

    async fn use_database(&mut self, database: &str) -> Result<()> {
        let ctx = crate::cancel::Context::background();
        let channel = self.channel_mut()?;
        channel.queue_package(Package::Language(LanguagePackage::new(format!(
            "use {database}"
        ))));
        channel.send_remaining_packets(&ctx).await?;

        loop {
            match channel.next_package(true, &ctx).await? {
                Package::Done(done) if done.is_final() => break,
                Package::Done(_) => continue,
                Package::Error(err) => return Err(Error::Server(err.diagnostic)),
                Package::Eed(_) | Package::EnvChange(_) => continue,
                other => {
                    return Err(Error::ProtocolViolation(format!(
                        "unexpected package while selecting database: {other:?}"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Shuts down the TCP socket. Idempotent: a second call is a no-op
    /// (§4.7); further operations after close fail with
    /// `connection-closed` via [`Connection::channel_mut`].
    pub async fn close(&mut self) -> Result<()> {
        match self.channel.take() {
            Some(channel) => {
                let mut stream = channel.into_inner();
                stream.shutdown().await?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_none()
    }

    /// Wraps an already-established channel directly, bypassing dial and
    /// login -- only useful for driving a connection over a test socket.
    #[cfg(test)]
    pub(crate) fn from_parts(channel: Channel<TcpStream>, capabilities: Capabilities) -> Self {
        Connection {
            channel: Some(channel),
            capabilities,
        }
    }
}
