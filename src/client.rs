//! The consumer-facing surface (§6): `Client`, `Stmt`, `Rows`. A thin
//! layer over [`Connection`]/[`Channel`] that resolves whether a call is
//! a plain language request or a dynamic-statement round depending on
//! whether arguments were supplied, and otherwise does nothing the
//! package/channel layer doesn't already do.
//!
//! Shaped like a conventional query/exec/prepare client, reworked
//! around this driver's dynamic-statement lifecycle (`dynamic.rs`)
//! rather than per-query RPC handles.

use std::collections::HashMap;

use tokio::net::TcpStream;

use crate::cancel::Context;
use crate::capability::Capabilities;
use crate::channel::Channel;
use crate::config::ConnectionInfo;
use crate::connection::Connection;
use crate::dynamic::DynamicStatements;
use crate::error::{Error, Result};
use crate::package::dynamic::{DynamicOperation, DynamicPackage, DynamicStatus, DynamicStatusType};
use crate::package::fmt::ParamFmtPackage;
use crate::package::language::LanguagePackage;
use crate::package::row::ParamsPackage;
use crate::package::Package;
use crate::types::{convert, DataType, FieldData, FieldFmt};

/// The outcome of an `exec`/`direct_exec` call once its `Rows` has been
/// fully drained: the row count(s) carried by the closing `Done`, and
/// the last `Return` status seen, if the call went through a stored
/// procedure.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub return_status: Option<i32>,
}

/// A streamed result set (§6's `rows.next`/`rows.columns`/`rows.close`).
/// Borrows the connection's one channel, so only one `Rows` (or any
/// other in-flight request) can exist at a time -- the same
/// single-request-in-flight contract `Channel` already enforces.
pub struct Rows<'a> {
    channel: &'a mut Channel<TcpStream>,
    ctx: Context,
    fmts: Vec<FieldFmt>,
    finished: bool,
    result: ExecResult,
}

impl<'a> Rows<'a> {
    fn new(channel: &'a mut Channel<TcpStream>, ctx: Context) -> Self {
        Rows {
            channel,
            ctx,
            fmts: Vec::new(),
            finished: false,
            result: ExecResult::default(),
        }
    }

    pub fn columns(&self) -> Vec<String> {
        self.fmts.iter().map(|fmt| fmt.column_name.clone()).collect()
    }

    pub fn result(&self) -> ExecResult {
        self.result
    }

    /// Pulls the next row, or `None` once the message's final `Done` has
    /// been seen. Intermediate format/control/diagnostic packages are
    /// consumed transparently.
    pub async fn next(&mut self) -> Result<Option<Vec<FieldData>>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            match self.channel.next_package(true, &self.ctx).await? {
                Package::RowFmt(fmt) => {
                    self.fmts = fmt.fmts;
                    continue;
                }
                Package::Row(row) => return Ok(Some(row.fields)),
                Package::Return(ret) => {
                    self.result.return_status = Some(ret.status);
                    continue;
                }
                Package::Order(_) | Package::Control(_) => continue,
                Package::Done(done) | Package::DoneProc(done) | Package::DoneInProc(done) => {
                    self.result.rows_affected += done.count as u64;
                    if done.is_final() {
                        self.finished = true;
                        return Ok(None);
                    }
                    continue;
                }
                Package::Eed(_) | Package::EnvChange(_) => continue,
                Package::Error(err) => return Err(Error::Server(err.diagnostic)),
                other => {
                    return Err(Error::ProtocolViolation(format!(
                        "unexpected package in result set: {other:?}"
                    )))
                }
            }
        }
    }

    /// Drains any remaining rows so the channel is ready for the next
    /// request without the caller having to loop `next` themselves.
    pub async fn close(mut self) -> Result<()> {
        while self.next().await?.is_some() {}
        Ok(())
    }
}

/// A dynamic statement prepared against a [`Client`]. Holds only the
/// driver-assigned id; every operation on it is a method on `Client`
/// taking the `Stmt` by reference or value, since the statement has no
/// channel of its own to carry.
#[derive(Debug, Clone)]
pub struct Stmt {
    id: u32,
    cached: bool,
}

impl Stmt {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Executes this prepared statement with positional arguments bound
    /// by position against the statement's declared input format, if the
    /// server sent one during prepare.
    pub async fn direct_exec<'a>(
        &self,
        client: &'a mut Client,
        ctx: &Context,
        args: &[FieldData],
    ) -> Result<Rows<'a>> {
        client.exec_stmt_positional(self.id, ctx, args).await
    }

    /// Deallocates this statement server-side unless it was prepared
    /// with `cache: true`, in which case it stays prepared for reuse and
    /// this is a local no-op.
    pub async fn close(self, client: &mut Client) -> Result<()> {
        client.close_stmt(self.id, self.cached).await
    }
}

/// The consumer-facing client (§6): one connection, its dynamic
/// statement registry, and a sql-text-keyed cache of the statements
/// `exec` has implicitly prepared.
pub struct Client {
    conn: Connection,
    statements: DynamicStatements,
    stmt_cache: HashMap<String, u32>,
}

impl Client {
    pub async fn connect(info: &ConnectionInfo) -> Result<Self> {
        let conn = Connection::connect(info).await?;
        Ok(Client {
            conn,
            statements: DynamicStatements::new(),
            stmt_cache: HashMap::new(),
        })
    }

    pub fn capabilities(&self) -> Capabilities {
        self.conn.capabilities()
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    pub async fn close(&mut self) -> Result<()> {
        self.conn.close().await
    }

    /// `select 'ping'`, drained to completion. Any transport-level
    /// failure (as opposed to a server error reply) is reported as
    /// [`Error::BadConnection`] regardless of its original shape, so a
    /// pool can use `ping` as its sole health check.
    pub async fn ping(&mut self, ctx: &Context) -> Result<()> {
        let outcome: Result<()> = async {
            let mut rows = self.exec_language("select 'ping'", ctx).await?;
            while rows.next().await?.is_some() {}
            Ok(())
        }
        .await;
        outcome.map_err(|err| {
            if err.is_bad_connection() {
                Error::BadConnection(err.to_string())
            } else {
                err
            }
        })
    }

    /// Runs `sql` as a plain language request if `named_args` is empty,
    /// or as a dynamic-statement exec otherwise (§6). A statement bound
    /// by `exec` is implicitly prepared and cached by its sql text the
    /// first time it's seen.
    pub async fn exec<'a>(
        &'a mut self,
        ctx: &Context,
        sql: &str,
        named_args: &[(&str, FieldData)],
    ) -> Result<Rows<'a>> {
        if named_args.is_empty() {
            self.exec_language(sql, ctx).await
        } else {
            let id = self.prepare_cached(sql, ctx).await?;
            let (fmts, values) = self.bind_named_args(id, named_args).await?;
            self.exec_dynamic(id, ctx, fmts, values).await
        }
    }

    /// Runs `sql` without going through statement caching: a plain
    /// language request when `args` is empty, or a one-shot
    /// `ExecImmediate` dynamic round when it's not. The ephemeral
    /// statement id is never cached and is not explicitly deallocated,
    /// matching `ExecImmediate`'s prepare-execute-forget semantics.
    pub async fn direct_exec<'a>(
        &'a mut self,
        ctx: &Context,
        sql: &str,
        args: &[FieldData],
    ) -> Result<Rows<'a>> {
        if args.is_empty() {
            return self.exec_language(sql, ctx).await;
        }

        let id = self.statements.alloc_id();
        let fmts: Vec<FieldFmt> = args
            .iter()
            .enumerate()
            .map(|(i, value)| FieldFmt::new(format!("p{i}"), data_type_for_value(value)))
            .collect();
        let values = args.to_vec();

        let channel = self.conn.channel_mut()?;
        let wide = channel.wide();
        channel.queue_package(Package::Dynamic(DynamicPackage {
            operation: DynamicOperation::ExecImmediate.into(),
            status: DynamicStatus::HasArgs.into(),
            id,
            stmt: sql.to_string(),
            wide,
        }));
        channel.queue_package(Package::ParamFmt(ParamFmtPackage {
            fmts: fmts.clone(),
            wide,
        }));
        channel.queue_params(ParamsPackage { fields: values }, fmts);
        channel.send_remaining_packets(ctx).await?;
        Ok(Rows::new(channel, ctx.clone()))
    }

    /// Prepares `sql` under `name`, reusing an already-cached id when
    /// `cache` is true and `name` has been seen before. `cache: false`
    /// always prepares fresh and deallocates on [`Stmt::close`].
    pub async fn new_stmt(&mut self, ctx: &Context, name: &str, sql: &str, cache: bool) -> Result<Stmt> {
        if cache {
            if let Some(&id) = self.stmt_cache.get(name) {
                return Ok(Stmt { id, cached: true });
            }
        }
        let id = self.statements.register(sql).await;
        self.send_prepare(id, sql, ctx).await?;
        if cache {
            self.stmt_cache.insert(name.to_string(), id);
        }
        Ok(Stmt { id, cached: cache })
    }

    async fn exec_language(&mut self, sql: &str, ctx: &Context) -> Result<Rows<'_>> {
        let channel = self.conn.channel_mut()?;
        channel.queue_package(Package::Language(LanguagePackage::new(sql)));
        channel.send_remaining_packets(ctx).await?;
        Ok(Rows::new(channel, ctx.clone()))
    }

    async fn prepare_cached(&mut self, sql: &str, ctx: &Context) -> Result<u32> {
        if let Some(&id) = self.stmt_cache.get(sql) {
            return Ok(id);
        }
        let id = self.statements.register(sql).await;
        self.send_prepare(id, sql, ctx).await?;
        self.stmt_cache.insert(sql.to_string(), id);
        Ok(id)
    }

    /// Sends `Dynamic(Prepare)` and drains the server's `Ack`/format/
    /// `Done` response, recording any `ParamFmt`/`RowFmt` it sent so
    /// later binds can convert against the statement's declared types.
    async fn send_prepare(&mut self, id: u32, sql: &str, ctx: &Context) -> Result<()> {
        let channel = self.conn.channel_mut()?;
        let wide = channel.wide();
        channel.queue_package(Package::Dynamic(DynamicPackage {
            operation: DynamicOperation::Prepare.into(),
            status: DynamicStatusType::empty(),
            id,
            stmt: sql.to_string(),
            wide,
        }));
        channel.send_remaining_packets(ctx).await?;

        loop {
            match channel.next_package(true, ctx).await? {
                Package::Dynamic(ack) if ack.operation.contains(DynamicOperation::Ack) => continue,
                Package::ParamFmt(fmt) => {
                    self.statements.set_formats(id, Some(fmt.fmts), None).await?;
                }
                Package::RowFmt(fmt) => {
                    self.statements.set_formats(id, None, Some(fmt.fmts)).await?;
                }
                Package::Done(done) if done.is_final() => break,
                Package::Done(_) => continue,
                Package::Eed(_) | Package::EnvChange(_) => continue,
                Package::Error(err) => return Err(Error::Server(err.diagnostic)),
                other => {
                    return Err(Error::ProtocolViolation(format!(
                        "unexpected package while preparing statement: {other:?}"
                    )))
                }
            }
        }
        Ok(())
    }

    async fn exec_stmt_positional(
        &mut self,
        id: u32,
        ctx: &Context,
        args: &[FieldData],
    ) -> Result<Rows<'_>> {
        self.statements.mark_executing(id).await?;
        let declared = self.statements.get(id).await?.input_fmt;
        let mut fmts = Vec::with_capacity(args.len());
        let mut values = Vec::with_capacity(args.len());
        for (i, value) in args.iter().enumerate() {
            match declared.as_ref().and_then(|fs| fs.get(i)) {
                Some(fmt) => {
                    values.push(convert(value, fmt.data_type)?);
                    fmts.push(fmt.clone());
                }
                None => {
                    fmts.push(FieldFmt::new(format!("p{i}"), data_type_for_value(value)));
                    values.push(value.clone());
                }
            }
        }
        self.exec_dynamic(id, ctx, fmts, values).await
    }

    async fn bind_named_args(
        &self,
        id: u32,
        named_args: &[(&str, FieldData)],
    ) -> Result<(Vec<FieldFmt>, Vec<FieldData>)> {
        let declared = self.statements.get(id).await?.input_fmt;
        let mut fmts = Vec::with_capacity(named_args.len());
        let mut values = Vec::with_capacity(named_args.len());
        for (name, value) in named_args {
            let target = declared
                .as_ref()
                .and_then(|fs| fs.iter().find(|fmt| fmt.column_name == *name));
            match target {
                Some(fmt) => {
                    values.push(convert(value, fmt.data_type)?);
                    fmts.push(fmt.clone());
                }
                None => {
                    fmts.push(FieldFmt::new(*name, data_type_for_value(value)));
                    values.push(value.clone());
                }
            }
        }
        Ok((fmts, values))
    }

    async fn exec_dynamic(
        &mut self,
        id: u32,
        ctx: &Context,
        fmts: Vec<FieldFmt>,
        values: Vec<FieldData>,
    ) -> Result<Rows<'_>> {
        self.statements.mark_executing(id).await?;
        let has_args = !fmts.is_empty();
        let channel = self.conn.channel_mut()?;
        let wide = channel.wide();
        channel.queue_package(Package::Dynamic(DynamicPackage {
            operation: DynamicOperation::Exec.into(),
            status: if has_args {
                DynamicStatus::HasArgs.into()
            } else {
                DynamicStatusType::empty()
            },
            id,
            stmt: String::new(),
            wide,
        }));
        if has_args {
            channel.queue_package(Package::ParamFmt(ParamFmtPackage {
                fmts: fmts.clone(),
                wide,
            }));
            channel.queue_params(ParamsPackage { fields: values }, fmts);
        }
        channel.send_remaining_packets(ctx).await?;
        Ok(Rows::new(channel, ctx.clone()))
    }

    /// Deallocation has no `ctx` in the consumer surface (§6's
    /// `stmt.close()` takes none), so the drain below runs against a
    /// background context.
    async fn close_stmt(&mut self, id: u32, cached: bool) -> Result<()> {
        if !cached {
            self.send_dealloc(id).await?;
        }
        let _ = self.statements.deallocate(id).await;
        Ok(())
    }

    async fn send_dealloc(&mut self, id: u32) -> Result<()> {
        let ctx = Context::background();
        let channel = self.conn.channel_mut()?;
        let wide = channel.wide();
        channel.queue_package(Package::Dynamic(DynamicPackage {
            operation: DynamicOperation::Dealloc.into(),
            status: DynamicStatusType::empty(),
            id,
            stmt: String::new(),
            wide,
        }));
        channel.send_remaining_packets(&ctx).await?;

        loop {
            match channel.next_package(true, &ctx).await? {
                Package::Done(done) if done.is_final() => break,
                Package::Done(_) => continue,
                Package::Eed(_) | Package::EnvChange(_) | Package::Dynamic(_) => continue,
                Package::Error(err) => return Err(Error::Server(err.diagnostic)),
                other => {
                    return Err(Error::ProtocolViolation(format!(
                        "unexpected package during dealloc: {other:?}"
                    )))
                }
            }
        }
        Ok(())
    }

    #[cfg(test)]
    fn from_parts(conn: Connection) -> Self {
        Client {
            conn,
            statements: DynamicStatements::new(),
            stmt_cache: HashMap::new(),
        }
    }
}

/// The identity datatype for a caller-supplied value with no declared
/// target format to convert against (an ad hoc `direct_exec` bind, or a
/// named arg the prepared statement's `ParamFmt` didn't mention). `Null`
/// has no datatype of its own, so it's bound as the nullable integer
/// family; a server expecting a different column type will reject it,
/// which is the caller's bug to fix by routing the bind through a
/// prepared statement instead.
fn data_type_for_value(value: &FieldData) -> DataType {
    match value {
        FieldData::Null => DataType::IntN,
        FieldData::TinyInt(_) => DataType::TinyInt,
        FieldData::SmallInt(_) => DataType::SmallInt,
        FieldData::Int(_) => DataType::Int,
        FieldData::BigInt(_) => DataType::BigInt,
        FieldData::Float4(_) => DataType::Float4,
        FieldData::Float8(_) => DataType::Float8,
        FieldData::Bit(_) => DataType::Bit,
        FieldData::Char(_) => DataType::Char,
        FieldData::Varchar(_) => DataType::Varchar,
        FieldData::Binary(_) => DataType::Binary,
        FieldData::Varbinary(_) => DataType::Varbinary,
        FieldData::Longchar(_) => DataType::Longchar,
        FieldData::Longbinary(_) => DataType::Longbinary,
        FieldData::Decimal(_) => DataType::Decimal,
        FieldData::Money(_) => DataType::Money,
        FieldData::DateTime(_) => DataType::DateTime,
        FieldData::SmallDateTime(_) => DataType::SmallDateTime,
        FieldData::Text { .. } => DataType::Text,
        FieldData::Image { .. } => DataType::Image,
        FieldData::Unitext(_) => DataType::Unitext,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::byte_channel::{ByteChannel, Endianness};
    use crate::hooks::HookRegistry;
    use crate::package::done::{DonePackage, DoneStatus, TranState};
    use crate::package::fmt::RowFmtPackage;
    use crate::package::row::RowPackage;
    use crate::packet::{PacketHeader, PacketStatusBit, PacketType};

    /// A real connected TCP pair over loopback -- `TcpStream` has no
    /// `pair()` constructor the way `UnixStream` does, so tests that
    /// need a live socket dial a listener bound to an ephemeral port.
    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, (server, _)) =
            tokio::join!(TcpStream::connect(addr), async { listener.accept().await.unwrap() });
        (client, server)
    }

    fn test_client(stream: TcpStream) -> Client {
        let mut channel = Channel::new(stream, 0, HookRegistry::with_tracing_defaults());
        channel.set_byte_order(Endianness::Big);
        let conn = Connection::from_parts(channel, Capabilities::driver_default());
        Client::from_parts(conn)
    }

    async fn write_message(server: &mut TcpStream, body: Vec<u8>) {
        let header = PacketHeader {
            ptype: PacketType::Normal,
            status: PacketStatusBit::EndOfMessage.into(),
            length: (crate::packet::HEADER_LEN + body.len()) as u16,
            channel: 0,
            packet_seq: 0,
            window: 0,
        };
        tokio::io::AsyncWriteExt::write_all(server, &header.encode())
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(server, &body).await.unwrap();
    }

    fn encode_row_fmt(fmts: &[FieldFmt]) -> Vec<u8> {
        let mut ch = ByteChannel::new(Endianness::Big);
        ch.write_u8(crate::package::Token::RowFmt.as_u8());
        RowFmtPackage {
            fmts: fmts.to_vec(),
            wide: false,
        }
        .encode(&mut ch);
        ch.into_inner()
    }

    fn encode_row(fields: Vec<FieldData>, fmts: &[FieldFmt]) -> Vec<u8> {
        let mut ch = ByteChannel::new(Endianness::Big);
        ch.write_u8(crate::package::Token::Row.as_u8());
        RowPackage { fields }.encode(&mut ch, fmts).unwrap();
        ch.into_inner()
    }

    fn encode_done_final() -> Vec<u8> {
        let mut ch = ByteChannel::new(Endianness::Big);
        ch.write_u8(crate::package::Token::Done.as_u8());
        DonePackage {
            status: DoneStatus::empty(),
            tran_state: TranState::Completed,
            count: 1,
        }
        .encode(&mut ch);
        ch.into_inner()
    }

    #[tokio::test]
    async fn ping_succeeds_when_server_answers() {
        let (a, mut server) = tcp_pair().await;
        let mut client = test_client(a);

        let fmts = vec![FieldFmt::new("", DataType::Varchar)];
        let mut body = encode_row_fmt(&fmts);
        body.extend(encode_row(vec![FieldData::Varchar("ping".into())], &fmts));
        body.extend(encode_done_final());
        let server_task = tokio::spawn(async move {
            write_message(&mut server, body).await;
        });

        client.ping(&Context::background()).await.unwrap();
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn ping_reports_bad_connection_on_transport_failure() {
        let (a, server) = tcp_pair().await;
        let mut client = test_client(a);
        drop(server);

        let err = client.ping(&Context::background()).await.unwrap_err();
        assert!(matches!(err, Error::BadConnection(_)));
    }

    #[tokio::test]
    async fn exec_without_args_is_a_plain_language_round_trip() {
        let (a, mut server) = tcp_pair().await;
        let mut client = test_client(a);

        let fmts = vec![FieldFmt::new("id", DataType::Int)];
        let mut body = encode_row_fmt(&fmts);
        body.extend(encode_row(vec![FieldData::Int(1)], &fmts));
        body.extend(encode_done_final());
        let server_task = tokio::spawn(async move {
            write_message(&mut server, body).await;
        });

        let mut rows = client.exec(&Context::background(), "select 1 as id", &[]).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row, vec![FieldData::Int(1)]);
        assert_eq!(rows.columns(), vec!["id".to_string()]);
        assert!(rows.next().await.unwrap().is_none());
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn exec_with_named_args_prepares_then_executes() {
        let (a, mut server) = tcp_pair().await;
        let mut client = test_client(a);

        let server_task = tokio::spawn(async move {
            // Ack the prepare with a final Done; no ParamFmt sent, so the
            // client falls back to identity formats for the bind.
            write_message(&mut server, encode_done_final()).await;

            let fmts = vec![FieldFmt::new("id", DataType::Int)];
            let mut body = encode_row_fmt(&fmts);
            body.extend(encode_row(vec![FieldData::Int(42)], &fmts));
            body.extend(encode_done_final());
            write_message(&mut server, body).await;
        });

        let mut rows = client
            .exec(
                &Context::background(),
                "select * from t where id = @id",
                &[("id", FieldData::Int(42))],
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row, vec![FieldData::Int(42)]);
        assert!(rows.next().await.unwrap().is_none());
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn second_exec_of_same_sql_reuses_the_cached_statement_id() {
        let (a, mut server) = tcp_pair().await;
        let mut client = test_client(a);

        let server_task = tokio::spawn(async move {
            write_message(&mut server, encode_done_final()).await;
            write_message(&mut server, encode_done_final()).await;
            write_message(&mut server, encode_done_final()).await;
        });

        client
            .exec(
                &Context::background(),
                "select * from t where id = @id",
                &[("id", FieldData::Int(1))],
            )
            .await
            .unwrap()
            .close()
            .await
            .unwrap();
        client
            .exec(
                &Context::background(),
                "select * from t where id = @id",
                &[("id", FieldData::Int(2))],
            )
            .await
            .unwrap()
            .close()
            .await
            .unwrap();

        assert_eq!(client.stmt_cache.len(), 1);
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn new_stmt_direct_exec_and_close_round_trip() {
        let (a, mut server) = tcp_pair().await;
        let mut client = test_client(a);

        let server_task = tokio::spawn(async move {
            write_message(&mut server, encode_done_final()).await; // prepare ack

            let fmts = vec![FieldFmt::new("n", DataType::Int)];
            let mut body = encode_row_fmt(&fmts);
            body.extend(encode_row(vec![FieldData::Int(7)], &fmts));
            body.extend(encode_done_final());
            write_message(&mut server, body).await; // exec result

            write_message(&mut server, encode_done_final()).await; // dealloc ack
        });

        let stmt = client
            .new_stmt(&Context::background(), "get_n", "select ? as n", false)
            .await
            .unwrap();
        let mut rows = stmt
            .direct_exec(&mut client, &Context::background(), &[FieldData::Int(7)])
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row, vec![FieldData::Int(7)]);
        rows.close().await.unwrap();
        stmt.close(&mut client).await.unwrap();

        server_task.await.unwrap();
    }
}
