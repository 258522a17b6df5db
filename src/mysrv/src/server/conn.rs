use crate::error::CmdError;
use crate::protocol::mysql::basic::{Column, OkPacket, PacketIO};
use crate::protocol::mysql::binlog::BinlogStreamer;
use crate::protocol::mysql::constants::HeaderInfo;
use crate::protocol::mysql::error_codes::ErrorKind;
use crate::protocol::mysql::packet::packet_writer::PacketWriter;
use crate::protocol::mysql::packet::writers;
use crate::server::cmd_handler::CmdHandler;
use crate::server::response::{AffectedRows, QueryResult, Response};
use crate::server::stmt::StmtRegistry;
use mysql_common::constants::{CapabilityFlags, StatusFlags};
use std::io::{self, Write};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

/// One authenticated connection in the command phase.
///
/// Owns the transport, the handler and the prepared statements. Commands are served
/// strictly one after another; the transport handle is dropped on the first I/O failure.
pub struct Conn<R, W, H: CmdHandler> {
    pub(crate) conn_id: u32,
    io: Option<PacketIO<R, W>>,
    capabilities: CapabilityFlags,
    pub(crate) handler: H,
    pub(crate) stmts: StmtRegistry<H::Context>,
}

impl<R, W, H: CmdHandler> Conn<R, W, H> {
    pub fn new(conn_id: u32, io: PacketIO<R, W>, capabilities: CapabilityFlags, handler: H) -> Self {
        Self {
            conn_id,
            io: Some(io),
            capabilities,
            handler,
            stmts: StmtRegistry::default(),
        }
    }

    pub fn conn_id(&self) -> u32 {
        self.conn_id
    }

    pub fn is_closed(&self) -> bool {
        self.io.is_none()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn stmts(&self) -> &StmtRegistry<H::Context> {
        &self.stmts
    }

    /// The transport, while the connection is open.
    pub fn io(&self) -> Option<&PacketIO<R, W>> {
        self.io.as_ref()
    }
}

fn ok_packet(affected: AffectedRows) -> OkPacket {
    OkPacket {
        header: HeaderInfo::OKHeader as u8,
        affected_rows: affected.affected_rows,
        last_insert_id: affected.last_insert_id,
        status_flags: StatusFlags::SERVER_STATUS_AUTOCOMMIT,
        warnings: 0,
        info: affected.info,
        session_state_info: String::new(),
    }
}

impl<R, W, H> Conn<R, W, H>
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin,
    H: CmdHandler,
{
    /// Drops the transport after shutting down its write side. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(mut io) = self.io.take() {
            if let Err(e) = io.writer.shutdown().await {
                debug!("MySrvConn {} shutdown err {:?}", self.conn_id, e);
            }
        }
    }

    /// Serves one command: read a packet, dispatch it, write the response.
    ///
    /// Any read or write failure closes the connection and is returned; handler and
    /// decoding errors are written as ERR packets and the connection stays usable.
    pub async fn handle_command(&mut self) -> io::Result<()> {
        let Some(io) = self.io.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection closed",
            ));
        };
        let (seq, pkt) = match io.reader.next_async().await {
            Ok(Some(read)) => read,
            Ok(None) => {
                self.close().await;
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "connection disconnect.",
                ));
            }
            Err(e) => {
                warn!("MySrvConn {} read pkg err = {:?}", self.conn_id, e);
                self.close().await;
                return Err(e);
            }
        };
        if let Some(io) = self.io.as_mut() {
            io.writer.set_seq(seq.wrapping_add(1));
        }

        let response = self.dispatch(&pkt).await;
        let written = self.write_response(response).await;
        if let Some(io) = self.io.as_mut() {
            io.writer.reset_seq();
        }
        if let Err(e) = written {
            warn!("MySrvConn {} write response err = {:?}", self.conn_id, e);
            self.close().await;
            return Err(e);
        }
        Ok(())
    }

    /// Serves commands until the client quits or the transport fails, then closes every
    /// prepared statement.
    pub async fn run(&mut self) -> io::Result<()> {
        let rs = loop {
            if self.is_closed() {
                break Ok(());
            }
            if let Err(e) = self.handle_command().await {
                break Err(e);
            }
        };
        self.stmts.close_all(&mut self.handler).await;
        rs
    }

    async fn write_response(&mut self, response: Result<Response, CmdError>) -> io::Result<()> {
        let capabilities = self.capabilities;
        let Some(io) = self.io.as_mut() else {
            return match response {
                Ok(Response::NoResponse) => Ok(()),
                _ => Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "connection closed",
                )),
            };
        };
        let w = &mut io.writer;
        match response {
            Err(e) => {
                debug!("MySrvConn {} command err {}", self.conn_id, e);
                writers::write_err_packet(e.kind(), e.to_string().as_bytes(), w).await?;
            }
            Ok(Response::NoResponse) => return Ok(()),
            Ok(Response::Ok) => {
                let ok = ok_packet(AffectedRows::default());
                writers::write_ok_packet_with_client_flags(w, capabilities, ok).await?;
            }
            Ok(Response::Eof) => {
                writers::write_end_of_rows(w, capabilities, StatusFlags::SERVER_STATUS_AUTOCOMMIT)
                    .await?;
            }
            Ok(Response::Query(QueryResult::Rows(rs))) => {
                let rows = writers::encode_text_rows(&rs.columns, &rs.rows);
                write_rows(self.conn_id, &rs.columns, rows, w, capabilities).await?;
            }
            Ok(Response::Execute(QueryResult::Rows(rs))) => {
                let rows = writers::encode_binary_rows(&rs.columns, &rs.rows);
                write_rows(self.conn_id, &rs.columns, rows, w, capabilities).await?;
            }
            Ok(Response::Query(QueryResult::Affected(affected)))
            | Ok(Response::Execute(QueryResult::Affected(affected))) => {
                let ok = ok_packet(affected);
                writers::write_ok_packet_with_client_flags(w, capabilities, ok).await?;
            }
            Ok(Response::Fields(columns)) => {
                writers::write_column_definitions_41(&columns, w, capabilities, true).await?;
            }
            Ok(Response::Prepared(stmt)) => {
                writers::write_prepare_ok(stmt.stmt_id, stmt.params, stmt.columns, w, capabilities)
                    .await?;
            }
            Ok(Response::Binlog(streamer)) => {
                write_binlog_stream(streamer, w, capabilities).await?;
            }
        }
        w.flush_all().await
    }
}

/// Writes an encoded result set, or an ERR packet when the handler's rows could not be
/// encoded. Nothing of the result set is on the wire in the second case.
async fn write_rows<W: AsyncWrite + Unpin>(
    conn_id: u32,
    columns: &[Column],
    rows: io::Result<Vec<Vec<u8>>>,
    w: &mut PacketWriter<W>,
    capabilities: CapabilityFlags,
) -> io::Result<()> {
    match rows {
        Ok(rows) => writers::write_resultset(columns, &rows, w, capabilities).await,
        Err(e) => {
            warn!("MySrvConn {conn_id} cannot encode result set: {e}");
            let err = CmdError::server(ErrorKind::ER_UNKNOWN_ERROR, e.to_string());
            writers::write_err_packet(err.kind(), err.to_string().as_bytes(), w).await
        }
    }
}

/// Sends each event behind an OK marker until the producer hangs up (EOF) or fails (ERR).
async fn write_binlog_stream<W: AsyncWrite + Unpin>(
    mut streamer: BinlogStreamer,
    w: &mut PacketWriter<W>,
    capabilities: CapabilityFlags,
) -> io::Result<()> {
    while let Some(event) = streamer.next_event().await {
        match event {
            Ok(event) => {
                w.write_all(&[HeaderInfo::OKHeader as u8])?;
                w.write_all(&event.0)?;
                w.end_packet().await?;
                w.flush_all().await?;
            }
            Err(e) => {
                return writers::write_err_packet(e.kind(), e.to_string().as_bytes(), w).await;
            }
        }
    }
    writers::write_end_of_rows(w, capabilities, StatusFlags::empty()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mysql::packet::packet_reader::PacketReader;
    use crate::server::cmd_handler::{EmptyHandler, StmtMeta};
    use crate::server::response::Resultset;
    use mysql_common::constants::ColumnType;
    use mysql_common::value::Value;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    fn frame(seq: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = (payload.len() as u32).to_le_bytes()[..3].to_vec();
        out.push(seq);
        out.extend_from_slice(payload);
        out
    }

    fn written_packets<H: CmdHandler>(
        conn: &Conn<Cursor<Vec<u8>>, Vec<u8>, H>,
    ) -> Vec<(u8, Vec<u8>)> {
        let mut out = &conn.io().unwrap().writer.inner_writer[..];
        let mut packets = Vec::new();
        while !out.is_empty() {
            let len = out[0] as usize | (out[1] as usize) << 8 | (out[2] as usize) << 16;
            packets.push((out[3], out[4..4 + len].to_vec()));
            out = &out[4 + len..];
        }
        packets
    }

    fn conn_with_input(input: Vec<u8>) -> Conn<Cursor<Vec<u8>>, Vec<u8>, EmptyHandler> {
        conn_with_handler(input, EmptyHandler)
    }

    fn conn_with_handler<H: CmdHandler>(
        input: Vec<u8>,
        handler: H,
    ) -> Conn<Cursor<Vec<u8>>, Vec<u8>, H> {
        let io = PacketIO::new(
            PacketReader::new(Cursor::new(input)),
            PacketWriter::new(Vec::new()),
        );
        Conn::new(7, io, CapabilityFlags::CLIENT_PROTOCOL_41, handler)
    }

    #[tokio::test]
    async fn test_ping_answers_ok_and_resets_seq() {
        let mut conn = conn_with_input(frame(0, &[0x0e]));
        conn.handle_command().await.unwrap();
        let packets = written_packets(&conn);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].0, 1);
        assert_eq!(packets[0].1[0], 0x00);
        assert_eq!(conn.io().unwrap().writer.seq(), 0);
    }

    #[tokio::test]
    async fn test_errors_keep_connection_open() {
        let mut input = frame(0, &[0xfe]);
        input.extend(frame(0, &[]));
        input.extend(frame(0, &[0x0e]));
        let mut conn = conn_with_input(input);
        conn.handle_command().await.unwrap();
        conn.handle_command().await.unwrap();
        conn.handle_command().await.unwrap();
        let packets = written_packets(&conn);
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].1[..3], [0xff, 0x17, 0x04]);
        assert_eq!(&packets[0].1[9..], b"command 254 is not supported now");
        assert_eq!(packets[1].1[..3], [0xff, 0x2b, 0x07]);
        assert_eq!(packets[2].1[0], 0x00);
        assert!(!conn.is_closed());
    }

    /// Answers every query with two columns and rows that do not fit them.
    struct MismatchedRows;

    #[async_trait::async_trait]
    impl CmdHandler for MismatchedRows {
        type Context = ();

        async fn on_query(&mut self, query: &str) -> Result<QueryResult, CmdError> {
            let mut rs = Resultset::new(vec![
                Column::new("t", "a", ColumnType::MYSQL_TYPE_TINY),
                Column::new("t", "b", ColumnType::MYSQL_TYPE_TINY),
            ]);
            if query == "narrow" {
                rs.push_row(vec![Value::Int(1)]);
            } else {
                rs.push_row(vec![Value::Int(1), Value::Int(2)]);
            }
            Ok(QueryResult::Rows(rs))
        }

        async fn on_prepare(&mut self, _query: &str) -> Result<StmtMeta<()>, CmdError> {
            Ok(StmtMeta {
                params: 0,
                columns: 1,
                context: (),
            })
        }

        async fn on_execute(
            &mut self,
            _context: &(),
            _query: &str,
            _params: &[Value],
        ) -> Result<QueryResult, CmdError> {
            let mut rs = Resultset::new(vec![Column::new("t", "a", ColumnType::MYSQL_TYPE_TINY)]);
            rs.push_row(vec![Value::Int(300)]);
            Ok(QueryResult::Rows(rs))
        }
    }

    #[tokio::test]
    async fn test_unencodable_rows_answer_err_and_keep_conn() {
        let mut input = frame(0, b"\x03narrow");
        input.extend(frame(0, b"\x16select ?"));
        let mut execute = vec![0x17];
        execute.extend(1u32.to_le_bytes());
        execute.push(0x00);
        execute.extend(1u32.to_le_bytes());
        input.extend(frame(0, &execute));
        input.extend(frame(0, b"\x03wide"));
        let mut conn = conn_with_handler(input, MismatchedRows);
        for _ in 0..4 {
            conn.handle_command().await.unwrap();
        }
        assert!(!conn.is_closed());

        let packets = written_packets(&conn);
        // query ERR, prepare OK + column + EOF, execute ERR, then a full result set
        assert_eq!(packets.len(), 1 + 3 + 1 + 6);
        assert_eq!(packets[0].0, 1);
        assert_eq!(packets[0].1[..3], [0xff, 0x51, 0x04]);
        assert_eq!(&packets[0].1[3..9], b"#HY000");
        assert_eq!(&packets[0].1[9..], b"row has 1 values for 2 columns");
        assert_eq!(packets[4].0, 1);
        assert_eq!(packets[4].1[..3], [0xff, 0x51, 0x04]);
        assert_eq!(packets[5], (1, vec![2]));
        assert_eq!(packets[9].1, vec![1, b'1', 1, b'2']);
    }

    #[tokio::test]
    async fn test_quit_writes_nothing() {
        let mut input = frame(0, &[0x01]);
        input.extend(frame(0, &[0x0e]));
        let mut conn = conn_with_input(input);
        conn.run().await.unwrap();
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_clean_eof_is_connection_aborted() {
        let mut conn = conn_with_input(Vec::new());
        let err = conn.run().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
        assert!(conn.is_closed());
        let err = conn.handle_command().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    struct BrokenReader;

    impl AsyncRead for BrokenReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
        }
    }

    struct CountingWriter(std::sync::Arc<std::sync::atomic::AtomicUsize>);

    impl AsyncWrite for CountingWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.0
                .fetch_add(buf.len(), std::sync::atomic::Ordering::SeqCst);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_read_failure_closes_without_write() {
        let written = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let io = PacketIO::new(
            PacketReader::new(BrokenReader),
            PacketWriter::new(CountingWriter(written.clone())),
        );
        let mut conn = Conn::new(1, io, CapabilityFlags::CLIENT_PROTOCOL_41, EmptyHandler);
        let err = conn.handle_command().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert!(conn.is_closed());
        assert_eq!(written.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_write_failure_closes() {
        struct BrokenWriter;
        impl AsyncWrite for BrokenWriter {
            fn poll_write(
                self: Pin<&mut Self>,
                _cx: &mut Context<'_>,
                _buf: &[u8],
            ) -> Poll<io::Result<usize>> {
                Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe")))
            }
            fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
                Poll::Ready(Ok(()))
            }
            fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
                Poll::Ready(Ok(()))
            }
        }
        let io = PacketIO::new(
            PacketReader::new(Cursor::new(frame(0, &[0x0e]))),
            PacketWriter::new(BrokenWriter),
        );
        let mut conn = Conn::new(1, io, CapabilityFlags::CLIENT_PROTOCOL_41, EmptyHandler);
        let err = conn.handle_command().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_binlog_stream_encoding() {
        let (tx, streamer) = BinlogStreamer::channel(2);
        tx.send(Ok(crate::protocol::mysql::binlog::BinlogEvent(vec![1, 2])))
            .await
            .unwrap();
        tx.send(Err(CmdError::server(
            crate::protocol::mysql::error_codes::ErrorKind::ER_UNKNOWN_ERROR,
            "purged",
        )))
        .await
        .unwrap();
        drop(tx);
        let mut out = Vec::new();
        let mut w = PacketWriter::new(&mut out);
        write_binlog_stream(streamer, &mut w, CapabilityFlags::CLIENT_PROTOCOL_41)
            .await
            .unwrap();
        assert_eq!(&out[..7], &[3, 0, 0, 0, 0x00, 1, 2]);
        assert_eq!(out[7 + 4], 0xff);
        assert_eq!(&out[out.len() - 6..], b"purged");
    }
}
