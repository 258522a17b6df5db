use crate::protocol::mysql::basic::PacketIO;
use crate::protocol::mysql::constants::DEFAULT_MAX_PACKET_LEN;
use crate::protocol::mysql::packet::packet_reader::PacketReader;
use crate::protocol::mysql::packet::packet_writer::PacketWriter;
use crate::server::auth::Authenticator;
use crate::server::cmd_handler::CmdHandler;
use crate::server::handshake;

use common::metrics::common_labels;
use common::metrics::metric_def::{MYSRV_CURR_CONN, MYSRV_TOTAL_CONN};
use common::ShutdownMessage;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch::Receiver;
use tracing::{debug, info, warn};

/// Accepts MySQL clients and serves each one on its own task with a fresh handler.
///
/// `F` builds the handler of a new connection. Connection ids start at 1 and only grow.
pub struct MySqlServer<F> {
    next_conn_id: AtomicU32,
    factory: F,
    authenticator: Arc<dyn Authenticator>,
    max_packet_len: usize,
}

impl<F, H> MySqlServer<F>
where
    F: Fn() -> H + Send + Sync + 'static,
    H: CmdHandler + 'static,
{
    pub fn new(factory: F, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            next_conn_id: AtomicU32::new(1),
            factory,
            authenticator,
            max_packet_len: DEFAULT_MAX_PACKET_LEN,
        }
    }

    /// Caps the packets read from every client of this server.
    pub fn with_max_packet_len(mut self, max_packet_len: usize) -> Self {
        self.max_packet_len = max_packet_len;
        self
    }

    fn next_conn_id(&self) -> u32 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Runs the connection phase and then the command loop on one client transport.
    pub async fn serve_conn<R, W>(&self, reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncRead + Send + Unpin,
        W: AsyncWrite + Send + Unpin,
    {
        let conn_id = self.next_conn_id();
        info!("MySrv on_conn conn_id={conn_id}");
        common::metrics::gauge_inc(MYSRV_CURR_CONN, 1_f64, Some(common_labels()));
        common::metrics::counter_inc(MYSRV_TOTAL_CONN, 1, Some(common_labels()));

        let reader = PacketReader::new(reader).with_max_packet_len(self.max_packet_len);
        let io = PacketIO::new(reader, PacketWriter::new(writer));
        let rs = async {
            let mut conn =
                handshake::accept(conn_id, io, (self.factory)(), self.authenticator.as_ref())
                    .await?;
            conn.run().await
        }
        .await;

        common::metrics::gauge_dec(MYSRV_CURR_CONN, 1_f64, Some(common_labels()));
        match &rs {
            Ok(()) => info!("MySrv conn {conn_id} closed"),
            Err(e) => debug!("MySrv conn {conn_id} closed by {e:?}"),
        }
        rs
    }

    /// Accepts connections until the shutdown watch changes.
    pub async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown_rx: Receiver<ShutdownMessage>,
    ) -> io::Result<()> {
        info!("MySrv listening on {:?}", listener.local_addr()?);
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_ok() {
                        let canceled = shutdown_rx.borrow_and_update().clone();
                        if let ShutdownMessage::Cancel(msg) = canceled {
                            info!("MySrv stop accepting, {msg}");
                        }
                    }
                    return Ok(());
                }
                rs = listener.accept() => {
                    match rs {
                        Ok((stream, addr)) => {
                            debug!("MySrv accept {addr}");
                            if let Err(e) = stream.set_nodelay(true) {
                                warn!("MySrv set_nodelay err {e:?}");
                            }
                            let (reader, writer) = stream.into_split();
                            let server = Arc::clone(&self);
                            tokio::spawn(async move {
                                let _ = server.serve_conn(reader, writer).await;
                            });
                        }
                        Err(e) => {
                            warn!("MySrv accept connection err. cause by {e:?}");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::auth::authenticator::AllowAnyUser;
    use crate::server::cmd_handler::EmptyHandler;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::watch;

    #[test]
    fn test_conn_ids_increase() {
        let server = MySqlServer::new(|| EmptyHandler, Arc::new(AllowAnyUser));
        assert_eq!(server.next_conn_id(), 1);
        assert_eq!(server.next_conn_id(), 2);
        assert_eq!(server.next_conn_id(), 3);
    }

    #[tokio::test]
    async fn test_oversized_handshake_response_is_refused() {
        let server =
            MySqlServer::new(|| EmptyHandler, Arc::new(AllowAnyUser)).with_max_packet_len(16);
        let (client, server_side) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(server_side);
        let (mut client_reader, mut client_writer) = tokio::io::split(client);
        let serving = tokio::spawn(async move { server.serve_conn(reader, writer).await });

        let mut header = [0u8; 4];
        client_reader.read_exact(&mut header).await.unwrap();
        let len = header[0] as usize | (header[1] as usize) << 8 | (header[2] as usize) << 16;
        let mut greeting = vec![0u8; len];
        client_reader.read_exact(&mut greeting).await.unwrap();
        let mut response = vec![32, 0, 0, 1];
        response.extend([0u8; 32]);
        client_writer.write_all(&response).await.unwrap();

        let err = serving.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let server = Arc::new(MySqlServer::new(|| EmptyHandler, Arc::new(AllowAnyUser)));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = watch::channel(ShutdownMessage::Init);
        let task = tokio::spawn(server.run(listener, rx));
        tx.send(ShutdownMessage::Cancel("test".to_string())).unwrap();
        assert!(task.await.unwrap().is_ok());
    }
}
