use crate::error::CmdError;
use crate::protocol::mysql::basic::{from_packet, utf8_payload, Command};
use crate::protocol::mysql::binlog::{parse_binlog_dump, parse_binlog_dump_gtid};
use crate::protocol::mysql::constants::CommandCode;
use crate::server::cmd_handler::CmdHandler;
use crate::server::conn::Conn;
use crate::server::response::Response;
use crate::server::sql_com_labels;
use common::metrics::metric_def::MYSRV_COM_LATENCY;
use common::metrics::MetricsTimer;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

impl<R, W, H> Conn<R, W, H>
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin,
    H: CmdHandler,
{
    /// Routes one command packet and produces its response, or the error standing in for it.
    pub(crate) async fn dispatch(&mut self, pkt: &[u8]) -> Result<Response, CmdError> {
        let (com, command) = from_packet(pkt)?;
        let _timer = MetricsTimer::new_with_labels(MYSRV_COM_LATENCY, sql_com_labels(com));
        debug!(
            "MySrvConn {} dispatch {}",
            self.conn_id(),
            CommandCode::name_of(com)
        );

        match command {
            Command::Quit => {
                self.close().await;
                Ok(Response::NoResponse)
            }
            Command::Query(query) => {
                let query = utf8_payload(CommandCode::ComQuery, query)?;
                self.handler.on_query(query).await.map(Response::Query)
            }
            Command::Ping => Ok(Response::Ok),
            Command::InitDb(db) => {
                let db = utf8_payload(CommandCode::ComInitDB, db)?;
                self.handler.use_db(db).await.map(|_| Response::Ok)
            }
            Command::FieldList { table, wildcard } => {
                let table = utf8_payload(CommandCode::ComFieldList, table)?;
                let wildcard = utf8_payload(CommandCode::ComFieldList, wildcard)?;
                self.handler
                    .on_field_list(table, wildcard)
                    .await
                    .map(Response::Fields)
            }
            Command::StmtPrepare(query) => {
                let query = utf8_payload(CommandCode::ComStmtPrepare, query)?;
                self.stmts
                    .prepare(&mut self.handler, query)
                    .await
                    .map(Response::Prepared)
            }
            Command::StmtExecute(data) => self
                .stmts
                .execute(&mut self.handler, data)
                .await
                .map(Response::Execute),
            Command::StmtSendLongData(data) => {
                self.stmts.append_long_data(data);
                Ok(Response::NoResponse)
            }
            Command::StmtClose(data) => {
                self.stmts.close(&mut self.handler, data).await;
                Ok(Response::NoResponse)
            }
            Command::StmtReset(data) => self.stmts.reset(data).map(|_| Response::Ok),
            Command::SetOption(data) => self
                .handler
                .on_other(com, data)
                .await
                .map(|_| Response::Eof),
            Command::RegisterSlave(data) => {
                if let Some(replication) = self.handler.as_replication() {
                    return replication
                        .on_register_slave(data)
                        .await
                        .map(|_| Response::Ok);
                }
                self.on_other(com, data).await
            }
            Command::BinlogDump(data) => {
                if let Some(replication) = self.handler.as_replication() {
                    let pos = parse_binlog_dump(data)?;
                    debug!("MySrvConn {} binlog dump from {:?}", self.conn_id, pos);
                    return replication
                        .on_binlog_dump(pos)
                        .await
                        .map(Response::Binlog);
                }
                self.on_other(com, data).await
            }
            Command::BinlogDumpGtid(data) => {
                if let Some(replication) = self.handler.as_replication() {
                    let gtid = parse_binlog_dump_gtid(data)?;
                    debug!("MySrvConn {} binlog dump gtid {}", self.conn_id, gtid);
                    return replication
                        .on_binlog_dump_gtid(gtid)
                        .await
                        .map(Response::Binlog);
                }
                self.on_other(com, data).await
            }
            Command::Other(data) => self.on_other(com, data).await,
        }
    }

    async fn on_other(&mut self, com: u8, data: &[u8]) -> Result<Response, CmdError> {
        self.handler.on_other(com, data).await.map(|_| Response::Ok)
    }
}
