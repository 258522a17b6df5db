use crate::error::CmdError;
use crate::protocol::mysql::basic::Column;
use crate::protocol::mysql::binlog::{BinlogPosition, BinlogStreamer, GtidSet};
use crate::server::response::QueryResult;
use async_trait::async_trait;
use mysql_common::value::Value;

/// What a handler reports for a prepared statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StmtMeta<C> {
    pub params: u16,
    pub columns: u16,
    /// Handed back untouched to `on_execute` and `on_close`.
    pub context: C,
}

/// [`CmdHandler`] is the base command set a connection serves.
///
/// Every operation has a default that refuses it, so an implementation overrides only
/// what it supports. `on_close` defaults to success and `on_other` to the unknown
/// command error carrying the command byte.
#[async_trait]
pub trait CmdHandler: Send {
    /// Opaque per statement value produced by `on_prepare`.
    type Context: Send + Sync + 'static;

    async fn use_db(&mut self, _db: &str) -> Result<(), CmdError> {
        Err(CmdError::not_supported("use_db"))
    }

    async fn on_query(&mut self, _query: &str) -> Result<QueryResult, CmdError> {
        Err(CmdError::not_supported("on_query"))
    }

    async fn on_field_list(
        &mut self,
        _table: &str,
        _wildcard: &str,
    ) -> Result<Vec<Column>, CmdError> {
        Err(CmdError::not_supported("on_field_list"))
    }

    async fn on_prepare(&mut self, _query: &str) -> Result<StmtMeta<Self::Context>, CmdError> {
        Err(CmdError::not_supported("on_prepare"))
    }

    async fn on_execute(
        &mut self,
        _context: &Self::Context,
        _query: &str,
        _params: &[Value],
    ) -> Result<QueryResult, CmdError> {
        Err(CmdError::not_supported("on_execute"))
    }

    async fn on_close(&mut self, _context: Self::Context) -> Result<(), CmdError> {
        Ok(())
    }

    /// Catch-all for every command nobody else handles.
    async fn on_other(&mut self, cmd: u8, _data: &[u8]) -> Result<(), CmdError> {
        Err(CmdError::UnknownCommand { cmd })
    }

    /// Returns the replication command set when this handler implements it.
    fn as_replication(&mut self) -> Option<&mut dyn ReplicationHandler> {
        None
    }
}

/// Optional replication command set, looked up per command through
/// [`CmdHandler::as_replication`].
#[async_trait]
pub trait ReplicationHandler: Send {
    async fn on_register_slave(&mut self, _data: &[u8]) -> Result<(), CmdError> {
        Err(CmdError::not_supported("on_register_slave"))
    }

    async fn on_binlog_dump(&mut self, _pos: BinlogPosition) -> Result<BinlogStreamer, CmdError> {
        Err(CmdError::not_supported("on_binlog_dump"))
    }

    async fn on_binlog_dump_gtid(&mut self, _gtid: GtidSet) -> Result<BinlogStreamer, CmdError> {
        Err(CmdError::not_supported("on_binlog_dump_gtid"))
    }
}

/// Serves nothing: every base operation fails with the default answers.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyHandler;

impl CmdHandler for EmptyHandler {
    type Context = ();
}

/// Like [`EmptyHandler`], but advertises the replication set whose operations all fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyReplicationHandler;

impl CmdHandler for EmptyReplicationHandler {
    type Context = ();

    fn as_replication(&mut self) -> Option<&mut dyn ReplicationHandler> {
        Some(self)
    }
}

impl ReplicationHandler for EmptyReplicationHandler {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mysql::error_codes::ErrorKind;

    #[tokio::test]
    async fn test_empty_handler_refuses_everything() {
        let mut handler = EmptyHandler;
        assert_eq!(
            handler.use_db("db").await,
            Err(CmdError::not_supported("use_db"))
        );
        assert!(handler.on_query("select 1").await.unwrap_err().is_unsupported());
        assert!(handler.on_field_list("t", "").await.unwrap_err().is_unsupported());
        let err = handler.on_prepare("select ?").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ER_NOT_SUPPORTED_YET);
        assert!(handler.on_execute(&(), "select ?", &[]).await.is_err());
        assert!(handler.as_replication().is_none());
    }

    #[tokio::test]
    async fn test_empty_handler_close_succeeds() {
        assert_eq!(EmptyHandler.on_close(()).await, Ok(()));
    }

    #[tokio::test]
    async fn test_catch_all_keeps_command_byte() {
        let err = EmptyHandler.on_other(0xfe, &[1, 2]).await.unwrap_err();
        assert_eq!(err, CmdError::UnknownCommand { cmd: 0xfe });
        assert_eq!(err.kind(), ErrorKind::ER_UNKNOWN_COM_ERROR);
    }

    #[tokio::test]
    async fn test_empty_replication_handler() {
        let mut handler = EmptyReplicationHandler;
        let replication = handler.as_replication().unwrap();
        assert!(replication.on_register_slave(&[]).await.is_err());
        let pos = BinlogPosition {
            name: "mysql-bin.000001".to_string(),
            pos: 4,
        };
        assert!(replication.on_binlog_dump(pos).await.is_err());
        assert!(replication
            .on_binlog_dump_gtid(GtidSet::default())
            .await
            .is_err());
    }
}
