use crate::error::CmdError;
use crate::protocol::mysql::basic::{send_long_data, stmt_id};
use crate::protocol::mysql::constants::CommandCode;
use crate::protocol::mysql::error_codes::ErrorKind;
use crate::protocol::mysql::params::{execute_params, BoundTypes};
use crate::server::cmd_handler::CmdHandler;
use crate::server::response::{QueryResult, StmtPrepared};
use std::collections::HashMap;
use tracing::debug;

/// A prepared statement owned by one connection.
#[derive(Debug)]
pub struct Statement<C> {
    pub id: u32,
    pub query: String,
    pub params: u16,
    pub columns: u16,
    pub context: C,
    /// One slot per parameter, filled by COM_STMT_SEND_LONG_DATA until the next execute.
    long_data: Vec<Option<Vec<u8>>>,
    bound_types: BoundTypes,
}

impl<C> Statement<C> {
    pub fn long_data(&self, index: usize) -> Option<&[u8]> {
        self.long_data.get(index).and_then(|slot| slot.as_deref())
    }

    fn clear_long_data(&mut self) {
        self.long_data.iter_mut().for_each(|slot| *slot = None);
    }
}

/// Connection-local prepared statements keyed by monotonically assigned ids.
#[derive(Debug)]
pub struct StmtRegistry<C> {
    last_id: u32,
    stmts: HashMap<u32, Statement<C>>,
}

impl<C> Default for StmtRegistry<C> {
    fn default() -> Self {
        Self {
            last_id: 0,
            stmts: HashMap::new(),
        }
    }
}

impl<C: Send + Sync + 'static> StmtRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u32) -> Option<&Statement<C>> {
        self.stmts.get(&id)
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    fn next_id(&mut self) -> Result<u32, CmdError> {
        let id = self.last_id.checked_add(1).ok_or_else(|| {
            CmdError::server(ErrorKind::ER_UNKNOWN_ERROR, "prepared statement ids exhausted")
        })?;
        self.last_id = id;
        Ok(id)
    }

    /// Assigns the next id and asks the handler to prepare `query`.
    ///
    /// The id is consumed even when the handler fails.
    pub async fn prepare<H>(&mut self, handler: &mut H, query: &str) -> Result<StmtPrepared, CmdError>
    where
        H: CmdHandler<Context = C> + ?Sized,
    {
        let id = self.next_id()?;
        let meta = handler.on_prepare(query).await?;
        let statement = Statement {
            id,
            query: query.to_string(),
            params: meta.params,
            columns: meta.columns,
            context: meta.context,
            long_data: vec![None; meta.params as usize],
            bound_types: Vec::new(),
        };
        debug!(
            "MySrv prepared stmt {id} params={} columns={}",
            meta.params, meta.columns
        );
        self.stmts.insert(id, statement);
        Ok(StmtPrepared {
            stmt_id: id,
            params: meta.params,
            columns: meta.columns,
        })
    }

    /// Decodes a COM_STMT_EXECUTE payload and runs the statement through the handler.
    pub async fn execute<H>(&mut self, handler: &mut H, data: &[u8]) -> Result<QueryResult, CmdError>
    where
        H: CmdHandler<Context = C> + ?Sized,
    {
        let id = stmt_id(CommandCode::ComStmtExecute, data)?;
        let stmt = self.stmts.get_mut(&id).ok_or(CmdError::UnknownStmt {
            stmt_id: id,
            command: "mysqld_stmt_execute",
        })?;
        let params = execute_params(data, stmt.params, &stmt.long_data, &mut stmt.bound_types);
        // long data only lives until the execute that consumes it.
        stmt.clear_long_data();
        let params = params?;
        handler.on_execute(&stmt.context, &stmt.query, &params).await
    }

    /// Appends a long data chunk. Unknown statements and parameter indexes are ignored.
    pub fn append_long_data(&mut self, data: &[u8]) {
        let Ok((_, (id, param, chunk))) = send_long_data(data) else {
            debug!("MySrv ignore malformed long data packet");
            return;
        };
        match self
            .stmts
            .get_mut(&id)
            .and_then(|stmt| stmt.long_data.get_mut(param as usize))
        {
            Some(slot) => slot.get_or_insert_with(Vec::new).extend_from_slice(chunk),
            None => debug!("MySrv ignore long data for stmt {id} param {param}"),
        }
    }

    /// Drops buffered long data of a statement.
    pub fn reset(&mut self, data: &[u8]) -> Result<(), CmdError> {
        let id = stmt_id(CommandCode::ComStmtReset, data)?;
        let stmt = self.stmts.get_mut(&id).ok_or(CmdError::UnknownStmt {
            stmt_id: id,
            command: "mysqld_stmt_reset",
        })?;
        stmt.clear_long_data();
        Ok(())
    }

    /// Removes a statement and hands its context to the handler. Never fails.
    pub async fn close<H>(&mut self, handler: &mut H, data: &[u8])
    where
        H: CmdHandler<Context = C> + ?Sized,
    {
        let Ok(id) = stmt_id(CommandCode::ComStmtClose, data) else {
            debug!("MySrv ignore malformed stmt close packet");
            return;
        };
        if let Some(stmt) = self.stmts.remove(&id) {
            if let Err(e) = handler.on_close(stmt.context).await {
                debug!("MySrv close stmt {id} error {e}");
            }
        }
    }

    /// Closes every statement, used when the connection goes away.
    pub async fn close_all<H>(&mut self, handler: &mut H)
    where
        H: CmdHandler<Context = C> + ?Sized,
    {
        for (id, stmt) in self.stmts.drain() {
            if let Err(e) = handler.on_close(stmt.context).await {
                debug!("MySrv close stmt {id} error {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::cmd_handler::StmtMeta;
    use crate::server::response::Resultset;
    use async_trait::async_trait;
    use mysql_common::value::Value;

    #[derive(Default)]
    struct RecordingHandler {
        fail_prepare: bool,
        executed: Vec<(u64, String, Vec<Value>)>,
        closed: Vec<u64>,
    }

    #[async_trait]
    impl CmdHandler for RecordingHandler {
        type Context = u64;

        async fn on_prepare(&mut self, query: &str) -> Result<StmtMeta<u64>, CmdError> {
            if self.fail_prepare {
                return Err(CmdError::server(ErrorKind::ER_PARSE_ERROR, "bad query"));
            }
            Ok(StmtMeta {
                params: query.matches('?').count() as u16,
                columns: 1,
                context: 0xC0FFEE,
            })
        }

        async fn on_execute(
            &mut self,
            context: &u64,
            query: &str,
            params: &[Value],
        ) -> Result<QueryResult, CmdError> {
            self.executed
                .push((*context, query.to_string(), params.to_vec()));
            Ok(QueryResult::Rows(Resultset::default()))
        }

        async fn on_close(&mut self, context: u64) -> Result<(), CmdError> {
            self.closed.push(context);
            Ok(())
        }
    }

    fn execute_payload(id: u32, value: i64) -> Vec<u8> {
        let mut data = id.to_le_bytes().to_vec();
        data.push(0x00);
        data.extend(1u32.to_le_bytes());
        data.push(0x00);
        data.push(0x01);
        data.extend([0x08, 0x00]);
        data.extend(value.to_le_bytes());
        data
    }

    fn long_data_payload(id: u32, param: u16, chunk: &[u8]) -> Vec<u8> {
        let mut data = id.to_le_bytes().to_vec();
        data.extend(param.to_le_bytes());
        data.extend_from_slice(chunk);
        data
    }

    #[tokio::test]
    async fn test_prepare_then_execute_passes_context() {
        let mut handler = RecordingHandler::default();
        let mut registry = StmtRegistry::new();
        let prepared = registry.prepare(&mut handler, "SELECT ? ").await.unwrap();
        assert_eq!(
            prepared,
            StmtPrepared {
                stmt_id: 1,
                params: 1,
                columns: 1
            }
        );

        registry
            .execute(&mut handler, &execute_payload(1, 42))
            .await
            .unwrap();
        assert_eq!(
            handler.executed,
            vec![(0xC0FFEE, "SELECT ? ".to_string(), vec![Value::Int(42)])]
        );
    }

    #[tokio::test]
    async fn test_failed_prepare_consumes_id() {
        let mut handler = RecordingHandler::default();
        let mut registry = StmtRegistry::new();
        assert_eq!(registry.prepare(&mut handler, "a").await.unwrap().stmt_id, 1);
        handler.fail_prepare = true;
        assert!(registry.prepare(&mut handler, "b").await.is_err());
        handler.fail_prepare = false;
        assert_eq!(registry.prepare(&mut handler, "c").await.unwrap().stmt_id, 3);
        assert_eq!(registry.len(), 2);
        assert!(registry.get(2).is_none());
    }

    #[tokio::test]
    async fn test_exhausted_ids_are_never_reused() {
        let mut handler = RecordingHandler::default();
        let mut registry = StmtRegistry::new();
        registry.last_id = u32::MAX - 1;
        let last = registry.prepare(&mut handler, "SELECT 1").await.unwrap();
        assert_eq!(last.stmt_id, u32::MAX);

        let err = registry.prepare(&mut handler, "SELECT 2").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ER_UNKNOWN_ERROR);
        assert_eq!(err.to_string(), "prepared statement ids exhausted");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(u32::MAX).unwrap().query, "SELECT 1");
        assert_eq!(registry.last_id, u32::MAX);
    }

    #[tokio::test]
    async fn test_execute_unknown_stmt() {
        let mut handler = RecordingHandler::default();
        let mut registry = StmtRegistry::new();
        let err = registry
            .execute(&mut handler, &execute_payload(9, 1))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CmdError::UnknownStmt {
                stmt_id: 9,
                command: "mysqld_stmt_execute"
            }
        );
        assert_eq!(err.kind(), ErrorKind::ER_UNKNOWN_STMT_HANDLER);
    }

    #[tokio::test]
    async fn test_long_data_then_reset() {
        let mut handler = RecordingHandler::default();
        let mut registry = StmtRegistry::new();
        registry.prepare(&mut handler, "INSERT ?").await.unwrap();
        registry.append_long_data(&long_data_payload(1, 0, b"ab"));
        registry.append_long_data(&long_data_payload(1, 0, b"cd"));
        assert_eq!(registry.get(1).unwrap().long_data(0), Some(&b"abcd"[..]));

        registry.reset(&1u32.to_le_bytes()).unwrap();
        assert_eq!(registry.get(1).unwrap().long_data(0), None);

        registry
            .execute(&mut handler, &execute_payload(1, 5))
            .await
            .unwrap();
        assert_eq!(handler.executed[0].2, vec![Value::Int(5)]);
    }

    #[tokio::test]
    async fn test_long_data_is_consumed_by_execute() {
        let mut handler = RecordingHandler::default();
        let mut registry = StmtRegistry::new();
        registry.prepare(&mut handler, "INSERT ?").await.unwrap();
        registry.append_long_data(&long_data_payload(1, 0, b"blob"));
        registry
            .execute(&mut handler, &execute_payload(1, 5))
            .await
            .unwrap();
        assert_eq!(handler.executed[0].2, vec![Value::Bytes(b"blob".to_vec())]);
        assert_eq!(registry.get(1).unwrap().long_data(0), None);
    }

    #[tokio::test]
    async fn test_long_data_unknown_targets_are_ignored() {
        let mut handler = RecordingHandler::default();
        let mut registry = StmtRegistry::new();
        registry.prepare(&mut handler, "INSERT ?").await.unwrap();
        registry.append_long_data(&long_data_payload(7, 0, b"x"));
        registry.append_long_data(&long_data_payload(1, 3, b"x"));
        registry.append_long_data(&[1, 0]);
        assert_eq!(registry.get(1).unwrap().long_data(0), None);
    }

    #[test]
    fn test_reset_unknown_stmt() {
        let mut registry: StmtRegistry<u64> = StmtRegistry::new();
        let err = registry.reset(&3u32.to_le_bytes()).unwrap_err();
        assert_eq!(
            err,
            CmdError::UnknownStmt {
                stmt_id: 3,
                command: "mysqld_stmt_reset"
            }
        );
    }

    #[tokio::test]
    async fn test_close_removes_and_hands_back_context() {
        let mut handler = RecordingHandler::default();
        let mut registry = StmtRegistry::new();
        registry.prepare(&mut handler, "SELECT 1").await.unwrap();
        registry.close(&mut handler, &2u32.to_le_bytes()).await;
        assert_eq!(registry.len(), 1);
        registry.close(&mut handler, &1u32.to_le_bytes()).await;
        assert!(registry.is_empty());
        assert_eq!(handler.closed, vec![0xC0FFEE]);
    }

    #[tokio::test]
    async fn test_close_all() {
        let mut handler = RecordingHandler::default();
        let mut registry = StmtRegistry::new();
        registry.prepare(&mut handler, "SELECT 1").await.unwrap();
        registry.prepare(&mut handler, "SELECT 2").await.unwrap();
        registry.close_all(&mut handler).await;
        assert!(registry.is_empty());
        assert_eq!(handler.closed.len(), 2);
    }
}
