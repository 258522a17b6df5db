use async_trait::async_trait;
use mysql_common::constants::{ColumnFlags, ColumnType};
use mysql_common::value::Value;
use mysrv::error::CmdError;
use mysrv::protocol::mysql::basic::Column;
use mysrv::protocol::mysql::error_codes::ErrorKind;
use mysrv::server::cmd_handler::{CmdHandler, StmtMeta};
use mysrv::server::response::{AffectedRows, QueryResult, Resultset};
use tracing::debug;

/// A toy handler that answers the base command set without any storage behind it.
///
/// `SELECT` queries echo their text as one row, any other query reports zero affected
/// rows, and an execute returns its bound parameters as a single row.
#[derive(Debug, Default)]
pub struct DemoHandler {
    db: Option<String>,
}

impl DemoHandler {
    pub fn current_db(&self) -> Option<&str> {
        self.db.as_deref()
    }

    fn table_name(&self) -> &str {
        self.db.as_deref().unwrap_or("")
    }
}

fn is_select(query: &str) -> bool {
    query
        .trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"))
}

fn column_of(name: String, value: &Value) -> Column {
    let (column_type, flags) = match value {
        Value::NULL => (ColumnType::MYSQL_TYPE_NULL, ColumnFlags::empty()),
        Value::Bytes(_) => (ColumnType::MYSQL_TYPE_VAR_STRING, ColumnFlags::empty()),
        Value::Int(_) => (ColumnType::MYSQL_TYPE_LONGLONG, ColumnFlags::empty()),
        Value::UInt(_) => (ColumnType::MYSQL_TYPE_LONGLONG, ColumnFlags::UNSIGNED_FLAG),
        Value::Float(_) => (ColumnType::MYSQL_TYPE_FLOAT, ColumnFlags::empty()),
        Value::Double(_) => (ColumnType::MYSQL_TYPE_DOUBLE, ColumnFlags::empty()),
        Value::Date(..) => (ColumnType::MYSQL_TYPE_DATETIME, ColumnFlags::empty()),
        Value::Time(..) => (ColumnType::MYSQL_TYPE_TIME, ColumnFlags::empty()),
    };
    Column::new("", name, column_type).with_flags(flags)
}

#[async_trait]
impl CmdHandler for DemoHandler {
    /// The prepared query text.
    type Context = String;

    async fn use_db(&mut self, db: &str) -> Result<(), CmdError> {
        debug!("MySrv demo use_db {db}");
        self.db = Some(db.to_string());
        Ok(())
    }

    async fn on_query(&mut self, query: &str) -> Result<QueryResult, CmdError> {
        if is_select(query) {
            let mut rs = Resultset::new(vec![Column::new(
                self.table_name(),
                "query",
                ColumnType::MYSQL_TYPE_VAR_STRING,
            )]);
            rs.push_row(vec![Value::Bytes(query.as_bytes().to_vec())]);
            Ok(QueryResult::Rows(rs))
        } else {
            Ok(QueryResult::Affected(AffectedRows::default()))
        }
    }

    async fn on_field_list(
        &mut self,
        table: &str,
        _wildcard: &str,
    ) -> Result<Vec<Column>, CmdError> {
        Ok(vec![
            Column::new(table, "id", ColumnType::MYSQL_TYPE_LONGLONG)
                .with_flags(ColumnFlags::NOT_NULL_FLAG | ColumnFlags::PRI_KEY_FLAG),
            Column::new(table, "name", ColumnType::MYSQL_TYPE_VAR_STRING),
        ])
    }

    async fn on_prepare(&mut self, query: &str) -> Result<StmtMeta<String>, CmdError> {
        let params = query.matches('?').count();
        let params = u16::try_from(params).map_err(|_| {
            CmdError::server(
                ErrorKind::ER_WRONG_ARGUMENTS,
                format!("too many placeholders ({params})"),
            )
        })?;
        Ok(StmtMeta {
            params,
            columns: 1,
            context: query.to_string(),
        })
    }

    async fn on_execute(
        &mut self,
        context: &String,
        _query: &str,
        params: &[Value],
    ) -> Result<QueryResult, CmdError> {
        debug!("MySrv demo execute {context} with {} params", params.len());
        let columns = params
            .iter()
            .enumerate()
            .map(|(idx, value)| column_of(format!("param{idx}"), value))
            .collect();
        let mut rs = Resultset::new(columns);
        rs.push_row(params.to_vec());
        Ok(QueryResult::Rows(rs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_select_echoes_query() {
        let mut handler = DemoHandler::default();
        handler.use_db("demo").await.unwrap();
        assert_eq!(handler.current_db(), Some("demo"));
        let QueryResult::Rows(rs) = handler.on_query("  select 1").await.unwrap() else {
            panic!("select must return rows");
        };
        assert_eq!(rs.columns[0].table, "demo");
        assert_eq!(rs.rows, vec![vec![Value::Bytes(b"  select 1".to_vec())]]);
    }

    #[tokio::test]
    async fn test_other_query_is_affected_rows() {
        let mut handler = DemoHandler::default();
        assert_eq!(
            handler.on_query("insert into t values (1)").await.unwrap(),
            QueryResult::Affected(AffectedRows::default())
        );
        assert!(!is_select("sel"));
    }

    #[tokio::test]
    async fn test_prepare_and_execute() {
        let mut handler = DemoHandler::default();
        let meta = handler.on_prepare("select ?, ?").await.unwrap();
        assert_eq!((meta.params, meta.columns), (2, 1));
        let params = vec![Value::Int(-1), Value::UInt(7)];
        let QueryResult::Rows(rs) = handler
            .on_execute(&meta.context, "select ?, ?", &params)
            .await
            .unwrap()
        else {
            panic!("execute must return rows");
        };
        assert_eq!(rs.columns.len(), 2);
        assert!(rs.columns[1].is_unsigned());
        assert_eq!(rs.rows, vec![params]);
    }

    #[tokio::test]
    async fn test_field_list_and_no_replication() {
        let mut handler = DemoHandler::default();
        let columns = handler.on_field_list("users", "").await.unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].table, "users");
        assert!(handler.as_replication().is_none());
    }
}
