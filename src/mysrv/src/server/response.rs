use crate::protocol::mysql::basic::Column;
use crate::protocol::mysql::binlog::BinlogStreamer;
use mysql_common::value::Value;

/// Rows returned by a query or a statement execute.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Resultset {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl Resultset {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AffectedRows {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub info: String,
}

/// What a query or execute produced: rows, or an affected-rows acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Rows(Resultset),
    Affected(AffectedRows),
}

/// Descriptor of a freshly prepared statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StmtPrepared {
    pub stmt_id: u32,
    pub params: u16,
    pub columns: u16,
}

/// The one value produced per command. The connection encodes it according to the
/// negotiated capabilities; an error takes its place as `Err(CmdError)`.
#[derive(Debug)]
pub enum Response {
    /// Nothing is written.
    NoResponse,
    Ok,
    Eof,
    /// Result of COM_QUERY, rows go out in the text protocol.
    Query(QueryResult),
    /// Result of COM_STMT_EXECUTE, rows go out in the binary protocol.
    Execute(QueryResult),
    Fields(Vec<Column>),
    Prepared(StmtPrepared),
    Binlog(BinlogStreamer),
}
