use crate::error::CmdError;
use crate::protocol::mysql::constants::CommandCode as ComInfo;
use crate::protocol::mysql::packet::packet_reader::PacketReader;
use crate::protocol::mysql::packet::packet_writer::PacketWriter;
use mysql_common::constants::{CapabilityFlags, ColumnFlags, ColumnType, StatusFlags};
use num_traits::FromPrimitive;
use winnow::binary::{le_u16, le_u24, le_u32, le_u64, le_u8};
use winnow::token::{literal, take, take_until};
use winnow::Parser;

/// The transport handle of one connection.
pub struct PacketIO<R, W> {
    pub reader: PacketReader<R>,
    pub writer: PacketWriter<W>,
}

impl<R, W> PacketIO<R, W> {
    pub fn new(reader: PacketReader<R>, writer: PacketWriter<W>) -> Self {
        Self { reader, writer }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// This column's associated table.
    ///
    /// Note: that this is *technically* the table's alias.
    pub table: String,
    /// This column's name.
    ///
    /// Note: that this is *technically* the column's alias.
    pub column: String,
    /// This column's type>
    pub column_type: ColumnType,
    /// Any flags associated with this column.
    ///
    /// Of particular interest are `ColumnFlags::UNSIGNED_FLAG` and `ColumnFlags::NOT_NULL_FLAG`.
    pub column_flags: ColumnFlags,
}

impl Column {
    pub fn new(table: impl Into<String>, column: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            column_type,
            column_flags: ColumnFlags::empty(),
        }
    }

    pub fn with_flags(mut self, column_flags: ColumnFlags) -> Self {
        self.column_flags = column_flags;
        self
    }

    pub fn is_unsigned(&self) -> bool {
        self.column_flags.contains(ColumnFlags::UNSIGNED_FLAG)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OkPacket {
    /// header
    pub header: u8,
    /// affected rows in update/insert
    pub affected_rows: u64,
    /// insert_id in update/insert
    pub last_insert_id: u64,
    /// StatusFlags associated with this query
    pub status_flags: StatusFlags,
    /// Warnings
    pub warnings: u16,
    /// Extra information
    pub info: String,
    /// session state change information
    pub session_state_info: String,
}

/// `HandshakeResponse` represents the client's reply to the initial handshake packet.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HandshakeResponse {
    pub client_flag: CapabilityFlags,
    pub max_packet_len: u32,
    pub collation: u16,
    pub username: Option<Vec<u8>>,
    pub auth_response: Vec<u8>,
    pub auth_plugin: Vec<u8>,
    pub database: Option<Vec<u8>>,
}

impl HandshakeResponse {
    pub fn db_user_string(&self) -> String {
        match &self.username {
            Some(username) => String::from_utf8_lossy(username).to_string(),
            None => "_NONE".to_string(),
        }
    }
}

fn null_terminated(i: &[u8]) -> winnow::IResult<&[u8], &[u8]> {
    let (i, bytes) = take_until(0.., &b"\0"[..]).parse_peek(i)?;
    let (i, _) = literal(&b"\0"[..]).parse_peek(i)?;
    Ok((i, bytes))
}

// mysql handshake response:
// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase_packets_protocol_handshake_response.html
pub fn client_handshake_response(
    i: &[u8],
    is_after_tls: bool,
) -> winnow::IResult<&[u8], HandshakeResponse> {
    let (i, capability_flags) = le_u16.parse_peek(i)?;
    let capabilities = CapabilityFlags::from_bits_truncate(capability_flags as u32);
    if !capabilities.contains(CapabilityFlags::CLIENT_PROTOCOL_41) {
        // HandshakeResponse320 is rejected by the caller; keep the flags only.
        let (i, max_packet_len) = le_u24.parse_peek(i)?;
        return Ok((
            i,
            HandshakeResponse {
                client_flag: capabilities,
                max_packet_len,
                collation: 0,
                username: None,
                auth_response: vec![],
                auth_plugin: vec![],
                database: None,
            },
        ));
    }

    // HandshakeResponse41
    let (i, cap2) = le_u16.parse_peek(i)?;
    let cap = (cap2 as u32) << 16 | capability_flags as u32;
    let capabilities = CapabilityFlags::from_bits_truncate(cap);

    let (i, max_packet_len) = le_u32.parse_peek(i)?;
    let (i, collation) = le_u8.parse_peek(i)?;
    let (i, _) = take(23u8).parse_peek(i)?;

    if !is_after_tls && capabilities.contains(CapabilityFlags::CLIENT_SSL) {
        return Ok((
            i,
            HandshakeResponse {
                client_flag: capabilities,
                max_packet_len,
                collation: u16::from(collation),
                username: None,
                auth_response: vec![],
                auth_plugin: vec![],
                database: None,
            },
        ));
    }

    let (i, username) = null_terminated(i)?;
    let (i, auth_response) =
        if capabilities.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA) {
            let (i, size) = read_length_encoded_number(i)?;
            take(size).parse_peek(i)?
        } else if capabilities.contains(CapabilityFlags::CLIENT_SECURE_CONNECTION) {
            let (i, size) = le_u8.parse_peek(i)?;
            take(size).parse_peek(i)?
        } else {
            null_terminated(i)?
        };

    let (i, database) =
        if capabilities.contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB) && !i.is_empty() {
            let (i, db) = null_terminated(i)?;
            (i, Some(db.to_vec()))
        } else {
            (i, None)
        };

    let (i, auth_plugin) =
        if capabilities.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH) && !i.is_empty() {
            null_terminated(i)?
        } else {
            (i, &b""[..])
        };

    // connection attributes are not used by this server.
    Ok((
        &i[i.len()..],
        HandshakeResponse {
            client_flag: capabilities,
            max_packet_len,
            collation: u16::from(collation),
            username: Some(username.to_vec()),
            auth_response: auth_response.to_vec(),
            auth_plugin: auth_plugin.to_vec(),
            database,
        },
    ))
}

pub fn read_length_encoded_number(i: &[u8]) -> winnow::IResult<&[u8], u64> {
    let (i, b) = le_u8.parse_peek(i)?;
    match b {
        0xfb => Ok((i, 0)),
        0xfc => {
            let (i, v) = le_u16.parse_peek(i)?;
            Ok((i, u64::from(v)))
        }
        0xfd => {
            let (i, v) = le_u24.parse_peek(i)?;
            Ok((i, u64::from(v)))
        }
        0xfe => le_u64.parse_peek(i),
        _ => Ok((i, u64::from(b))),
    }
}

/// A command packet split by command byte.
///
/// Payload decoding beyond the split is left to the dispatcher: statement and
/// replication payloads are only decoded once the target operation is known.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Quit,
    Query(&'a [u8]),
    Ping,
    InitDb(&'a [u8]),
    FieldList { table: &'a [u8], wildcard: &'a [u8] },
    StmtPrepare(&'a [u8]),
    StmtExecute(&'a [u8]),
    StmtSendLongData(&'a [u8]),
    StmtClose(&'a [u8]),
    StmtReset(&'a [u8]),
    SetOption(&'a [u8]),
    RegisterSlave(&'a [u8]),
    BinlogDump(&'a [u8]),
    BinlogDumpGtid(&'a [u8]),
    Other(&'a [u8]),
}

/// Splits a command packet into its command byte and a [`Command`].
pub fn from_packet(pkt: &[u8]) -> Result<(u8, Command<'_>), CmdError> {
    let (&com, data) = pkt
        .split_first()
        .ok_or_else(|| CmdError::malformed(ComInfo::ComSleep, "empty command packet"))?;
    let command = match ComInfo::from_u8(com) {
        Some(ComInfo::ComQuit) => Command::Quit,
        Some(ComInfo::ComQuery) => Command::Query(data),
        Some(ComInfo::ComPing) => Command::Ping,
        Some(ComInfo::ComInitDB) => Command::InitDb(data),
        Some(ComInfo::ComFieldList) => {
            // table name, 0x00, then the field wildcard up to the end of the packet.
            let index = data.iter().position(|b| *b == 0x00).ok_or_else(|| {
                CmdError::malformed(ComInfo::ComFieldList, "missing table terminator")
            })?;
            Command::FieldList {
                table: &data[..index],
                wildcard: &data[index + 1..],
            }
        }
        Some(ComInfo::ComStmtPrepare) => Command::StmtPrepare(data),
        Some(ComInfo::ComStmtExecute) => Command::StmtExecute(data),
        Some(ComInfo::ComStmtSendLongData) => Command::StmtSendLongData(data),
        Some(ComInfo::ComStmtClose) => Command::StmtClose(data),
        Some(ComInfo::ComStmtReset) => Command::StmtReset(data),
        Some(ComInfo::ComSetOption) => Command::SetOption(data),
        Some(ComInfo::ComRegisterSlave) => Command::RegisterSlave(data),
        Some(ComInfo::ComBinlogDump) => Command::BinlogDump(data),
        Some(ComInfo::ComBinlogDumpGtid) => Command::BinlogDumpGtid(data),
        _ => Command::Other(data),
    };
    Ok((com, command))
}

/// Reads the leading statement id of COM_STMT_EXECUTE/CLOSE/RESET/SEND_LONG_DATA.
pub fn stmt_id(command: ComInfo, data: &[u8]) -> Result<u32, CmdError> {
    le_u32
        .parse_peek(data)
        .map(|(_, id)| id)
        .map_err(|_: winnow::error::ErrMode<winnow::error::InputError<&[u8]>>| {
            CmdError::malformed(command, "missing statement id")
        })
}

/// COM_STMT_SEND_LONG_DATA: statement id, parameter index, then the data chunk.
pub fn send_long_data(data: &[u8]) -> winnow::IResult<&[u8], (u32, u16, &[u8])> {
    let (i, stmt) = le_u32.parse_peek(data)?;
    let (i, param) = le_u16.parse_peek(i)?;
    Ok((&i[i.len()..], (stmt, param, i)))
}

/// Decodes a text payload, refusing bytes that are not UTF-8.
pub fn utf8_payload(command: ComInfo, data: &[u8]) -> Result<&str, CmdError> {
    std::str::from_utf8(data).map_err(|e| CmdError::malformed(command, e.to_string()))
}
