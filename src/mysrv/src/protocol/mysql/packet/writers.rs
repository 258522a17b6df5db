use crate::protocol::mysql::basic::{Column, OkPacket};
use crate::protocol::mysql::constants::{
    AuthPluginName, HeaderInfo, AUTH_PLUGIN_DATA_PART_1_LENGTH, DEFAULT_COLLATION_ID,
    FIELD_LIST_DEFAULT_MARKER,
};
use crate::protocol::mysql::error_codes::ErrorKind;
use crate::protocol::mysql::packet::packet_writer::PacketWriter;
use crate::protocol::mysql::value::{write_bin_value, write_text_value};
use crate::server::default_capabilities;

use byteorder::{LittleEndian, WriteBytesExt};
use mysql_common::constants::{CapabilityFlags, ColumnType, StatusFlags};
use mysql_common::io::WriteMysqlExt;
use mysql_common::value::Value;
use std::io::{self, Write};
use tokio::io::AsyncWrite;

pub async fn write_err_packet<W: AsyncWrite + Unpin>(
    err: ErrorKind,
    msg: &[u8],
    w: &mut PacketWriter<W>,
) -> io::Result<()> {
    w.write_u8(HeaderInfo::ErrHeader as u8)?;
    w.write_u16::<LittleEndian>(err.code())?;
    w.write_u8(b'#')?;
    w.write_all(err.sqlstate())?;
    w.write_all(msg)?;
    w.end_packet().await
}

pub async fn write_eof_packet<W: AsyncWrite + Unpin>(
    w: &mut PacketWriter<W>,
    s: StatusFlags,
) -> io::Result<()> {
    w.write_all(&[HeaderInfo::EOFHeader as u8, 0x00, 0x00])?;
    w.write_u16::<LittleEndian>(s.bits())?;
    w.end_packet().await
}

pub async fn write_ok_packet_with_client_flags<W: AsyncWrite + Unpin>(
    w: &mut PacketWriter<W>,
    client_capabilities: CapabilityFlags,
    ok_packet: OkPacket,
) -> io::Result<()> {
    w.write_u8(ok_packet.header)?; // OK packet type
    w.write_lenenc_int(ok_packet.affected_rows)?;
    w.write_lenenc_int(ok_packet.last_insert_id)?;
    if client_capabilities.contains(CapabilityFlags::CLIENT_PROTOCOL_41) {
        w.write_u16::<LittleEndian>(ok_packet.status_flags.bits())?;
        w.write_u16::<LittleEndian>(ok_packet.warnings)?;
    } else if client_capabilities.contains(CapabilityFlags::CLIENT_TRANSACTIONS) {
        w.write_u16::<LittleEndian>(ok_packet.status_flags.bits())?;
    }

    if client_capabilities.contains(CapabilityFlags::CLIENT_SESSION_TRACK) {
        w.write_lenenc_str(ok_packet.info.as_bytes())?;
        if ok_packet
            .status_flags
            .contains(StatusFlags::SERVER_SESSION_STATE_CHANGED)
        {
            w.write_lenenc_str(ok_packet.session_state_info.as_bytes())?;
        }
    } else {
        w.write_all(ok_packet.info.as_bytes())?;
    }
    w.end_packet().await
}

/// Terminates a row stream: EOF for old clients, an OK packet with the EOF header
/// when `CLIENT_DEPRECATE_EOF` was negotiated.
pub async fn write_end_of_rows<W: AsyncWrite + Unpin>(
    w: &mut PacketWriter<W>,
    client_capabilities: CapabilityFlags,
    status_flags: StatusFlags,
) -> io::Result<()> {
    if client_capabilities.contains(CapabilityFlags::CLIENT_DEPRECATE_EOF) {
        let ok_packet = OkPacket {
            header: HeaderInfo::EOFHeader as u8,
            status_flags,
            ..Default::default()
        };
        write_ok_packet_with_client_flags(w, client_capabilities, ok_packet).await
    } else {
        write_eof_packet(w, status_flags).await
    }
}

/// COM_STMT_PREPARE_OK followed by placeholder definitions.
///
/// Only the counts are known after prepare, so parameters are described as `?` and
/// result columns as anonymous strings.
pub async fn write_prepare_ok<W: AsyncWrite + Unpin>(
    id: u32,
    params: u16,
    columns: u16,
    w: &mut PacketWriter<W>,
    client_capabilities: CapabilityFlags,
) -> io::Result<()> {
    w.write_u8(HeaderInfo::OKHeader as u8)?;
    w.write_u32::<LittleEndian>(id)?;
    w.write_u16::<LittleEndian>(columns)?;
    w.write_u16::<LittleEndian>(params)?;
    w.write_u8(0x00)?;
    w.write_u16::<LittleEndian>(0)?; // number of warnings
    w.end_packet().await?;

    if params > 0 {
        let placeholders =
            vec![Column::new("", "?", ColumnType::MYSQL_TYPE_VAR_STRING); params as usize];
        write_column_definitions_41(&placeholders, w, client_capabilities, false).await?;
    }
    if columns > 0 {
        let anonymous =
            vec![Column::new("", "", ColumnType::MYSQL_TYPE_VAR_STRING); columns as usize];
        write_column_definitions_41(&anonymous, w, client_capabilities, false).await?;
    }
    Ok(())
}

pub async fn write_column_definitions<'a, I, W>(
    i: I,
    w: &mut PacketWriter<W>,
    client_capabilities: CapabilityFlags,
) -> io::Result<()>
where
    I: IntoIterator<Item = &'a Column>,
    <I as IntoIterator>::IntoIter: ExactSizeIterator,
    W: AsyncWrite + Unpin,
{
    let i = i.into_iter();
    w.write_lenenc_int(i.len() as u64)?;
    w.end_packet().await?;
    write_column_definitions_41(i, w, client_capabilities, false).await
}

// works for Protocol::ColumnDefinition41 is set
// see: https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_query_response_text_resultset_column_definition.html
pub async fn write_column_definitions_41<'a, I, W>(
    i: I,
    w: &mut PacketWriter<W>,
    client_capabilities: CapabilityFlags,
    is_com_field_list: bool,
) -> io::Result<()>
where
    I: IntoIterator<Item = &'a Column>,
    W: AsyncWrite + Unpin,
{
    for c in i {
        w.write_lenenc_str(b"def")?;
        w.write_lenenc_str(b"")?;
        w.write_lenenc_str(c.table.as_bytes())?;
        w.write_lenenc_str(c.table.as_bytes())?;
        w.write_lenenc_str(c.column.as_bytes())?;
        w.write_lenenc_str(c.column.as_bytes())?;
        w.write_lenenc_int(0xC)?;
        w.write_u16::<LittleEndian>(u16::from(DEFAULT_COLLATION_ID))?;
        w.write_u32::<LittleEndian>(1024)?;
        w.write_u8(c.column_type as u8)?;
        w.write_u16::<LittleEndian>(c.column_flags.bits())?;
        w.write_all(&[0x00])?; // decimals
        w.write_all(&[0x00, 0x00])?; // unused

        if is_com_field_list {
            w.write_u8(FIELD_LIST_DEFAULT_MARKER)?;
        }
        w.end_packet().await?;
    }

    if is_com_field_list {
        write_end_of_rows(w, client_capabilities, StatusFlags::empty()).await
    } else if !client_capabilities.contains(CapabilityFlags::CLIENT_DEPRECATE_EOF) {
        write_eof_packet(w, StatusFlags::empty()).await
    } else {
        Ok(())
    }
}

/// Encodes the rows of a COM_QUERY result set in the text protocol.
///
/// Every row is encoded before anything is written, so a row that does not match its
/// columns fails while the wire is still clean.
pub fn encode_text_rows(columns: &[Column], rows: &[Vec<Value>]) -> io::Result<Vec<Vec<u8>>> {
    rows.iter()
        .map(|row| {
            check_row_width(row, columns)?;
            let mut out = Vec::new();
            for (value, column) in row.iter().zip(columns) {
                write_text_value(&mut out, value, column)?;
            }
            Ok(out)
        })
        .collect()
}

/// Encodes the rows of a COM_STMT_EXECUTE result set in the binary protocol.
pub fn encode_binary_rows(columns: &[Column], rows: &[Vec<Value>]) -> io::Result<Vec<Vec<u8>>> {
    // the first two bits of a binary row's null bitmap are reserved.
    let bitmap_len = (columns.len() + 7 + 2) / 8;
    rows.iter()
        .map(|row| {
            check_row_width(row, columns)?;
            let mut out = vec![0u8; 1 + bitmap_len];
            out[0] = HeaderInfo::OKHeader as u8;
            for (index, (value, column)) in row.iter().zip(columns).enumerate() {
                if *value == Value::NULL {
                    let bit = index + 2;
                    out[1 + bit / 8] |= 1 << (bit % 8);
                } else {
                    write_bin_value(&mut out, value, column)?;
                }
            }
            Ok(out)
        })
        .collect()
}

/// Column count, column definitions, the encoded rows and the end-of-rows marker.
pub async fn write_resultset<W: AsyncWrite + Unpin>(
    columns: &[Column],
    rows: &[Vec<u8>],
    w: &mut PacketWriter<W>,
    client_capabilities: CapabilityFlags,
) -> io::Result<()> {
    write_column_definitions(columns, w, client_capabilities).await?;
    for row in rows {
        w.write_all(row)?;
        w.end_packet().await?;
    }
    write_end_of_rows(
        w,
        client_capabilities,
        StatusFlags::SERVER_STATUS_AUTOCOMMIT,
    )
    .await
}

fn check_row_width(row: &[Value], columns: &[Column]) -> io::Result<()> {
    if row.len() != columns.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("row has {} values for {} columns", row.len(), columns.len()),
        ));
    }
    Ok(())
}

pub async fn write_initial_handshake<W: AsyncWrite + Unpin>(
    writer: &mut PacketWriter<W>,
    conn_id: u32,
    scramble: [u8; 20],
    server_version: &[u8],
) -> io::Result<()> {
    writer.write_all(&[10])?; // protocol 10

    writer.write_all(server_version)?;
    writer.write_all(&[0x00])?;
    writer.write_u32::<LittleEndian>(conn_id)?;
    let server_capabilities_vec = default_capabilities().bits().to_le_bytes();

    writer.write_all(&scramble[0..AUTH_PLUGIN_DATA_PART_1_LENGTH])?; // auth-plugin-data-part-1
    writer.write_all(&[0x00])?;

    writer.write_all(&server_capabilities_vec[..2])?; // The lower 2 bytes of the Capabilities Flags

    writer.write_all(&[DEFAULT_COLLATION_ID])?;
    writer.write_all(&StatusFlags::SERVER_STATUS_AUTOCOMMIT.bits().to_le_bytes())?; // status_flags
    writer.write_all(&server_capabilities_vec[2..4])?; // The upper 2 bytes of the Capabilities Flags

    writer.write_all(&((scramble.len() + 1) as u8).to_le_bytes())?;

    writer.write_all(&[0x00; 10][..])?; // 10 bytes filler
    writer.write_all(&scramble[AUTH_PLUGIN_DATA_PART_1_LENGTH..])?; // 12 bytes
    writer.write_all(&[0x00])?;

    // Plugin name
    writer.write_all(AuthPluginName::AuthNativePassword.as_ref().as_bytes())?;
    writer.write_all(&[0x00])?;
    writer.end_packet().await?;
    writer.flush_all().await
}

pub async fn write_auth_switch_request<W: AsyncWrite + Unpin>(
    writer: &mut PacketWriter<W>,
    plugin: AuthPluginName,
    scramble: [u8; 20],
) -> io::Result<()> {
    writer.write_u8(HeaderInfo::EOFHeader as u8)?;
    writer.write_all(plugin.as_ref().as_bytes())?;
    writer.write_u8(0x00)?;
    writer.write_all(&scramble)?;
    writer.write_u8(0x00)?;
    writer.end_packet().await?;
    writer.flush_all().await
}
