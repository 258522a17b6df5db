use crate::error::CmdError;
use crate::protocol::mysql::constants::{CommandCode, PARAM_UNSIGNED_FLAG};
use byteorder::{LittleEndian, ReadBytesExt};
use mysql_common::constants::ColumnType;
use mysql_common::value::Value;
use std::io;

/// Parameter types bound by the most recent execute that sent them.
/// `true` marks an unsigned integer parameter.
pub type BoundTypes = Vec<(ColumnType, bool)>;

fn malformed(reason: impl Into<String>) -> CmdError {
    CmdError::malformed(CommandCode::ComStmtExecute, reason)
}

fn io_malformed(e: io::Error) -> CmdError {
    malformed(format!("truncated parameter block: {e}"))
}

fn read_lenenc_int(r: &mut &[u8]) -> io::Result<u64> {
    match r.read_u8()? {
        0xfc => r.read_u16::<LittleEndian>().map(u64::from),
        0xfd => r.read_u24::<LittleEndian>().map(u64::from),
        0xfe => r.read_u64::<LittleEndian>(),
        b => Ok(u64::from(b)),
    }
}

fn read_lenenc_bytes(r: &mut &[u8]) -> io::Result<Vec<u8>> {
    let len = read_lenenc_int(r)? as usize;
    if r.len() < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("need {len} bytes, {} left", r.len()),
        ));
    }
    let (bytes, rest) = r.split_at(len);
    *r = rest;
    Ok(bytes.to_vec())
}

fn read_binary_value(r: &mut &[u8], column_type: ColumnType, unsigned: bool) -> io::Result<Value> {
    use ColumnType::*;
    let value = match column_type {
        MYSQL_TYPE_NULL => Value::NULL,
        MYSQL_TYPE_TINY if unsigned => Value::UInt(u64::from(r.read_u8()?)),
        MYSQL_TYPE_TINY => Value::Int(i64::from(r.read_i8()?)),
        MYSQL_TYPE_SHORT | MYSQL_TYPE_YEAR if unsigned => {
            Value::UInt(u64::from(r.read_u16::<LittleEndian>()?))
        }
        MYSQL_TYPE_SHORT | MYSQL_TYPE_YEAR => Value::Int(i64::from(r.read_i16::<LittleEndian>()?)),
        MYSQL_TYPE_LONG | MYSQL_TYPE_INT24 if unsigned => {
            Value::UInt(u64::from(r.read_u32::<LittleEndian>()?))
        }
        MYSQL_TYPE_LONG | MYSQL_TYPE_INT24 => Value::Int(i64::from(r.read_i32::<LittleEndian>()?)),
        MYSQL_TYPE_LONGLONG if unsigned => Value::UInt(r.read_u64::<LittleEndian>()?),
        MYSQL_TYPE_LONGLONG => Value::Int(r.read_i64::<LittleEndian>()?),
        MYSQL_TYPE_FLOAT => Value::Float(r.read_f32::<LittleEndian>()?),
        MYSQL_TYPE_DOUBLE => Value::Double(r.read_f64::<LittleEndian>()?),
        MYSQL_TYPE_DATE | MYSQL_TYPE_DATETIME | MYSQL_TYPE_TIMESTAMP | MYSQL_TYPE_DATETIME2
        | MYSQL_TYPE_TIMESTAMP2 => {
            let len = r.read_u8()?;
            let (mut year, mut month, mut day) = (0, 0, 0);
            let (mut hour, mut minute, mut second, mut micros) = (0, 0, 0, 0);
            if len >= 4 {
                year = r.read_u16::<LittleEndian>()?;
                month = r.read_u8()?;
                day = r.read_u8()?;
            }
            if len >= 7 {
                hour = r.read_u8()?;
                minute = r.read_u8()?;
                second = r.read_u8()?;
            }
            if len >= 11 {
                micros = r.read_u32::<LittleEndian>()?;
            }
            Value::Date(year, month, day, hour, minute, second, micros)
        }
        MYSQL_TYPE_TIME | MYSQL_TYPE_TIME2 => {
            let len = r.read_u8()?;
            let (mut negative, mut days) = (false, 0);
            let (mut hours, mut minutes, mut seconds, mut micros) = (0, 0, 0, 0);
            if len >= 8 {
                negative = r.read_u8()? == 1;
                days = r.read_u32::<LittleEndian>()?;
                hours = r.read_u8()?;
                minutes = r.read_u8()?;
                seconds = r.read_u8()?;
            }
            if len >= 12 {
                micros = r.read_u32::<LittleEndian>()?;
            }
            Value::Time(negative, days, hours, minutes, seconds, micros)
        }
        // strings, decimals, blobs, json, bit, enum, set and geometry travel as length encoded bytes.
        _ => Value::Bytes(read_lenenc_bytes(r)?),
    };
    Ok(value)
}

/// Decodes the parameter values of a COM_STMT_EXECUTE payload.
///
/// `data` is the whole payload after the command byte. Types sent with the
/// new-params-bound flag replace `bound_types`; later executes without the flag reuse them.
/// A parameter with accumulated long data takes that data as its value and consumes
/// nothing from the payload.
pub fn execute_params(
    data: &[u8],
    params: u16,
    long_data: &[Option<Vec<u8>>],
    bound_types: &mut BoundTypes,
) -> Result<Vec<Value>, CmdError> {
    let mut r = data;
    // statement id, cursor flags and iteration count.
    if r.len() < 9 {
        return Err(malformed("missing execute header"));
    }
    r = &r[9..];
    if params == 0 {
        return Ok(Vec::new());
    }

    let params = params as usize;
    let bitmap_len = (params + 7) / 8;
    if r.len() < bitmap_len + 1 {
        return Err(malformed("missing null bitmap"));
    }
    let (null_bitmap, rest) = r.split_at(bitmap_len);
    r = rest;
    let new_params_bound = r.read_u8().map_err(io_malformed)?;
    if new_params_bound == 1 {
        let mut types = Vec::with_capacity(params);
        for _ in 0..params {
            let ty = r.read_u8().map_err(io_malformed)?;
            let flags = r.read_u8().map_err(io_malformed)?;
            let column_type = ColumnType::try_from(ty)
                .map_err(|_| malformed(format!("unknown parameter type {ty:#x}")))?;
            types.push((column_type, flags & PARAM_UNSIGNED_FLAG != 0));
        }
        *bound_types = types;
    }
    if bound_types.len() != params {
        return Err(malformed("parameter types were never bound"));
    }

    let mut values = Vec::with_capacity(params);
    for (index, (column_type, unsigned)) in bound_types.iter().enumerate() {
        if null_bitmap[index / 8] & (1 << (index % 8)) != 0 {
            values.push(Value::NULL);
            continue;
        }
        if let Some(Some(data)) = long_data.get(index) {
            values.push(Value::Bytes(data.clone()));
            continue;
        }
        values.push(read_binary_value(&mut r, *column_type, *unsigned).map_err(io_malformed)?);
    }
    Ok(values)
}
