use crate::protocol::mysql::basic::Column;
use crate::protocol::mysql::constants::TEXT_NULL;
use byteorder::{LittleEndian, WriteBytesExt};
use mysql_common::constants::ColumnType;
use mysql_common::io::WriteMysqlExt;
use mysql_common::value::Value;
use std::io::{self, Write};

fn bad_value(value: &Value, column: &Column) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!(
            "value {:?} cannot be sent as {:?} for column {}",
            value, column.column_type, column.column
        ),
    )
}

fn date_text(value: &Value, column_type: ColumnType) -> Option<String> {
    match *value {
        Value::Date(y, m, d, _, _, _, _) if column_type == ColumnType::MYSQL_TYPE_DATE => {
            Some(format!("{y:04}-{m:02}-{d:02}"))
        }
        Value::Date(y, m, d, h, mi, s, 0) => {
            Some(format!("{y:04}-{m:02}-{d:02} {h:02}:{mi:02}:{s:02}"))
        }
        Value::Date(y, m, d, h, mi, s, us) => Some(format!(
            "{y:04}-{m:02}-{d:02} {h:02}:{mi:02}:{s:02}.{us:06}"
        )),
        Value::Time(neg, days, h, mi, s, us) => {
            let sign = if neg { "-" } else { "" };
            let hours = u64::from(days) * 24 + u64::from(h);
            if us == 0 {
                Some(format!("{sign}{hours:02}:{mi:02}:{s:02}"))
            } else {
                Some(format!("{sign}{hours:02}:{mi:02}:{s:02}.{us:06}"))
            }
        }
        _ => None,
    }
}

/// Text protocol: NULL is `0xfb`, everything else a length encoded string.
pub fn write_text_value<W: Write>(w: &mut W, value: &Value, column: &Column) -> io::Result<()> {
    match value {
        Value::NULL => w.write_u8(TEXT_NULL),
        Value::Bytes(bytes) => w.write_lenenc_str(bytes).map(|_| ()),
        Value::Int(v) => w.write_lenenc_str(v.to_string().as_bytes()).map(|_| ()),
        Value::UInt(v) => w.write_lenenc_str(v.to_string().as_bytes()).map(|_| ()),
        Value::Float(v) => w.write_lenenc_str(v.to_string().as_bytes()).map(|_| ()),
        Value::Double(v) => w.write_lenenc_str(v.to_string().as_bytes()).map(|_| ()),
        Value::Date(..) | Value::Time(..) => {
            let text = date_text(value, column.column_type).ok_or_else(|| bad_value(value, column))?;
            w.write_lenenc_str(text.as_bytes()).map(|_| ())
        }
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match *value {
        Value::Int(v) => Some(v),
        Value::UInt(v) => i64::try_from(v).ok(),
        _ => None,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match *value {
        Value::Int(v) => u64::try_from(v).ok(),
        Value::UInt(v) => Some(v),
        _ => None,
    }
}

/// Binary protocol encoding of a non NULL value. NULLs live in the row's null bitmap.
pub fn write_bin_value<W: Write>(w: &mut W, value: &Value, column: &Column) -> io::Result<()> {
    use ColumnType::*;
    let unsigned = column.is_unsigned();
    match column.column_type {
        MYSQL_TYPE_TINY => {
            if unsigned {
                let v = as_u64(value).and_then(|v| u8::try_from(v).ok());
                w.write_u8(v.ok_or_else(|| bad_value(value, column))?)
            } else {
                let v = as_i64(value).and_then(|v| i8::try_from(v).ok());
                w.write_i8(v.ok_or_else(|| bad_value(value, column))?)
            }
        }
        MYSQL_TYPE_SHORT | MYSQL_TYPE_YEAR => {
            if unsigned {
                let v = as_u64(value).and_then(|v| u16::try_from(v).ok());
                w.write_u16::<LittleEndian>(v.ok_or_else(|| bad_value(value, column))?)
            } else {
                let v = as_i64(value).and_then(|v| i16::try_from(v).ok());
                w.write_i16::<LittleEndian>(v.ok_or_else(|| bad_value(value, column))?)
            }
        }
        MYSQL_TYPE_LONG | MYSQL_TYPE_INT24 => {
            if unsigned {
                let v = as_u64(value).and_then(|v| u32::try_from(v).ok());
                w.write_u32::<LittleEndian>(v.ok_or_else(|| bad_value(value, column))?)
            } else {
                let v = as_i64(value).and_then(|v| i32::try_from(v).ok());
                w.write_i32::<LittleEndian>(v.ok_or_else(|| bad_value(value, column))?)
            }
        }
        MYSQL_TYPE_LONGLONG => {
            if unsigned {
                w.write_u64::<LittleEndian>(as_u64(value).ok_or_else(|| bad_value(value, column))?)
            } else {
                w.write_i64::<LittleEndian>(as_i64(value).ok_or_else(|| bad_value(value, column))?)
            }
        }
        MYSQL_TYPE_FLOAT => match *value {
            Value::Float(v) => w.write_f32::<LittleEndian>(v),
            _ => Err(bad_value(value, column)),
        },
        MYSQL_TYPE_DOUBLE => match *value {
            Value::Float(v) => w.write_f64::<LittleEndian>(f64::from(v)),
            Value::Double(v) => w.write_f64::<LittleEndian>(v),
            _ => Err(bad_value(value, column)),
        },
        MYSQL_TYPE_DATE | MYSQL_TYPE_DATETIME | MYSQL_TYPE_TIMESTAMP | MYSQL_TYPE_DATETIME2
        | MYSQL_TYPE_TIMESTAMP2 => match *value {
            Value::Date(y, m, d, h, mi, s, us) => {
                if us != 0 {
                    w.write_u8(11)?;
                } else if h != 0 || mi != 0 || s != 0 {
                    w.write_u8(7)?;
                } else {
                    w.write_u8(4)?;
                }
                w.write_u16::<LittleEndian>(y)?;
                w.write_all(&[m, d])?;
                if h != 0 || mi != 0 || s != 0 || us != 0 {
                    w.write_all(&[h, mi, s])?;
                }
                if us != 0 {
                    w.write_u32::<LittleEndian>(us)?;
                }
                Ok(())
            }
            _ => Err(bad_value(value, column)),
        },
        MYSQL_TYPE_TIME | MYSQL_TYPE_TIME2 => match *value {
            Value::Time(neg, days, h, mi, s, us) => {
                w.write_u8(if us != 0 { 12 } else { 8 })?;
                w.write_u8(u8::from(neg))?;
                w.write_u32::<LittleEndian>(days)?;
                w.write_all(&[h, mi, s])?;
                if us != 0 {
                    w.write_u32::<LittleEndian>(us)?;
                }
                Ok(())
            }
            _ => Err(bad_value(value, column)),
        },
        // everything else is sent the way the text protocol sends it.
        _ => write_text_value(w, value, column),
    }
}
