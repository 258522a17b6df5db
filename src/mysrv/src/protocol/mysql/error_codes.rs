//! Server error codes written into ERR packets.
//!
//! Only the codes this server produces are listed. Numbers and SQLSTATEs follow
//! the [server error reference](https://dev.mysql.com/doc/mysql-errors/8.0/en/server-error-reference.html).
#![allow(non_camel_case_types)]

use num_derive::{FromPrimitive, ToPrimitive};

#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum ErrorKind {
    ER_HANDSHAKE_ERROR = 1043,
    ER_ACCESS_DENIED_ERROR = 1045,
    ER_UNKNOWN_COM_ERROR = 1047,
    ER_BAD_DB_ERROR = 1049,
    ER_BAD_FIELD_ERROR = 1054,
    ER_PARSE_ERROR = 1064,
    ER_UNKNOWN_ERROR = 1105,
    ER_NO_SUCH_TABLE = 1146,
    ER_WRONG_ARGUMENTS = 1210,
    ER_NOT_SUPPORTED_YET = 1235,
    ER_UNKNOWN_STMT_HANDLER = 1243,
    ER_ACCESS_DENIED_NO_PASSWORD_ERROR = 1698,
    ER_MALFORMED_PACKET = 1835,
}

impl ErrorKind {
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Five byte SQLSTATE written after the `#` marker.
    pub fn sqlstate(self) -> &'static [u8; 5] {
        match self {
            ErrorKind::ER_HANDSHAKE_ERROR | ErrorKind::ER_UNKNOWN_COM_ERROR => b"08S01",
            ErrorKind::ER_ACCESS_DENIED_ERROR => b"28000",
            ErrorKind::ER_BAD_DB_ERROR => b"42000",
            ErrorKind::ER_BAD_FIELD_ERROR => b"42S22",
            ErrorKind::ER_PARSE_ERROR => b"42000",
            ErrorKind::ER_NO_SUCH_TABLE => b"42S02",
            ErrorKind::ER_NOT_SUPPORTED_YET => b"42000",
            ErrorKind::ER_ACCESS_DENIED_NO_PASSWORD_ERROR => b"28000",
            ErrorKind::ER_UNKNOWN_ERROR
            | ErrorKind::ER_WRONG_ARGUMENTS
            | ErrorKind::ER_UNKNOWN_STMT_HANDLER
            | ErrorKind::ER_MALFORMED_PACKET => b"HY000",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorKind;
    use num_traits::FromPrimitive;

    #[test]
    fn test_code_round_trip() {
        assert_eq!(ErrorKind::ER_UNKNOWN_STMT_HANDLER.code(), 1243);
        assert_eq!(
            ErrorKind::from_u16(1047),
            Some(ErrorKind::ER_UNKNOWN_COM_ERROR)
        );
        assert_eq!(ErrorKind::from_u16(1), None);
    }

    #[test]
    fn test_sqlstate() {
        assert_eq!(ErrorKind::ER_UNKNOWN_COM_ERROR.sqlstate(), b"08S01");
        assert_eq!(ErrorKind::ER_MALFORMED_PACKET.sqlstate(), b"HY000");
    }
}
