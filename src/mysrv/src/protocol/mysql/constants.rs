use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive as _;
use strum_macros::{AsRefStr, EnumIter, IntoStaticStr};

// max packet payload length.
pub const MAX_PAYLOAD_LEN: usize = 16_777_215;

pub const PACKET_HEADER_LEN: usize = 4;
/// Largest joined payload a peer may send, matching mysqld's default `max_allowed_packet`.
pub const DEFAULT_MAX_PACKET_LEN: usize = 64 * 1024 * 1024;
/// auth-plugin-data-part-1 The first 8 bytes of the scramble sent in the initial handshake.
pub const AUTH_PLUGIN_DATA_PART_1_LENGTH: usize = 8;
/// The length of the random number required for encryption. (auth-plugin-data-part-1 + auth-plugin-data-part-2)
pub const SCRAMBLE_SIZE: usize = 20;

/// utf8mb4_general_ci
pub const DEFAULT_COLLATION_ID: u8 = 45;

/// Marker written in the `default values` slot of a COM_FIELD_LIST column definition.
pub const FIELD_LIST_DEFAULT_MARKER: u8 = 0xfb;

/// Length-encoded NULL inside a text protocol row.
pub const TEXT_NULL: u8 = 0xfb;

/// Bit set on the parameter type byte of COM_STMT_EXECUTE when the parameter is unsigned.
pub const PARAM_UNSIGNED_FLAG: u8 = 0x80;

#[derive(Debug, PartialEq, AsRefStr)]
pub enum AuthPluginName {
    #[strum(serialize = "caching_sha2_password")]
    AuthCachingSha2Password,
    #[strum(serialize = "mysql_native_password")]
    AuthNativePassword,
}

#[derive(Debug, PartialEq, ToPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum HeaderInfo {
    OKHeader = 0x00,
    ErrHeader = 0xff,
    EOFHeader = 0xfe,
}

/// Command byte of a client packet in the command phase.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Copy,
    FromPrimitive,
    ToPrimitive,
    AsRefStr,
    EnumIter,
    IntoStaticStr,
)]
#[repr(u8)]
pub enum CommandCode {
    ComSleep = 0,
    ComQuit,
    ComInitDB,
    ComQuery,
    ComFieldList,
    ComCreateDB,
    ComDropDB,
    ComRefresh,
    ComShutdown,
    ComStatistics,
    ComProcessInfo,
    ComConnect,
    ComProcessKill,
    ComDebug,
    ComPing,
    ComTime,
    ComDelayedInsert,
    ComChangeUser,
    ComBinlogDump,
    ComTableDump,
    ComConnectOut,
    ComRegisterSlave,
    ComStmtPrepare,
    ComStmtExecute,
    ComStmtSendLongData,
    ComStmtClose,
    ComStmtReset,
    ComSetOption,
    ComStmtFetch,
    ComDaemon,
    ComBinlogDumpGtid,
    ComResetConnection,
}

impl CommandCode {
    /// Name of a raw command byte, `ComUnknown` outside the known range.
    pub fn name_of(code: u8) -> &'static str {
        match CommandCode::from_u8(code) {
            Some(com) => com.into(),
            None => "ComUnknown",
        }
    }
}

#[cfg(test)]
mod test {
    use crate::protocol::mysql::constants::*;
    use strum::IntoEnumIterator;

    #[test]
    pub fn max_packet_size_test() {
        let max_u24_size = 16_777_215;
        assert_eq!(max_u24_size, MAX_PAYLOAD_LEN);
    }

    #[test]
    pub fn test_command_code_values() {
        assert_eq!(CommandCode::ComQuery as u8, 0x03);
        assert_eq!(CommandCode::ComBinlogDump as u8, 0x12);
        assert_eq!(CommandCode::ComRegisterSlave as u8, 0x15);
        assert_eq!(CommandCode::ComStmtExecute as u8, 0x17);
        assert_eq!(CommandCode::ComSetOption as u8, 0x1b);
        assert_eq!(CommandCode::ComBinlogDumpGtid as u8, 0x1e);
    }

    #[test]
    pub fn test_command_names_match_as_ref() {
        for com in CommandCode::iter() {
            assert_eq!(CommandCode::name_of(com as u8), com.as_ref());
        }
        assert_eq!(CommandCode::name_of(0xfe), "ComUnknown");
    }
}
