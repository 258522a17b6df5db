use crate::protocol::mysql::constants::CommandCode;
use common::metrics::common_labels;
use mysql_common::constants::CapabilityFlags;
use std::collections::HashMap;
use std::sync::OnceLock;
use strum::IntoEnumIterator;

pub mod auth;
pub mod cmd_handler;
pub mod conn;
mod dispatcher;
pub mod handshake;
pub mod mysql_server;
pub mod response;
pub mod server_args;
pub mod stmt;

pub const SERVER_VERSION: &[u8] = b"8.0.34-mysrv";
pub const MYSRV_COM_METRIC_LABEL_KEY: &str = "mysrv_com";

pub static DEFAULT_CAPABILITIES_ONCE: OnceLock<CapabilityFlags> = OnceLock::new();

static MYSRV_COM: OnceLock<HashMap<u8, Vec<(&'static str, String)>>> = OnceLock::new();

/// Latency labels of every known command, keyed by command byte.
pub fn init_sql_com_labels() -> &'static HashMap<u8, Vec<(&'static str, String)>> {
    MYSRV_COM.get_or_init(|| {
        let process_labels = common_labels();
        CommandCode::iter()
            .map(|com| {
                (
                    com as u8,
                    [
                        &vec![(MYSRV_COM_METRIC_LABEL_KEY, com.as_ref().to_string())][..],
                        &process_labels[..],
                    ]
                    .concat(),
                )
            })
            .collect::<HashMap<u8, Vec<(&'static str, String)>>>()
    })
}

/// Labels for a command byte, falling back to an `unknown` entry for bytes outside the table.
pub fn sql_com_labels(com: u8) -> &'static Vec<(&'static str, String)> {
    static UNKNOWN_COM: OnceLock<Vec<(&'static str, String)>> = OnceLock::new();
    match init_sql_com_labels().get(&com) {
        Some(labels) => labels,
        None => UNKNOWN_COM.get_or_init(|| {
            [
                &vec![(MYSRV_COM_METRIC_LABEL_KEY, "ComUnknown".to_string())][..],
                &common_labels()[..],
            ]
            .concat()
        }),
    }
}

// CLIENT_SSL is never announced: this server has no TLS.
// COM_QUERY: https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_query.html
pub fn default_capabilities() -> CapabilityFlags {
    *DEFAULT_CAPABILITIES_ONCE.get_or_init(|| {
        CapabilityFlags::CLIENT_CONNECT_ATTRS
            | CapabilityFlags::CLIENT_CONNECT_WITH_DB
            | CapabilityFlags::CLIENT_DEPRECATE_EOF
            | CapabilityFlags::CLIENT_FOUND_ROWS
            | CapabilityFlags::CLIENT_IGNORE_SIGPIPE
            | CapabilityFlags::CLIENT_IGNORE_SPACE
            | CapabilityFlags::CLIENT_INTERACTIVE
            | CapabilityFlags::CLIENT_LONG_FLAG
            | CapabilityFlags::CLIENT_LONG_PASSWORD
            | CapabilityFlags::CLIENT_MULTI_RESULTS
            | CapabilityFlags::CLIENT_PLUGIN_AUTH
            | CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
            | CapabilityFlags::CLIENT_PROTOCOL_41
            | CapabilityFlags::CLIENT_PS_MULTI_RESULTS
            | CapabilityFlags::CLIENT_RESERVED
            | CapabilityFlags::CLIENT_SECURE_CONNECTION
            | CapabilityFlags::CLIENT_SESSION_TRACK
            | CapabilityFlags::CLIENT_TRANSACTIONS
    })
}
