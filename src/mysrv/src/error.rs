use crate::protocol::mysql::constants::CommandCode;
use crate::protocol::mysql::error_codes::ErrorKind;

/// Error produced while serving one command.
///
/// Every variant is an ordinary response: the connection stays usable after it is
/// written as an ERR packet. Transport failures are `std::io::Error` and never appear here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CmdError {
    /// Reported by a command handler and passed to the client verbatim.
    #[error("{message}")]
    Server { kind: ErrorKind, message: String },
    /// The command payload could not be decoded.
    #[error("malformed {command} packet: {reason}")]
    Malformed {
        command: &'static str,
        reason: String,
    },
    #[error("Unknown prepared statement handler ({stmt_id}) given to {command}")]
    UnknownStmt { stmt_id: u32, command: &'static str },
    /// A handler operation the concrete handler does not implement.
    #[error("{operation} is not supported now")]
    NotSupported { operation: &'static str },
    /// The catch-all answer for a command byte nobody handles.
    #[error("command {cmd} is not supported now")]
    UnknownCommand { cmd: u8 },
}

impl CmdError {
    pub fn server(kind: ErrorKind, message: impl Into<String>) -> Self {
        CmdError::Server {
            kind,
            message: message.into(),
        }
    }

    pub fn malformed(command: CommandCode, reason: impl Into<String>) -> Self {
        CmdError::Malformed {
            command: command.into(),
            reason: reason.into(),
        }
    }

    pub fn not_supported(operation: &'static str) -> Self {
        CmdError::NotSupported { operation }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CmdError::Server { kind, .. } => *kind,
            CmdError::Malformed { .. } => ErrorKind::ER_MALFORMED_PACKET,
            CmdError::UnknownStmt { .. } => ErrorKind::ER_UNKNOWN_STMT_HANDLER,
            CmdError::NotSupported { .. } => ErrorKind::ER_NOT_SUPPORTED_YET,
            CmdError::UnknownCommand { .. } => ErrorKind::ER_UNKNOWN_COM_ERROR,
        }
    }

    /// True for the two "nobody implements this" outcomes.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            CmdError::NotSupported { .. } | CmdError::UnknownCommand { .. }
        )
    }
}
