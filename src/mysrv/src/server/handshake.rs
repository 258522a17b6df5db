use crate::async_packet_read;
use crate::error::CmdError;
use crate::protocol::mysql::basic::{client_handshake_response, OkPacket, PacketIO};
use crate::protocol::mysql::constants::{AuthPluginName, HeaderInfo};
use crate::protocol::mysql::error_codes::ErrorKind;
use crate::protocol::mysql::packet::packet_writer::PacketWriter;
use crate::protocol::mysql::packet::writers;
use crate::server::auth::{gen_user_salt, Authenticator};
use crate::server::cmd_handler::CmdHandler;
use crate::server::conn::Conn;
use crate::server::{default_capabilities, SERVER_VERSION};

use mysql_common::constants::{CapabilityFlags, StatusFlags};
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// Writes `err` as the last packet of a failed connection phase and returns the error
/// the caller reports.
async fn refuse<W: AsyncWrite + Unpin>(
    conn_id: u32,
    writer: &mut PacketWriter<W>,
    err: CmdError,
    kind: io::ErrorKind,
) -> io::Error {
    warn!("MySrv conn {} handshake refused: {}", conn_id, err);
    let written = async {
        writers::write_err_packet(err.kind(), err.to_string().as_bytes(), writer).await?;
        writer.flush_all().await
    }
    .await;
    match written {
        Ok(()) => io::Error::new(kind, err.to_string()),
        Err(e) => e,
    }
}

/// Runs the connection phase on a fresh transport and returns the connection ready for
/// the command phase.
///
/// The server speaks first with the protocol 10 handshake. A client that is not
/// `CLIENT_PROTOCOL_41`, asks for TLS, or fails authentication gets an ERR packet and
/// the error is returned. When the client answered for another auth plugin the server
/// asks it to switch to `mysql_native_password` with the same scramble.
pub async fn accept<R, W, H, A>(
    conn_id: u32,
    mut io: PacketIO<R, W>,
    mut handler: H,
    authenticator: &A,
) -> io::Result<Conn<R, W, H>>
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin,
    H: CmdHandler,
    A: Authenticator + ?Sized,
{
    let scramble = gen_user_salt();
    io.writer.reset_seq();
    writers::write_initial_handshake(&mut io.writer, conn_id, scramble, SERVER_VERSION).await?;

    let (seq, pkt) = async_packet_read!(io.reader);
    io.writer.set_seq(seq.wrapping_add(1));
    let response = match client_handshake_response(&pkt, false) {
        Ok((_, response)) => response,
        Err(e) => {
            debug!("MySrv conn {} bad handshake response {:?}", conn_id, e);
            let err = CmdError::server(ErrorKind::ER_HANDSHAKE_ERROR, "Bad handshake");
            return Err(refuse(conn_id, &mut io.writer, err, io::ErrorKind::InvalidData).await);
        }
    };

    if !response
        .client_flag
        .contains(CapabilityFlags::CLIENT_PROTOCOL_41)
    {
        let err = CmdError::server(
            ErrorKind::ER_HANDSHAKE_ERROR,
            "Client does not support protocol 4.1",
        );
        return Err(refuse(conn_id, &mut io.writer, err, io::ErrorKind::Unsupported).await);
    }
    if response.client_flag.contains(CapabilityFlags::CLIENT_SSL) {
        let err = CmdError::server(
            ErrorKind::ER_HANDSHAKE_ERROR,
            "SSL connection is not supported",
        );
        return Err(refuse(conn_id, &mut io.writer, err, io::ErrorKind::Unsupported).await);
    }

    let native = AuthPluginName::AuthNativePassword.as_ref().as_bytes();
    let mut auth_response = response.auth_response.clone();
    if !response.auth_plugin.is_empty() && response.auth_plugin != native {
        debug!(
            "MySrv conn {} switch auth plugin from {}",
            conn_id,
            String::from_utf8_lossy(&response.auth_plugin)
        );
        writers::write_auth_switch_request(
            &mut io.writer,
            AuthPluginName::AuthNativePassword,
            scramble,
        )
        .await?;
        let (seq, switched) = async_packet_read!(io.reader);
        io.writer.set_seq(seq.wrapping_add(1));
        auth_response = switched.to_vec();
    }

    let user = response.db_user_string();
    if let Err(err) = authenticator
        .authenticate(&user, &scramble, &auth_response)
        .await
    {
        return Err(refuse(conn_id, &mut io.writer, err, io::ErrorKind::PermissionDenied).await);
    }

    if let Some(db) = &response.database {
        let selected = match std::str::from_utf8(db) {
            Ok(db) => handler.use_db(db).await,
            Err(_) => Err(CmdError::server(
                ErrorKind::ER_BAD_DB_ERROR,
                format!("Unknown database '{}'", String::from_utf8_lossy(db)),
            )),
        };
        if let Err(err) = selected {
            return Err(refuse(conn_id, &mut io.writer, err, io::ErrorKind::NotFound).await);
        }
    }

    let capabilities = response.client_flag & default_capabilities();
    let ok = OkPacket {
        header: HeaderInfo::OKHeader as u8,
        status_flags: StatusFlags::SERVER_STATUS_AUTOCOMMIT,
        ..Default::default()
    };
    writers::write_ok_packet_with_client_flags(&mut io.writer, capabilities, ok).await?;
    io.writer.flush_all().await?;
    io.writer.reset_seq();

    info!(
        "MySrv conn {} authenticated user={} db={:?}",
        conn_id,
        user,
        response
            .database
            .as_deref()
            .map(String::from_utf8_lossy)
    );
    Ok(Conn::new(conn_id, io, capabilities, handler))
}
