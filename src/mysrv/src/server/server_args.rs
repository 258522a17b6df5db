use crate::server::auth::authenticator::{AllowAnyUser, NativePassword};
use crate::server::auth::Authenticator;
use crate::protocol::mysql::constants::DEFAULT_MAX_PACKET_LEN;

use clap::Parser;
use std::sync::Arc;

#[derive(Parser, Default, Debug, Clone)]
#[clap(
    name = "mysql-cmd-server",
    version = "0.1.0",
    about = "server side of the MySQL client/server protocol."
)]
pub struct ServerArgs {
    #[clap(long, value_name = "WORKS", default_value_t = 4)]
    pub works: usize,
    #[clap(long, value_name = "ADDR", default_value = "0.0.0.0")]
    pub addr: String,
    #[clap(long, value_name = "PORT", default_value_t = 3306)]
    pub port: u16,
    #[clap(long, value_name = "HTTP_PORT", default_value_t = 9000)]
    pub http_port: u16,
    #[clap(long, value_name = "ENABLE METRICS COLLECTOR", default_value_t = false)]
    pub enable_metrics: bool,
    #[clap(long, value_name = "LOG_LEVEL")]
    pub log_level: Option<String>,
    /// Without a user every login is accepted.
    #[clap(long, value_name = "USER")]
    pub user: Option<String>,
    #[clap(long, value_name = "PASSWORD")]
    pub password: Option<String>,
    /// Largest packet accepted from a client, in bytes.
    #[clap(long, value_name = "MAX_PACKET_LEN", default_value_t = DEFAULT_MAX_PACKET_LEN)]
    pub max_packet_len: usize,
}

impl ServerArgs {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }

    pub fn authenticator(&self) -> Arc<dyn Authenticator> {
        match &self.user {
            Some(user) => Arc::new(NativePassword::new(
                user.as_str(),
                self.password.as_deref().unwrap_or_default(),
            )),
            None => Arc::new(AllowAnyUser),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = ServerArgs::parse_from(["mysql-cmd-server"]);
        assert_eq!(args.port, 3306);
        assert_eq!(args.works, 4);
        assert_eq!(args.http_port, 9000);
        assert!(!args.enable_metrics);
        assert_eq!(args.max_packet_len, 64 * 1024 * 1024);
        assert_eq!(args.listen_addr(), "0.0.0.0:3306");
    }

    #[tokio::test]
    async fn test_authenticator_from_user() {
        let scramble = [1u8; 20];
        let open = ServerArgs::parse_from(["mysql-cmd-server"]).authenticator();
        assert!(open.authenticate("x", &scramble, b"y").await.is_ok());

        let args = ServerArgs::parse_from([
            "mysql-cmd-server",
            "--user",
            "root",
            "--port",
            "3307",
            "--addr",
            "127.0.0.1",
            "--max-packet-len",
            "1024",
        ]);
        assert_eq!(args.listen_addr(), "127.0.0.1:3307");
        assert_eq!(args.max_packet_len, 1024);
        let native = args.authenticator();
        assert!(native.authenticate("root", &scramble, &[]).await.is_ok());
        assert!(native.authenticate("x", &scramble, &[]).await.is_err());
    }
}
