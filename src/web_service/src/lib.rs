pub mod http_handler;
pub mod http_server;
