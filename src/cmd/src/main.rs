mod demo_handler;

use crate::demo_handler::DemoHandler;
use clap::Parser;
use common::ShutdownMessage;
use mysrv::server::mysql_server::MySqlServer;
use mysrv::server::server_args::ServerArgs;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tokio::sync::watch::Receiver;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

async fn shutdown_await(mut shutdown_rx: Box<Receiver<ShutdownMessage>>) {
    let changed_rs = &shutdown_rx.changed().await;
    if changed_rs.is_ok() {
        let canceled = shutdown_rx.borrow_and_update().clone();
        if let ShutdownMessage::Cancel(msg) = canceled {
            info!("MySrv process receive shutdown msg {msg}");
        }
    }
}

async fn shutdown_signal() -> ShutdownMessage {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("MySrv failed to install Ctrl+C handler {e:?}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("MySrv failed to install terminate handler {e:?}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        ctrl_c_v = ctrl_c => {
            let msg = format!("MySrv receive ctrl_c signal  {ctrl_c_v:?}");
            ShutdownMessage::Cancel(msg)
        },
        v = terminate => {
            let msg =  format!("MySrv receive terminate signal  {v:?}");
            ShutdownMessage::Cancel(msg)
        },
    }
}

fn start_metrics_and_rest(
    server_args: &ServerArgs,
    runtime: &Runtime,
    shutdown_rx: &Receiver<ShutdownMessage>,
) {
    if !server_args.enable_metrics {
        return;
    }
    common::metrics::init_metrics_context();
    let http_port = server_args.http_port;
    let shutdown_rx_clone = Box::new(shutdown_rx.clone());
    runtime.spawn(async move {
        if let Err(e) = web_service::http_server::MySrvRest::start_server(
            "0.0.0.0".to_string(),
            http_port,
            true,
            shutdown_await(shutdown_rx_clone),
        )
        .await
        {
            warn!("MySrvRest stopped {e:?}");
        }
    });
}

fn main() -> anyhow::Result<()> {
    let server_args = ServerArgs::parse();
    let log_level_string = server_args
        .log_level
        .clone()
        .unwrap_or("INFO".to_string());
    let level = Level::from_str(log_level_string.as_str())?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("INFO,hyper=INFO,tower=INFO"))
        .add_directive(level.into())
        .add_directive("hyper=INFO".parse()?)
        .add_directive("tower=INFO".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_line_number(true)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("MYSRV")
        .worker_threads(server_args.works)
        .build()?;

    info!("MySrv running config args={:?}", server_args);
    let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownMessage::Init);
    start_metrics_and_rest(&server_args, &runtime, &shutdown_rx);

    runtime.block_on(async {
        let listener = TcpListener::bind(server_args.listen_addr()).await?;
        let server = Arc::new(
            MySqlServer::new(DemoHandler::default, server_args.authenticator())
                .with_max_packet_len(server_args.max_packet_len),
        );
        let accept_loop = tokio::spawn(server.run(listener, shutdown_rx));

        let shutdown_msg = shutdown_signal().await;
        if shutdown_tx.send(shutdown_msg).is_err() {
            warn!("MySrv no receiver for the shutdown message");
        }
        accept_loop.await??;
        Ok::<(), anyhow::Error>(())
    })
}
