use crate::http_handler::*;

use anyhow::anyhow;
use axum::routing::get;
use axum::Router;
use std::future::Future;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{error, info};

pub struct MySrvRest;

impl MySrvRest {
    pub fn router(enable_metric: bool) -> Router {
        let mut app = Router::new().route("/", get("Hi I'm MySrvREST"));
        if enable_metric {
            app = app.merge(route_metrics(MetricsHandler {}));
        }
        app.layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new()))
    }

    pub async fn start_server<F>(
        addr: String,
        port: u16,
        enable_metric: bool,
        shutdown: F,
    ) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = Self::router(enable_metric);
        let listener = tokio::net::TcpListener::bind(format!("{addr}:{port}")).await?;
        info!("MySrvRest listening on {addr}:{port}");

        match axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Failed to start MySrvRest {e:?}");
                Err(anyhow!(e.to_string()))
            }
        }
    }
}
