//! This file contains the prober [`Server`]:
//!  1. the HTTP control surface ([`router`]) served by axum
//!  2. the background tasks feeding it
//!    - the [`crate::cluster::poller`] refreshing node states every polling interval
//!    - the [`crate::credentials::watcher`] keeping admin credentials in sync with their secret
//!
//! Background tasks live as long as the server: they are aborted once `run` returns.
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{event, Level};

use crate::cluster::{poller::start_poller, state::State};
use crate::credentials::{watcher::watch_admin_secret, SharedCredentials};
use crate::jmx::{jolokia::JolokiaClient, SyncJmxClient};

use self::config::Config;
use self::handlers::AppState;

pub mod auth;
pub mod config;
pub mod handlers;
pub mod metrics;

/// Builds the control surface.
/// Coordination routes sit behind basic auth, `/healthz`, `/ping` and `/metrics` don't.
pub fn router(app: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/region-ready",
            get(handlers::get_region_ready).put(handlers::put_region_ready),
        )
        .route(
            "/reaper-ready",
            get(handlers::get_reaper_ready).put(handlers::put_reaper_ready),
        )
        .route("/seeds", get(handlers::get_seeds).put(handlers::put_seeds))
        .route("/dcs", get(handlers::get_dcs).put(handlers::put_dcs))
        .route(
            "/region-ips",
            get(handlers::get_region_ips).put(handlers::put_region_ips),
        )
        .route(
            "/reaper-ips",
            get(handlers::get_reaper_ips).put(handlers::put_reaper_ips),
        )
        .route("/pod-ips", get(handlers::get_pod_ips))
        .route_layer(middleware::from_fn_with_state(
            app.credentials.clone(),
            auth::require_basic_auth,
        ));

    Router::new()
        .route("/healthz", get(handlers::healthz_self))
        .route("/healthz/:broadcastip", get(handlers::healthz))
        .route("/ping", get(handlers::ping))
        .merge(protected)
        .route_layer(middleware::from_fn(metrics::track_metrics))
        .route("/metrics", get(metrics::render))
        .with_state(app)
}

pub struct Server {
    listener: TcpListener,
    app: AppState,
    jmx: SyncJmxClient,
    polling_interval: Duration,
    background: Vec<JoinHandle<()>>,
}

impl Server {
    /// Binds the control surface on `port` (0 picks an ephemeral one).
    /// No background task is started until [`Server::run`].
    pub async fn new(
        port: u16,
        polling_interval: Duration,
        jmx: SyncJmxClient,
        credentials: SharedCredentials,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;

        Ok(Self {
            listener,
            app: AppState {
                cluster: State::new(),
                credentials,
            },
            jmx,
            polling_interval,
            background: Vec::new(),
        })
    }

    /// Wires the production collaborators: the local jolokia proxy and the
    /// kubernetes watch on the admin secret.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let credentials = SharedCredentials::default();
        let jmx = Arc::new(JolokiaClient::new(
            config.jolokia_port,
            config.jmx_port,
            config.jolokia_timeout(),
            credentials.clone(),
        )?);

        let kube_client = kube::Client::try_default().await?;

        let mut server = Self::new(
            config.server_port,
            config.jmx_polling_interval,
            jmx,
            credentials.clone(),
        )
        .await?;

        server.background.push(tokio::spawn(watch_admin_secret(
            kube_client,
            config.pod_namespace,
            config.admin_secret_name,
            credentials,
        )));

        Ok(server)
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Cluster state shared by the poller and the handlers
    pub fn state(&self) -> State {
        self.app.cluster.clone()
    }

    /// Serves until `shutdown` completes
    pub async fn run<F>(mut self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future + Send + 'static,
    {
        self.background.push(tokio::spawn(start_poller(
            self.app.cluster.clone(),
            self.jmx.clone(),
            self.polling_interval,
        )));

        event!(
            Level::INFO,
            "Cassandra's prober listening on {}",
            self.listener.local_addr()?
        );

        let result = axum::serve(
            self.listener,
            router(self.app).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown.await;
        })
        .await;

        for task in self.background {
            task.abort();
        }
        event!(Level::INFO, "prober stopped");

        Ok(result?)
    }
}
