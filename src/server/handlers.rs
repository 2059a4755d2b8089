//! HTTP handlers of the prober's control surface.
//!
//! `/healthz` answers readiness probes from the cluster's own state and never
//! performs network I/O. Every other route reads or replaces one coordination
//! field published by the reconciler.
use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::{event, instrument, Level};

use crate::cluster::state::{Dc, State as ClusterState};
use crate::credentials::SharedCredentials;
use crate::error::{Error, InvalidRequest, Result};

/// Upper bound for PUT payloads
const MAX_BODY_SIZE: usize = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AppState {
    pub cluster: ClusterState,
    pub credentials: SharedCredentials,
}

#[instrument(name = "server::healthz", level = "debug", skip(app, connect_info))]
pub async fn healthz(
    State(app): State<AppState>,
    Path(broadcast_ip): Path<String>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Result<Response> {
    let pod_ip = connect_info.map(|ConnectInfo(addr)| addr.ip().to_string());
    readiness_response(&app, &broadcast_ip, pod_ip)
}

/// Readiness probe for the caller itself, identified by its socket address
pub async fn healthz_self(
    State(app): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Result<Response> {
    let ConnectInfo(addr) =
        connect_info.ok_or(Error::InvalidRequest(InvalidRequest::MissingRemoteAddress))?;
    let ip = addr.ip().to_string();
    readiness_response(&app, &ip, Some(ip.clone()))
}

fn readiness_response(app: &AppState, ip: &str, pod_ip: Option<String>) -> Result<Response> {
    let readiness = app.cluster.probe(ip, pod_ip.as_deref())?;
    let status = if readiness.ready {
        StatusCode::OK
    } else {
        event!(
            Level::INFO,
            broadcast_ip = %ip,
            pod_ip = ?pod_ip,
            "health check failed"
        );
        StatusCode::NOT_FOUND
    };

    Ok((status, Json(readiness.view)).into_response())
}

pub async fn ping() -> &'static str {
    "pong"
}

/// Parses booleans the way the reconciler writes them:
/// `1 t T TRUE true True` and `0 f F FALSE false False`
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

async fn read_body(body: Body) -> Result<Bytes> {
    axum::body::to_bytes(body, MAX_BODY_SIZE)
        .await
        .map_err(|err| Error::Io {
            reason: format!("unable to read request body: {}", err),
        })
}

async fn json_body<T: DeserializeOwned>(body: Body) -> Result<T> {
    let bytes = read_body(body).await?;
    serde_json::from_slice(&bytes)
        .map_err(|err| Error::InvalidRequest(InvalidRequest::InvalidJsonPayload(err.to_string())))
}

async fn bool_body(body: Body) -> Result<bool> {
    let bytes = read_body(body).await?;
    let value = std::str::from_utf8(&bytes)
        .map_err(|_| Error::InvalidRequest(InvalidRequest::BodyNotUtf8))?;
    parse_bool(value)
        .ok_or_else(|| Error::InvalidRequest(InvalidRequest::InvalidBoolean(value.to_string())))
}

pub async fn get_seeds(State(app): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(app.cluster.seeds()?))
}

pub async fn put_seeds(State(app): State<AppState>, body: Body) -> Result<StatusCode> {
    let seeds: Vec<String> = json_body(body).await?;
    event!(Level::INFO, ?seeds, "seeds updated");
    app.cluster.set_seeds(seeds)?;
    Ok(StatusCode::OK)
}

pub async fn get_dcs(State(app): State<AppState>) -> Result<Json<Vec<Dc>>> {
    Ok(Json(app.cluster.dcs()?))
}

pub async fn put_dcs(State(app): State<AppState>, body: Body) -> Result<StatusCode> {
    let dcs: Vec<Dc> = json_body(body).await?;
    event!(Level::INFO, ?dcs, "dcs updated");
    app.cluster.set_dcs(dcs)?;
    Ok(StatusCode::OK)
}

pub async fn get_region_ready(State(app): State<AppState>) -> Result<String> {
    Ok(app.cluster.region_ready()?.to_string())
}

pub async fn put_region_ready(State(app): State<AppState>, body: Body) -> Result<StatusCode> {
    let ready = bool_body(body).await?;
    event!(Level::INFO, ready, "region readiness updated");
    app.cluster.set_region_ready(ready)?;
    Ok(StatusCode::OK)
}

pub async fn get_reaper_ready(State(app): State<AppState>) -> Result<String> {
    Ok(app.cluster.reaper_ready()?.to_string())
}

pub async fn put_reaper_ready(State(app): State<AppState>, body: Body) -> Result<StatusCode> {
    let ready = bool_body(body).await?;
    event!(Level::INFO, ready, "reaper readiness updated");
    app.cluster.set_reaper_ready(ready)?;
    Ok(StatusCode::OK)
}

pub async fn get_region_ips(State(app): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(app.cluster.region_ips()?))
}

pub async fn put_region_ips(State(app): State<AppState>, body: Body) -> Result<StatusCode> {
    let ips: Vec<String> = json_body(body).await?;
    event!(Level::INFO, ?ips, "region ips updated");
    app.cluster.set_region_ips(ips)?;
    Ok(StatusCode::OK)
}

pub async fn get_reaper_ips(State(app): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(app.cluster.reaper_ips()?))
}

pub async fn put_reaper_ips(State(app): State<AppState>, body: Body) -> Result<StatusCode> {
    let ips: Vec<String> = json_body(body).await?;
    event!(Level::INFO, ?ips, "reaper ips updated");
    app.cluster.set_reaper_ips(ips)?;
    Ok(StatusCode::OK)
}

pub async fn get_pod_ips(
    State(app): State<AppState>,
) -> Result<Json<std::collections::BTreeMap<String, String>>> {
    Ok(Json(app.cluster.pod_ips()?))
}
