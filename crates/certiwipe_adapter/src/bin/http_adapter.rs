#![forbid(unsafe_code)]

use std::{collections::HashMap, env, net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use certiwipe_adapter::{AdapterError, AdapterRuntime, VerifyCertificateRequest};
use certiwipe_os::device_query::ListDevicesQuery;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

type SharedRuntime = Arc<AdapterRuntime>;

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct StatusChangeBody {
    #[serde(default)]
    status: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = env::var("CERTIWIPE_LOG")
        .or_else(|_| env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let bind = env::var("CERTIWIPE_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let addr: SocketAddr = bind.parse()?;

    let runtime: SharedRuntime = Arc::new(AdapterRuntime::default_from_env()?);
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/certificates/process", post(process_certificate))
        .route("/api/certificates/verify", post(verify_submitted))
        .route("/api/certificates/:id", get(get_certificate))
        .route("/api/certificates/:id/verify", get(verify_issued))
        .route("/api/devices", get(list_devices))
        .route("/api/devices/stats/summary", get(device_summary))
        .route("/api/devices/:imei", get(get_device))
        .route("/api/devices/:imei/status", patch(set_device_status))
        .route("/api/issuer/public-key", get(issuer_public_key))
        .with_state(runtime);

    tracing::info!(%addr, "certiwipe_http listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("certiwipe_http shutting down");
}

/// Runs a runtime call off the async executor; provider clients block.
async fn run_blocking<T, F>(runtime: SharedRuntime, success: StatusCode, call: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&AdapterRuntime) -> Result<T, AdapterError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || call(&runtime)).await {
        Ok(Ok(data)) => ok(success, data),
        Ok(Err(err)) => failure(&err),
        Err(join_err) => {
            tracing::error!(error = %join_err, "adapter task aborted");
            failure(&AdapterError::Internal)
        }
    }
}

fn ok<T: Serialize>(status: StatusCode, data: T) -> Response {
    let body = ApiResponse {
        success: true,
        message: None,
        data: Some(data),
    };
    (status, Json(body)).into_response()
}

fn failure(err: &AdapterError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body: ApiResponse<()> = ApiResponse {
        success: false,
        message: Some(err.to_string()),
        data: None,
    };
    (status, Json(body)).into_response()
}

async fn healthz(State(runtime): State<SharedRuntime>) -> Response {
    match runtime.health_report() {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => failure(&err),
    }
}

async fn process_certificate(
    State(runtime): State<SharedRuntime>,
    Json(body): Json<Value>,
) -> Response {
    run_blocking(runtime, StatusCode::CREATED, move |rt| {
        rt.process_certificate(body)
    })
    .await
}

async fn get_certificate(State(runtime): State<SharedRuntime>, Path(id): Path<String>) -> Response {
    match runtime.certificate(&id) {
        Ok(record) => ok(StatusCode::OK, record),
        Err(err) => failure(&err),
    }
}

async fn verify_issued(State(runtime): State<SharedRuntime>, Path(id): Path<String>) -> Response {
    run_blocking(runtime, StatusCode::OK, move |rt| rt.verify_issued(&id)).await
}

async fn verify_submitted(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<VerifyCertificateRequest>,
) -> Response {
    run_blocking(runtime, StatusCode::OK, move |rt| rt.verify_submitted(request)).await
}

async fn get_device(State(runtime): State<SharedRuntime>, Path(imei): Path<String>) -> Response {
    match runtime.device(&imei) {
        Ok(detail) => ok(StatusCode::OK, detail),
        Err(err) => failure(&err),
    }
}

async fn list_devices(
    State(runtime): State<SharedRuntime>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let query = match list_query_from_params(&params) {
        Ok(query) => query,
        Err(err) => return failure(&err),
    };
    match runtime.list_devices(&query) {
        Ok(page) => ok(StatusCode::OK, page),
        Err(err) => failure(&err),
    }
}

async fn device_summary(State(runtime): State<SharedRuntime>) -> Response {
    match runtime.device_summary() {
        Ok(summary) => ok(StatusCode::OK, summary),
        Err(err) => failure(&err),
    }
}

async fn set_device_status(
    State(runtime): State<SharedRuntime>,
    Path(imei): Path<String>,
    Json(body): Json<StatusChangeBody>,
) -> Response {
    run_blocking(runtime, StatusCode::OK, move |rt| {
        rt.set_device_status(&imei, &body.status)
    })
    .await
}

async fn issuer_public_key(State(runtime): State<SharedRuntime>) -> Response {
    ok(StatusCode::OK, runtime.issuer_public_key())
}

fn list_query_from_params(
    params: &HashMap<String, String>,
) -> Result<ListDevicesQuery, AdapterError> {
    let number = |name: &str| -> Result<Option<u32>, AdapterError> {
        match params.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<u32>()
                .map(Some)
                .map_err(|_| AdapterError::BadRequest(format!("{name} must be a positive integer"))),
        }
    };
    Ok(ListDevicesQuery {
        page: number("page")?,
        limit: number("limit")?,
        status: params.get("status").cloned(),
    })
}
