use crate::config::ApiConfig;
use crate::error::AlbumError;
use crate::photo_meta::UploadedFile;
use crate::travel::{TravelDetail, TravelSummary};
use crate::travel_service::{NewTravel, TravelService};
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Handler state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TravelService>,
    pub db_pool: PgPool,
}

/// JSON body of every failed request
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn status_for(err: &AlbumError) -> StatusCode {
    match err {
        AlbumError::MetadataExtraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AlbumError::PathConstruction(_) | AlbumError::InvalidBatch(_) => StatusCode::BAD_REQUEST,
        AlbumError::NotFound { .. } => StatusCode::NOT_FOUND,
        AlbumError::StorageUpload { .. } | AlbumError::Storage(_) => StatusCode::BAD_GATEWAY,
        AlbumError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(err: AlbumError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        error!(error = %err, "Request failed");
    } else {
        warn!(error = %err, "Request rejected");
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
        }),
    )
}

fn malformed_upload(err: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: format!("Malformed multipart upload: {err}"),
            code: "MALFORMED_UPLOAD".to_string(),
        }),
    )
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if !config.cors_enabled {
        return CorsLayer::new();
    }

    let origins = if config.cors_origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            config
                .cors_origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the album router: probes plus the travel and photo endpoints
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let travels = Router::new()
        .route("/travels", post(create_travel))
        .route("/travels/:travel_id", get(get_travel_detail))
        .route("/travels/:travel_id/photos", post(upload_photos))
        .route("/users/:user_id/travels", get(list_user_travels))
        .route("/photos/:photo_id/download", get(download_photo));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api/v1", travels)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ProbeResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// Liveness: the process is serving requests
async fn health_check() -> Json<ProbeResponse> {
    Json(ProbeResponse {
        status: "healthy",
        detail: None,
    })
}

/// Readiness: the travel database answers
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ProbeResponse>) {
    match sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db_pool)
        .await
    {
        Ok(_) => (
            StatusCode::OK,
            Json(ProbeResponse {
                status: "ready",
                detail: None,
            }),
        ),
        Err(e) => {
            warn!(error = %e, "Database unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ProbeResponse {
                    status: "not_ready",
                    detail: Some(format!("database: {e}")),
                }),
            )
        }
    }
}

#[instrument(skip(state, request))]
async fn create_travel(
    State(state): State<AppState>,
    Json(request): Json<NewTravel>,
) -> Result<(StatusCode, Json<TravelSummary>), ApiError> {
    let summary = state.service.create(request).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(summary)))
}

#[instrument(skip(state))]
async fn get_travel_detail(
    State(state): State<AppState>,
    Path(travel_id): Path<i64>,
) -> Result<Json<TravelDetail>, ApiError> {
    state
        .service
        .get_travel_detail(travel_id)
        .await
        .map(Json)
        .map_err(api_error)
}

#[instrument(skip(state))]
async fn list_user_travels(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<TravelSummary>>, ApiError> {
    state
        .service
        .find_all_travel_info(user_id)
        .await
        .map(Json)
        .map_err(api_error)
}

/// Batch upload. `files` parts and `names` text parts are paired by order.
#[instrument(skip(state, multipart))]
async fn upload_photos(
    State(state): State<AppState>,
    Path(travel_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<TravelSummary>, ApiError> {
    let mut files = Vec::new();
    let mut names = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(malformed_upload)? {
        let field_name = field.name().map(String::from);
        match field_name.as_deref() {
            Some("files") => {
                let file_name = field.file_name().map(String::from);
                let content_type = field.content_type().map(String::from);
                let bytes = field.bytes().await.map_err(malformed_upload)?;
                files.push(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some("names") => names.push(field.text().await.map_err(malformed_upload)?),
            other => warn!(field = ?other, "Ignoring unexpected multipart field"),
        }
    }

    state
        .service
        .update_photos(travel_id, files, names)
        .await
        .map(Json)
        .map_err(api_error)
}

#[instrument(skip(state))]
async fn download_photo(
    State(state): State<AppState>,
    Path(photo_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let object = state
        .service
        .download_photo(photo_id)
        .await
        .map_err(api_error)?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, object.content_type)],
        object.bytes,
    ))
}

/// Serve the router until `shutdown` resolves, then drain in-flight requests
pub async fn start_api_server<F>(state: AppState, config: &ApiConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind album API to {addr}"))?;

    info!(address = %addr, "Album API listening");

    axum::serve(listener, create_router(state, config))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Album API server failed")
}
