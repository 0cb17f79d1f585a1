// HTTP API: detection endpoints, model management and the live stream

use crate::static_files::{fallback_handler, index_handler};
use axum::{
    body::{Body, Bytes},
    extract::{multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures_util::StreamExt;
use hardhat_core::codec::{encode_base64, encode_detections, DetectionRecord, STREAM_CONTENT_TYPE};
use hardhat_core::{DetectionSummary, ServerConfig, UploadKind, VisionError};
use hardhat_eye::camera::run_stream;
use hardhat_eye::frame::{decode_image, encode_jpeg};
use hardhat_eye::video::{output_video_name, temp_video_name};
use hardhat_eye::{annotate, CameraGuard, ModelGateway, StreamSettings, TempUpload, VideoJob};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::ReaderStream;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Frames buffered between the camera worker and the response body.
const STREAM_BUFFER: usize = 4;

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<ServerConfig>,
    pub gateway: Arc<ModelGateway>,
}

impl ApiState {
    pub fn new(config: ServerConfig, gateway: ModelGateway) -> Self {
        Self {
            config: Arc::new(config),
            gateway: Arc::new(gateway),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error returned by every handler, rendered as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<VisionError> for ApiError {
    fn from(e: VisionError) -> Self {
        let status = match &e {
            VisionError::Validation(_) => StatusCode::BAD_REQUEST,
            VisionError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::new(e.status(), e.body_text())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        error!("Worker task failed: {}", e);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Worker task failed")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{}: {}", self.status, self.message);
        } else {
            warn!("{}: {}", self.status, self.message);
        }
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub model_path: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ImageDetectionResponse {
    pub success: bool,
    pub detections: Vec<DetectionRecord>,
    /// Annotated image, base64 JPEG.
    pub image: String,
    pub total_detections: usize,
    pub summary: DetectionSummary,
}

#[derive(Debug, Serialize)]
pub struct VideoDetectionResponse {
    pub success: bool,
    /// File name to pass to `GET /api/video/:filename`.
    pub output_path: String,
    pub frame_count: u64,
    pub total_detections: u64,
    pub fps: u32,
    pub frame_errors: u64,
    pub summary: DetectionSummary,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub path: String,
    pub size_mb: f64,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
pub struct LoadModelRequest {
    pub model_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoadModelResponse {
    pub success: bool,
    pub message: String,
}

/// Create HTTP router with all API routes
pub fn create_router(state: ApiState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/", get(index_handler))
        .route("/api/health", get(health_handler))
        .route("/api/detect/image", post(detect_image_handler))
        .route("/api/detect/video", post(detect_video_handler))
        .route("/api/video/:filename", get(get_video_handler))
        .route("/api/stream", get(stream_handler))
        .route("/api/models", get(list_models_handler))
        .route("/api/load-model", post(load_model_handler))
        .fallback(fallback_handler)
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: state.gateway.is_loaded(),
        model_path: state.gateway.model_path().map(|p| p.display().to_string()),
        timestamp: chrono::Local::now().to_rfc3339(),
    })
}

/// Fields of a detection upload form.
#[derive(Default)]
struct UploadForm {
    file: Option<(String, Bytes)>,
    confidence: Option<String>,
}

async fn read_upload(mut multipart: Multipart, file_field: &str) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == file_field {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await?;
            if !filename.is_empty() {
                form.file = Some((filename, data));
            }
        } else if name == "confidence" {
            form.confidence = Some(field.text().await?);
        }
    }
    Ok(form)
}

/// Absent or blank means the configured default; anything else must parse
/// into [0, 1].
fn parse_confidence(raw: Option<&str>, default: f32) -> Result<f32, ApiError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(default),
        Some(raw) => raw,
    };
    match raw.parse::<f32>() {
        Ok(value) if value.is_finite() && (0.0..=1.0).contains(&value) => Ok(value),
        _ => Err(ApiError::bad_request("Invalid confidence value")),
    }
}

fn checked_upload(
    config: &ServerConfig,
    kind: UploadKind,
    file: Option<(String, Bytes)>,
    missing: &str,
) -> Result<(String, Bytes), ApiError> {
    let (filename, data) = file.ok_or_else(|| ApiError::bad_request(missing))?;
    if !config.is_allowed_upload(kind, &filename) {
        return Err(ApiError::bad_request("Unsupported file type"));
    }
    Ok((filename, data))
}

async fn detect_image_handler(
    State(state): State<ApiState>,
    multipart: Multipart,
) -> Result<Json<ImageDetectionResponse>, ApiError> {
    let form = read_upload(multipart, "image").await?;
    let (filename, data) = checked_upload(&state.config, UploadKind::Image, form.file, "No image file provided")?;
    let confidence = parse_confidence(form.confidence.as_deref(), state.config.default_confidence)?;

    let gateway = state.gateway.clone();
    let (detections, jpeg) = tokio::task::spawn_blocking(move || -> hardhat_core::Result<_> {
        let frame = decode_image(&data)?;
        let detections = gateway.infer(&frame, confidence)?;
        let annotated = annotate(&frame, &detections)?;
        Ok((detections, encode_jpeg(&annotated)?))
    })
    .await??;

    info!("🔍 {}: {} detections at confidence {}", filename, detections.len(), confidence);

    Ok(Json(ImageDetectionResponse {
        success: true,
        total_detections: detections.len(),
        summary: DetectionSummary::from_detections(&detections),
        detections: encode_detections(&detections),
        image: encode_base64(&jpeg),
    }))
}

async fn detect_video_handler(
    State(state): State<ApiState>,
    multipart: Multipart,
) -> Result<Json<VideoDetectionResponse>, ApiError> {
    let form = read_upload(multipart, "video").await?;
    let (filename, data) = checked_upload(&state.config, UploadKind::Video, form.file, "No video file provided")?;
    let confidence = parse_confidence(form.confidence.as_deref(), state.config.default_confidence)?;
    if !state.gateway.is_loaded() {
        warn!("No model loaded, {} frames will be written unannotated", filename);
    }

    let stamp = chrono::Utc::now().timestamp();
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    let temp_path = state.config.upload_dir.join(temp_video_name(stamp, &extension));
    let output_name = output_video_name(stamp, &state.config.output_extension);
    let output_path = state.config.output_dir.join(&output_name);

    let gateway = state.gateway.clone();
    let fourcc = state.config.output_fourcc.clone();
    let report = tokio::task::spawn_blocking(move || {
        let upload = TempUpload::create(temp_path, &data)?;
        let job = VideoJob::new(upload.path(), output_path);
        let result = job.run(&gateway, confidence, &fourcc);
        if result.is_err() {
            let _ = std::fs::remove_file(job.output());
        }
        result
    })
    .await??;

    Ok(Json(VideoDetectionResponse {
        success: true,
        output_path: output_name,
        frame_count: report.frame_count,
        total_detections: report.total_detections,
        fps: report.fps,
        frame_errors: report.frame_errors,
        summary: report.summary,
    }))
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\') && !name.contains("..")
}

async fn get_video_handler(
    State(state): State<ApiState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    if !is_plain_file_name(&filename) {
        return Err(ApiError::not_found("Video not found"));
    }
    let path = state.config.output_dir.join(&filename);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(_) => return Err(ApiError::not_found("Video not found")),
    };
    let metadata = file.metadata().await.map_err(VisionError::Io)?;
    if !metadata.is_file() {
        return Err(ApiError::not_found("Video not found"));
    }

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (header::CONTENT_LENGTH, metadata.len().to_string()),
        ],
        body,
    )
        .into_response())
}

async fn stream_handler(State(state): State<ApiState>) -> Response {
    let (tx, rx) = mpsc::channel::<Bytes>(STREAM_BUFFER);
    let gateway = state.gateway.clone();
    let index = state.config.camera_index;
    let settings = StreamSettings {
        confidence: state.config.default_confidence,
        fps: state.config.stream_fps,
    };

    tokio::task::spawn_blocking(move || {
        let mut camera = match CameraGuard::open(index) {
            Ok(camera) => camera,
            Err(e) => {
                warn!("Live stream unavailable: {}", e);
                return;
            }
        };
        info!("📡 Live stream started on camera {}", camera.index());
        run_stream(&mut camera, &gateway, settings, &tx);
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    (
        [
            (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

async fn list_models_handler(State(state): State<ApiState>) -> Result<Json<ModelsResponse>, ApiError> {
    let dir = &state.config.model_dir;
    let mut models = Vec::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Json(ModelsResponse { models })),
        Err(e) => return Err(VisionError::Io(e).into()),
    };
    while let Some(entry) = entries.next_entry().await.map_err(VisionError::Io)? {
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&state.config.model_extension))
            .unwrap_or(false);
        let metadata = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        if !matches {
            continue;
        }
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        models.push(ModelInfo {
            name,
            path: path.display().to_string(),
            size_mb: (metadata.len() as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
        });
    }

    models.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(ModelsResponse { models }))
}

async fn load_model_handler(
    State(state): State<ApiState>,
    payload: Result<Json<LoadModelRequest>, JsonRejection>,
) -> Result<Json<LoadModelResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let model_path = match request.model_path {
        Some(p) if !p.is_empty() => p,
        _ => return Err(ApiError::bad_request("Invalid model path")),
    };
    if !tokio::fs::try_exists(&model_path).await.unwrap_or(false) {
        return Err(ApiError::bad_request("Invalid model path"));
    }

    let gateway = state.gateway.clone();
    let path = std::path::PathBuf::from(&model_path);
    tokio::task::spawn_blocking(move || gateway.load(&path))
        .await?
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(LoadModelResponse {
        success: true,
        message: format!("Model {} loaded successfully", model_path),
    }))
}
