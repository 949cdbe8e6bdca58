// 该文件是 Tianyan （田眼） 项目的一部分。
// src/server.rs - HTTP 推理服务
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! `POST /predict/{crop}`、`GET /health` 与 `GET /`

use std::{sync::Arc, time::Instant};

use axum::{
  Json, Router,
  extract::{
    DefaultBodyLimit, Multipart, Path, Query, State,
    multipart::MultipartRejection,
    rejection::QueryRejection,
  },
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{
  cors::{Any, CorsLayer},
  trace::TraceLayer,
};
use tracing::{debug, error, warn};

use crate::{
  crop::CropId,
  decode::{DecodeError, decode_image},
  error::EngineError,
  inference::{InferenceEngine, Threshold},
  model::ModelLoader,
  result::UnifiedResult,
};

pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 上传图像大小上限
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

const UPLOAD_FIELD: &str = "file";
const CLASSIFY_OUTPUT: &str = "classify";

pub struct AppState<L: ModelLoader> {
  engine: InferenceEngine<L>,
  started_at: Instant,
  device: &'static str,
}

pub type SharedState<L> = Arc<AppState<L>>;

impl<L: ModelLoader> AppState<L> {
  pub fn new(engine: InferenceEngine<L>, device: &'static str) -> Self {
    Self {
      engine,
      started_at: Instant::now(),
      device,
    }
  }

  pub fn engine(&self) -> &InferenceEngine<L> {
    &self.engine
  }

  pub fn uptime_seconds(&self) -> u64 {
    self.started_at.elapsed().as_secs()
  }
}

pub fn router<L>(state: AppState<L>) -> Router
where
  L: ModelLoader + 'static,
{
  Router::new()
    .route("/", get(index))
    .route("/health", get(health::<L>))
    .route("/predict/{crop}", post(predict::<L>))
    .with_state(Arc::new(state))
    .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
    .layer(TraceLayer::new_for_http())
    .layer(
      CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any),
    )
}

#[derive(Debug)]
pub struct ApiError {
  status: StatusCode,
  body: serde_json::Value,
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    self.status
  }

  pub fn bad_request(msg: impl Into<String>) -> Self {
    let msg = msg.into();
    warn!("Bad request: {}", msg);
    Self {
      status: StatusCode::BAD_REQUEST,
      body: json!({ "detail": msg }),
    }
  }

  pub fn unsupported_crop() -> Self {
    let supported = CropId::supported();
    let detail = format!("Unsupported crop. Choose from {:?}", supported);
    warn!("Not found: {}", detail);
    Self {
      status: StatusCode::NOT_FOUND,
      body: json!({ "detail": detail, "supported_crops": supported }),
    }
  }

  pub fn internal(msg: impl Into<String>) -> Self {
    let msg = msg.into();
    error!("Internal error: {}", msg);
    Self {
      status: StatusCode::INTERNAL_SERVER_ERROR,
      body: json!({ "detail": msg }),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    (self.status, Json(self.body)).into_response()
  }
}

impl From<EngineError> for ApiError {
  fn from(err: EngineError) -> Self {
    match err {
      EngineError::UnsupportedCrop(_) => ApiError::unsupported_crop(),
      EngineError::InvalidThreshold(_) => ApiError::bad_request(err.to_string()),
      EngineError::ModelLoad { .. } | EngineError::Inference { .. } => {
        ApiError::internal(err.to_string())
      }
    }
  }
}

impl From<DecodeError> for ApiError {
  fn from(err: DecodeError) -> Self {
    debug!("图像解码失败: {}", err);
    match err {
      DecodeError::UnsupportedFormat(_) => ApiError::bad_request("Unsupported image format"),
      DecodeError::Corrupted(_) => ApiError::bad_request("Invalid or corrupted image"),
    }
  }
}

impl From<QueryRejection> for ApiError {
  fn from(err: QueryRejection) -> Self {
    ApiError::bad_request(err.body_text())
  }
}

impl From<MultipartRejection> for ApiError {
  fn from(err: MultipartRejection) -> Self {
    ApiError::bad_request(err.body_text())
  }
}

#[derive(Debug, Deserialize)]
pub struct PredictQuery {
  #[serde(default)]
  pub output_type: Option<String>,
  #[serde(default = "default_threshold")]
  pub threshold: f32,
}

fn default_threshold() -> f32 {
  Threshold::DEFAULT.value()
}

/// 取出 `file` 字段的内容类型与字节
async fn read_upload(mut multipart: Multipart) -> Result<(String, Vec<u8>), ApiError> {
  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|e| ApiError::bad_request(e.body_text()))?
  {
    if field.name() != Some(UPLOAD_FIELD) {
      continue;
    }
    let content_type = field.content_type().unwrap_or_default().to_string();
    let bytes = field
      .bytes()
      .await
      .map_err(|e| ApiError::bad_request(e.body_text()))?;
    return Ok((content_type, bytes.to_vec()));
  }
  Err(ApiError::bad_request("Missing upload field 'file'"))
}

async fn predict<L>(
  State(state): State<SharedState<L>>,
  Path(crop): Path<String>,
  query: Result<Query<PredictQuery>, QueryRejection>,
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UnifiedResult>, ApiError>
where
  L: ModelLoader + 'static,
{
  // 先校验作物与阈值，再读取上传内容
  let crop: CropId = crop.parse().map_err(EngineError::from)?;
  let Query(query) = query?;
  let threshold = Threshold::new(query.threshold)?;

  let (content_type, bytes) = read_upload(multipart?).await?;
  let image = decode_image(&bytes, &content_type)?;

  let engine = state.engine.clone();
  let mut result = tokio::task::spawn_blocking(move || engine.infer_crop(crop, &image, threshold))
    .await
    .map_err(|e| ApiError::internal(format!("推理任务异常退出: {e}")))??;

  if query.output_type.as_deref() != Some(CLASSIFY_OUTPUT) {
    result.classification.clear();
  }
  Ok(Json(result))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RuntimeInfo {
  pub name: String,
  pub version: String,
  pub os: String,
  pub arch: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
  pub status: String,
  pub api_version: String,
  pub runtime: RuntimeInfo,
  pub device: String,
  pub supported_crops: Vec<String>,
  pub models_loaded_in_cache: Vec<String>,
  pub model_cache_size: usize,
  pub uptime_seconds: u64,
}

async fn health<L>(State(state): State<SharedState<L>>) -> Json<HealthResponse>
where
  L: ModelLoader + 'static,
{
  let loaded: Vec<String> = state
    .engine
    .registry()
    .loaded()
    .into_iter()
    .map(|crop| crop.to_string())
    .collect();

  Json(HealthResponse {
    status: "ok".to_string(),
    api_version: API_VERSION.to_string(),
    runtime: RuntimeInfo {
      name: env!("CARGO_PKG_NAME").to_string(),
      version: env!("CARGO_PKG_VERSION").to_string(),
      os: std::env::consts::OS.to_string(),
      arch: std::env::consts::ARCH.to_string(),
    },
    device: state.device.to_string(),
    supported_crops: CropId::supported().into_iter().map(String::from).collect(),
    model_cache_size: loaded.len(),
    models_loaded_in_cache: loaded,
    uptime_seconds: state.uptime_seconds(),
  })
}

async fn index() -> Json<serde_json::Value> {
  Json(json!({
    "message": "Crop Disease Detection API is running",
    "endpoints": {
      "predict": "/predict/{crop}",
      "health": "/health",
    }
  }))
}
