// 该文件是 Tianyan （田眼） 项目的一部分。
// src/recorder.rs - 病害检测记录
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

use std::{
  sync::{Mutex, PoisonError},
  time::{Duration, Instant},
};

use chrono::{DateTime, Local};
use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  crop::CropId,
  output::Render,
  result::UnifiedResult,
  telemetry::GpsSource,
};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(2);

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 各作物视为健康的标签
pub fn healthy_labels(crop: CropId) -> &'static [&'static str] {
  match crop {
    CropId::Tomato => &["healthy"],
    CropId::Cotton => &["Healthy Leaf"],
    CropId::Rose => &["Healthy", "rose"],
    CropId::Chilli => &["Healthy Chilies", "Healthy Leaves"],
    CropId::Turmeric => &["healthy_leaf"],
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
  #[serde(serialize_with = "serialize_timestamp")]
  pub timestamp: DateTime<Local>,
  pub crop: CropId,
  pub disease: String,
  pub satellites: u32,
  pub lat: f64,
  pub lon: f64,
}

fn serialize_timestamp<S: serde::Serializer>(
  timestamp: &DateTime<Local>,
  serializer: S,
) -> Result<S::Ok, S::Error> {
  serializer.collect_str(&timestamp.format(TIMESTAMP_FORMAT))
}

#[derive(Error, Debug)]
pub enum RecorderError {
  #[error("记录写入失败: {0}")]
  Sink(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  /// 部分记录已写入，冷却计时已刷新
  #[error("仅写入 {} / {total} 条记录: {source}", .written.len())]
  PartialWrite {
    written: Vec<DetectionRecord>,
    total: usize,
    #[source]
    source: Box<RecorderError>,
  },
}

pub trait DetectionSink: Send + Sync {
  fn write(&self, record: &DetectionRecord) -> Result<(), RecorderError>;
}

/// 通过日志输出记录
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DetectionSink for TracingSink {
  fn write(&self, record: &DetectionRecord) -> Result<(), RecorderError> {
    info!(
      timestamp = %record.timestamp.format(TIMESTAMP_FORMAT),
      crop = %record.crop,
      disease = %record.disease,
      satellites = record.satellites,
      lat = record.lat,
      lon = record.lon,
      "记录病害"
    );
    Ok(())
  }
}

pub struct DetectionRecorder<G, S> {
  crop: CropId,
  gps: G,
  sink: S,
  cooldown: Duration,
  last_saved: Mutex<Option<Instant>>,
}

impl<G: GpsSource, S: DetectionSink> DetectionRecorder<G, S> {
  pub fn new(crop: CropId, gps: G, sink: S) -> Self {
    Self {
      crop,
      gps,
      sink,
      cooldown: DEFAULT_COOLDOWN,
      last_saved: Mutex::new(None),
    }
  }

  pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
    self.cooldown = cooldown;
    self
  }

  pub fn crop(&self) -> CropId {
    self.crop
  }

  pub fn sink(&self) -> &S {
    &self.sink
  }

  pub fn observe(&self, result: &UnifiedResult) -> Result<Vec<DetectionRecord>, RecorderError> {
    self.observe_at(result, Instant::now())
  }

  /// 冷却期内或只有健康标签时不写入
  ///
  /// 冷却计时只在确有记录写入后刷新。首条写入失败时原样返回错误；
  /// 之后的写入失败返回 [`RecorderError::PartialWrite`]，其中带有已写入的记录。
  pub fn observe_at(
    &self,
    result: &UnifiedResult,
    now: Instant,
  ) -> Result<Vec<DetectionRecord>, RecorderError> {
    let healthy = healthy_labels(self.crop);
    let diseases: Vec<&str> = result
      .distinct_labels()
      .into_iter()
      .filter(|label| !healthy.contains(label))
      .collect();
    if diseases.is_empty() {
      return Ok(Vec::new());
    }

    let mut last_saved = self
      .last_saved
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    if let Some(last) = *last_saved
      && now.saturating_duration_since(last) <= self.cooldown
    {
      debug!("冷却中，跳过 {} 条记录", diseases.len());
      return Ok(Vec::new());
    }

    let fix = self.gps.snapshot();
    let timestamp = Local::now();
    let total = diseases.len();
    let mut written = Vec::with_capacity(total);
    for disease in diseases {
      let record = DetectionRecord {
        timestamp,
        crop: self.crop,
        disease: disease.to_string(),
        satellites: fix.satellites,
        lat: fix.lat,
        lon: fix.lon,
      };
      if let Err(e) = self.sink.write(&record) {
        if written.is_empty() {
          return Err(e);
        }
        warn!("已写入 {} / {} 条记录后失败: {}", written.len(), total, e);
        return Err(RecorderError::PartialWrite {
          written,
          total,
          source: Box::new(e),
        });
      }
      *last_saved = Some(now);
      written.push(record);
    }

    Ok(written)
  }
}

impl<G: GpsSource, S: DetectionSink> Render<RgbImage, UnifiedResult> for DetectionRecorder<G, S> {
  type Error = RecorderError;

  fn render_result(&self, _frame: &RgbImage, result: &UnifiedResult) -> Result<(), Self::Error> {
    self.observe(result).map(|_| ())
  }
}
