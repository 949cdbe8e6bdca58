// 该文件是 Tianyan （田眼） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
  fs::File,
  io::BufWriter,
  path::{Path, PathBuf},
  sync::{Mutex, PoisonError},
};

use chrono::{Datelike, Local};
use image::RgbImage;
use thiserror::Error;
use tracing::debug;

#[cfg(feature = "draw")]
use crate::output::draw::Draw;
use crate::{FromUrl, FromUrlWithScheme, output::Render, result::UnifiedResult};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 记录方式：标注图像，或原图加 JSON 结果
pub enum RecordMode {
  #[cfg(feature = "draw")]
  Draw(Box<Draw>),
  Record,
}

impl RecordMode {
  fn save_result(
    &self,
    path: &Path,
    frame: &RgbImage,
    result: &UnifiedResult,
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      #[cfg(feature = "draw")]
      RecordMode::Draw(draw) => {
        draw.annotate(frame, result).save(path)?;
      }
      RecordMode::Record => {
        frame.save(path)?;
        let writer = BufWriter::new(File::create(path.with_extension("json"))?);
        serde_json::to_writer_pretty(writer, result)?;
      }
    }
    Ok(())
  }

  fn with(kind: &str) -> Self {
    match kind {
      "record" => RecordMode::Record,
      #[cfg(feature = "draw")]
      _ => RecordMode::Draw(Box::default()),
      #[cfg(not(feature = "draw"))]
      _ => RecordMode::Record,
    }
  }
}

/// `folder:///path/to/dir[?record][&always]`
///
/// 按 年/月/日 分目录保存。默认只保存非空结果。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  mode: RecordMode,
  frame_counter: Mutex<u16>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let kind = if uri.query_pairs().any(|(k, _)| k == "record") {
      "record"
    } else {
      "draw"
    };
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput::new(
      uri.path(),
      RecordMode::with(kind),
      always,
    ))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, mode: RecordMode, always: bool) -> Self {
    Self {
      directory: directory.into(),
      mode,
      frame_counter: Mutex::new(0),
      always,
    }
  }

  fn frame_id(&self) -> u16 {
    let mut counter = self
      .frame_counter
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    *counter = counter.wrapping_add(1);
    *counter
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Local::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<RgbImage, UnifiedResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RgbImage, result: &UnifiedResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }
    let path = self.frame_path()?;
    self.mode.save_result(&path, frame, result)?;
    debug!("记录帧: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{crop::CropId, result::ClassEntry};

  fn files_with_extension(root: &Path, ext: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else if path.extension().is_some_and(|e| e == ext) {
          found.push(path);
        }
      }
    }
    found
  }

  #[test]
  fn record_mode_writes_image_and_json() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::new(dir.path(), RecordMode::Record, false);
    let result = UnifiedResult {
      crop: CropId::Turmeric,
      boxes: vec![],
      classification: vec![ClassEntry {
        class: "leaf_blotch".into(),
        confidence: 0.77,
      }],
    };
    output.render_result(&RgbImage::new(8, 8), &result).unwrap();

    let pngs = files_with_extension(dir.path(), "png");
    let jsons = files_with_extension(dir.path(), "json");
    assert_eq!(pngs.len(), 1);
    assert_eq!(jsons.len(), 1);

    let stored: UnifiedResult =
      serde_json::from_reader(File::open(&jsons[0]).unwrap()).unwrap();
    assert_eq!(stored, result);
  }

  #[test]
  fn empty_results_are_skipped_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let empty = UnifiedResult::empty(CropId::Rose);

    let output = DirectoryRecordOutput::new(dir.path(), RecordMode::Record, false);
    output.render_result(&RgbImage::new(4, 4), &empty).unwrap();
    assert!(files_with_extension(dir.path(), "png").is_empty());

    let output = DirectoryRecordOutput::new(dir.path(), RecordMode::Record, true);
    output.render_result(&RgbImage::new(4, 4), &empty).unwrap();
    assert_eq!(files_with_extension(dir.path(), "png").len(), 1);
  }

  #[test]
  fn query_selects_mode() {
    let url = url::Url::parse("folder:///tmp/tianyan?record&always").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert!(matches!(output.mode, RecordMode::Record));
    assert!(output.always);
    assert_eq!(output.directory, PathBuf::from("/tmp/tianyan"));
  }
}
