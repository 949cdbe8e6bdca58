// 该文件是 Tianyan （田眼） 项目的一部分。
// src/output/draw.rs - 推理结果可视化
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
  path::Path,
  sync::atomic::{AtomicBool, Ordering},
};

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::result::UnifiedResult;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const CLASS_COLOR: [u8; 3] = [46, 125, 50]; // 绿色
const BOX_THICKNESS: i32 = 2;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(String),
}

/// 在图像上绘制统一结果
///
/// 未提供字体时只绘制边框与标签底色。
pub struct Draw {
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  font: Option<FontVec>,
  box_color: [u8; 3],
  class_color: [u8; 3],
  missing_font_reported: AtomicBool,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      font: None,
      box_color: BOX_COLOR,
      class_color: CLASS_COLOR,
      missing_font_reported: AtomicBool::new(false),
    }
  }
}

impl Draw {
  pub fn with_font(mut self, font: FontVec) -> Self {
    self.font = Some(font);
    self
  }

  pub fn with_font_file(self, path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let data = std::fs::read(path.as_ref())?;
    let font = FontVec::try_from_vec(data).map_err(|e| DrawError::InvalidFont(e.to_string()))?;
    debug!("加载标注字体: {}", path.as_ref().display());
    Ok(self.with_font(font))
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  /// 复制原图并绘制检测框与分类结果
  pub fn annotate(&self, image: &RgbImage, result: &UnifiedResult) -> RgbImage {
    let mut canvas = image.clone();
    for entry in &result.boxes {
      let label = format!("{} {:.2}", entry.class, entry.confidence);
      self.draw_bbox_with_label(&mut canvas, &entry.bbox, &label);
    }

    // 分类结果逐行列在左上角
    for (row, entry) in result.classification.iter().enumerate() {
      let label = format!("{} {:.2}", entry.class, entry.confidence);
      let y = row as i32 * self.label_text_height;
      self.draw_label(&mut canvas, 0, y, &label, self.class_color);
    }
    canvas
  }

  // bbox 为像素坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(&self, image: &mut RgbImage, bbox: &[f32; 4], label: &str) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox[3].ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 边框加粗
    for t in 0..BOX_THICKNESS {
      let width = x_max - x_min - 2 * t;
      let height = y_max - y_min - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32 + 1, height as u32 + 1);
      draw_hollow_rect_mut(image, rect, Rgb(self.box_color));
    }

    // 标签放在边框上方
    let label_y = (y_min - self.label_text_height).max(0);
    self.draw_label(image, x_min, label_y, label, self.box_color);
  }

  fn draw_label(&self, image: &mut RgbImage, x: i32, y: i32, label: &str, color: [u8; 3]) {
    let text_width = (label.chars().count() as f32 * self.label_char_width) as i32;
    let max_width = (image.width() as i32 - x).max(0);
    let max_height = (image.height() as i32 - y).max(0);
    let label_width = text_width.min(max_width);
    let label_height = self.label_text_height.min(max_height);

    if label_width <= 0 || label_height <= 0 {
      return;
    }

    let rect = Rect::at(x, y).of_size(label_width as u32, label_height as u32);
    draw_filled_rect_mut(image, rect, Rgb(color));

    let Some(font) = &self.font else {
      // 只提示一次
      if !self.missing_font_reported.swap(true, Ordering::Relaxed) {
        warn!("未加载标注字体，标签只绘制底色，可通过 ?font= 指定字体文件");
      }
      return;
    };
    draw_text_mut(
      image,
      Rgb([255u8, 255u8, 255u8]),
      x,
      y + self.label_text_vertical_padding,
      PxScale::from(self.font_size),
      font,
      label,
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    crop::CropId,
    result::{BoxEntry, ClassEntry},
  };

  fn blank() -> RgbImage {
    RgbImage::from_pixel(200, 200, Rgb([0, 0, 0]))
  }

  #[test]
  fn draws_box_edges_without_touching_interior() {
    let result = UnifiedResult {
      crop: CropId::Cotton,
      boxes: vec![BoxEntry {
        class: "Curl Virus".into(),
        confidence: 0.8,
        bbox: [50.0, 80.0, 150.0, 180.0],
      }],
      classification: vec![],
    };
    let annotated = Draw::default().annotate(&blank(), &result);
    assert_eq!(annotated.get_pixel(50, 120), &Rgb(BOX_COLOR));
    assert_eq!(annotated.get_pixel(100, 180), &Rgb(BOX_COLOR));
    assert_eq!(annotated.get_pixel(100, 130), &Rgb([0, 0, 0]));
  }

  #[test]
  fn classification_is_listed_top_left() {
    let result = UnifiedResult {
      crop: CropId::Tomato,
      boxes: vec![],
      classification: vec![ClassEntry {
        class: "healthy".into(),
        confidence: 0.91,
      }],
    };
    let annotated = Draw::default().annotate(&blank(), &result);
    assert_eq!(annotated.get_pixel(1, 1), &Rgb(CLASS_COLOR));
    assert_eq!(annotated.get_pixel(199, 199), &Rgb([0, 0, 0]));
  }

  #[derive(Clone, Default)]
  struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

  impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      self.0.lock().unwrap().extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn missing_font_is_reported_once() {
    let logs = Captured::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
      .with_writer(move || writer.clone())
      .with_ansi(false)
      .finish();

    let result = UnifiedResult {
      crop: CropId::Chilli,
      boxes: vec![],
      classification: vec![
        ClassEntry {
          class: "Leaf Curl".into(),
          confidence: 0.7,
        },
        ClassEntry {
          class: "Whitefly".into(),
          confidence: 0.6,
        },
      ],
    };
    let draw = Draw::default();
    tracing::subscriber::with_default(subscriber, || {
      draw.annotate(&blank(), &result);
      draw.annotate(&blank(), &result);
    });

    let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert_eq!(text.matches("未加载标注字体").count(), 1);
    assert!(text.contains("WARN"));
  }

  #[test]
  fn empty_result_leaves_image_unchanged() {
    let image = blank();
    let annotated = Draw::default().annotate(&image, &UnifiedResult::empty(CropId::Rose));
    assert_eq!(annotated, image);
  }
}
