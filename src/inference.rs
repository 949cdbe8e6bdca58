// 该文件是 Tianyan （田眼） 项目的一部分。
// src/inference.rs - 推理与结果归一化
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

use std::{sync::Arc, time::Instant};

use image::RgbImage;
use tracing::{debug, error, info};

use crate::{
  crop::CropId,
  error::EngineError,
  model::{Labels, Model, ModelLoader, RawOutput},
  registry::ModelRegistry,
  result::{BoxEntry, ClassEntry, UnifiedResult},
};

/// 置信度阈值，取值范围 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Threshold(f32);

impl Threshold {
  pub const DEFAULT: Threshold = Threshold(0.5);

  /// 超出范围（含 NaN）直接拒绝，不做截断
  pub fn new(value: f32) -> Result<Self, EngineError> {
    if (0.0..=1.0).contains(&value) {
      Ok(Threshold(value))
    } else {
      Err(EngineError::InvalidThreshold(value))
    }
  }

  pub fn value(self) -> f32 {
    self.0
  }

  pub fn admits(self, confidence: f32) -> bool {
    confidence >= self.0
  }
}

impl Default for Threshold {
  fn default() -> Self {
    Self::DEFAULT
  }
}

impl TryFrom<f32> for Threshold {
  type Error = EngineError;

  fn try_from(value: f32) -> Result<Self, Self::Error> {
    Threshold::new(value)
  }
}

/// 将模型原始输出整理为统一结果
///
/// 检测与分类两种形状分别检查，互不排斥。检测项保持原始顺序，分类项按类别下标升序。
pub fn normalize(
  crop: CropId,
  raw: &RawOutput,
  labels: &Labels,
  threshold: Threshold,
) -> UnifiedResult {
  let mut result = UnifiedResult::empty(crop);

  if let Some(detections) = raw.detections() {
    result.boxes = detections
      .iter()
      .filter(|item| threshold.admits(item.score))
      .map(|item| BoxEntry {
        class: labels.name(item.class_id).into_owned(),
        confidence: item.score,
        bbox: item.bbox,
      })
      .collect();
  }

  if let Some(probs) = raw.probs() {
    result.classification = probs
      .iter()
      .enumerate()
      .filter(|(_, p)| threshold.admits(**p))
      .map(|(class_id, p)| ClassEntry {
        class: labels.name(class_id).into_owned(),
        confidence: *p,
      })
      .collect();
  }

  result
}

pub struct InferenceEngine<L: ModelLoader> {
  registry: Arc<ModelRegistry<L>>,
}

impl<L: ModelLoader> Clone for InferenceEngine<L> {
  fn clone(&self) -> Self {
    Self {
      registry: Arc::clone(&self.registry),
    }
  }
}

impl<L: ModelLoader> InferenceEngine<L> {
  pub fn new(registry: Arc<ModelRegistry<L>>) -> Self {
    Self { registry }
  }

  pub fn with_loader(loader: L) -> Self {
    Self::new(Arc::new(ModelRegistry::new(loader)))
  }

  pub fn registry(&self) -> &ModelRegistry<L> {
    &self.registry
  }

  /// 以字符串作物名与原始阈值推理
  ///
  /// 作物与阈值均在加载模型之前校验。
  pub fn infer(
    &self,
    crop: &str,
    image: &RgbImage,
    threshold: f32,
  ) -> Result<UnifiedResult, EngineError> {
    let crop: CropId = crop.parse()?;
    let threshold = Threshold::new(threshold)?;
    self.infer_crop(crop, image, threshold)
  }

  pub fn infer_crop(
    &self,
    crop: CropId,
    image: &RgbImage,
    threshold: Threshold,
  ) -> Result<UnifiedResult, EngineError> {
    let model = self.registry.get_model(crop)?;

    debug!(
      "作物 {} 推理开始，图像尺寸 {}x{}",
      crop,
      image.width(),
      image.height()
    );
    let now = Instant::now();
    let raw = model.invoke(image).map_err(|e| {
      error!("作物 {} 推理失败: {}", crop, e);
      EngineError::inference(crop, e)
    })?;
    let elapsed = now.elapsed();

    let result = normalize(crop, &raw, model.labels(), threshold);
    info!(
      "作物 {} 推理完成，耗时: {:.2?}，检测框 {} 个，分类 {} 项",
      crop,
      elapsed,
      result.boxes.len(),
      result.classification.len()
    );

    Ok(result)
  }

  /// 推理并返回标注后的图像，标注只读取统一结果
  #[cfg(feature = "draw")]
  pub fn infer_with_plot(
    &self,
    crop: CropId,
    image: &RgbImage,
    threshold: Threshold,
    draw: &crate::output::draw::Draw,
  ) -> Result<(RgbImage, UnifiedResult), EngineError> {
    let result = self.infer_crop(crop, image, threshold)?;
    let annotated = draw.annotate(image, &result);
    Ok((annotated, result))
  }
}
