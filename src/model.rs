// 该文件是 Tianyan （田眼） 项目的一部分。
// src/model.rs - 模型
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

use std::{borrow::Cow, collections::BTreeMap};

use image::RgbImage;

use crate::crop::CropId;

/// 已加载、可调用的模型
///
/// 实现必须可在多线程间共享；若底层运行时需要独占访问，由实现自行在句柄内部加锁。
pub trait Model: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn invoke(&self, image: &RgbImage) -> Result<RawOutput, Self::Error>;

  /// 该模型自己的类别标签，不同作物的标签空间互不相通
  fn labels(&self) -> &Labels;
}

/// 按作物构建模型
pub trait ModelLoader: Send + Sync {
  type Model: Model;
  type Error: std::error::Error + Send + Sync + 'static;

  fn load(&self, crop: CropId) -> Result<Self::Model, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: usize,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，输入图像像素坐标
}

/// 模型原始输出
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawOutput {
  #[default]
  Neither,
  Detections(Vec<DetectItem>),
  Classifications(Vec<f32>),
  Both {
    detections: Vec<DetectItem>,
    probs: Vec<f32>,
  },
}

impl RawOutput {
  pub fn from_parts(detections: Option<Vec<DetectItem>>, probs: Option<Vec<f32>>) -> Self {
    match (detections, probs) {
      (None, None) => RawOutput::Neither,
      (Some(detections), None) => RawOutput::Detections(detections),
      (None, Some(probs)) => RawOutput::Classifications(probs),
      (Some(detections), Some(probs)) => RawOutput::Both { detections, probs },
    }
  }

  pub fn detections(&self) -> Option<&[DetectItem]> {
    match self {
      RawOutput::Detections(detections) | RawOutput::Both { detections, .. } => Some(detections),
      RawOutput::Neither | RawOutput::Classifications(_) => None,
    }
  }

  pub fn probs(&self) -> Option<&[f32]> {
    match self {
      RawOutput::Classifications(probs) | RawOutput::Both { probs, .. } => Some(probs),
      RawOutput::Neither | RawOutput::Detections(_) => None,
    }
  }
}

/// 类别下标到标签名的映射
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
  names: BTreeMap<usize, String>,
}

impl Labels {
  pub fn new(names: BTreeMap<usize, String>) -> Self {
    Self { names }
  }

  pub fn from_names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
    names
      .into_iter()
      .enumerate()
      .map(|(i, name)| (i, name.into()))
      .collect()
  }

  /// 下标缺失时返回 `class_<id>`
  pub fn name(&self, class_id: usize) -> Cow<'_, str> {
    match self.names.get(&class_id) {
      Some(name) => Cow::Borrowed(name.as_str()),
      None => Cow::Owned(format!("class_{}", class_id)),
    }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
    self.names.iter().map(|(id, name)| (*id, name.as_str()))
  }
}

impl FromIterator<(usize, String)> for Labels {
  fn from_iter<T: IntoIterator<Item = (usize, String)>>(iter: T) -> Self {
    Self {
      names: iter.into_iter().collect(),
    }
  }
}

#[cfg(feature = "onnx")]
mod yolo;
#[cfg(feature = "onnx")]
pub use self::yolo::{OnnxLoader, OnnxModelError, YoloOnnx, YoloTask, accelerator};
