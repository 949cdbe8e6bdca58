// 该文件是 Tianyan （田眼） 项目的一部分。
// tests/common/mod.rs - 测试用桩模型
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

#![allow(dead_code)]

use std::{
  collections::HashMap,
  io,
  sync::Mutex,
  thread,
  time::Duration,
};

use image::{Rgb, RgbImage};
use tianyan::{
  CropId,
  model::{DetectItem, Labels, Model, ModelLoader, RawOutput},
};

pub struct StubModel {
  pub crop: CropId,
  labels: Labels,
  output: RawOutput,
}

impl Model for StubModel {
  type Error = io::Error;

  fn invoke(&self, image: &RgbImage) -> Result<RawOutput, Self::Error> {
    if image.width() == 0 || image.height() == 0 {
      return Err(io::Error::other("empty image"));
    }
    Ok(self.output.clone())
  }

  fn labels(&self) -> &Labels {
    &self.labels
  }
}

/// 按作物返回固定输出，并统计加载次数
#[derive(Default)]
pub struct StubLoader {
  outputs: HashMap<CropId, (Labels, RawOutput)>,
  failing: Vec<CropId>,
  delay: Duration,
  loads: Mutex<HashMap<CropId, usize>>,
}

impl StubLoader {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_output(mut self, crop: CropId, labels: Labels, output: RawOutput) -> Self {
    self.outputs.insert(crop, (labels, output));
    self
  }

  pub fn failing(mut self, crop: CropId) -> Self {
    self.failing.push(crop);
    self
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  pub fn loads(&self, crop: CropId) -> usize {
    self.loads.lock().unwrap().get(&crop).copied().unwrap_or(0)
  }

  pub fn total_loads(&self) -> usize {
    self.loads.lock().unwrap().values().sum()
  }
}

impl ModelLoader for StubLoader {
  type Model = StubModel;
  type Error = io::Error;

  fn load(&self, crop: CropId) -> Result<Self::Model, Self::Error> {
    *self.loads.lock().unwrap().entry(crop).or_default() += 1;
    thread::sleep(self.delay);
    if self.failing.contains(&crop) {
      return Err(io::Error::new(io::ErrorKind::NotFound, format!("{crop}.onnx")));
    }
    let (labels, output) = self.outputs.get(&crop).cloned().unwrap_or_default();
    Ok(StubModel {
      crop,
      labels,
      output,
    })
  }
}

pub fn tomato_classification() -> (Labels, RawOutput) {
  (
    Labels::from_names(["healthy", "Late_blight"]),
    RawOutput::Classifications(vec![0.91, 0.40]),
  )
}

pub fn cotton_detection() -> (Labels, RawOutput) {
  (
    Labels::from_names(["Healthy Leaf", "Leaf Hopper Jassids"]),
    RawOutput::Detections(vec![
      DetectItem {
        class_id: 1,
        score: 0.72,
        bbox: [12.0, 34.0, 156.0, 178.0],
      },
      DetectItem {
        class_id: 0,
        score: 0.3,
        bbox: [1.0, 2.0, 3.0, 4.0],
      },
    ]),
  )
}

/// 带有两种输出形状的加载器
pub fn scenario_loader() -> StubLoader {
  let (tomato_labels, tomato_output) = tomato_classification();
  let (cotton_labels, cotton_output) = cotton_detection();
  StubLoader::new()
    .with_output(CropId::Tomato, tomato_labels, tomato_output)
    .with_output(CropId::Cotton, cotton_labels, cotton_output)
}

pub fn leaf_image() -> RgbImage {
  RgbImage::from_pixel(32, 24, Rgb([34, 139, 34]))
}
