// 该文件是 Tianyan （田眼） 项目的一部分。
// src/result.rs - 统一推理结果
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

use serde::{Deserialize, Serialize};

use crate::crop::CropId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxEntry {
  pub class: String,
  pub confidence: f32,
  pub bbox: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassEntry {
  pub class: String,
  pub confidence: f32,
}

/// 调用方唯一可见的输出结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedResult {
  pub crop: CropId,
  pub boxes: Vec<BoxEntry>,
  pub classification: Vec<ClassEntry>,
}

impl UnifiedResult {
  pub fn empty(crop: CropId) -> Self {
    Self {
      crop,
      boxes: Vec::new(),
      classification: Vec::new(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.boxes.is_empty() && self.classification.is_empty()
  }

  /// 结果中出现过的标签，按首次出现顺序去重；分类结果在前
  pub fn distinct_labels(&self) -> Vec<&str> {
    let mut labels: Vec<&str> = Vec::new();
    let found = self
      .classification
      .iter()
      .map(|c| c.class.as_str())
      .chain(self.boxes.iter().map(|b| b.class.as_str()));
    for label in found {
      if !labels.contains(&label) {
        labels.push(label);
      }
    }
    labels
  }
}
