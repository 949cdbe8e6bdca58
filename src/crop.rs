// 该文件是 Tianyan （田眼） 项目的一部分。
// src/crop.rs - 作物标识
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

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 支持的作物
///
/// 变体按名称字母序声明，派生的 `Ord` 即为排序后的顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropId {
  Chilli,
  Cotton,
  Rose,
  Tomato,
  Turmeric,
}

impl CropId {
  pub const ALL: [CropId; 5] = [
    CropId::Chilli,
    CropId::Cotton,
    CropId::Rose,
    CropId::Tomato,
    CropId::Turmeric,
  ];

  pub const COUNT: usize = Self::ALL.len();

  pub const fn as_str(self) -> &'static str {
    match self {
      CropId::Chilli => "chilli",
      CropId::Cotton => "cotton",
      CropId::Rose => "rose",
      CropId::Tomato => "tomato",
      CropId::Turmeric => "turmeric",
    }
  }

  /// 作物在注册表槽位中的下标
  pub(crate) const fn index(self) -> usize {
    self as usize
  }

  /// 排序后的作物名称列表
  pub fn supported() -> Vec<&'static str> {
    Self::ALL.iter().map(|c| c.as_str()).collect()
  }
}

impl fmt::Display for CropId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("不支持的作物: {crop}，可选作物: {supported:?}")]
pub struct UnsupportedCropError {
  pub crop: String,
  pub supported: Vec<&'static str>,
}

impl UnsupportedCropError {
  pub fn new(crop: impl Into<String>) -> Self {
    Self {
      crop: crop.into(),
      supported: CropId::supported(),
    }
  }
}

impl FromStr for CropId {
  type Err = UnsupportedCropError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let lower = s.to_lowercase();
    CropId::ALL
      .into_iter()
      .find(|c| c.as_str() == lower)
      .ok_or_else(|| UnsupportedCropError::new(lower))
  }
}
