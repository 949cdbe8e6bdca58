// 该文件是 Tianyan （田眼） 项目的一部分。
// src/error.rs - 推理引擎错误
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

use thiserror::Error;

use crate::crop::{CropId, UnsupportedCropError};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum EngineError {
  #[error(transparent)]
  UnsupportedCrop(#[from] UnsupportedCropError),
  #[error("作物 {crop} 的模型加载失败: {source}")]
  ModelLoad {
    crop: CropId,
    #[source]
    source: BoxError,
  },
  #[error("置信度阈值 {0} 超出范围 [0, 1]")]
  InvalidThreshold(f32),
  #[error("作物 {crop} 的模型推理失败: {source}")]
  Inference {
    crop: CropId,
    #[source]
    source: BoxError,
  },
}

impl EngineError {
  pub fn model_load(crop: CropId, source: impl Into<BoxError>) -> Self {
    EngineError::ModelLoad {
      crop,
      source: source.into(),
    }
  }

  pub fn inference(crop: CropId, source: impl Into<BoxError>) -> Self {
    EngineError::Inference {
      crop,
      source: source.into(),
    }
  }

  /// 调用方输入有误（作物或阈值），而非部署或运行时故障
  pub fn is_client_error(&self) -> bool {
    matches!(
      self,
      EngineError::UnsupportedCrop(_) | EngineError::InvalidThreshold(_)
    )
  }
}
