// 该文件是 Tianyan （田眼） 项目的一部分。
// src/registry.rs - 按作物缓存的模型注册表
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
  sync::{Arc, Mutex, OnceLock, PoisonError},
  time::Instant,
};

use tracing::{debug, error, info};

use crate::{
  crop::CropId,
  error::EngineError,
  model::{Model, ModelLoader},
};

struct Slot<M> {
  model: OnceLock<Arc<M>>,
  // 同一作物的首次加载在此串行，不同作物互不影响
  gate: Mutex<()>,
}

impl<M> Slot<M> {
  fn new() -> Self {
    Self {
      model: OnceLock::new(),
      gate: Mutex::new(()),
    }
  }
}

/// 模型注册表
///
/// 每个作物最多构建一次模型，构建后常驻至进程退出。
pub struct ModelRegistry<L: ModelLoader> {
  loader: L,
  slots: [Slot<L::Model>; CropId::COUNT],
}

impl<L: ModelLoader> ModelRegistry<L> {
  pub fn new(loader: L) -> Self {
    Self {
      loader,
      slots: std::array::from_fn(|_| Slot::new()),
    }
  }

  pub fn loader(&self) -> &L {
    &self.loader
  }

  /// 获取作物对应的模型，首次调用时加载
  pub fn get_model(&self, crop: CropId) -> Result<Arc<L::Model>, EngineError> {
    let slot = &self.slots[crop.index()];
    if let Some(model) = slot.model.get() {
      return Ok(Arc::clone(model));
    }

    let _gate = slot.gate.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(model) = slot.model.get() {
      debug!("作物 {} 的模型已由其他调用方加载", crop);
      return Ok(Arc::clone(model));
    }

    info!("首次加载作物 {} 的模型", crop);
    let now = Instant::now();
    let model = self.loader.load(crop).map_err(|e| {
      error!("作物 {} 的模型加载失败: {}", crop, e);
      EngineError::model_load(crop, e)
    })?;
    let model = Arc::new(model);
    // 持有 gate 时槽位不可能已被填充
    let _ = slot.model.set(Arc::clone(&model));
    info!(
      "作物 {} 的模型加载完成，类别数: {}，耗时: {:.2?}",
      crop,
      model.labels().len(),
      now.elapsed()
    );

    Ok(model)
  }

  /// 先按名称解析作物，未知作物不会触发任何加载
  pub fn get_model_str(&self, crop: &str) -> Result<Arc<L::Model>, EngineError> {
    let crop: CropId = crop.parse()?;
    self.get_model(crop)
  }

  pub fn is_loaded(&self, crop: CropId) -> bool {
    self.slots[crop.index()].model.get().is_some()
  }

  /// 已缓存模型的作物，按名称排序
  pub fn loaded(&self) -> Vec<CropId> {
    CropId::ALL
      .into_iter()
      .filter(|crop| self.is_loaded(*crop))
      .collect()
  }
}
