// 该文件是 Tianyan （田眼） 项目的一部分。
// src/task.rs - 推理任务循环
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
  sync::mpsc::{self, Receiver},
  thread,
  time::{Duration, Instant},
};

use image::RgbImage;
use tracing::{info, warn};

use crate::{
  crop::CropId,
  inference::{InferenceEngine, Threshold},
  model::ModelLoader,
  output::Render,
  result::UnifiedResult,
};

pub trait Task<I, L: ModelLoader, O>: Sized {
  type Error;
  fn run_task(self, input: I, engine: &InferenceEngine<L>, output: O) -> Result<(), Self::Error>;
}

/// 只处理第一帧
#[derive(Debug, Clone, Copy)]
pub struct OneShotTask {
  crop: CropId,
  threshold: Threshold,
}

impl OneShotTask {
  pub fn new(crop: CropId, threshold: Threshold) -> Self {
    Self { crop, threshold }
  }
}

impl<I, L, O, RE> Task<I, L, O> for OneShotTask
where
  I: Iterator<Item = RgbImage>,
  L: ModelLoader,
  O: Render<RgbImage, UnifiedResult, Error = RE>,
  RE: Into<anyhow::Error>,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    engine: &InferenceEngine<L>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    let result = engine.infer_crop(self.crop, &frame, self.threshold)?;
    let now = Instant::now();
    output.render_result(&frame, &result).map_err(Into::into)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 逐帧推理直到输入耗尽、达到帧数上限或收到停止信号
#[derive(Debug)]
pub struct ContinuousTask {
  crop: CropId,
  threshold: Threshold,
  frame_number: Option<usize>,
  stop: Option<Receiver<()>>,
}

impl ContinuousTask {
  pub fn new(crop: CropId, threshold: Threshold) -> Self {
    Self {
      crop,
      threshold,
      frame_number: None,
      stop: None,
    }
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 使用外部停止信号代替 Ctrl-C
  pub fn with_stop_signal(mut self, stop: Receiver<()>) -> Self {
    self.stop = Some(stop);
    self
  }

  fn ctrlc_signal() -> anyhow::Result<Receiver<()>> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;
    Ok(rx)
  }
}

impl<I, L, O, RE> Task<I, L, O> for ContinuousTask
where
  I: Iterator<Item = RgbImage>,
  L: ModelLoader,
  O: Render<RgbImage, UnifiedResult, Error = RE>,
  RE: Into<anyhow::Error>,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, engine: &InferenceEngine<L>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let stop = match self.stop {
      Some(stop) => stop,
      None => Self::ctrlc_signal()?,
    };

    let mut frame_index = 0usize;
    for frame in input {
      frame_index = frame_index.wrapping_add(1);
      info!("处理第 {} 帧图像", frame_index);
      let now = Instant::now();
      let result = engine.infer_crop(self.crop, &frame, self.threshold)?;
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &result).map_err(Into::into)?;
      let elapsed_b = now.elapsed();
      info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if stop.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，退出");
    Ok(())
  }
}
