// 该文件是 Tianyan （田眼） 项目的一部分。
// src/bin/record.rs - 连续推理并记录病害位置
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

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use tianyan::{
  CropId, FromUrl, InferenceEngine, Threshold,
  input::InputWrapper,
  model::OnnxLoader,
  output::OutputWrapper,
  recorder::{DEFAULT_COOLDOWN, DetectionRecorder, TracingSink},
  task::{ContinuousTask, Task},
  telemetry::GpsWrapper,
};

/// 田眼 连续巡检记录
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型目录，如 `onnx:///opt/tianyan/models`
  #[arg(long, value_name = "MODELS")]
  pub models: Url,
  /// 作物名称
  #[arg(long)]
  pub crop: CropId,
  /// 置信度阈值
  #[arg(long, default_value_t = Threshold::DEFAULT.value())]
  pub threshold: f32,
  /// 输入来源，如 `folder:///path/frames`
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 定位来源，如 `mock://`、`fixed://?lat=..&lon=..&sat=..` 或 `line:///dev/ttyUSB0`
  #[arg(long, value_name = "GPS", default_value = "mock://")]
  pub gps: Url,
  /// 记录冷却时间（毫秒）
  #[arg(long, default_value_t = DEFAULT_COOLDOWN.as_millis() as u64)]
  pub cooldown_ms: u64,
  /// 另存帧图像，如 `folder:///path/records`
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
  /// 最多处理的帧数
  #[arg(long)]
  pub frames: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型目录: {}", args.models);
  info!("输入来源: {}", args.input);
  info!("定位来源: {}", args.gps);

  let threshold = Threshold::new(args.threshold)?;
  let engine = InferenceEngine::with_loader(OnnxLoader::from_url(&args.models)?);
  let input = InputWrapper::from_url(&args.input)?;
  let gps = GpsWrapper::from_url(&args.gps)?;
  let recorder = DetectionRecorder::new(args.crop, gps, TracingSink)
    .with_cooldown(Duration::from_millis(args.cooldown_ms));
  let task = ContinuousTask::new(args.crop, threshold).with_frame_number(args.frames);

  match &args.output {
    Some(output) => {
      info!("输出路径: {}", output);
      let output = OutputWrapper::from_url(output)?;
      task.run_task(input, &engine, (recorder, output))
    }
    None => task.run_task(input, &engine, recorder),
  }
}
