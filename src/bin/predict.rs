// 该文件是 Tianyan （田眼） 项目的一部分。
// src/bin/predict.rs - 单张图像推理
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

use anyhow::Result;
use clap::Parser;
use image::RgbImage;
use tracing::info;
use url::Url;

use tianyan::{
  CropId, FromUrl, InferenceEngine, Threshold, UnifiedResult,
  input::InputWrapper,
  model::OnnxLoader,
  output::{OutputWrapper, Render},
  task::{OneShotTask, Task},
};

/// 田眼 单张图像推理，结果以 JSON 输出
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
  /// 输入来源，如 `image:///path/leaf.jpg`
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 标注图像输出，如 `image:///path/out.png`
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
}

/// 将结果打印为 JSON
struct PrintJson;

impl Render<RgbImage, UnifiedResult> for PrintJson {
  type Error = serde_json::Error;

  fn render_result(&self, _frame: &RgbImage, result: &UnifiedResult) -> Result<(), Self::Error> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型目录: {}", args.models);
  info!("输入来源: {}", args.input);

  let threshold = Threshold::new(args.threshold)?;
  let engine = InferenceEngine::with_loader(OnnxLoader::from_url(&args.models)?);
  let input = InputWrapper::from_url(&args.input)?;
  let task = OneShotTask::new(args.crop, threshold);

  match &args.output {
    Some(output) => {
      info!("输出路径: {}", output);
      let output = OutputWrapper::from_url(output)?;
      task.run_task(input, &engine, (PrintJson, output))
    }
    None => task.run_task(input, &engine, PrintJson),
  }
}
