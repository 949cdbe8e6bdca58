// 该文件是 Tianyan （田眼） 项目的一部分。
// src/bin/serve.rs - HTTP 推理服务入口
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
  net::{IpAddr, SocketAddr},
  path::PathBuf,
};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use tianyan::{
  CropId, InferenceEngine,
  model::{OnnxLoader, accelerator},
  server::{AppState, router},
};

/// 田眼 作物病害推理服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 监听地址，IPv4 或 IPv6，如 `0.0.0.0`、`::`
  #[arg(long, default_value = "0.0.0.0", env = "TIANYAN_HOST")]
  pub host: IpAddr,
  /// 监听端口
  #[arg(short, long, default_value_t = 8000, env = "TIANYAN_PORT")]
  pub port: u16,
  /// 模型目录，其中包含 `<作物>.onnx`
  #[arg(long, default_value = "./models", env = "TIANYAN_MODELS_DIR")]
  pub models_dir: PathBuf,
}

impl Args {
  pub fn bind_addr(&self) -> SocketAddr {
    SocketAddr::new(self.host, self.port)
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let loader = OnnxLoader::new(&args.models_dir);
  for crop in CropId::ALL {
    let path = loader.model_path(crop);
    if !path.exists() {
      warn!("作物 {} 的模型文件不存在: {}", crop, path.display());
    }
  }

  let device = accelerator();
  info!("田眼 推理服务 v{}", env!("CARGO_PKG_VERSION"));
  info!("模型目录: {}", args.models_dir.display());
  info!("推理设备: {}", device);

  let state = AppState::new(InferenceEngine::with_loader(loader), device);
  let app = router(state);

  let addr = args.bind_addr();
  info!("服务启动: http://{}", addr);

  let listener = tokio::net::TcpListener::bind(addr).await?;
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!("收到中断信号，服务退出");
    })
    .await?;

  Ok(())
}
