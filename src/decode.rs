// 该文件是 Tianyan （田眼） 项目的一部分。
// src/decode.rs - 上传图像解码
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

use image::RgbImage;
use thiserror::Error;
use tracing::debug;

pub const SUPPORTED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/jpg"];

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("Unsupported image format: {0}")]
  UnsupportedFormat(String),
  #[error("Invalid or corrupted image: {0}")]
  Corrupted(#[from] image::ImageError),
}

fn media_type(content_type: &str) -> String {
  content_type
    .split(';')
    .next()
    .unwrap_or_default()
    .trim()
    .to_ascii_lowercase()
}

/// 按声明的内容类型解码图像
///
/// 内容类型只用于白名单校验，实际格式由数据本身识别。
pub fn decode_image(bytes: &[u8], content_type: &str) -> Result<RgbImage, DecodeError> {
  let media = media_type(content_type);
  if !SUPPORTED_CONTENT_TYPES.contains(&media.as_str()) {
    return Err(DecodeError::UnsupportedFormat(content_type.to_string()));
  }

  let image = image::load_from_memory(bytes)?.to_rgb8();
  debug!(
    "图像解码完成: {}x{}, {} 字节",
    image.width(),
    image.height(),
    bytes.len()
  );
  Ok(image)
}
