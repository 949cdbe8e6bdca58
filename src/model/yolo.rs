// 该文件是 Tianyan （田眼） 项目的一部分。
// src/model/yolo.rs - Ultralytics YOLO ONNX 模型
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
  path::{Path, PathBuf},
  sync::{Mutex, PoisonError},
};

use image::{Rgb, RgbImage, imageops::FilterType};
use ndarray::Array4;
use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::TensorRef,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  crop::CropId,
  model::{DetectItem, Labels, Model, ModelLoader, RawOutput},
};

const MODEL_EXTENSION: &str = "onnx";
const YOLO_DETECT_INPUT: u32 = 640;
const YOLO_CLASSIFY_INPUT: u32 = 224;
// 与 Ultralytics 预测默认值一致
const YOLO_CANDIDATE_THRESH: f32 = 0.25;
const YOLO_NMS_THRESH: f32 = 0.45;
const YOLO_PAD_VALUE: u8 = 114;

#[derive(Error, Debug)]
pub enum OnnxModelError {
  #[error("模型文件不存在: {0}")]
  NotFound(PathBuf),
  #[error("ONNX Runtime 错误: {0}")]
  Ort(String),
  #[error("模型无效: {0}")]
  InvalidModel(String),
  #[error("模型输出不符合预期: {0}")]
  UnexpectedOutput(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YoloTask {
  Detect,
  Classify,
}

impl YoloTask {
  fn from_metadata(task: &str) -> Option<Self> {
    match task.trim() {
      "detect" => Some(YoloTask::Detect),
      "classify" => Some(YoloTask::Classify),
      _ => None,
    }
  }
}

/// 解析 Ultralytics 写入的 `names` 元数据，例如 `{0: 'healthy', 1: 'Late_blight'}`
fn parse_names(raw: &str) -> Option<Labels> {
  let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
  let mut names = Vec::new();
  let mut rest = body.trim();

  while !rest.is_empty() {
    let (key, after) = rest.split_once(':')?;
    let id: usize = key.trim().parse().ok()?;
    let after = after.trim_start();
    let quote = after.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let after = &after[1..];
    let end = after.find(quote)?;
    names.push((id, after[..end].to_string()));
    rest = after[end + 1..].trim_start();
    rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
  }

  Some(names.into_iter().collect())
}

/// 解析 `imgsz` 元数据，例如 `[640, 640]`
fn parse_imgsz(raw: &str) -> Option<(u32, u32)> {
  let body = raw.trim().trim_start_matches('[').trim_end_matches(']');
  let mut dims = body.split(',').map(|d| d.trim().parse::<u32>());
  let h = dims.next()?.ok()?;
  let w = match dims.next() {
    Some(w) => w.ok()?,
    None => h,
  };
  Some((h, w))
}

/// letterbox 缩放参数
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
  scale: f32,
  pad_x: f32,
  pad_y: f32,
  src_w: f32,
  src_h: f32,
}

impl Letterbox {
  fn new(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Self {
    let scale = (dst_w as f32 / src_w as f32).min(dst_h as f32 / src_h as f32);
    let new_w = (src_w as f32 * scale).round();
    let new_h = (src_h as f32 * scale).round();
    Self {
      scale,
      pad_x: (dst_w as f32 - new_w) / 2.0,
      pad_y: (dst_h as f32 - new_h) / 2.0,
      src_w: src_w as f32,
      src_h: src_h as f32,
    }
  }

  /// 模型输入坐标映射回原图像素坐标
  fn restore(&self, bbox: [f32; 4]) -> [f32; 4] {
    [
      ((bbox[0] - self.pad_x) / self.scale).clamp(0.0, self.src_w),
      ((bbox[1] - self.pad_y) / self.scale).clamp(0.0, self.src_h),
      ((bbox[2] - self.pad_x) / self.scale).clamp(0.0, self.src_w),
      ((bbox[3] - self.pad_y) / self.scale).clamp(0.0, self.src_h),
    ]
  }
}

fn to_nchw(image: &RgbImage) -> Array4<f32> {
  let (w, h) = image.dimensions();
  Array4::from_shape_fn((1, 3, h as usize, w as usize), |(_, c, y, x)| {
    image.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
  })
}

fn letterbox(image: &RgbImage, dst_w: u32, dst_h: u32) -> (Array4<f32>, Letterbox) {
  let lb = Letterbox::new(image.width(), image.height(), dst_w, dst_h);
  let new_w = ((image.width() as f32 * lb.scale).round() as u32).max(1);
  let new_h = ((image.height() as f32 * lb.scale).round() as u32).max(1);
  let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

  let mut canvas = RgbImage::from_pixel(dst_w, dst_h, Rgb([YOLO_PAD_VALUE; 3]));
  image::imageops::replace(
    &mut canvas,
    &resized,
    lb.pad_x.floor() as i64,
    lb.pad_y.floor() as i64,
  );
  (to_nchw(&canvas), lb)
}

/// 短边缩放到目标尺寸后居中裁剪
fn center_crop(image: &RgbImage, dst_w: u32, dst_h: u32) -> Array4<f32> {
  let scale = (dst_w as f32 / image.width() as f32).max(dst_h as f32 / image.height() as f32);
  let new_w = ((image.width() as f32 * scale).round() as u32).max(dst_w);
  let new_h = ((image.height() as f32 * scale).round() as u32).max(dst_h);
  let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);
  let x = (new_w - dst_w) / 2;
  let y = (new_h - dst_h) / 2;
  let cropped = image::imageops::crop_imm(&resized, x, y, dst_w, dst_h).to_image();
  to_nchw(&cropped)
}

fn ort_error(e: impl std::fmt::Display) -> OnnxModelError {
  OnnxModelError::Ort(e.to_string())
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 按类别的非极大值抑制，结果按置信度降序
fn nms(mut items: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<DetectItem> = Vec::new();
  for item in items {
    let suppressed = kept
      .iter()
      .any(|k| k.class_id == item.class_id && iou(&k.bbox, &item.bbox) >= iou_threshold);
    if !suppressed {
      kept.push(item);
    }
  }
  kept
}

/// 检测头的输出布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetectLayout {
  /// `[1, 4 + nc, N]`，框为中心点加宽高，需要 NMS
  Anchors { num_classes: usize, anchors: usize },
  /// `[1, N, 6]`，每行 `x1, y1, x2, y2, score, class`，导出时已完成 NMS
  EndToEnd { rows: usize },
}

const END_TO_END_COLUMNS: usize = 6;

/// 由输出形状与类别数（若元数据提供）确定布局，无法对应时报错
fn detect_layout(shape: &[usize], num_classes: Option<usize>) -> Result<DetectLayout, OnnxModelError> {
  let unexpected = || {
    OnnxModelError::UnexpectedOutput(format!(
      "检测输出形状 {:?} 无法识别（类别数 {:?}）",
      shape, num_classes
    ))
  };

  let [1, a, b] = *shape else {
    return Err(unexpected());
  };

  match num_classes {
    Some(nc) if a == 4 + nc => Ok(DetectLayout::Anchors {
      num_classes: nc,
      anchors: b,
    }),
    Some(_) if b == END_TO_END_COLUMNS => Ok(DetectLayout::EndToEnd { rows: a }),
    Some(_) => Err(unexpected()),
    // 无类别元数据时，锚点数远多于通道数
    None if b == END_TO_END_COLUMNS && a > b => Ok(DetectLayout::EndToEnd { rows: a }),
    None if a > 4 && b >= a => Ok(DetectLayout::Anchors {
      num_classes: a - 4,
      anchors: b,
    }),
    None => Err(unexpected()),
  }
}

/// 解码检测头输出，坐标映射回原图
fn decode_detections(
  data: &[f32],
  shape: &[usize],
  num_classes: Option<usize>,
  lb: &Letterbox,
) -> Result<Vec<DetectItem>, OnnxModelError> {
  let layout = detect_layout(shape, num_classes)?;
  let expected: usize = shape.iter().product();
  if data.len() != expected {
    return Err(OnnxModelError::UnexpectedOutput(format!(
      "检测输出长度 {} 与形状 {:?} 不符",
      data.len(),
      shape
    )));
  }

  match layout {
    DetectLayout::Anchors {
      num_classes,
      anchors,
    } => Ok(decode_anchors(data, num_classes, anchors, lb)),
    DetectLayout::EndToEnd { rows } => decode_end_to_end(data, rows, num_classes, lb),
  }
}

fn decode_anchors(data: &[f32], num_classes: usize, anchors: usize, lb: &Letterbox) -> Vec<DetectItem> {
  let mut candidates = Vec::new();
  for i in 0..anchors {
    let mut score = f32::MIN;
    let mut class_id = 0usize;
    for c in 0..num_classes {
      let s = data[(4 + c) * anchors + i];
      if s > score {
        score = s;
        class_id = c;
      }
    }

    if score < YOLO_CANDIDATE_THRESH {
      continue;
    }

    let cx = data[i];
    let cy = data[anchors + i];
    let w = data[2 * anchors + i];
    let h = data[3 * anchors + i];
    let bbox = lb.restore([cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]);
    candidates.push(DetectItem {
      class_id,
      score,
      bbox,
    });
  }

  debug!("候选框 {} 个", candidates.len());
  nms(candidates, YOLO_NMS_THRESH)
}

fn decode_end_to_end(
  data: &[f32],
  rows: usize,
  num_classes: Option<usize>,
  lb: &Letterbox,
) -> Result<Vec<DetectItem>, OnnxModelError> {
  let mut items = Vec::new();
  for row in data.chunks_exact(END_TO_END_COLUMNS).take(rows) {
    let score = row[4];
    if score < YOLO_CANDIDATE_THRESH {
      continue;
    }

    let class = row[5];
    if !class.is_finite() || class < 0.0 || class.fract() != 0.0 {
      return Err(OnnxModelError::UnexpectedOutput(format!("类别下标无效: {}", class)));
    }
    let class_id = class as usize;
    if num_classes.is_some_and(|nc| class_id >= nc) {
      return Err(OnnxModelError::UnexpectedOutput(format!(
        "类别下标 {} 超出类别数 {:?}",
        class_id, num_classes
      )));
    }

    items.push(DetectItem {
      class_id,
      score,
      bbox: lb.restore([row[0], row[1], row[2], row[3]]),
    });
  }
  items.sort_by(|a, b| b.score.total_cmp(&a.score));
  Ok(items)
}

/// 解码分类头输出 `[1, nc]`
fn decode_probs(data: &[f32], shape: &[usize]) -> Result<Vec<f32>, OnnxModelError> {
  match shape {
    [1, nc] if *nc == data.len() => Ok(data.to_vec()),
    _ => Err(OnnxModelError::UnexpectedOutput(format!(
      "分类输出形状应为 [1, nc]，实际为 {:?}",
      shape
    ))),
  }
}

/// Ultralytics 导出的 ONNX 模型
pub struct YoloOnnx {
  // ort 的 `Session::run` 需要独占访问，锁的范围仅限此模型
  session: Mutex<Session>,
  task: YoloTask,
  labels: Labels,
  input_name: String,
  output_name: String,
  input_w: u32,
  input_h: u32,
}

impl std::fmt::Debug for YoloOnnx {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("YoloOnnx")
      .field("task", &self.task)
      .field("num_classes", &self.labels.len())
      .field("input", &(self.input_w, self.input_h))
      .finish()
  }
}

impl YoloOnnx {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, OnnxModelError> {
    let path = path.as_ref();
    if !path.exists() {
      return Err(OnnxModelError::NotFound(path.to_path_buf()));
    }

    info!("加载模型文件: {}", path.display());
    if let Ok(meta) = std::fs::metadata(path) {
      debug!(
        "模型文件大小: {:.2} MB",
        meta.len() as f64 / (1024.0 * 1024.0)
      );
    }

    #[allow(unused_mut)]
    let mut builder = Session::builder().map_err(ort_error)?;
    #[cfg(feature = "cuda")]
    {
      builder = builder
        .with_execution_providers([
          ort::execution_providers::CUDAExecutionProvider::default().build(),
        ])
        .map_err(ort_error)?;
    }
    let session = builder
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(ort_error)?
      .commit_from_file(path)
      .map_err(ort_error)?;

    let (task_meta, names_meta, imgsz_meta) = {
      let metadata = session.metadata().map_err(ort_error)?;
      (
        metadata.custom("task").map_err(ort_error)?,
        metadata.custom("names").map_err(ort_error)?,
        metadata.custom("imgsz").map_err(ort_error)?,
      )
    };

    let task = match task_meta.as_deref().and_then(YoloTask::from_metadata) {
      Some(task) => task,
      None => {
        let rank = session
          .outputs
          .first()
          .and_then(|o| o.output_type.tensor_shape().map(|s| s.len()))
          .unwrap_or_default();
        match rank {
          2 => YoloTask::Classify,
          3 => YoloTask::Detect,
          _ => {
            error!("无法确定模型任务类型，输出维度: {}", rank);
            return Err(OnnxModelError::InvalidModel(format!(
              "缺少 task 元数据且输出维度 {} 无法识别",
              rank
            )));
          }
        }
      }
    };

    let labels = match names_meta.as_deref().and_then(parse_names) {
      Some(labels) => labels,
      None => {
        warn!("模型缺少 names 元数据，类别将以下标命名");
        Labels::default()
      }
    };

    let input = session
      .inputs
      .first()
      .ok_or_else(|| OnnxModelError::InvalidModel("模型没有输入".to_string()))?;
    let input_name = input.name.clone();
    let output_name = session
      .outputs
      .first()
      .map(|o| o.name.clone())
      .ok_or_else(|| OnnxModelError::InvalidModel("模型没有输出".to_string()))?;
    let default_size = match task {
      YoloTask::Detect => YOLO_DETECT_INPUT,
      YoloTask::Classify => YOLO_CLASSIFY_INPUT,
    };
    let (mut input_h, mut input_w) = imgsz_meta
      .as_deref()
      .and_then(parse_imgsz)
      .unwrap_or((default_size, default_size));
    if let Some(dims) = input.input_type.tensor_shape()
      && dims.len() == 4
      && dims[2] > 0
      && dims[3] > 0
    {
      input_h = dims[2] as u32;
      input_w = dims[3] as u32;
    }

    debug!(
      "模型任务: {:?}, 输入: {} {}x{}, 类别数: {}",
      task,
      input_name,
      input_w,
      input_h,
      labels.len()
    );

    Ok(Self {
      session: Mutex::new(session),
      task,
      labels,
      input_name,
      output_name,
      input_w,
      input_h,
    })
  }

  pub fn task(&self) -> YoloTask {
    self.task
  }

  fn run(&self, input: &Array4<f32>) -> Result<(Vec<f32>, Vec<usize>), OnnxModelError> {
    let contiguous = input.as_standard_layout();
    let tensor = TensorRef::from_array_view(&contiguous).map_err(ort_error)?;

    let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
    let outputs = session
      .run(ort::inputs![&self.input_name => tensor])
      .map_err(ort_error)?;
    let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
      OnnxModelError::UnexpectedOutput(format!("缺少输出 {}", self.output_name))
    })?;

    let (shape, data) = output.try_extract_tensor::<f32>().map_err(ort_error)?;
    let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
    Ok((data.to_vec(), shape))
  }
}

impl Model for YoloOnnx {
  type Error = OnnxModelError;

  fn invoke(&self, image: &RgbImage) -> Result<RawOutput, Self::Error> {
    if image.width() == 0 || image.height() == 0 {
      return Err(OnnxModelError::UnexpectedOutput(format!(
        "输入图像尺寸无效: {}x{}",
        image.width(),
        image.height()
      )));
    }

    match self.task {
      YoloTask::Detect => {
        let (input, lb) = letterbox(image, self.input_w, self.input_h);
        let (data, shape) = self.run(&input)?;
        let num_classes = (!self.labels.is_empty()).then(|| self.labels.len());
        Ok(RawOutput::Detections(decode_detections(
          &data,
          &shape,
          num_classes,
          &lb,
        )?))
      }
      YoloTask::Classify => {
        let input = center_crop(image, self.input_w, self.input_h);
        let (data, shape) = self.run(&input)?;
        Ok(RawOutput::Classifications(decode_probs(&data, &shape)?))
      }
    }
  }

  fn labels(&self) -> &Labels {
    &self.labels
  }
}

/// 从目录按 `<crop>.onnx` 加载模型
#[derive(Debug, Clone)]
pub struct OnnxLoader {
  models_dir: PathBuf,
}

impl OnnxLoader {
  pub fn new(models_dir: impl Into<PathBuf>) -> Self {
    Self {
      models_dir: models_dir.into(),
    }
  }

  pub fn model_path(&self, crop: CropId) -> PathBuf {
    self
      .models_dir
      .join(format!("{}.{}", crop.as_str(), MODEL_EXTENSION))
  }
}

impl FromUrlWithScheme for OnnxLoader {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxLoader {
  type Error = OnnxModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }
    let path = urlencoding::decode(url.path())
      .map_err(|e| OnnxModelError::ModelPathError(e.to_string()))?;
    Ok(OnnxLoader::new(path.into_owned()))
  }
}

impl ModelLoader for OnnxLoader {
  type Model = YoloOnnx;
  type Error = OnnxModelError;

  fn load(&self, crop: CropId) -> Result<Self::Model, Self::Error> {
    YoloOnnx::load(self.model_path(crop))
  }
}

/// 推理设备名称
pub fn accelerator() -> &'static str {
  #[cfg(feature = "cuda")]
  {
    use ort::execution_providers::ExecutionProvider;
    if ort::execution_providers::CUDAExecutionProvider::default()
      .is_available()
      .unwrap_or(false)
    {
      return "cuda";
    }
  }
  "cpu"
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_ultralytics_names() {
    let labels = parse_names("{0: 'Bacterial Blight', 1: \"Curl Virus\", 2: 'Healthy Leaf'}").unwrap();
    assert_eq!(labels.len(), 3);
    assert_eq!(labels.name(0), "Bacterial Blight");
    assert_eq!(labels.name(1), "Curl Virus");
    assert_eq!(labels.name(2), "Healthy Leaf");
    assert!(parse_names("[0, 1]").is_none());
    assert_eq!(parse_names("{}").unwrap().len(), 0);
  }

  #[test]
  fn parses_imgsz() {
    assert_eq!(parse_imgsz("[640, 480]"), Some((640, 480)));
    assert_eq!(parse_imgsz("224"), Some((224, 224)));
    assert_eq!(parse_imgsz("[a]"), None);
  }

  #[test]
  fn letterbox_restores_pixel_coordinates() {
    // 1280x640 缩放 0.5 后上下各填充 160
    let lb = Letterbox::new(1280, 640, 640, 640);
    assert_eq!(lb.scale, 0.5);
    assert_eq!(lb.pad_x, 0.0);
    assert_eq!(lb.pad_y, 160.0);
    assert_eq!(lb.restore([10.0, 170.0, 110.0, 470.0]), [20.0, 20.0, 220.0, 620.0]);
    assert_eq!(lb.restore([-5.0, 0.0, 700.0, 640.0]), [0.0, 0.0, 1280.0, 640.0]);
  }

  #[test]
  fn letterbox_tensor_has_model_shape() {
    let image = RgbImage::from_pixel(100, 50, Rgb([255, 0, 0]));
    let (tensor, _) = letterbox(&image, 64, 64);
    assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
    // 中心为原图，顶端为填充
    assert_eq!(tensor[[0, 0, 32, 32]], 1.0);
    assert_eq!(tensor[[0, 0, 0, 0]], YOLO_PAD_VALUE as f32 / 255.0);
  }

  #[test]
  fn center_crop_tensor_has_model_shape() {
    let image = RgbImage::from_pixel(300, 200, Rgb([0, 255, 0]));
    let tensor = center_crop(&image, 224, 224);
    assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    assert_eq!(tensor[[0, 1, 100, 100]], 1.0);
  }

  #[test]
  fn decodes_detection_head_with_nms() {
    // 2 个类别，3 个锚点；锚点 0 与 1 同类且重叠，锚点 2 低于候选阈值
    let anchors = 3;
    let mut data = vec![0.0f32; 6 * anchors];
    let rows: [[f32; 3]; 6] = [
      [50.0, 52.0, 10.0],  // cx
      [50.0, 50.0, 10.0],  // cy
      [20.0, 20.0, 4.0],   // w
      [20.0, 20.0, 4.0],   // h
      [0.9, 0.7, 0.1],     // class 0
      [0.1, 0.2, 0.2],     // class 1
    ];
    for (r, row) in rows.iter().enumerate() {
      for (i, v) in row.iter().enumerate() {
        data[r * anchors + i] = *v;
      }
    }
    let lb = Letterbox::new(100, 100, 100, 100);
    let items = decode_detections(&data, &[1, 6, anchors], Some(2), &lb).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 0);
    assert_eq!(items[0].score, 0.9);
    assert_eq!(items[0].bbox, [40.0, 40.0, 60.0, 60.0]);
  }

  #[test]
  fn nms_keeps_overlapping_boxes_of_different_classes() {
    let a = DetectItem {
      class_id: 0,
      score: 0.6,
      bbox: [0.0, 0.0, 10.0, 10.0],
    };
    let b = DetectItem {
      class_id: 1,
      score: 0.8,
      bbox: [0.0, 0.0, 10.0, 10.0],
    };
    let kept = nms(vec![a.clone(), b.clone()], 0.45);
    assert_eq!(kept, vec![b, a]);
  }

  #[test]
  fn rejects_unexpected_shapes() {
    let lb = Letterbox::new(10, 10, 10, 10);
    assert!(decode_detections(&[0.0; 8], &[1, 4, 2], None, &lb).is_err());
    assert!(decode_probs(&[0.1, 0.9], &[1, 3]).is_err());
    assert_eq!(decode_probs(&[0.1, 0.9], &[1, 2]).unwrap(), vec![0.1, 0.9]);
  }

  #[test]
  fn class_count_must_match_channel_rows() {
    let lb = Letterbox::new(100, 100, 100, 100);
    let data = vec![0.0f32; 6 * 3];
    // 2 类模型应有 6 行通道，元数据声明 3 类时拒绝
    assert!(decode_detections(&data, &[1, 6, 3], Some(3), &lb).is_err());
    assert!(decode_detections(&data, &[1, 6, 3], Some(2), &lb).is_ok());
  }

  #[test]
  fn end_to_end_rows_are_decoded_not_guessed() {
    let rows = 300;
    let mut data = Vec::with_capacity(rows * 6);
    data.extend_from_slice(&[10.0, 10.0, 50.0, 50.0, 0.9, 1.0]);
    data.extend_from_slice(&[20.0, 30.0, 40.0, 60.0, 0.6, 0.0]);
    for _ in 2..rows {
      data.extend_from_slice(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }
    let lb = Letterbox::new(100, 100, 100, 100);

    for num_classes in [Some(2), None] {
      let items = decode_detections(&data, &[1, rows, 6], num_classes, &lb).unwrap();
      assert_eq!(items.len(), 2);
      assert_eq!(items[0].class_id, 1);
      assert_eq!(items[0].score, 0.9);
      assert_eq!(items[0].bbox, [10.0, 10.0, 50.0, 50.0]);
      assert_eq!(items[1].class_id, 0);
    }
  }

  #[test]
  fn end_to_end_class_outside_labels_is_rejected() {
    let mut data = vec![0.0f32; 300 * 6];
    data[..6].copy_from_slice(&[10.0, 10.0, 50.0, 50.0, 0.9, 4.0]);
    let lb = Letterbox::new(100, 100, 100, 100);
    assert!(matches!(
      decode_detections(&data, &[1, 300, 6], Some(2), &lb),
      Err(OnnxModelError::UnexpectedOutput(_))
    ));
  }

  #[test]
  fn unknown_detection_layout_is_rejected() {
    let lb = Letterbox::new(100, 100, 100, 100);
    assert!(decode_detections(&[0.0; 300 * 7], &[1, 300, 7], Some(2), &lb).is_err());
    assert!(decode_detections(&[0.0; 300 * 7], &[1, 300, 7], None, &lb).is_err());
    assert!(decode_detections(&[0.0; 12], &[2, 6, 1], None, &lb).is_err());
  }

  #[test]
  fn loader_derives_path_per_crop() {
    let loader = OnnxLoader::from_url(&Url::parse("onnx:///srv/models").unwrap()).unwrap();
    assert_eq!(
      loader.model_path(CropId::Tomato),
      PathBuf::from("/srv/models/tomato.onnx")
    );
    assert!(OnnxLoader::from_url(&Url::parse("file:///srv/models").unwrap()).is_err());
  }

  #[test]
  fn missing_artifact_is_reported() {
    let loader = OnnxLoader::new("/nonexistent/models");
    let err = loader.load(CropId::Cotton).unwrap_err();
    assert!(matches!(err, OnnxModelError::NotFound(p) if p.ends_with("cotton.onnx")));
  }
}
