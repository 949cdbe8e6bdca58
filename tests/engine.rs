// 该文件是 Tianyan （田眼） 项目的一部分。
// tests/engine.rs - 推理引擎集成测试
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

mod common;

use std::{
  sync::{Arc, Barrier, Mutex, mpsc},
  thread,
  time::Duration,
};

use image::RgbImage;
use tianyan::{
  CropId, EngineError, InferenceEngine, ModelRegistry, Threshold, UnifiedResult,
  model::{DetectItem, Labels, RawOutput},
  output::Render,
  result::BoxEntry,
  task::{ContinuousTask, Task},
};

use common::{StubLoader, leaf_image, scenario_loader};

#[test]
fn distinct_crops_get_distinct_handles() {
  let registry = ModelRegistry::new(StubLoader::new());
  let handles: Vec<_> = CropId::ALL
    .iter()
    .map(|crop| registry.get_model(*crop).unwrap())
    .collect();

  for (i, a) in handles.iter().enumerate() {
    assert_eq!(a.crop, CropId::ALL[i]);
    for b in handles.iter().skip(i + 1) {
      assert!(!Arc::ptr_eq(a, b));
    }
  }
  assert_eq!(registry.loaded().len(), CropId::COUNT);
}

#[test]
fn concurrent_first_calls_share_one_load() {
  const CALLERS: usize = 8;
  let registry = Arc::new(ModelRegistry::new(
    StubLoader::new().with_delay(Duration::from_millis(50)),
  ));
  let barrier = Arc::new(Barrier::new(CALLERS));

  let workers: Vec<_> = (0..CALLERS)
    .map(|_| {
      let registry = Arc::clone(&registry);
      let barrier = Arc::clone(&barrier);
      thread::spawn(move || {
        barrier.wait();
        registry.get_model(CropId::Chilli).unwrap()
      })
    })
    .collect();
  let handles: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

  assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
  assert_eq!(registry.loader().loads(CropId::Chilli), 1);
}

#[test]
fn slow_load_does_not_block_other_crops() {
  let registry = Arc::new(ModelRegistry::new(
    StubLoader::new().with_delay(Duration::from_millis(20)),
  ));
  let a = {
    let registry = Arc::clone(&registry);
    thread::spawn(move || registry.get_model(CropId::Rose).map(|_| ()))
  };
  let b = {
    let registry = Arc::clone(&registry);
    thread::spawn(move || registry.get_model(CropId::Turmeric).map(|_| ()))
  };
  a.join().unwrap().unwrap();
  b.join().unwrap().unwrap();
  assert_eq!(registry.loader().loads(CropId::Rose), 1);
  assert_eq!(registry.loader().loads(CropId::Turmeric), 1);
}

#[test]
fn unsupported_crop_fails_before_any_load() {
  let engine = InferenceEngine::with_loader(scenario_loader());
  for crop in ["banana", "Tomatoo", "", "tomato "] {
    let err = engine.infer(crop, &leaf_image(), 0.5).unwrap_err();
    match err {
      EngineError::UnsupportedCrop(e) => {
        assert_eq!(e.crop, crop.to_lowercase());
        assert_eq!(e.supported, vec!["chilli", "cotton", "rose", "tomato", "turmeric"]);
      }
      other => panic!("unexpected error: {other}"),
    }
  }
  assert_eq!(engine.registry().loader().total_loads(), 0);
}

#[test]
fn crop_names_are_case_normalized() {
  let engine = InferenceEngine::with_loader(scenario_loader());
  let result = engine.infer("TOMATO", &leaf_image(), 0.5).unwrap();
  assert_eq!(result.crop, CropId::Tomato);
}

#[test]
fn out_of_range_thresholds_are_rejected() {
  let engine = InferenceEngine::with_loader(scenario_loader());
  for t in [-0.1, 1.5, f32::NAN] {
    assert!(matches!(
      engine.infer("tomato", &leaf_image(), t),
      Err(EngineError::InvalidThreshold(_))
    ));
  }
  assert_eq!(engine.registry().loader().total_loads(), 0);
}

#[test]
fn tomato_classification_scenario() {
  let engine = InferenceEngine::with_loader(scenario_loader());
  let result = engine.infer("tomato", &leaf_image(), 0.5).unwrap();
  assert!(result.boxes.is_empty());
  assert_eq!(result.classification.len(), 1);
  assert_eq!(result.classification[0].class, "healthy");
  assert_eq!(result.classification[0].confidence, 0.91);
}

#[test]
fn cotton_detection_scenario() {
  let engine = InferenceEngine::with_loader(scenario_loader());
  let result = engine.infer("cotton", &leaf_image(), 0.5).unwrap();
  assert_eq!(
    result.boxes,
    vec![BoxEntry {
      class: "Leaf Hopper Jassids".into(),
      confidence: 0.72,
      bbox: [12.0, 34.0, 156.0, 178.0],
    }]
  );
  assert!(result.classification.is_empty());
}

#[test]
fn nothing_above_threshold_is_empty_not_error() {
  let loader = StubLoader::new().with_output(
    CropId::Chilli,
    Labels::from_names(["Leaf Curl", "Healthy Leaves"]),
    RawOutput::Both {
      detections: vec![DetectItem {
        class_id: 0,
        score: 0.2,
        bbox: [0.0, 0.0, 1.0, 1.0],
      }],
      probs: vec![0.1, 0.3],
    },
  );
  let engine = InferenceEngine::with_loader(loader);
  let result = engine.infer("chilli", &leaf_image(), 0.5).unwrap();
  assert!(result.is_empty());
}

#[test]
fn repeated_inference_is_identical() {
  let engine = InferenceEngine::with_loader(scenario_loader());
  let first = engine.infer("cotton", &leaf_image(), 0.25).unwrap();
  let second = engine.infer("cotton", &leaf_image(), 0.25).unwrap();
  assert_eq!(first, second);
  assert_eq!(engine.registry().loader().loads(CropId::Cotton), 1);
}

#[test]
fn higher_threshold_returns_subset() {
  let engine = InferenceEngine::with_loader(scenario_loader());
  let steps = [0.0, 0.1, 0.3, 0.4, 0.5, 0.72, 0.9, 1.0];
  for crop in ["tomato", "cotton"] {
    for pair in steps.windows(2) {
      let low = engine.infer(crop, &leaf_image(), pair[0]).unwrap();
      let high = engine.infer(crop, &leaf_image(), pair[1]).unwrap();
      assert!(high.boxes.iter().all(|b| low.boxes.contains(b)));
      assert!(
        high
          .classification
          .iter()
          .all(|c| low.classification.contains(c))
      );
    }
  }
}

#[test]
fn failed_load_is_reported_and_retried_later() {
  let engine = InferenceEngine::with_loader(StubLoader::new().failing(CropId::Rose));
  for _ in 0..2 {
    assert!(matches!(
      engine.infer("rose", &leaf_image(), 0.5),
      Err(EngineError::ModelLoad {
        crop: CropId::Rose,
        ..
      })
    ));
  }
  assert_eq!(engine.registry().loader().loads(CropId::Rose), 2);
  assert!(!engine.registry().is_loaded(CropId::Rose));
}

#[test]
fn invoke_failure_is_inference_error() {
  let engine = InferenceEngine::with_loader(scenario_loader());
  let err = engine
    .infer_crop(CropId::Tomato, &RgbImage::new(0, 0), Threshold::DEFAULT)
    .unwrap_err();
  assert!(matches!(err, EngineError::Inference { crop: CropId::Tomato, .. }));
  assert!(!err.is_client_error());
}

struct Collect(Arc<Mutex<Vec<UnifiedResult>>>);

impl Render<RgbImage, UnifiedResult> for Collect {
  type Error = std::io::Error;

  fn render_result(&self, _frame: &RgbImage, result: &UnifiedResult) -> Result<(), Self::Error> {
    self.0.lock().unwrap().push(result.clone());
    Ok(())
  }
}

#[test]
fn continuous_task_stops_at_frame_limit() {
  let engine = InferenceEngine::with_loader(scenario_loader());
  let seen = Arc::new(Mutex::new(Vec::new()));
  let (_tx, rx) = mpsc::channel();
  let frames = std::iter::repeat_with(leaf_image).take(10);

  ContinuousTask::new(CropId::Cotton, Threshold::DEFAULT)
    .with_frame_number(Some(3))
    .with_stop_signal(rx)
    .run_task(frames, &engine, Collect(Arc::clone(&seen)))
    .unwrap();

  let seen = seen.lock().unwrap();
  assert_eq!(seen.len(), 3);
  assert!(seen.iter().all(|r| r.boxes.len() == 1));
}

#[test]
fn continuous_task_honours_stop_signal() {
  let engine = InferenceEngine::with_loader(scenario_loader());
  let seen = Arc::new(Mutex::new(Vec::new()));
  let (tx, rx) = mpsc::channel();
  tx.send(()).unwrap();

  ContinuousTask::new(CropId::Tomato, Threshold::DEFAULT)
    .with_stop_signal(rx)
    .run_task(std::iter::repeat_with(leaf_image), &engine, Collect(Arc::clone(&seen)))
    .unwrap();

  assert_eq!(seen.lock().unwrap().len(), 1);
}
