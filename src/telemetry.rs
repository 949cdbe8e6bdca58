// 该文件是 Tianyan （田眼） 项目的一部分。
// src/telemetry.rs - 定位数据来源
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
  fs::File,
  io::{BufRead, BufReader},
  sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
  },
  thread::{self, JoinHandle},
  time::Duration,
};

use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

pub const MOCK_BASE_LAT: f64 = 16.495906;
pub const MOCK_BASE_LON: f64 = 80.496290;
const MOCK_JITTER: f64 = 0.0005;
const MOCK_SATELLITES: std::ops::RangeInclusive<u32> = 5..=12;
const MOCK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GpsFix {
  pub lat: f64,
  pub lon: f64,
  pub satellites: u32,
}

#[derive(Error, Debug)]
pub enum GpsError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("参数 {key} 无效: {value}")]
  InvalidParameter { key: String, value: String },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 当前位置的只读快照
pub trait GpsSource: Send + Sync {
  fn snapshot(&self) -> GpsFix;
}

/// 固定位置
impl GpsSource for GpsFix {
  fn snapshot(&self) -> GpsFix {
    *self
  }
}

impl<G: GpsSource + ?Sized> GpsSource for Arc<G> {
  fn snapshot(&self) -> GpsFix {
    (**self).snapshot()
  }
}

/// 解析 `LAT:..,LON:..,SAT:..` 格式的一行
///
/// 缺失或无法解析的字段保留 `current` 中的值；没有任何字段更新时返回 `None`。
pub fn parse_gps_line(line: &str, current: GpsFix) -> Option<GpsFix> {
  let mut fix = current;
  let mut updated = false;
  for part in line.trim().split(',') {
    let Some((key, value)) = part.split_once(':') else {
      continue;
    };
    let value = value.trim();
    match key.trim() {
      "LAT" => {
        if let Ok(lat) = value.parse::<f64>() {
          fix.lat = lat;
          updated = true;
        }
      }
      "LON" => {
        if let Ok(lon) = value.parse::<f64>() {
          fix.lon = lon;
          updated = true;
        }
      }
      "SAT" => {
        // 卫星数可能以浮点形式给出
        if let Ok(sat) = value.parse::<f64>()
          && sat.is_finite()
          && sat >= 0.0
        {
          fix.satellites = sat.trunc() as u32;
          updated = true;
        }
      }
      _ => {}
    }
  }
  updated.then_some(fix)
}

fn jittered(base: (f64, f64)) -> GpsFix {
  let mut rng = rand::rng();
  GpsFix {
    lat: base.0 + rng.random_range(-MOCK_JITTER..=MOCK_JITTER),
    lon: base.1 + rng.random_range(-MOCK_JITTER..=MOCK_JITTER),
    satellites: rng.random_range(MOCK_SATELLITES),
  }
}

/// 模拟定位，后台线程按固定间隔在基准点附近抖动
pub struct MockGps {
  state: Arc<Mutex<GpsFix>>,
  running: Arc<AtomicBool>,
  worker: Option<JoinHandle<()>>,
}

impl MockGps {
  pub fn new(lat: f64, lon: f64, interval: Duration) -> Result<Self, GpsError> {
    let base = (lat, lon);
    let state = Arc::new(Mutex::new(jittered(base)));
    let running = Arc::new(AtomicBool::new(true));

    let worker = {
      let state = Arc::clone(&state);
      let running = Arc::clone(&running);
      thread::Builder::new()
        .name("mock-gps".into())
        .spawn(move || {
          while running.load(Ordering::SeqCst) {
            thread::park_timeout(interval);
            if !running.load(Ordering::SeqCst) {
              break;
            }
            let fix = jittered(base);
            *state.lock().unwrap_or_else(PoisonError::into_inner) = fix;
          }
          debug!("模拟定位线程退出");
        })?
    };

    info!(
      "模拟定位已启动: 基准 ({:.6}, {:.6})，间隔 {:?}",
      lat, lon, interval
    );

    Ok(Self {
      state,
      running,
      worker: Some(worker),
    })
  }
}

impl GpsSource for MockGps {
  fn snapshot(&self) -> GpsFix {
    *self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl Drop for MockGps {
  fn drop(&mut self) {
    self.running.store(false, Ordering::SeqCst);
    if let Some(worker) = self.worker.take() {
      worker.thread().unpark();
      let _ = worker.join();
    }
  }
}

impl FromUrlWithScheme for MockGps {
  const SCHEME: &'static str = "mock";
}

fn query_param<T: std::str::FromStr>(url: &Url, key: &str) -> Result<Option<T>, GpsError> {
  match url.query_pairs().find(|(k, _)| k == key) {
    Some((_, value)) => value
      .parse::<T>()
      .map(Some)
      .map_err(|_| GpsError::InvalidParameter {
        key: key.to_string(),
        value: value.into_owned(),
      }),
    None => Ok(None),
  }
}

/// `mock://?lat=..&lon=..&interval_ms=..`
impl FromUrl for MockGps {
  type Error = GpsError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GpsError::SchemeMismatch(url.scheme().to_string()));
    }
    let lat = query_param(url, "lat")?.unwrap_or(MOCK_BASE_LAT);
    let lon = query_param(url, "lon")?.unwrap_or(MOCK_BASE_LON);
    let interval = query_param::<u64>(url, "interval_ms")?
      .map(Duration::from_millis)
      .unwrap_or(MOCK_INTERVAL);
    MockGps::new(lat, lon, interval)
  }
}

/// `fixed://?lat=..&lon=..&sat=..`
pub struct FixedGps(GpsFix);

impl FromUrlWithScheme for FixedGps {
  const SCHEME: &'static str = "fixed";
}

impl FromUrl for FixedGps {
  type Error = GpsError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GpsError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(FixedGps(GpsFix {
      lat: query_param(url, "lat")?.unwrap_or_default(),
      lon: query_param(url, "lon")?.unwrap_or_default(),
      satellites: query_param(url, "sat")?.unwrap_or_default(),
    }))
  }
}

impl GpsSource for FixedGps {
  fn snapshot(&self) -> GpsFix {
    self.0
  }
}

/// 逐行读取 `LAT:..,LON:..,SAT:..` 文本的定位来源
///
/// 后台线程读到 EOF 或读取出错时退出，快照保留最后一次有效定位。
/// 阻塞读无法中断，因此析构时不等待线程结束。
pub struct LineGps {
  state: Arc<Mutex<GpsFix>>,
  worker: JoinHandle<()>,
}

impl LineGps {
  pub fn spawn<R>(reader: R) -> Result<Self, GpsError>
  where
    R: BufRead + Send + 'static,
  {
    let state = Arc::new(Mutex::new(GpsFix::default()));
    let worker = {
      let state = Arc::clone(&state);
      thread::Builder::new()
        .name("line-gps".into())
        .spawn(move || {
          for line in reader.lines() {
            let line = match line {
              Ok(line) => line,
              Err(e) => {
                warn!("定位数据读取失败: {}", e);
                break;
              }
            };
            let mut fix = state.lock().unwrap_or_else(PoisonError::into_inner);
            match parse_gps_line(&line, *fix) {
              Some(next) => *fix = next,
              None => debug!("忽略定位行: {}", line.trim()),
            }
          }
          debug!("定位读取线程退出");
        })?
    };
    Ok(Self { state, worker })
  }

  pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, GpsError> {
    let file = File::open(path.as_ref())?;
    info!("定位数据来源: {}", path.as_ref().display());
    Self::spawn(BufReader::new(file))
  }

  /// 读取线程是否已结束
  pub fn is_finished(&self) -> bool {
    self.worker.is_finished()
  }
}

impl GpsSource for LineGps {
  fn snapshot(&self) -> GpsFix {
    *self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl FromUrlWithScheme for LineGps {
  const SCHEME: &'static str = "line";
}

/// `line:///dev/ttyUSB0`，也可以是 FIFO 或普通文件
impl FromUrl for LineGps {
  type Error = GpsError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GpsError::SchemeMismatch(url.scheme().to_string()));
    }
    let path = urlencoding::decode(url.path())
      .map(|p| p.into_owned())
      .unwrap_or_else(|_| url.path().to_string());
    LineGps::open(path)
  }
}

pub enum GpsWrapper {
  Mock(MockGps),
  Fixed(FixedGps),
  Line(LineGps),
}

impl FromUrl for GpsWrapper {
  type Error = GpsError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      MockGps::SCHEME => Ok(GpsWrapper::Mock(MockGps::from_url(url)?)),
      FixedGps::SCHEME => Ok(GpsWrapper::Fixed(FixedGps::from_url(url)?)),
      LineGps::SCHEME => Ok(GpsWrapper::Line(LineGps::from_url(url)?)),
      other => Err(GpsError::SchemeMismatch(other.to_string())),
    }
  }
}

impl GpsSource for GpsWrapper {
  fn snapshot(&self) -> GpsFix {
    match self {
      GpsWrapper::Mock(gps) => gps.snapshot(),
      GpsWrapper::Fixed(gps) => gps.snapshot(),
      GpsWrapper::Line(gps) => gps.snapshot(),
    }
  }
}
