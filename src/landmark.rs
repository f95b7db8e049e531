// 该文件是 Yanjian （眼睑） 项目的一部分。
// src/landmark.rs - 人脸关键点与检测器接口
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::Frame};

mod process;
mod replay;
pub use self::process::ProcessDetector;
pub use self::replay::ReplayDetector;

/// 单个关键点，坐标相对帧宽高归一化到 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LandmarkPoint {
  pub x: f32,
  pub y: f32,
}

impl LandmarkPoint {
  pub const fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }

  pub fn midpoint(&self, other: &Self) -> Self {
    Self {
      x: (self.x + other.x) / 2.0,
      y: (self.y + other.y) / 2.0,
    }
  }
}

/// 一张人脸的关键点集合，索引含义由检测器约定
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
  points: Box<[LandmarkPoint]>,
}

impl From<Vec<LandmarkPoint>> for LandmarkSet {
  fn from(points: Vec<LandmarkPoint>) -> Self {
    Self {
      points: points.into_boxed_slice(),
    }
  }
}

impl std::ops::Index<usize> for LandmarkSet {
  type Output = LandmarkPoint;

  fn index(&self, index: usize) -> &Self::Output {
    &self.points[index]
  }
}

impl LandmarkSet {
  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  /// 是否包含索引 `max_index` 及之前的全部关键点
  pub fn covers(&self, max_index: usize) -> bool {
    max_index < self.points.len()
  }

  /// 解析一行 JSON：`null`、`[]` 表示没有人脸，否则为 `[[x, y], ...]` 或 `[[x, y, z], ...]`
  pub fn parse_json_line(line: &str) -> Result<Option<Self>, DetectorError> {
    let raw: Option<Vec<Vec<f32>>> = serde_json::from_str(line.trim())?;
    let Some(raw) = raw else {
      return Ok(None);
    };
    if raw.is_empty() {
      return Ok(None);
    }

    let points = raw
      .into_iter()
      .enumerate()
      .map(|(index, coords)| match coords.as_slice() {
        [x, y] | [x, y, _] => Ok(LandmarkPoint::new(*x, *y)),
        _ => Err(DetectorError::MalformedPoint {
          index,
          len: coords.len(),
        }),
      })
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(Self::from(points)))
  }
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("关键点 JSON 解析错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("第 {index} 个关键点坐标数量错误: {len}")]
  MalformedPoint { index: usize, len: usize },
  #[error("检测进程已退出")]
  ProcessExited,
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 外部人脸关键点检测器
///
/// 每帧调用一次；`Ok(None)` 表示该帧没有检测到人脸。
pub trait LandmarkDetector {
  type Error;

  fn detect(&mut self, frame: &Frame) -> Result<Option<LandmarkSet>, Self::Error>;
}

impl<D: LandmarkDetector + ?Sized> LandmarkDetector for Box<D> {
  type Error = D::Error;

  fn detect(&mut self, frame: &Frame) -> Result<Option<LandmarkSet>, Self::Error> {
    (**self).detect(frame)
  }
}

pub type BoxedDetector = Box<dyn LandmarkDetector<Error = DetectorError>>;

/// 根据 URL 方案创建检测器
///
/// - `jsonl:///path/to/landmarks.jsonl` 回放预先计算的关键点
/// - `exec:///path/to/detector?arg=--model&arg=face.onnx` 通过子进程检测
pub fn create_detector(url: &Url) -> Result<BoxedDetector, DetectorError> {
  match url.scheme() {
    ReplayDetector::SCHEME => Ok(Box::new(ReplayDetector::from_url(url)?)),
    ProcessDetector::SCHEME => Ok(Box::new(ProcessDetector::from_url(url)?)),
    scheme => Err(DetectorError::SchemeMismatch(scheme.to_string())),
  }
}
