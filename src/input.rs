// 该文件是 Yanjian （眼睑） 项目的一部分。
// src/input.rs - 视频/图像输入
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
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

mod v4l2_source;
pub use self::v4l2_source::V4l2Source;

#[cfg(feature = "read_image_file")]
mod image_source;
#[cfg(feature = "read_image_file")]
pub use self::image_source::ImageSource;

/// 帧数据
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl Frame {
  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

/// 输入源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSourceType {
  /// 图片文件
  Image,
  /// V4L2 摄像头
  V4l2,
  /// 内存中的帧序列
  Memory,
}

#[derive(Error, Debug)]
pub enum InputError {
  #[error("无法打开设备 {path}: {source}")]
  DeviceOpen {
    path: String,
    source: std::io::Error,
  },
  #[error("V4L 错误: {0}")]
  V4l(std::io::Error),
  #[error("不支持的像素格式: {0}")]
  UnsupportedPixelFormat(String),
  #[error("无法捕获帧: {0}")]
  Capture(std::io::Error),
  #[error("捕获缓冲区大小不匹配: 期望 {expected}, 实际 {actual}")]
  BufferSize { expected: usize, actual: usize },
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 输入源 trait
pub trait InputSource: Iterator<Item = Result<Frame, InputError>> {
  /// 获取输入源类型
  fn source_type(&self) -> InputSourceType;

  /// 获取帧宽度
  fn width(&self) -> u32;

  /// 获取帧高度
  fn height(&self) -> u32;

  /// 获取帧率（如果适用）
  fn fps(&self) -> Option<f64>;
}

impl<S: InputSource + ?Sized> InputSource for Box<S> {
  fn source_type(&self) -> InputSourceType {
    (**self).source_type()
  }

  fn width(&self) -> u32 {
    (**self).width()
  }

  fn height(&self) -> u32 {
    (**self).height()
  }

  fn fps(&self) -> Option<f64> {
    (**self).fps()
  }
}

/// 内存帧序列输入，用于回放或测试
pub struct MemorySource {
  frames: std::vec::IntoIter<Result<Frame, InputError>>,
  width: u32,
  height: u32,
}

impl MemorySource {
  pub fn new(frames: Vec<Result<Frame, InputError>>) -> Self {
    let (width, height) = frames
      .iter()
      .find_map(|frame| frame.as_ref().ok().map(|f| (f.width(), f.height())))
      .unwrap_or((0, 0));
    Self {
      frames: frames.into_iter(),
      width,
      height,
    }
  }

  /// 由若干图像构造，帧索引与时间戳按 33ms 间隔递增
  pub fn from_images(images: impl IntoIterator<Item = RgbImage>) -> Self {
    let frames = images
      .into_iter()
      .enumerate()
      .map(|(index, image)| {
        Ok(Frame {
          image,
          index: index as u64,
          timestamp_ms: index as u64 * 33,
        })
      })
      .collect();
    Self::new(frames)
  }
}

impl Iterator for MemorySource {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.frames.next()
  }
}

impl InputSource for MemorySource {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::Memory
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    None
  }
}

/// 按摄像头序号打开 `/dev/videoN`
pub fn open_camera(index: usize) -> Result<Box<dyn InputSource>, InputError> {
  Ok(Box::new(V4l2Source::with_index(index)?))
}

/// 根据 URL 方案打开输入源
///
/// - `v4l:///dev/video0`
/// - `image:///path/to/frame.png`（需要 `read_image_file` 特性）
pub fn open_input(url: &Url) -> Result<Box<dyn InputSource>, InputError> {
  if url.scheme() == V4l2Source::SCHEME {
    return Ok(Box::new(V4l2Source::from_url(url)?));
  }
  #[cfg(feature = "read_image_file")]
  {
    if url.scheme() == ImageSource::SCHEME {
      return Ok(Box::new(ImageSource::from_url(url)?));
    }
  }
  Err(InputError::SchemeMismatch(url.scheme().to_string()))
}
