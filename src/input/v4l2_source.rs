// 该文件是 Yanjian （眼睑） 项目的一部分。
// src/input/v4l2_source.rs - V4L2 摄像头输入源
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::time::Instant;

use image::RgbImage;
use tracing::{error, info};
use url::Url;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use super::{Frame, InputError, InputSource, InputSourceType};
use crate::{FromUrl, FromUrlWithScheme, url_file_path};

const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;

/// V4L2 摄像头输入源
///
/// 采集流在 `device` 之前释放，两者都随本结构体一起释放。
pub struct V4l2Source {
  /// 捕获流
  stream: Option<Stream<'static>>,
  /// V4L2 设备
  _device: Device,
  /// 设备路径
  device_path: String,
  /// 帧索引
  frame_index: u64,
  /// 视频宽度
  width: u32,
  /// 视频高度
  height: u32,
  /// 开始时间
  start_time: Instant,
}

impl FromUrlWithScheme for V4l2Source {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4l2Source {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }

    // v4l:///dev/video0
    let path = url_file_path(url);
    let path = if path.is_empty() || path == "/" {
      "/dev/video0".to_string()
    } else {
      path
    };
    Self::new(&path)
  }
}

impl V4l2Source {
  /// 按序号打开摄像头
  pub fn with_index(index: usize) -> Result<Self, InputError> {
    Self::new(&format!("/dev/video{}", index))
  }

  /// 创建一个新的 V4L2 摄像头输入源
  pub fn new(device_path: &str) -> Result<Self, InputError> {
    let device = Device::with_path(device_path).map_err(|source| InputError::DeviceOpen {
      path: device_path.to_string(),
      source,
    })?;

    // 设置视频格式
    let mut format = device.format().map_err(InputError::V4l)?;
    format.width = REQUESTED_WIDTH;
    format.height = REQUESTED_HEIGHT;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format).map_err(InputError::V4l)?;
    if format.fourcc != FourCC::new(b"YUYV") {
      return Err(InputError::UnsupportedPixelFormat(format.fourcc.to_string()));
    }

    let stream = Stream::with_buffers(&device, Type::VideoCapture, STREAM_BUFFERS)
      .map_err(InputError::V4l)?;

    info!(
      "摄像头已打开: {} {}x{}",
      device_path, format.width, format.height
    );

    Ok(Self {
      stream: Some(stream),
      _device: device,
      device_path: device_path.to_string(),
      frame_index: 0,
      width: format.width,
      height: format.height,
      start_time: Instant::now(),
    })
  }

  /// 将 YUYV 格式转换为 RGB
  fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);

    for chunk in yuyv.chunks_exact(4) {
      let y0 = chunk[0] as f32;
      let u = chunk[1] as f32 - 128.0;
      let y1 = chunk[2] as f32;
      let v = chunk[3] as f32 - 128.0;

      for y in [y0, y1] {
        let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
        let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
        let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
        rgb.extend_from_slice(&[r, g, b]);
      }
    }

    rgb
  }
}

impl Drop for V4l2Source {
  fn drop(&mut self) {
    // stream 必须先于 device 释放
    self.stream.take();
    info!("摄像头已释放: {}", self.device_path);
  }
}

impl Iterator for V4l2Source {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let stream = self.stream.as_mut()?;

    let buffer = match stream.next() {
      Ok((buffer, _meta)) => buffer,
      Err(e) => return Some(Err(InputError::Capture(e))),
    };

    let expected = (self.width * self.height * 2) as usize;
    if buffer.len() < expected {
      return Some(Err(InputError::BufferSize {
        expected,
        actual: buffer.len(),
      }));
    }

    let rgb_data = Self::yuyv_to_rgb(&buffer[..expected], self.width, self.height);
    let actual = rgb_data.len();
    let Some(image) = RgbImage::from_raw(self.width, self.height, rgb_data) else {
      return Some(Err(InputError::BufferSize {
        expected: (self.width * self.height * 3) as usize,
        actual,
      }));
    };

    let frame = Frame {
      image,
      index: self.frame_index,
      timestamp_ms: self.start_time.elapsed().as_millis() as u64,
    };

    self.frame_index += 1;
    Some(Ok(frame))
  }
}

impl InputSource for V4l2Source {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::V4l2
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    Some(30.0) // V4L2 默认帧率
  }
}
