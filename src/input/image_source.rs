// 该文件是 Yanjian （眼睑） 项目的一部分。
// src/input/image_source.rs - 图片输入源
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{ImageReader, RgbImage};
use tracing::error;
use url::Url;

use super::{Frame, InputError, InputSource, InputSourceType};
use crate::{FromUrl, FromUrlWithScheme, url_file_path};

/// 图片输入源，只产生一帧
pub struct ImageSource {
  image: Option<RgbImage>,
  width: u32,
  height: u32,
}

impl FromUrlWithScheme for ImageSource {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageSource {
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

    Self::open(&url_file_path(url))
  }
}

impl ImageSource {
  /// 读取并解码图片文件
  pub fn open(path: &str) -> Result<Self, InputError> {
    let image = ImageReader::open(path)?.decode()?.to_rgb8();
    Ok(Self::from(image))
  }
}

impl From<RgbImage> for ImageSource {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      image: Some(image),
      width,
      height,
    }
  }
}

impl Iterator for ImageSource {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take().map(|image| {
      Ok(Frame {
        image,
        index: 0,
        timestamp_ms: 0,
      })
    })
  }
}

impl InputSource for ImageSource {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::Image
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
