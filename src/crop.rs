// 该文件是 Yanjian （眼睑） 项目的一部分。
// src/crop.rs - 眼部区域裁剪与归一化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{GrayImage, ImageBuffer, Luma, RgbImage, imageops, imageops::FilterType};

use crate::eye::EyeBox;

/// 裁剪区域的最小边长（像素）
const MIN_CROP_SIDE: i64 = 4;

/// 输出图像尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropSize {
  pub width: u32,
  pub height: u32,
}

impl Default for CropSize {
  fn default() -> Self {
    Self {
      width: 48,
      height: 24,
    }
  }
}

impl CropSize {
  pub fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }
}

/// 帧内的像素矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

/// 将归一化的眼部框换算为帧内像素矩形
///
/// 左上角限制在帧内，边长限制在 `[4, 帧边长]`，再与帧求交。
/// 面积为零时返回 `None`。
pub fn pixel_rect(eye_box: &EyeBox, frame_width: u32, frame_height: u32) -> Option<PixelRect> {
  if frame_width == 0 || frame_height == 0 {
    return None;
  }
  let (fw, fh) = (frame_width as i64, frame_height as i64);
  let (fwf, fhf) = (frame_width as f32, frame_height as f32);

  // `as` 转换向零截断，NaN 变为 0
  let x = (((eye_box.center_x - eye_box.width / 2.0) * fwf) as i64).clamp(0, fw - 1);
  let y = (((eye_box.center_y - eye_box.height / 2.0) * fhf) as i64).clamp(0, fh - 1);
  let w = ((eye_box.width * fwf) as i64).clamp(MIN_CROP_SIDE.min(fw), fw);
  let h = ((eye_box.height * fhf) as i64).clamp(MIN_CROP_SIDE.min(fh), fh);

  let width = w.min(fw - x);
  let height = h.min(fh - y);
  if width <= 0 || height <= 0 {
    return None;
  }

  Some(PixelRect {
    x: x as u32,
    y: y as u32,
    width: width as u32,
    height: height as u32,
  })
}

/// 按 BT.601 亮度权重转换为灰度
pub fn to_luma_bt601(image: &RgbImage) -> GrayImage {
  ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
    let [r, g, b] = image.get_pixel(x, y).0;
    let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    Luma([(luma + 0.5).clamp(0.0, 255.0) as u8])
  })
}

/// 一个输出坐标覆盖的源像素及其权重
type AxisWeights = Vec<Vec<(u32, f32)>>;

fn axis_weights(src: u32, dst: u32) -> AxisWeights {
  let scale = src as f64 / dst as f64;
  (0..dst)
    .map(|d| {
      let start = d as f64 * scale;
      let end = (d + 1) as f64 * scale;
      let first = start.floor() as u32;
      let last = (end.ceil() as u32).min(src);
      (first..last)
        .filter_map(|s| {
          let overlap = end.min(s as f64 + 1.0) - start.max(s as f64);
          (overlap > 0.0).then(|| (s, (overlap / scale) as f32))
        })
        .collect()
    })
    .collect()
}

/// 面积平均缩放
///
/// 缩小时每个输出像素取其在源图上覆盖区域内像素的加权平均，权重为覆盖面积。
/// 任一方向需要放大时改用双线性插值。
pub fn resize_area(image: &GrayImage, width: u32, height: u32) -> GrayImage {
  if image.dimensions() == (width, height) {
    return image.clone();
  }
  if image.width() == 0 || image.height() == 0 {
    return GrayImage::new(width, height);
  }
  if width > image.width() || height > image.height() {
    return imageops::resize(image, width, height, FilterType::Triangle);
  }

  let columns = axis_weights(image.width(), width);
  let rows = axis_weights(image.height(), height);

  ImageBuffer::from_fn(width, height, |x, y| {
    let mut sum = 0.0f32;
    for &(sy, wy) in &rows[y as usize] {
      for &(sx, wx) in &columns[x as usize] {
        sum += wy * wx * image.get_pixel(sx, sy)[0] as f32;
      }
    }
    Luma([(sum + 0.5).clamp(0.0, 255.0) as u8])
  })
}

/// 从彩色帧中裁剪眼部并归一化为固定尺寸的灰度图
///
/// 区域面积为零时返回 `None`；否则输出尺寸恒为 `size`。
pub fn crop_eye(frame: &RgbImage, eye_box: &EyeBox, size: CropSize) -> Option<GrayImage> {
  let rect = pixel_rect(eye_box, frame.width(), frame.height())?;
  let region = imageops::crop_imm(frame, rect.x, rect.y, rect.width, rect.height).to_image();
  let gray = to_luma_bt601(&region);
  Some(resize_area(&gray, size.width, size.height))
}
