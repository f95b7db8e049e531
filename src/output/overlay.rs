// 该文件是 Yanjian （眼睑） 项目的一部分。
// src/output/overlay.rs - 预览叠加层
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{DynamicImage, GrayImage, Rgb, RgbImage, imageops};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::{
  crop::pixel_rect,
  eye::{EyeDefinition, EyePair, EyeSide, estimate},
  landmark::LandmarkSet,
};

const LINE_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const BOX_COLOR: [u8; 3] = [255, 200, 0];
const PREVIEW_MARGIN: i64 = 10;

/// 在帧的副本上绘制眼角连线、裁剪区域和眼部预览
pub struct Overlay {
  line_color: Rgb<u8>,
  box_color: Rgb<u8>,
}

impl Default for Overlay {
  fn default() -> Self {
    Self {
      line_color: Rgb(LINE_COLOR),
      box_color: Rgb(BOX_COLOR),
    }
  }
}

impl Overlay {
  /// `definitions` 应与裁剪时使用的眼睛定义一致
  pub fn draw(
    &self,
    frame: &RgbImage,
    landmarks: Option<&LandmarkSet>,
    definitions: &[EyeDefinition],
    eyes: &EyePair,
  ) -> RgbImage {
    let mut image = frame.clone();
    if let Some(landmarks) = landmarks {
      for eye in definitions
        .iter()
        .filter(|eye| landmarks.covers(eye.max_index()))
      {
        self.draw_eye(&mut image, landmarks, eye);
      }
    }
    Self::draw_previews(&mut image, eyes);
    image
  }

  fn draw_eye(&self, image: &mut RgbImage, landmarks: &LandmarkSet, eye: &EyeDefinition) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let a = landmarks[eye.corners[0]];
    let b = landmarks[eye.corners[1]];

    // 两像素粗的眼角连线
    for offset in [0.0, 1.0] {
      draw_line_segment_mut(
        image,
        (a.x * w, a.y * h + offset),
        (b.x * w, b.y * h + offset),
        self.line_color,
      );
    }

    if let Some(rect) = pixel_rect(&estimate(landmarks, eye), image.width(), image.height()) {
      let rect = Rect::at(rect.x as i32, rect.y as i32).of_size(rect.width, rect.height);
      draw_hollow_rect_mut(image, rect, self.box_color);
    }
  }

  /// 左上角依次放置左眼、右眼的预览
  fn draw_previews(image: &mut RgbImage, eyes: &EyePair) {
    for (side, crop) in eyes.iter() {
      let x = match side {
        EyeSide::Left => PREVIEW_MARGIN,
        EyeSide::Right => 2 * PREVIEW_MARGIN + crop.width() as i64,
      };
      imageops::replace(image, &gray_to_rgb(crop), x, PREVIEW_MARGIN);
    }
  }
}

fn gray_to_rgb(crop: &GrayImage) -> RgbImage {
  DynamicImage::ImageLuma8(crop.clone()).to_rgb8()
}
