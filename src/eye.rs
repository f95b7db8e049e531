// 该文件是 Yanjian （眼睑） 项目的一部分。
// src/eye.rs - 眼部区域估计与左右眼方向统一
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{GrayImage, imageops};

use crate::landmark::LandmarkSet;

/// 眼睑上下距离低估了眼部区域，高度先乘以该系数
pub const VERTICAL_EXPANSION: f32 = 2.2;

/// 眼部边界框的默认外扩系数
pub const EYE_PADDING: f32 = 1.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EyeSide {
  Left,
  Right,
}

impl EyeSide {
  /// 文件名中使用的标记
  pub fn tag(&self) -> &'static str {
    match self {
      EyeSide::Left => "L",
      EyeSide::Right => "R",
    }
  }
}

impl std::fmt::Display for EyeSide {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      EyeSide::Left => write!(f, "left"),
      EyeSide::Right => write!(f, "right"),
    }
  }
}

/// 单只眼睛的关键点定义（索引采用 468/478 点人脸网格的约定）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeDefinition {
  pub side: EyeSide,
  /// 上眼睑中部两个点
  pub upper: [usize; 2],
  /// 下眼睑中部两个点
  pub lower: [usize; 2],
  /// 两个眼角
  pub corners: [usize; 2],
  /// 宽高外扩系数
  pub padding: f32,
  /// 是否为标准眼的镜像，镜像眼的裁剪结果需要水平翻转
  pub mirrored: bool,
}

impl EyeDefinition {
  pub const LEFT: EyeDefinition = EyeDefinition {
    side: EyeSide::Left,
    upper: [386, 385],
    lower: [374, 380],
    corners: [263, 362],
    padding: EYE_PADDING,
    mirrored: false,
  };

  pub const RIGHT: EyeDefinition = EyeDefinition {
    side: EyeSide::Right,
    upper: [159, 158],
    lower: [145, 153],
    corners: [133, 33],
    padding: EYE_PADDING,
    mirrored: true,
  };

  /// 按处理顺序（先左后右）排列的两只眼睛
  pub const BOTH: [EyeDefinition; 2] = [Self::LEFT, Self::RIGHT];

  /// 定义中引用的最大关键点索引
  pub fn max_index(&self) -> usize {
    self
      .upper
      .iter()
      .chain(self.lower.iter())
      .chain(self.corners.iter())
      .copied()
      .max()
      .unwrap_or(0)
  }
}

/// 眼部边界框，所有值相对帧宽高归一化
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EyeBox {
  pub center_x: f32,
  pub center_y: f32,
  pub width: f32,
  pub height: f32,
}

impl EyeBox {
  pub fn is_degenerate(&self) -> bool {
    !(self.width > 0.0 && self.height > 0.0)
  }
}

/// 由关键点估计眼部边界框
///
/// 关键点重合时得到零宽或零高的框，由裁剪阶段处理。
///
/// # Panics
///
/// `landmarks` 必须覆盖 `eye.max_index()`，调用方应先用 [`LandmarkSet::covers`] 检查。
pub fn estimate(landmarks: &LandmarkSet, eye: &EyeDefinition) -> EyeBox {
  let upper = landmarks[eye.upper[0]].midpoint(&landmarks[eye.upper[1]]);
  let lower = landmarks[eye.lower[0]].midpoint(&landmarks[eye.lower[1]]);
  let a = landmarks[eye.corners[0]];
  let b = landmarks[eye.corners[1]];

  let width = (b.x - a.x).abs();
  let height = (lower.y - upper.y).abs() * VERTICAL_EXPANSION;

  EyeBox {
    center_x: (a.x + b.x) / 2.0,
    center_y: (upper.y + lower.y) / 2.0,
    width: width * eye.padding,
    height: height * eye.padding,
  }
}

/// 将镜像眼的裁剪结果水平翻转，使两只眼睛方向一致
pub fn normalize_lateral(eye: &EyeDefinition, crop: Option<GrayImage>) -> Option<GrayImage> {
  crop.map(|mut image| {
    if eye.mirrored {
      imageops::flip_horizontal_in_place(&mut image);
    }
    image
  })
}

/// 一帧中两只眼睛的裁剪结果，缺失的一侧为 `None`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EyePair {
  pub left: Option<GrayImage>,
  pub right: Option<GrayImage>,
}

impl EyePair {
  pub fn get(&self, side: EyeSide) -> Option<&GrayImage> {
    match side {
      EyeSide::Left => self.left.as_ref(),
      EyeSide::Right => self.right.as_ref(),
    }
  }

  pub fn set(&mut self, side: EyeSide, crop: Option<GrayImage>) {
    match side {
      EyeSide::Left => self.left = crop,
      EyeSide::Right => self.right = crop,
    }
  }

  /// 按先左后右的顺序遍历存在的裁剪结果
  pub fn iter(&self) -> impl Iterator<Item = (EyeSide, &GrayImage)> {
    [EyeSide::Left, EyeSide::Right]
      .into_iter()
      .filter_map(|side| self.get(side).map(|crop| (side, crop)))
  }

  pub fn is_empty(&self) -> bool {
    self.left.is_none() && self.right.is_none()
  }
}
