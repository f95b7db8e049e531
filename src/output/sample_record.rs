// 该文件是 Yanjian （眼睑） 项目的一部分。
// src/output/sample_record.rs - 标注样本保存
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use image::{GrayImage, ImageFormat};
use tracing::{debug, info};

use super::{Label, OutputError};
use crate::eye::{EyePair, EyeSide};

/// 按标签分目录保存眼部灰度样本
///
/// 目录结构：`<root>/open/*.png` 与 `<root>/closed/*.png`，
/// 文件名为 `eye<L|R>_<毫秒时间戳>.png`。
#[derive(Debug, Clone)]
pub struct SampleRecorder {
  root: PathBuf,
}

impl SampleRecorder {
  /// 创建根目录及两个标签子目录
  pub fn create(root: impl AsRef<Path>) -> Result<Self, OutputError> {
    let root = root.as_ref().to_path_buf();
    for label in [Label::Open, Label::Closed] {
      let directory = root.join(label.dir_name());
      if !directory.exists() {
        std::fs::create_dir_all(&directory)?;
        info!("已创建样本目录: {}", directory.display());
      }
    }
    Ok(Self { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn label_dir(&self, label: Label) -> PathBuf {
    self.root.join(label.dir_name())
  }

  pub fn sample_path(&self, label: Label, side: EyeSide, timestamp_ms: i64) -> PathBuf {
    self
      .label_dir(label)
      .join(format!("eye{}_{}.png", side.tag(), timestamp_ms))
  }

  /// 保存一只眼睛的样本（单通道 8 位 PNG）
  pub fn save(
    &self,
    label: Label,
    side: EyeSide,
    crop: &GrayImage,
    timestamp_ms: i64,
  ) -> Result<PathBuf, OutputError> {
    let path = self.sample_path(label, side, timestamp_ms);
    crop.save_with_format(&path, ImageFormat::Png)?;
    debug!("保存样本: {}", path.display());
    Ok(path)
  }

  /// 先左后右保存一帧中存在的眼部样本，缺失的一侧跳过
  pub fn save_pair(
    &self,
    label: Label,
    eyes: &EyePair,
    timestamp_ms: i64,
  ) -> Result<Vec<PathBuf>, OutputError> {
    eyes
      .iter()
      .map(|(side, crop)| self.save(label, side, crop, timestamp_ms))
      .collect()
  }

  /// 当前时间的毫秒时间戳
  pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
  }
}
