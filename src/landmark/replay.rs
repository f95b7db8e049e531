// 该文件是 Yanjian （眼睑） 项目的一部分。
// src/landmark/replay.rs - 关键点回放
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::fs::File;
use std::io::{BufRead, BufReader};

use tracing::{debug, error, warn};
use url::Url;

use super::{DetectorError, LandmarkDetector, LandmarkSet};
use crate::{FromUrl, FromUrlWithScheme, input::Frame, url_file_path};

/// 从 JSON Lines 文件逐帧回放关键点，每行对应一帧
pub struct ReplayDetector {
  reader: Box<dyn BufRead>,
  line: String,
  line_number: usize,
  exhausted: bool,
}

impl FromUrlWithScheme for ReplayDetector {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for ReplayDetector {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(DetectorError::SchemeMismatch(url.scheme().to_string()));
    }

    let file = File::open(url_file_path(url))?;
    Ok(Self::new(BufReader::new(file)))
  }
}

impl ReplayDetector {
  pub fn new(reader: impl BufRead + 'static) -> Self {
    Self {
      reader: Box::new(reader),
      line: String::new(),
      line_number: 0,
      exhausted: false,
    }
  }
}

impl LandmarkDetector for ReplayDetector {
  type Error = DetectorError;

  fn detect(&mut self, frame: &Frame) -> Result<Option<LandmarkSet>, Self::Error> {
    if self.exhausted {
      return Ok(None);
    }

    self.line.clear();
    if self.reader.read_line(&mut self.line)? == 0 {
      debug!("关键点文件已读完，第 {} 帧起视为无人脸", frame.index);
      self.exhausted = true;
      return Ok(None);
    }
    self.line_number += 1;

    if self.line.trim().is_empty() {
      return Ok(None);
    }
    LandmarkSet::parse_json_line(&self.line)
      .inspect_err(|e| warn!("关键点文件第 {} 行无法解析: {}", self.line_number, e))
  }
}
