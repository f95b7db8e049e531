// 该文件是 Yanjian （眼睑） 项目的一部分。
// src/landmark/process.rs - 子进程关键点检测器
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # 子进程检测器
//!
//! 通过标准输入输出与外部检测程序通信，协议按帧进行：
//!
//! 1. 写入一行帧头 `"<width> <height>\n"`
//! 2. 紧接着写入 `width * height * 3` 字节的 RGB 数据（行优先）
//! 3. 读取一行 JSON 结果，格式与回放文件相同（`null` 表示无人脸）
//!
//! ```text
//! yanjian-collect --landmarks "exec:///usr/local/bin/face-mesh?arg=--refine"
//! ```

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use tracing::{error, info, warn};
use url::Url;

use super::{DetectorError, LandmarkDetector, LandmarkSet};
use crate::{FromUrl, FromUrlWithScheme, input::Frame, url_file_path};

pub struct ProcessDetector {
  child: Child,
  stdin: ChildStdin,
  stdout: BufReader<ChildStdout>,
  line: String,
}

impl FromUrlWithScheme for ProcessDetector {
  const SCHEME: &'static str = "exec";
}

impl FromUrl for ProcessDetector {
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

    let args: Vec<String> = url
      .query_pairs()
      .filter(|(k, _)| k == "arg")
      .map(|(_, v)| v.into_owned())
      .collect();
    Self::spawn(&url_file_path(url), &args)
  }
}

impl ProcessDetector {
  /// 启动检测程序
  pub fn spawn(program: &str, args: &[String]) -> Result<Self, DetectorError> {
    let mut child = Command::new(program)
      .args(args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::inherit())
      .spawn()?;

    let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
      let _ = child.kill();
      let _ = child.wait();
      return Err(DetectorError::ProcessExited);
    };

    info!("检测进程已启动: {} (pid {})", program, child.id());
    Ok(Self {
      child,
      stdin,
      stdout: BufReader::new(stdout),
      line: String::new(),
    })
  }

  fn send_frame(&mut self, frame: &Frame) -> std::io::Result<()> {
    writeln!(self.stdin, "{} {}", frame.width(), frame.height())?;
    self.stdin.write_all(frame.image.as_raw())?;
    self.stdin.flush()
  }
}

impl LandmarkDetector for ProcessDetector {
  type Error = DetectorError;

  fn detect(&mut self, frame: &Frame) -> Result<Option<LandmarkSet>, Self::Error> {
    self.send_frame(frame).map_err(|e| match e.kind() {
      std::io::ErrorKind::BrokenPipe => DetectorError::ProcessExited,
      _ => DetectorError::Io(e),
    })?;

    self.line.clear();
    if self.stdout.read_line(&mut self.line)? == 0 {
      return Err(DetectorError::ProcessExited);
    }
    LandmarkSet::parse_json_line(&self.line)
  }
}

impl Drop for ProcessDetector {
  fn drop(&mut self) {
    if let Err(e) = self.child.kill() {
      warn!("无法终止检测进程: {}", e);
    }
    match self.child.wait() {
      Ok(status) => info!("检测进程已退出: {}", status),
      Err(e) => warn!("等待检测进程退出失败: {}", e),
    }
  }
}
