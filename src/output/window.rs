// 该文件是 Yanjian （眼睑） 项目的一部分。
// src/output/window.rs - 预览窗口与键盘命令
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::time::Duration;

use image::RgbImage;
use minifb::{Key, KeyRepeat, Window, WindowOptions};
use tracing::info;

use super::{Command, Console, KEY_LEGEND, OutputError};

/// 窗口刷新间隔，也是每帧轮询按键时唯一的等待
const UPDATE_INTERVAL: Duration = Duration::from_micros(16600);

/// 基于 minifb 的预览窗口
pub struct WindowConsole {
  window: Window,
  buffer: Vec<u32>,
  width: usize,
  height: usize,
}

impl WindowConsole {
  /// 创建预览窗口，标题后附带按键提示
  pub fn new(title: &str, width: u32, height: u32) -> Result<Self, OutputError> {
    let (width, height) = (width as usize, height as usize);
    let title = Self::title_with_legend(title);
    let mut window = Window::new(
      &title,
      width,
      height,
      WindowOptions {
        resize: true,
        ..WindowOptions::default()
      },
    )
    .map_err(|e| OutputError::Window(e.to_string()))?;
    window.limit_update_rate(Some(UPDATE_INTERVAL));

    info!("预览窗口已打开: {} {}x{}", title, width, height);
    Ok(Self {
      window,
      buffer: vec![0; width * height],
      width,
      height,
    })
  }

  fn title_with_legend(title: &str) -> String {
    format!("{}  {}", title, KEY_LEGEND)
  }

  fn key_command(key: Key) -> Command {
    match key {
      Key::O => Command::from_key('o'),
      Key::C => Command::from_key('c'),
      Key::Q | Key::Escape => Command::Quit,
      _ => Command::None,
    }
  }
}

impl Console for WindowConsole {
  type Error = OutputError;

  fn poll_command(&mut self) -> Command {
    if !self.window.is_open() {
      return Command::Quit;
    }
    Command::resolve(
      self
        .window
        .get_keys_pressed(KeyRepeat::No)
        .into_iter()
        .map(Self::key_command),
    )
  }

  fn render(&mut self, image: &RgbImage) -> Result<(), Self::Error> {
    // 帧尺寸变化时跟随调整缓冲区
    self.width = image.width() as usize;
    self.height = image.height() as usize;
    self.buffer.resize(self.width * self.height, 0);

    for (dst, pixel) in self.buffer.iter_mut().zip(image.pixels()) {
      let [r, g, b] = pixel.0;
      *dst = ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
    }

    self
      .window
      .update_with_buffer(&self.buffer, self.width, self.height)
      .map_err(|e| OutputError::Window(e.to_string()))
  }
}

impl Drop for WindowConsole {
  fn drop(&mut self) {
    info!("预览窗口已关闭");
  }
}
