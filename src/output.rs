// 该文件是 Yanjian （眼睑） 项目的一部分。
// src/output.rs - 输出定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::RgbImage;
use thiserror::Error;

pub mod overlay;

mod sample_record;
pub use self::sample_record::SampleRecorder;

#[cfg(feature = "window")]
mod window;
#[cfg(feature = "window")]
pub use self::window::WindowConsole;

/// 样本标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
  Open,
  Closed,
}

impl Label {
  /// 标签对应的子目录名
  pub fn dir_name(&self) -> &'static str {
    match self {
      Label::Open => "open",
      Label::Closed => "closed",
    }
  }
}

/// 每帧轮询得到的用户命令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Command {
  /// 以指定标签保存当前两只眼睛
  Save(Label),
  /// 结束会话
  Quit,
  #[default]
  None,
}

impl Command {
  /// 按键映射：`o` 保存为睁眼，`c` 保存为闭眼，`q` 退出，其余忽略
  pub fn from_key(key: char) -> Self {
    match key.to_ascii_lowercase() {
      'o' => Command::Save(Label::Open),
      'c' => Command::Save(Label::Closed),
      'q' => Command::Quit,
      _ => Command::None,
    }
  }

  /// 同一次轮询得到多条命令时：退出优先，其次是第一条保存命令
  pub fn resolve(commands: impl IntoIterator<Item = Command>) -> Self {
    let mut resolved = Command::None;
    for command in commands {
      match command {
        Command::Quit => return Command::Quit,
        Command::Save(_) if resolved == Command::None => resolved = command,
        _ => {}
      }
    }
    resolved
  }
}

/// 显示在预览窗口上的按键提示
pub const KEY_LEGEND: &str = "[o] open  [c] closed  [q] quit";

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("窗口错误: {0}")]
  Window(String),
}

/// 交互显示与键盘输入
pub trait Console {
  type Error;

  /// 非阻塞地取一条命令
  fn poll_command(&mut self) -> Command;

  /// 显示当前帧
  fn render(&mut self, image: &RgbImage) -> Result<(), Self::Error>;
}

impl<C: Console + ?Sized> Console for Box<C> {
  type Error = C::Error;

  fn poll_command(&mut self) -> Command {
    (**self).poll_command()
  }

  fn render(&mut self, image: &RgbImage) -> Result<(), Self::Error> {
    (**self).render(image)
  }
}

pub type BoxedConsole = Box<dyn Console<Error = OutputError>>;

/// 无界面运行：不显示、不产生命令，只能通过中断或输入结束退出
#[derive(Debug, Default)]
pub struct HeadlessConsole;

impl Console for HeadlessConsole {
  type Error = OutputError;

  fn poll_command(&mut self) -> Command {
    Command::None
  }

  fn render(&mut self, _image: &RgbImage) -> Result<(), Self::Error> {
    Ok(())
  }
}
