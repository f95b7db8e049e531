// 该文件是 Yanjian （眼睑） 项目的一部分。
// src/main.rs - 眼部样本采集程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::{thread, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use yanjian::{
  crop::CropSize,
  input::{InputSource, open_camera, open_input},
  landmark::create_detector,
  output::{BoxedConsole, HeadlessConsole, SampleRecorder},
  task::{CaptureTask, Session},
};

const WINDOW_TITLE: &str = "Collect Eye Data";

fn create_console(headless: bool, width: u32, height: u32) -> Result<BoxedConsole> {
  if headless {
    return Ok(Box::new(HeadlessConsole));
  }
  #[cfg(feature = "window")]
  {
    let console = yanjian::output::WindowConsole::new(WINDOW_TITLE, width, height)
      .context("无法创建预览窗口")?;
    Ok(Box::new(console))
  }
  #[cfg(not(feature = "window"))]
  {
    warn!(
      "未启用 window 特性，以无界面方式运行 ({} {}x{})",
      WINDOW_TITLE, width, height
    );
    Ok(Box::new(HeadlessConsole))
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = args::Args::parse();

  info!("样本输出目录: {}", args.out.display());
  info!("输出尺寸: {}x{}", args.img_w, args.img_h);
  info!("关键点检测器: {}", args.landmarks);

  let recorder = SampleRecorder::create(&args.out)
    .with_context(|| format!("无法创建样本目录: {}", args.out.display()))?;

  // 设备打开失败时直接退出，不创建检测器与窗口
  let session = Session::open(
    || {
      let input: Box<dyn InputSource> = match &args.input {
        Some(url) => open_input(url),
        None => open_camera(args.cam),
      }
      .inspect_err(|e| error!("无法打开输入源: {}", e))
      .context("无法打开输入源")?;
      info!(
        "输入源已打开: {}x{} ({:?})",
        input.width(),
        input.height(),
        input.source_type()
      );
      Ok(input)
    },
    || create_detector(&args.landmarks).context("无法创建关键点检测器"),
    |input: &Box<dyn InputSource>| create_console(args.headless, input.width(), input.height()),
  )?;

  let (tx, rx) = std::sync::mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .context("无法设置 Ctrl-C 处理函数")?;

  let summary = CaptureTask::default()
    .with_crop_size(CropSize::new(args.img_w, args.img_h))
    .with_max_frames(Some(args.max_frames))
    .with_interrupt(rx)
    .run_task(session, &recorder);

  info!(
    "样本保存在 {}：睁眼 {} 张，闭眼 {} 张",
    recorder.root().display(),
    summary.saved_open,
    summary.saved_closed
  );

  Ok(())
}
