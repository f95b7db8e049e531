// 该文件是 Yanjian （眼睑） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;
use url::Url;

/// 从摄像头采集睁眼/闭眼眼部样本
///
/// 按键: [o] 保存为睁眼, [c] 保存为闭眼, [q] 退出
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 样本输出根目录，其下自动创建 open/ 与 closed/
  #[arg(long, default_value = "data/eyes", value_name = "DIR")]
  pub out: PathBuf,

  /// 摄像头序号（/dev/videoN）
  #[arg(long, default_value_t = 0, value_name = "INDEX")]
  pub cam: usize,

  /// 输出图像宽度
  #[arg(long = "img-w", alias = "img_w", default_value_t = 48, value_name = "PIXELS",
    value_parser = clap::value_parser!(u32).range(1..))]
  pub img_w: u32,

  /// 输出图像高度
  #[arg(long = "img-h", alias = "img_h", default_value_t = 24, value_name = "PIXELS",
    value_parser = clap::value_parser!(u32).range(1..))]
  pub img_h: u32,

  /// 输入来源，指定后忽略 --cam
  /// 支持格式:
  /// - V4L2: v4l:///dev/video0
  /// - 图片: image:///path/to/frame.png
  #[arg(long, value_name = "SOURCE")]
  pub input: Option<Url>,

  /// 关键点检测器
  /// 支持格式:
  /// - 回放: jsonl:///path/to/landmarks.jsonl
  /// - 子进程: exec:///path/to/detector?arg=...
  #[arg(long, value_name = "DETECTOR")]
  pub landmarks: Url,

  /// 不打开预览窗口
  #[arg(long, default_value_t = false)]
  pub headless: bool,

  /// 最大处理帧数（0 表示无限制）
  #[arg(long, default_value_t = 0, value_name = "COUNT")]
  pub max_frames: u64,
}

#[cfg(test)]
mod tests {
  use clap::CommandFactory;

  use super::*;

  #[test]
  fn defaults_match_collection_layout() {
    let args = Args::parse_from(["yanjian-collect", "--landmarks", "jsonl:///tmp/lm.jsonl"]);
    assert_eq!(args.out, PathBuf::from("data/eyes"));
    assert_eq!(args.cam, 0);
    assert_eq!((args.img_w, args.img_h), (48, 24));
    assert!(args.input.is_none());
    assert!(!args.headless);
    assert_eq!(args.max_frames, 0);
  }

  #[test]
  fn underscore_aliases_are_accepted() {
    let args = Args::parse_from([
      "yanjian-collect",
      "--landmarks",
      "jsonl:///tmp/lm.jsonl",
      "--img_w",
      "64",
      "--img_h",
      "32",
      "--cam",
      "2",
    ]);
    assert_eq!((args.img_w, args.img_h, args.cam), (64, 32, 2));
  }

  #[test]
  fn zero_size_is_rejected() {
    let result = Args::try_parse_from([
      "yanjian-collect",
      "--landmarks",
      "jsonl:///tmp/lm.jsonl",
      "--img-w",
      "0",
    ]);
    assert!(result.is_err());
  }

  #[test]
  fn command_definition_is_valid() {
    Args::command().debug_assert();
  }
}
