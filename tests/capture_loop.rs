// 该文件是 Yanjian （眼睑） 项目的一部分。
// tests/capture_loop.rs - 采集循环集成测试
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::cell::Cell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::io::Cursor;
use std::path::Path;

use image::{Rgb, RgbImage};
use url::Url;

use yanjian::{
  input::{InputError, MemorySource, open_input},
  landmark::ReplayDetector,
  output::{Command, Console, HeadlessConsole, Label, SampleRecorder},
  task::{CaptureTask, Session, TerminationReason},
};

/// 按脚本依次返回命令
struct ScriptedConsole {
  commands: VecDeque<Command>,
}

impl ScriptedConsole {
  fn new(commands: impl IntoIterator<Item = Command>) -> Self {
    Self {
      commands: commands.into_iter().collect(),
    }
  }
}

impl Console for ScriptedConsole {
  type Error = Infallible;

  fn poll_command(&mut self) -> Command {
    self.commands.pop_front().unwrap_or_default()
  }

  fn render(&mut self, _image: &RgbImage) -> Result<(), Self::Error> {
    Ok(())
  }
}

fn face_line() -> String {
  let mut points = vec![[0.5f32, 0.5]; 478];
  for (i, x, y) in [
    (386, 0.62, 0.40),
    (385, 0.64, 0.40),
    (374, 0.62, 0.46),
    (380, 0.64, 0.46),
    (263, 0.70, 0.43),
    (362, 0.56, 0.43),
    (159, 0.36, 0.40),
    (158, 0.38, 0.40),
    (145, 0.36, 0.46),
    (153, 0.38, 0.46),
    (133, 0.44, 0.43),
    (33, 0.30, 0.43),
  ] {
    points[i] = [x, y];
  }
  serde_json::to_string(&points).unwrap()
}

fn frames(n: usize) -> MemorySource {
  MemorySource::from_images((0..n).map(|i| {
    RgbImage::from_fn(320, 240, move |x, y| {
      Rgb([(x % 256) as u8, (y % 256) as u8, (i * 20 % 256) as u8])
    })
  }))
}

fn sample_names(dir: &Path) -> Vec<String> {
  let mut names: Vec<String> = std::fs::read_dir(dir)
    .unwrap()
    .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
  names.sort();
  names
}

fn is_sample_name(name: &str) -> bool {
  let Some(rest) = name
    .strip_prefix("eyeL_")
    .or_else(|| name.strip_prefix("eyeR_"))
  else {
    return false;
  };
  rest
    .strip_suffix(".png")
    .is_some_and(|ts| !ts.is_empty() && ts.chars().all(|c| c.is_ascii_digit()))
}

#[test]
fn open_and_closed_saves_create_labelled_samples() {
  let dir = tempfile::tempdir().unwrap();
  let root = dir.path().join("data").join("eyes");
  assert!(!root.exists());

  let recorder = SampleRecorder::create(&root).unwrap();
  let landmarks = format!("{0}\n{0}\n{0}\n", face_line());
  let console = ScriptedConsole::new([
    Command::Save(Label::Open),
    Command::None,
    Command::Save(Label::Closed),
  ]);
  let session = Session::new(
    frames(3),
    ReplayDetector::new(Cursor::new(landmarks)),
    console,
  );

  let summary = CaptureTask::default().run_task(session, &recorder);
  assert_eq!(summary.frames, 3);
  assert_eq!(summary.faces, 3);
  assert_eq!(summary.reason, Some(TerminationReason::EndOfStream));

  let mut subdirs = sample_names(&root);
  subdirs.sort();
  assert_eq!(subdirs, vec!["closed".to_string(), "open".to_string()]);

  for label in ["open", "closed"] {
    let names = sample_names(&root.join(label));
    assert_eq!(names.len(), 2, "{label}: {names:?}");
    assert!(names.iter().all(|n| is_sample_name(n)), "{names:?}");
    assert!(names[0].starts_with("eyeL_") && names[1].starts_with("eyeR_"));

    for name in names {
      let sample = image::open(root.join(label).join(name)).unwrap();
      assert_eq!(sample.color(), image::ColorType::L8);
      assert_eq!((sample.width(), sample.height()), (48, 24));
    }
  }
}

#[test]
fn no_face_sequence_runs_to_end_without_samples() {
  let dir = tempfile::tempdir().unwrap();
  let recorder = SampleRecorder::create(dir.path()).unwrap();
  let console = ScriptedConsole::new(vec![Command::Save(Label::Open); 8]);
  let session = Session::new(
    frames(8),
    ReplayDetector::new(Cursor::new("null\n".repeat(8))),
    console,
  );

  let summary = CaptureTask::default().run_task(session, &recorder);
  assert_eq!(summary.frames, 8);
  assert_eq!(summary.faces, 0);
  assert_eq!(summary.reason, Some(TerminationReason::EndOfStream));
  assert!(sample_names(&dir.path().join("open")).is_empty());
}

#[test]
fn quit_command_ends_session_early() {
  let dir = tempfile::tempdir().unwrap();
  let recorder = SampleRecorder::create(dir.path()).unwrap();
  let console = ScriptedConsole::new([Command::None, Command::Quit, Command::Save(Label::Open)]);
  let session = Session::new(
    frames(5),
    ReplayDetector::new(Cursor::new(face_line())),
    console,
  );

  let summary = CaptureTask::default().run_task(session, &recorder);
  assert_eq!(summary.frames, 2);
  assert_eq!(summary.reason, Some(TerminationReason::Quit));
  assert!(sample_names(&dir.path().join("open")).is_empty());
}

#[test]
fn headless_session_stops_at_frame_limit() {
  let dir = tempfile::tempdir().unwrap();
  let recorder = SampleRecorder::create(dir.path()).unwrap();
  let session = Session::new(
    frames(10),
    ReplayDetector::new(Cursor::new(String::new())),
    HeadlessConsole,
  );

  let summary = CaptureTask::default()
    .with_max_frames(Some(4))
    .run_task(session, &recorder);
  assert_eq!(summary.frames, 4);
  assert_eq!(summary.reason, Some(TerminationReason::FrameLimit));
}

#[test]
fn missing_capture_device_stops_startup() {
  let url = Url::parse("v4l:///dev/yanjian-missing-camera").unwrap();
  assert!(matches!(
    open_input(&url),
    Err(InputError::DeviceOpen { .. })
  ));

  let detector_created = Cell::new(false);
  let console_created = Cell::new(false);
  let result = Session::open(
    || Ok(open_input(&url)?),
    || {
      detector_created.set(true);
      Ok(ReplayDetector::new(Cursor::new(String::new())))
    },
    |_| {
      console_created.set(true);
      Ok(HeadlessConsole)
    },
  );

  let err = result.err().unwrap();
  assert!(matches!(
    err.downcast_ref::<InputError>(),
    Some(InputError::DeviceOpen { .. })
  ));
  assert!(!detector_created.get());
  assert!(!console_created.get());
}
