// 该文件是 Yanjian （眼睑） 项目的一部分。
// src/task.rs - 采集标注循环
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::{
  crop::{CropSize, crop_eye},
  eye::{EyeDefinition, EyePair, estimate, normalize_lateral},
  input::Frame,
  landmark::{LandmarkDetector, LandmarkSet},
  output::{Command, Console, Label, SampleRecorder, overlay::Overlay},
};

/// 由关键点计算两只眼睛的裁剪结果，镜像眼已翻转
///
/// 关键点数量不足以覆盖某只眼睛的定义时，该侧为 `None`。
pub fn extract_eyes(
  image: &RgbImage,
  landmarks: &LandmarkSet,
  eyes: &[EyeDefinition],
  size: CropSize,
) -> EyePair {
  let mut pair = EyePair::default();
  for eye in eyes {
    if !landmarks.covers(eye.max_index()) {
      warn!(
        "关键点数量 {} 不足，跳过{}眼（需要索引 {}）",
        landmarks.len(),
        eye.side,
        eye.max_index()
      );
      continue;
    }
    let eye_box = estimate(landmarks, eye);
    if eye_box.is_degenerate() {
      debug!("{} 眼区域退化，按最小尺寸裁剪: {:?}", eye.side, eye_box);
    } else {
      debug!("{} 眼区域: {:?}", eye.side, eye_box);
    }
    let crop = crop_eye(image, &eye_box, size);
    pair.set(eye.side, normalize_lateral(eye, crop));
  }
  pair
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
  Running,
  Terminated(TerminationReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
  /// 用户按下退出键或关闭窗口
  Quit,
  /// 输入源没有更多帧
  EndOfStream,
  /// 采集设备中途无法交付帧
  CaptureFailed,
  /// 收到中断信号
  Interrupted,
  /// 达到最大帧数
  FrameLimit,
  /// 显示失败
  ConsoleFailed,
}

/// 单帧处理结果
#[derive(Debug, Clone)]
pub struct FrameOutcome {
  pub frame_index: Option<u64>,
  pub face_found: bool,
  pub eyes: EyePair,
  pub command: Command,
  pub saved: Vec<PathBuf>,
  pub state: LoopState,
}

impl FrameOutcome {
  fn terminated(reason: TerminationReason) -> Self {
    Self {
      frame_index: None,
      face_found: false,
      eyes: EyePair::default(),
      command: Command::None,
      saved: Vec::new(),
      state: LoopState::Terminated(reason),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
  pub frames: u64,
  pub faces: u64,
  pub saved_open: usize,
  pub saved_closed: usize,
  pub reason: Option<TerminationReason>,
}

/// 会话期间独占的资源：输入源、检测器与显示
///
/// 无论从哪条路径结束，都只在本值被丢弃时释放一次。
pub struct Session<I, D, C> {
  input: I,
  detector: D,
  console: C,
}

impl<I, D, C> Session<I, D, C> {
  pub fn new(input: I, detector: D, console: C) -> Self {
    Self {
      input,
      detector,
      console,
    }
  }

  /// 依次打开输入源、检测器与显示
  ///
  /// 输入源打开失败时直接返回错误，检测器与显示都不会被创建。
  /// 显示的创建可以参考已打开输入源的尺寸。
  pub fn open(
    open_input: impl FnOnce() -> anyhow::Result<I>,
    create_detector: impl FnOnce() -> anyhow::Result<D>,
    create_console: impl FnOnce(&I) -> anyhow::Result<C>,
  ) -> anyhow::Result<Self> {
    let input = open_input()?;
    let detector = create_detector()?;
    let console = create_console(&input)?;
    Ok(Self::new(input, detector, console))
  }
}

impl<I, D, C> Drop for Session<I, D, C> {
  fn drop(&mut self) {
    info!("释放会话资源");
  }
}

/// 采集标注任务配置
pub struct CaptureTask {
  crop_size: CropSize,
  eyes: Vec<EyeDefinition>,
  max_frames: Option<u64>,
  interrupt: Option<Receiver<()>>,
  overlay: Overlay,
}

impl Default for CaptureTask {
  fn default() -> Self {
    Self {
      crop_size: CropSize::default(),
      eyes: EyeDefinition::BOTH.to_vec(),
      max_frames: None,
      interrupt: None,
      overlay: Overlay::default(),
    }
  }
}

impl CaptureTask {
  pub fn with_crop_size(mut self, crop_size: CropSize) -> Self {
    self.crop_size = crop_size;
    self
  }

  /// 只处理给定的眼睛，预览也只绘制这些眼睛
  pub fn with_eyes(mut self, eyes: &[EyeDefinition]) -> Self {
    self.eyes = eyes.to_vec();
    self
  }

  /// `None` 或 `Some(0)` 表示不限制帧数
  pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
    self.max_frames = max_frames.filter(|n| *n > 0);
    self
  }

  /// 收到消息即结束循环
  pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  /// 建立单帧步进的采集循环
  pub fn start<I, D, C>(
    self,
    session: Session<I, D, C>,
    recorder: &SampleRecorder,
  ) -> CaptureLoop<'_, I, D, C> {
    CaptureLoop {
      task: self,
      session,
      recorder,
      state: LoopState::Running,
      summary: SessionSummary::default(),
      last_timestamp_ms: i64::MIN,
    }
  }

  /// 运行采集循环直到结束，会话资源在返回前释放
  pub fn run_task<I, E, D, C>(
    self,
    session: Session<I, D, C>,
    recorder: &SampleRecorder,
  ) -> SessionSummary
  where
    I: Iterator<Item = Result<Frame, E>>,
    E: Display,
    D: LandmarkDetector,
    D::Error: Display,
    C: Console,
    C::Error: Display,
  {
    info!("开始采集，按 [o] 保存睁眼样本，[c] 保存闭眼样本，[q] 退出");
    let mut capture = self.start(session, recorder);
    while capture.step().state == LoopState::Running {}
    let summary = capture.finish();

    info!(
      "采集结束（{:?}）：共 {} 帧，检测到人脸 {} 帧，睁眼样本 {} 张，闭眼样本 {} 张",
      summary.reason, summary.frames, summary.faces, summary.saved_open, summary.saved_closed
    );
    summary
  }
}

/// 采集标注状态机，每次 [`CaptureLoop::step`] 处理一帧
pub struct CaptureLoop<'a, I, D, C> {
  task: CaptureTask,
  session: Session<I, D, C>,
  recorder: &'a SampleRecorder,
  state: LoopState,
  summary: SessionSummary,
  last_timestamp_ms: i64,
}

impl<I, E, D, C> CaptureLoop<'_, I, D, C>
where
  I: Iterator<Item = Result<Frame, E>>,
  E: Display,
  D: LandmarkDetector,
  D::Error: Display,
  C: Console,
  C::Error: Display,
{
  /// 结束循环并释放会话资源
  pub fn finish(self) -> SessionSummary {
    let CaptureLoop { summary, .. } = self;
    summary
  }

  fn terminate(&mut self, reason: TerminationReason) -> FrameOutcome {
    if self.state == LoopState::Running {
      info!("采集循环终止: {:?}", reason);
      self.state = LoopState::Terminated(reason);
      self.summary.reason = Some(reason);
    }
    FrameOutcome::terminated(reason)
  }

  fn interrupted(&self) -> bool {
    self
      .task
      .interrupt
      .as_ref()
      .is_some_and(|rx| rx.try_recv().is_ok())
  }

  /// 同一会话内严格递增的毫秒时间戳
  fn next_timestamp(&mut self) -> i64 {
    let now = SampleRecorder::now_ms().max(self.last_timestamp_ms.saturating_add(1));
    self.last_timestamp_ms = now;
    now
  }

  fn detect(&mut self, frame: &Frame) -> Option<LandmarkSet> {
    match self.session.detector.detect(frame) {
      Ok(landmarks) => landmarks,
      Err(e) => {
        warn!("第 {} 帧关键点检测失败: {}", frame.index, e);
        None
      }
    }
  }

  fn persist(&mut self, label: Label, eyes: &EyePair) -> Vec<PathBuf> {
    if eyes.is_empty() {
      warn!("当前帧没有可保存的眼部图像");
      return Vec::new();
    }

    let timestamp = self.next_timestamp();
    match self.recorder.save_pair(label, eyes, timestamp) {
      Ok(saved) => {
        match label {
          Label::Open => self.summary.saved_open += saved.len(),
          Label::Closed => self.summary.saved_closed += saved.len(),
        }
        info!(
          "已保存 {} 张样本到 {}",
          saved.len(),
          self.recorder.label_dir(label).display()
        );
        saved
      }
      Err(e) => {
        warn!("保存样本失败: {}", e);
        Vec::new()
      }
    }
  }

  /// 处理一帧：取帧、检测、裁剪、轮询命令、保存、显示
  pub fn step(&mut self) -> FrameOutcome {
    if let LoopState::Terminated(reason) = self.state {
      return FrameOutcome::terminated(reason);
    }
    if self.interrupted() {
      warn!("中断信号接收，退出采集循环");
      return self.terminate(TerminationReason::Interrupted);
    }
    if self
      .task
      .max_frames
      .is_some_and(|limit| self.summary.frames >= limit)
    {
      info!("达到指定帧数 {}, 退出采集循环", self.summary.frames);
      return self.terminate(TerminationReason::FrameLimit);
    }

    let frame = match self.session.input.next() {
      Some(Ok(frame)) => frame,
      Some(Err(e)) => {
        warn!("无法获取帧: {}", e);
        return self.terminate(TerminationReason::CaptureFailed);
      }
      None => return self.terminate(TerminationReason::EndOfStream),
    };
    self.summary.frames += 1;

    let landmarks = self.detect(&frame);
    let eyes = match &landmarks {
      Some(landmarks) => {
        self.summary.faces += 1;
        extract_eyes(&frame.image, landmarks, &self.task.eyes, self.task.crop_size)
      }
      None => EyePair::default(),
    };

    let command = self.session.console.poll_command();
    let mut saved = Vec::new();
    match command {
      Command::Quit => {
        let mut outcome = self.terminate(TerminationReason::Quit);
        outcome.frame_index = Some(frame.index);
        outcome.face_found = landmarks.is_some();
        outcome.eyes = eyes;
        outcome.command = command;
        return outcome;
      }
      Command::Save(label) => saved = self.persist(label, &eyes),
      Command::None => {}
    }

    let preview = self.task.overlay.draw(
      &frame.image,
      landmarks.as_ref(),
      &self.task.eyes,
      &eyes,
    );
    if let Err(e) = self.session.console.render(&preview) {
      warn!("显示失败: {}", e);
      self.terminate(TerminationReason::ConsoleFailed);
    }

    FrameOutcome {
      frame_index: Some(frame.index),
      face_found: landmarks.is_some(),
      eyes,
      command,
      saved,
      state: self.state,
    }
  }
}

#[cfg(test)]
mod tests {
  use std::cell::{Cell, RefCell};
  use std::collections::VecDeque;
  use std::convert::Infallible;

  use image::Rgb;

  use super::*;
  use crate::{input::InputError, landmark::LandmarkPoint};

  struct FixedDetector(Option<LandmarkSet>);

  impl LandmarkDetector for FixedDetector {
    type Error = Infallible;

    fn detect(&mut self, _frame: &Frame) -> Result<Option<LandmarkSet>, Self::Error> {
      Ok(self.0.clone())
    }
  }

  #[derive(Default)]
  struct ScriptedConsole {
    commands: VecDeque<Command>,
    rendered: usize,
  }

  impl Console for ScriptedConsole {
    type Error = Infallible;

    fn poll_command(&mut self) -> Command {
      self.commands.pop_front().unwrap_or_default()
    }

    fn render(&mut self, _image: &RgbImage) -> Result<(), Self::Error> {
      self.rendered += 1;
      Ok(())
    }
  }

  fn frames(n: u64) -> std::vec::IntoIter<Result<Frame, InputError>> {
    (0..n)
      .map(|index| {
        Ok(Frame {
          image: RgbImage::from_pixel(64, 48, Rgb([120, 120, 120])),
          index,
          timestamp_ms: index * 33,
        })
      })
      .collect::<Vec<_>>()
      .into_iter()
  }

  fn face() -> LandmarkSet {
    let mut points = vec![LandmarkPoint::new(0.5, 0.5); 478];
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
      points[i] = LandmarkPoint::new(x, y);
    }
    LandmarkSet::from(points)
  }

  #[test]
  fn extract_eyes_returns_both_crops() {
    let image = RgbImage::from_pixel(64, 48, Rgb([10, 20, 30]));
    let eyes = extract_eyes(&image, &face(), &EyeDefinition::BOTH, CropSize::default());
    assert_eq!(eyes.left.as_ref().unwrap().dimensions(), (48, 24));
    assert_eq!(eyes.right.as_ref().unwrap().dimensions(), (48, 24));
  }

  #[test]
  fn extract_eyes_skips_uncovered_definitions() {
    let image = RgbImage::new(64, 48);
    let short = LandmarkSet::from(vec![LandmarkPoint::new(0.5, 0.5); 200]);
    let eyes = extract_eyes(&image, &short, &EyeDefinition::BOTH, CropSize::default());
    // 右眼索引最大为 159，左眼需要 386
    assert!(eyes.left.is_none());
    assert!(eyes.right.is_some());
  }

  #[test]
  fn no_face_frames_keep_running_until_end_of_stream() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = SampleRecorder::create(dir.path()).unwrap();
    let console = ScriptedConsole {
      commands: VecDeque::from(vec![Command::Save(Label::Open); 5]),
      ..Default::default()
    };
    let session = Session::new(frames(5), FixedDetector(None), console);
    let mut capture = CaptureTask::default().start(session, &recorder);

    for _ in 0..5 {
      let outcome = capture.step();
      assert_eq!(outcome.state, LoopState::Running);
      assert!(!outcome.face_found);
      assert!(outcome.eyes.is_empty());
      assert!(outcome.saved.is_empty());
    }
    assert_eq!(
      capture.step().state,
      LoopState::Terminated(TerminationReason::EndOfStream)
    );
    // 终止后继续调用保持终止
    assert_eq!(
      capture.step().state,
      LoopState::Terminated(TerminationReason::EndOfStream)
    );

    let summary = capture.finish();
    assert_eq!(summary.frames, 5);
    assert_eq!(summary.faces, 0);
    assert_eq!(summary.saved_open, 0);
    assert_eq!(std::fs::read_dir(dir.path().join("open")).unwrap().count(), 0);
  }

  #[test]
  fn quit_stops_before_render() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = SampleRecorder::create(dir.path()).unwrap();
    let console = ScriptedConsole {
      commands: VecDeque::from(vec![Command::None, Command::Quit]),
      ..Default::default()
    };
    let session = Session::new(frames(10), FixedDetector(Some(face())), console);
    let mut capture = CaptureTask::default().start(session, &recorder);

    assert_eq!(capture.step().state, LoopState::Running);
    let outcome = capture.step();
    assert_eq!(outcome.state, LoopState::Terminated(TerminationReason::Quit));
    assert_eq!(outcome.frame_index, Some(1));
    assert_eq!(capture.session.console.rendered, 1);
    assert_eq!(capture.finish().frames, 2);
  }

  #[test]
  fn capture_error_ends_session() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = SampleRecorder::create(dir.path()).unwrap();
    let input = vec![
      frames(1).next().unwrap(),
      Err(InputError::Capture(std::io::Error::other("unplugged"))),
    ];
    let session = Session::new(
      input.into_iter(),
      FixedDetector(None),
      ScriptedConsole::default(),
    );

    let summary = CaptureTask::default().run_task(session, &recorder);
    assert_eq!(summary.frames, 1);
    assert_eq!(summary.reason, Some(TerminationReason::CaptureFailed));
  }

  #[test]
  fn frame_limit_and_interrupt_terminate() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = SampleRecorder::create(dir.path()).unwrap();

    let session = Session::new(frames(10), FixedDetector(None), ScriptedConsole::default());
    let summary = CaptureTask::default()
      .with_max_frames(Some(3))
      .run_task(session, &recorder);
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.reason, Some(TerminationReason::FrameLimit));

    let (tx, rx) = std::sync::mpsc::channel();
    tx.send(()).unwrap();
    let session = Session::new(frames(10), FixedDetector(None), ScriptedConsole::default());
    let summary = CaptureTask::default()
      .with_interrupt(rx)
      .run_task(session, &recorder);
    assert_eq!(summary.frames, 0);
    assert_eq!(summary.reason, Some(TerminationReason::Interrupted));
  }

  #[test]
  fn custom_eye_definitions_limit_crops_and_saves() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = SampleRecorder::create(dir.path()).unwrap();
    let console = ScriptedConsole {
      commands: VecDeque::from(vec![Command::Save(Label::Open)]),
      ..Default::default()
    };
    let session = Session::new(frames(1), FixedDetector(Some(face())), console);
    let mut capture = CaptureTask::default()
      .with_eyes(&[EyeDefinition::LEFT])
      .start(session, &recorder);

    let outcome = capture.step();
    assert!(outcome.eyes.left.is_some());
    assert!(outcome.eyes.right.is_none());
    assert_eq!(outcome.saved.len(), 1);
    assert!(
      outcome.saved[0]
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("eyeL_")
    );
  }

  #[test]
  fn failed_input_open_creates_nothing_else() {
    let detector_created = Cell::new(false);
    let console_created = Cell::new(false);

    let result = Session::<std::vec::IntoIter<Result<Frame, InputError>>, _, _>::open(
      || anyhow::bail!("no such device"),
      || {
        detector_created.set(true);
        Ok(FixedDetector(None))
      },
      |_| {
        console_created.set(true);
        Ok(ScriptedConsole::default())
      },
    );

    assert!(result.is_err());
    assert!(!detector_created.get());
    assert!(!console_created.get());
  }

  #[test]
  fn session_opens_input_before_detector_and_console() {
    let order = RefCell::new(Vec::new());

    let session = Session::open(
      || {
        order.borrow_mut().push("input");
        Ok(frames(2))
      },
      || {
        order.borrow_mut().push("detector");
        Ok(FixedDetector(None))
      },
      |input| {
        order.borrow_mut().push("console");
        assert_eq!(input.len(), 2);
        Ok(ScriptedConsole::default())
      },
    );

    assert!(session.is_ok());
    assert_eq!(*order.borrow(), vec!["input", "detector", "console"]);
  }

  #[test]
  fn repeated_saves_get_distinct_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = SampleRecorder::create(dir.path()).unwrap();
    let console = ScriptedConsole {
      commands: VecDeque::from(vec![Command::Save(Label::Closed); 3]),
      ..Default::default()
    };
    let session = Session::new(frames(3), FixedDetector(Some(face())), console);
    let summary = CaptureTask::default().run_task(session, &recorder);

    assert_eq!(summary.saved_closed, 6);
    assert_eq!(
      std::fs::read_dir(dir.path().join("closed")).unwrap().count(),
      6
    );
  }
}
