// 该文件是 Overlens （叠影） 项目的一部分。
// tests/pipeline.rs - 从输入到输出的完整流程
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

#![cfg(all(feature = "model_replay", feature = "read_image_file", feature = "save_image_file"))]

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use image::{Rgb, RgbImage};
use url::Url;

use overlens::{
  FromUrl,
  config::{DisplaySize, ModelConfig, SchedulerConfig},
  frame::RgbFrame,
  input::{FrameSource, InputWrapper},
  model::{ModelCell, ReplayError, ReplayModel, ReplayModelBuilder},
  output::{ImageSurface, OutputWrapper, overlay::OverlayRenderer},
  permission::GrantedGate,
  session::{CameraSession, SessionStatus},
  task::{InferenceScheduler, TickOutcome},
};

const RECORDING: &str = r#"{"width":300,"height":300,"detections":[{"kind":"box","label":"cat","score":0.9,"bbox":{"x":10,"y":20,"width":30,"height":40}}]}"#;

fn workspace(name: &str) -> PathBuf {
  let dir = std::env::temp_dir().join(format!("overlens-pipeline-{}-{}", name, std::process::id()));
  std::fs::create_dir_all(&dir).unwrap();
  dir
}

fn write_fixtures(dir: &Path) -> (Url, Url) {
  let frames = dir.join("frames");
  std::fs::create_dir_all(&frames).unwrap();
  for name in ["0001.png", "0002.png"] {
    RgbImage::from_pixel(300, 300, Rgb([0, 0, 255]))
      .save(frames.join(name))
      .unwrap();
  }
  let model = dir.join("cat.jsonl");
  std::fs::write(&model, RECORDING).unwrap();

  (
    Url::parse(&format!("folder://{}", frames.display())).unwrap(),
    Url::parse(&format!("replay://{}", model.display())).unwrap(),
  )
}

fn load(url: &Url) -> ReplayModel<RgbFrame> {
  ReplayModelBuilder::from_url(url)
    .unwrap()
    .config(ModelConfig::object_detector())
    .build()
    .unwrap()
}

#[test]
fn mirrored_overlay_is_saved_over_the_frame() {
  let dir = workspace("oneshot");
  let (input_url, model_url) = write_fixtures(&dir);
  let output_path = dir.join("latest.png");

  let config = ModelConfig::object_detector();
  let display = DisplaySize {
    width: 900,
    height: 900,
  };
  let input = InputWrapper::from_url(&input_url)
    .unwrap()
    .with_input_size(config.input_size(display));
  let output = OutputWrapper::from_url(
    &Url::parse(&format!("image://{}", output_path.display())).unwrap(),
  )
  .unwrap()
  .with_mirror(true);

  let mut scheduler = InferenceScheduler::new(
    input,
    ModelCell::ready(load(&model_url)),
    OverlayRenderer::new(ImageSurface::new(900, 900)),
    output,
    SchedulerConfig::new(config.fps, true).unwrap(),
  )
  .unwrap();

  assert_eq!(scheduler.tick(), TickOutcome::Dispatched);
  assert!(scheduler.settle(Duration::from_secs(5)));
  assert_eq!(scheduler.stats().rendered, 1);

  let saved = image::open(&output_path).unwrap().to_rgb8();
  assert_eq!(saved.dimensions(), (900, 900));
  // 镜像后的边框左边缘在 x = 780
  let edge = saved.get_pixel(780, 120);
  assert!(edge[0] > edge[2], "edge pixel {:?}", edge);
  // 标签背景在边框上方
  let label = saved.get_pixel(790, 45);
  assert!(label[0] > 100, "label pixel {:?}", label);
  // 未镜像的位置保持原画面
  let untouched = saved.get_pixel(31, 120);
  assert!(untouched[2] > 200 && untouched[0] < 50, "pixel {:?}", untouched);

  std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn session_loads_in_background_while_scheduler_waits() {
  let dir = workspace("session");
  let (input_url, model_url) = write_fixtures(&dir);

  let cell: ModelCell<ReplayModel<RgbFrame>> = ModelCell::new();
  let mut session = CameraSession::new(GrantedGate, cell.clone());
  assert_eq!(session.status(), SessionStatus::AwaitingPermission);

  let input = InputWrapper::from_url(&input_url).unwrap();
  let output = OutputWrapper::from_url(&Url::parse("none:").unwrap()).unwrap();
  let mut scheduler = InferenceScheduler::new(
    input,
    cell,
    OverlayRenderer::new(ImageSurface::new(320, 240)),
    output,
    SchedulerConfig::new(50, false).unwrap(),
  )
  .unwrap();

  // 模型未就绪时不拉取
  assert_eq!(scheduler.tick(), TickOutcome::ModelNotReady);
  assert_eq!(scheduler.stats().no_frame + scheduler.stats().dispatched, 0);

  session
    .start_loading(move || -> Result<ReplayModel<RgbFrame>, ReplayError> {
      ReplayModelBuilder::from_url(&model_url)?.build()
    })
    .unwrap();
  session.wait_for_model().unwrap();
  assert_eq!(session.status(), SessionStatus::Running);

  let stats = scheduler.run();
  assert_eq!(stats.dispatched, 2);
  assert_eq!(stats.rendered, 2);
  assert_eq!(stats.skipped_not_ready, 1);
  assert!(scheduler.source().is_exhausted());

  std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn waiting_notice_reaches_the_image_output() {
  let dir = workspace("notice");
  let (input_url, _) = write_fixtures(&dir);
  let output_path = dir.join("latest.png");

  let input = InputWrapper::from_url(&input_url).unwrap();
  let output = OutputWrapper::from_url(
    &Url::parse(&format!("image://{}", output_path.display())).unwrap(),
  )
  .unwrap();
  let mut scheduler = InferenceScheduler::new(
    input,
    ModelCell::<ReplayModel<RgbFrame>>::new(),
    OverlayRenderer::new(ImageSurface::new(320, 240)),
    output,
    SchedulerConfig::new(10, false).unwrap(),
  )
  .unwrap();

  for _ in 0..3 {
    assert_eq!(scheduler.tick(), TickOutcome::ModelNotReady);
  }
  assert_eq!(scheduler.stats().dispatched, 0);

  // 等待画面是不透明的黑底
  let saved = image::open(&output_path).unwrap().to_rgba8();
  assert_eq!(saved.dimensions(), (320, 240));
  assert_eq!(saved.get_pixel(0, 0), &image::Rgba([0, 0, 0, 255]));
  assert_eq!(saved.get_pixel(319, 239), &image::Rgba([0, 0, 0, 255]));

  std::fs::remove_dir_all(&dir).ok();
}
