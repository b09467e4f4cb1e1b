// 该文件是 Overlens （叠影） 项目的一部分。
// src/bin/overlay_oneshot.rs - 单帧检测叠加
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

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use overlens::{
  FromUrl,
  config::{DisplaySize, MirrorPolicy, ModelConfig, ModelKind, SchedulerConfig},
  frame::RgbFrame,
  input::InputWrapper,
  model::{ModelCell, ReplayError, ReplayModel, ReplayModelBuilder},
  output::{ImageSurface, OutputWrapper, overlay::OverlayRenderer},
  permission::SourceGate,
  session::CameraSession,
  task::{InferenceScheduler, TickOutcome},
};

/// 取一帧、推理、绘制并输出
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型（回放文件）
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 模型类型: box 或 hand
  #[arg(long, value_name = "KIND", default_value = "box")]
  pub kind: ModelKind,
  /// 显示尺寸
  #[arg(long, value_name = "WxH", default_value = "640x480")]
  pub display: DisplaySize,
  /// 镜像策略: platform, on, off
  #[arg(long, value_name = "POLICY", default_value = "platform")]
  pub mirror: MirrorPolicy,
  /// 标签字体文件（TTF/OTF）
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  /// 等待推理完成的超时（秒）
  #[arg(long, value_name = "SECONDS", default_value_t = 10)]
  pub timeout: u64,
}

fn load_model(url: Url, config: ModelConfig) -> Result<ReplayModel<RgbFrame>, ReplayError> {
  ReplayModelBuilder::from_url(&url)?.config(config).build()
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let model_config = ModelConfig::preset(args.kind);
  model_config.validate()?;
  args.display.validate()?;
  let mirror = args.mirror.resolve();

  let gate = SourceGate::for_device(InputWrapper::camera_device_of(&args.input).as_deref());
  let model_url = args.model.clone();
  let loader_config = model_config.clone();
  let mut session = CameraSession::open(gate, ModelCell::new(), move || {
    load_model(model_url, loader_config)
  })?;
  session.wait_for_model()?;

  let input = InputWrapper::from_url(&args.input)?
    .with_input_size(model_config.input_size(args.display));
  let output = OutputWrapper::from_url(&args.output)?.with_mirror(mirror);
  let mut surface = ImageSurface::new(args.display.width, args.display.height);
  if let Some(path) = &args.font {
    surface = surface.with_font(ImageSurface::load_font(path)?);
  }

  let mut scheduler: InferenceScheduler<_, ReplayModel<RgbFrame>, _, _> = InferenceScheduler::new(
    input,
    session.model_cell().clone(),
    OverlayRenderer::new(surface),
    output,
    SchedulerConfig::new(model_config.fps, mirror)?,
  )?;

  let outcome = scheduler.tick();
  if outcome != TickOutcome::Dispatched {
    anyhow::bail!("没有分发推理: {:?}", outcome);
  }
  let now = std::time::Instant::now();
  if !scheduler.settle(Duration::from_secs(args.timeout)) {
    anyhow::bail!("推理超时");
  }
  info!("推理并渲染完成，耗时: {:.2?}", now.elapsed());

  let stats = scheduler.stats();
  if stats.rendered == 0 {
    anyhow::bail!("推理失败，没有输出");
  }
  info!("完成: {:?}", stats);

  Ok(())
}
