// 该文件是 Overlens （叠影） 项目的一部分。
// src/bin/overlay_camera.rs - 摄像头实时检测叠加
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

use std::{path::PathBuf, thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use url::Url;

use overlens::{
  FromUrl,
  config::{DisplaySize, MirrorPolicy, ModelConfig, ModelKind, SchedulerConfig},
  frame::RgbFrame,
  input::InputWrapper,
  model::{ModelCell, ReplayError, ReplayModel, ReplayModelBuilder},
  output::{ImageSurface, OutputWrapper, overlay::OverlayRenderer},
  permission::SourceGate,
  session::{CameraSession, SessionError},
  task::InferenceScheduler,
};

/// 摄像头实时检测叠加
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型（回放文件）
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源: image://, folder://, v4l://
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出: image://, folder://, none:
  #[arg(long, value_name = "OUTPUT", default_value = "none:")]
  pub output: Url,
  /// 模型类型: box 或 hand
  #[arg(long, value_name = "KIND", default_value = "box")]
  pub kind: ModelKind,
  /// 目标帧率，缺省使用模型预设
  #[arg(long, value_name = "FPS")]
  pub fps: Option<u32>,
  /// 显示尺寸
  #[arg(long, value_name = "WxH", default_value = "640x480")]
  pub display: DisplaySize,
  /// 镜像策略: platform, on, off
  #[arg(long, value_name = "POLICY", default_value = "platform")]
  pub mirror: MirrorPolicy,
  /// 标签字体文件（TTF/OTF）
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  /// 最多推理的帧数，0 表示不限制
  #[arg(long, value_name = "FRAME_NUMBER", default_value_t = 0)]
  pub frame_number: u64,
  /// 模型加载失败后的重试次数
  #[arg(long, value_name = "COUNT", default_value_t = 2)]
  pub load_retries: u32,
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

  let mut model_config = ModelConfig::preset(args.kind);
  if let Some(fps) = args.fps {
    model_config.fps = fps;
  }
  model_config.validate()?;
  args.display.validate()?;
  let mirror = args.mirror.resolve();
  let input_size = model_config.input_size(args.display);
  info!(
    "模型输入尺寸: {}x{}，显示尺寸: {}x{}，镜像: {}",
    input_size.0, input_size.1, args.display.width, args.display.height, mirror
  );

  // 先取得权限，再打开摄像头
  let gate = SourceGate::for_device(InputWrapper::camera_device_of(&args.input).as_deref());
  let cell = ModelCell::new();
  let session = CameraSession::new(gate, cell.clone());
  session.request_permission()?;

  let input = InputWrapper::from_url(&args.input)?.with_input_size(input_size);
  let output = OutputWrapper::from_url(&args.output)?.with_mirror(mirror);
  let mut surface = ImageSurface::new(args.display.width, args.display.height);
  if let Some(path) = &args.font {
    surface = surface.with_font(ImageSurface::load_font(path)?);
  }

  let mut scheduler = InferenceScheduler::new(
    input,
    cell,
    OverlayRenderer::new(surface),
    output,
    SchedulerConfig::new(model_config.fps, mirror)?,
  )?
  .with_frame_limit((args.frame_number > 0).then_some(args.frame_number));
  let stop = scheduler.stop_signal();
  let mut session = session.with_stop_signal(stop.clone());

  let interrupt = stop.clone();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    interrupt.stop();
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  // 模型在后台加载，调度器先显示等待提示
  let model_url = args.model.clone();
  let retries = args.load_retries;
  let loading = thread::Builder::new()
    .name("model-retry".to_string())
    .spawn(move || -> Result<(), SessionError> {
      let mut attempt = 0;
      loop {
        let url = model_url.clone();
        let config = model_config.clone();
        let loaded = session
          .start_loading(move || load_model(url, config))
          .and_then(|()| session.wait_for_model());
        match loaded {
          Ok(()) => {
            info!("会话状态: {:?}", session.status());
            return Ok(());
          }
          Err(e) if attempt < retries && matches!(e, SessionError::Model(_)) => {
            attempt += 1;
            warn!("模型加载失败 ({}), 第 {} 次重试", e, attempt);
          }
          Err(e) => {
            // 调度器不能一直停在等待提示上
            error!("模型加载失败，放弃: {}", e);
            session.stop_signal().stop();
            return Err(e);
          }
        }
      }
    })?;

  let stats = scheduler.run();
  info!(
    "共分发 {} 帧，绘制 {} 帧，失败 {} 帧",
    stats.dispatched, stats.rendered, stats.failed
  );

  match loading.join() {
    Ok(result) => result?,
    Err(_) => anyhow::bail!("模型加载线程异常退出"),
  }

  Ok(())
}
