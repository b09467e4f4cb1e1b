// 该文件是 Overlens （叠影） 项目的一部分。
// src/config.rs - 运行配置
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

use std::{str::FromStr, time::Duration};

use thiserror::Error;

// 手势模型默认值
pub const HAND_POSE_FPS: u32 = 15;
pub const HAND_POSE_RESIZE_WIDTH: u32 = 224;
pub const HAND_POSE_DETECTION_CONFIDENCE: f32 = 0.8;
pub const HAND_POSE_SCORE_THRESHOLD: f32 = 0.8;

// 物体检测模型默认值
pub const OBJECT_DETECTOR_FPS: u32 = 5;
pub const OBJECT_DETECTOR_RESIZE_WIDTH: u32 = 128;
pub const OBJECT_DETECTOR_SCORE_THRESHOLD: f32 = 0.5;

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;
pub const DEFAULT_MAX_BOXES: usize = 20;

pub const DEFAULT_DISPLAY_WIDTH: u32 = 640;
pub const DEFAULT_DISPLAY_HEIGHT: u32 = 480;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("帧率必须大于 0")]
  ZeroFps,
  #[error("显示尺寸无效: {0}x{1}")]
  InvalidDisplaySize(u32, u32),
  #[error("模型输入宽度必须大于 0")]
  ZeroResizeWidth,
  #[error("阈值 {name} 超出范围 [0, 1]: {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("无法解析 {0}")]
  Parse(String),
}

/// 模型输出的检测类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
  /// 边界框 + 标签
  BoundingBox,
  /// 关键点骨架
  Landmark,
}

impl FromStr for ModelKind {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "box" | "bbox" | "object" => Ok(ModelKind::BoundingBox),
      "landmark" | "hand" | "handpose" => Ok(ModelKind::Landmark),
      other => Err(ConfigError::Parse(format!("模型类型 '{}'", other))),
    }
  }
}

/// 模型的固定配置
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
  pub kind: ModelKind,
  pub fps: u32,
  pub resize_width: u32,
  /// 关键点检测的最低置信度
  pub detection_confidence: f32,
  pub score_threshold: f32,
  pub iou_threshold: f32,
  pub max_boxes: usize,
}

impl ModelConfig {
  pub fn hand_pose() -> Self {
    Self {
      kind: ModelKind::Landmark,
      fps: HAND_POSE_FPS,
      resize_width: HAND_POSE_RESIZE_WIDTH,
      detection_confidence: HAND_POSE_DETECTION_CONFIDENCE,
      score_threshold: HAND_POSE_SCORE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      max_boxes: DEFAULT_MAX_BOXES,
    }
  }

  pub fn object_detector() -> Self {
    Self {
      kind: ModelKind::BoundingBox,
      fps: OBJECT_DETECTOR_FPS,
      resize_width: OBJECT_DETECTOR_RESIZE_WIDTH,
      detection_confidence: 0.0,
      score_threshold: OBJECT_DETECTOR_SCORE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      max_boxes: DEFAULT_MAX_BOXES,
    }
  }

  pub fn preset(kind: ModelKind) -> Self {
    match kind {
      ModelKind::BoundingBox => Self::object_detector(),
      ModelKind::Landmark => Self::hand_pose(),
    }
  }

  /// 模型输入尺寸，高度按显示区域的宽高比换算
  pub fn input_size(&self, display: DisplaySize) -> (u32, u32) {
    let height = (display.height as f64 / display.width as f64 * self.resize_width as f64).round();
    (self.resize_width, (height as u32).max(1))
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.fps == 0 {
      return Err(ConfigError::ZeroFps);
    }
    if self.resize_width == 0 {
      return Err(ConfigError::ZeroResizeWidth);
    }
    for (name, value) in [
      ("detection_confidence", self.detection_confidence),
      ("score_threshold", self.score_threshold),
      ("iou_threshold", self.iou_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ThresholdOutOfRange { name, value });
      }
    }
    Ok(())
  }
}

/// 显示区域尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySize {
  pub width: u32,
  pub height: u32,
}

impl Default for DisplaySize {
  fn default() -> Self {
    Self {
      width: DEFAULT_DISPLAY_WIDTH,
      height: DEFAULT_DISPLAY_HEIGHT,
    }
  }
}

impl FromStr for DisplaySize {
  type Err = ConfigError;

  /// 格式: `WIDTHxHEIGHT`
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (w, h) = s
      .split_once(['x', 'X'])
      .ok_or_else(|| ConfigError::Parse(format!("显示尺寸 '{}'", s)))?;
    let width = w
      .trim()
      .parse()
      .map_err(|_| ConfigError::Parse(format!("显示宽度 '{}'", w)))?;
    let height = h
      .trim()
      .parse()
      .map_err(|_| ConfigError::Parse(format!("显示高度 '{}'", h)))?;
    let size = DisplaySize { width, height };
    size.validate()?;
    Ok(size)
  }
}

impl DisplaySize {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.width == 0 || self.height == 0 {
      return Err(ConfigError::InvalidDisplaySize(self.width, self.height));
    }
    Ok(())
  }
}

/// 水平镜像策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MirrorPolicy {
  /// 除 iOS 外都镜像
  #[default]
  Platform,
  On,
  Off,
}

impl MirrorPolicy {
  pub fn resolve(self) -> bool {
    match self {
      MirrorPolicy::Platform => !cfg!(target_os = "ios"),
      MirrorPolicy::On => true,
      MirrorPolicy::Off => false,
    }
  }
}

impl FromStr for MirrorPolicy {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "platform" | "auto" => Ok(MirrorPolicy::Platform),
      "on" | "true" => Ok(MirrorPolicy::On),
      "off" | "false" => Ok(MirrorPolicy::Off),
      other => Err(ConfigError::Parse(format!("镜像策略 '{}'", other))),
    }
  }
}

/// 调度器配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
  pub target_fps: u32,
  pub mirror: bool,
}

impl SchedulerConfig {
  pub fn new(target_fps: u32, mirror: bool) -> Result<Self, ConfigError> {
    if target_fps == 0 {
      return Err(ConfigError::ZeroFps);
    }
    Ok(Self { target_fps, mirror })
  }

  /// 两次调度之间的间隔：1000 / fps 毫秒
  pub fn tick_interval(&self) -> Duration {
    Duration::from_secs(1) / self.target_fps.max(1)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resize_height_follows_display_aspect() {
    let config = ModelConfig::hand_pose();
    let size = config.input_size(DisplaySize {
      width: 1080,
      height: 1920,
    });
    // 1920 / 1080 * 224 = 398.2
    assert_eq!(size, (224, 398));
  }

  #[test]
  fn display_size_parses() {
    assert_eq!(
      "900x900".parse::<DisplaySize>().unwrap(),
      DisplaySize {
        width: 900,
        height: 900
      }
    );
    assert!("900".parse::<DisplaySize>().is_err());
    assert_eq!(
      "0x10".parse::<DisplaySize>(),
      Err(ConfigError::InvalidDisplaySize(0, 10))
    );
  }

  #[test]
  fn zero_fps_is_rejected() {
    assert_eq!(SchedulerConfig::new(0, false), Err(ConfigError::ZeroFps));
    let config = SchedulerConfig::new(5, false).unwrap();
    assert_eq!(config.tick_interval(), Duration::from_millis(200));
  }

  #[test]
  fn presets_are_valid() {
    assert!(ModelConfig::hand_pose().validate().is_ok());
    assert!(ModelConfig::object_detector().validate().is_ok());
    let mut bad = ModelConfig::object_detector();
    bad.iou_threshold = 1.5;
    assert!(matches!(
      bad.validate(),
      Err(ConfigError::ThresholdOutOfRange {
        name: "iou_threshold",
        ..
      })
    ));
  }

  #[test]
  fn mirror_policy_resolves() {
    assert!(MirrorPolicy::On.resolve());
    assert!(!MirrorPolicy::Off.resolve());
    assert_eq!("auto".parse::<MirrorPolicy>().unwrap(), MirrorPolicy::Platform);
  }
}
