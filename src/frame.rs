// 该文件是 Overlens （叠影） 项目的一部分。
// src/frame.rs - 帧定义
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

use image::{RgbImage, imageops::FilterType};

/// 一帧摄像头图像。帧的生命周期只覆盖一次推理，释放即 drop。
pub trait Frame {
  fn width(&self) -> u32;
  fn height(&self) -> u32;

  /// 像素数据（如果有）
  fn image(&self) -> Option<&RgbImage> {
    None
  }

  /// 缩放前的采集画面，用作预览背景
  fn preview(&self) -> Option<&RgbImage> {
    self.image()
  }
}

/// RGB 帧
#[derive(Debug, Clone)]
pub struct RgbFrame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
  /// 缩放前的原始画面；未缩放时为 None
  pub capture: Option<RgbImage>,
}

impl RgbFrame {
  pub fn new(image: RgbImage, index: u64, timestamp_ms: u64) -> Self {
    Self {
      image,
      index,
      timestamp_ms,
      capture: None,
    }
  }

  /// 缩放到模型输入尺寸后构造帧，原始画面保留用于预览
  pub fn resized(image: &RgbImage, size: (u32, u32), index: u64, timestamp_ms: u64) -> Self {
    if image.dimensions() == size {
      return Self::new(image.clone(), index, timestamp_ms);
    }
    let resized = image::imageops::resize(image, size.0, size.1, FilterType::Triangle);
    Self {
      capture: Some(image.clone()),
      ..Self::new(resized, index, timestamp_ms)
    }
  }
}

impl Frame for RgbFrame {
  fn width(&self) -> u32 {
    self.image.width()
  }

  fn height(&self) -> u32 {
    self.image.height()
  }

  fn image(&self) -> Option<&RgbImage> {
    Some(&self.image)
  }

  fn preview(&self) -> Option<&RgbImage> {
    self.capture.as_ref().or(Some(&self.image))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resized_frame_reports_model_input_size() {
    let image = RgbImage::new(640, 480);
    let frame = RgbFrame::resized(&image, (128, 96), 3, 40);
    assert_eq!((frame.width(), frame.height()), (128, 96));
    assert_eq!(frame.index, 3);
    assert!(frame.image().is_some());
    assert_eq!(frame.preview().map(|p| p.dimensions()), Some((640, 480)));

    let same = RgbFrame::resized(&image, (640, 480), 4, 80);
    assert!(same.capture.is_none());
    assert_eq!(same.preview().map(|p| p.dimensions()), Some((640, 480)));
  }
}
