// 该文件是 Overlens （叠影） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::{
  path::{Path, PathBuf},
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::Detection,
  output::{ImageSurface, Render},
  url_file_path, url_has_flag,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 把检测结果写成文本，每个检测一行
fn record_line(detection: &Detection) -> String {
  match detection {
    Detection::Box(b) => format!(
      "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
      b.label, b.score, b.bbox.x, b.bbox.y, b.bbox.width, b.bbox.height
    ),
    Detection::Landmarks(l) => {
      let points: Vec<String> = l
        .points()
        .iter()
        .map(|p| format!("{:.4}, {:.4}", p.x, p.y))
        .collect();
      format!("landmarks, {:.4}, {}", l.score(), points.join(", "))
    }
  }
}

fn write_records(detections: &[Detection], path: &Path) -> Result<(), std::io::Error> {
  let records: Vec<String> = detections.iter().map(record_line).collect();
  std::fs::write(path.with_extension("txt"), records.join("\n"))
}

/// 按日期归档每一帧：`<目录>/YYYY/MM/DD/HH-MM-SS-XXXX.png`
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: bool,
  always: bool,
  mirror: bool,
  frame_counter: AtomicU16,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    Ok(
      DirectoryRecordOutput::new(url_file_path(uri))
        .record(url_has_flag(uri, "record"))
        .always(url_has_flag(uri, "always")),
    )
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl AsRef<Path>) -> Self {
    Self {
      directory: directory.as_ref().to_path_buf(),
      record: false,
      always: false,
      mirror: false,
      frame_counter: AtomicU16::new(0),
    }
  }

  /// 保存原始画面并把结果写入同名 .txt，而不是保存叠加后的画面
  pub fn record(mut self, record: bool) -> Self {
    self.record = record;
    self
  }

  /// 没有检测结果的帧也保存
  pub fn always(mut self, always: bool) -> Self {
    self.always = always;
    self
  }

  pub fn with_mirror(mut self, mirror: bool) -> Self {
    self.mirror = mirror;
    self
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl<F: Frame> Render<F, ImageSurface> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &self,
    frame: &F,
    surface: &ImageSurface,
    detections: &[Detection],
  ) -> Result<(), Self::Error> {
    if !self.always && detections.is_empty() {
      return Ok(());
    }

    let path = self.frame_path()?;
    if self.record {
      match frame.image() {
        Some(image) => image.save(&path)?,
        None => warn!("帧没有像素数据，只写入检测记录"),
      }
      write_records(detections, &path)?;
    } else {
      surface.composite_over(frame.preview(), self.mirror).save(&path)?;
    }
    debug!("记录帧: {}", path.display());
    Ok(())
  }
}
