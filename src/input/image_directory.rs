// 该文件是 Overlens （叠影） 项目的一部分。
// src/input/image_directory.rs - 图像目录输入
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
  time::Instant,
};

use image::ImageReader;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame, input::FrameSource, url_file_path};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

#[derive(Error, Debug)]
pub enum ImageDirectoryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("目录中没有图像: {0}")]
  Empty(PathBuf),
}

/// 按文件名顺序逐张读取目录中的图像，`?loop` 循环播放
pub struct ImageDirectoryInput {
  files: Vec<PathBuf>,
  cursor: usize,
  looping: bool,
  input_size: Option<(u32, u32)>,
  frame_index: u64,
  start_time: Instant,
}

impl FromUrlWithScheme for ImageDirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageDirectoryInput {
  type Error = ImageDirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageDirectoryInputError::SchemeMismatch);
    }

    let input = Self::open(url_file_path(url))?.looping(crate::url_has_flag(url, "loop"));
    Ok(input)
  }
}

impl ImageDirectoryInput {
  pub fn open(directory: impl AsRef<Path>) -> Result<Self, ImageDirectoryInputError> {
    let directory = directory.as_ref();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(directory)? {
      let path = entry?.path();
      if path.is_file() && is_image_file(&path) {
        files.push(path);
      }
    }
    files.sort();

    if files.is_empty() {
      return Err(ImageDirectoryInputError::Empty(directory.to_path_buf()));
    }
    info!("目录 {} 中共有 {} 张图像", directory.display(), files.len());

    Ok(Self {
      files,
      cursor: 0,
      looping: false,
      input_size: None,
      frame_index: 0,
      start_time: Instant::now(),
    })
  }

  pub fn looping(mut self, looping: bool) -> Self {
    self.looping = looping;
    self
  }

  pub fn with_input_size(mut self, size: (u32, u32)) -> Self {
    self.input_size = Some(size);
    self
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }
}

fn is_image_file(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    .unwrap_or(false)
}

impl FrameSource for ImageDirectoryInput {
  type Frame = RgbFrame;

  fn next_frame(&mut self) -> Option<Self::Frame> {
    if self.cursor >= self.files.len() {
      if !self.looping {
        return None;
      }
      self.cursor = 0;
    }

    let path = &self.files[self.cursor];
    self.cursor += 1;

    let image = match ImageReader::open(path).map(|reader| reader.decode()) {
      Ok(Ok(image)) => image.to_rgb8(),
      Ok(Err(e)) => {
        warn!("无法解码图像 {}: {}", path.display(), e);
        return None;
      }
      Err(e) => {
        error!("无法打开图像 {}: {}", path.display(), e);
        return None;
      }
    };

    let size = self.input_size.unwrap_or_else(|| image.dimensions());
    let timestamp_ms = self.start_time.elapsed().as_millis() as u64;
    let frame = RgbFrame::resized(&image, size, self.frame_index, timestamp_ms);
    self.frame_index += 1;
    Some(frame)
  }

  fn is_exhausted(&self) -> bool {
    !self.looping && self.cursor >= self.files.len()
  }
}
