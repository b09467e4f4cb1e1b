// 该文件是 Overlens （叠影） 项目的一部分。
// src/input/read_image_file.rs - 静态图像输入
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

use std::time::Instant;

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame, input::FrameSource, url_file_path};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 把一张静态图像当作摄像头：每次拉取都给出同一张图像。
/// `image:///path.png?once` 只给出一次。
pub struct ImageFileInput {
  image: RgbImage,
  input_size: Option<(u32, u32)>,
  once: bool,
  frame_index: u64,
  start_time: Instant,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = url_file_path(url);
    let image = ImageReader::open(&path)?.decode()?.to_rgb8();
    debug!(
      "读取图像 {}: {}x{}",
      path.display(),
      image.width(),
      image.height()
    );

    Ok(Self::from_image(image).once(crate::url_has_flag(url, "once")))
  }
}

impl ImageFileInput {
  pub fn from_image(image: RgbImage) -> Self {
    Self {
      image,
      input_size: None,
      once: false,
      frame_index: 0,
      start_time: Instant::now(),
    }
  }

  pub fn once(mut self, once: bool) -> Self {
    self.once = once;
    self
  }

  pub fn with_input_size(mut self, size: (u32, u32)) -> Self {
    self.input_size = Some(size);
    self
  }
}

impl FrameSource for ImageFileInput {
  type Frame = RgbFrame;

  fn next_frame(&mut self) -> Option<Self::Frame> {
    if self.is_exhausted() {
      return None;
    }

    let size = self.input_size.unwrap_or_else(|| self.image.dimensions());
    let timestamp_ms = self.start_time.elapsed().as_millis() as u64;
    let frame = RgbFrame::resized(&self.image, size, self.frame_index, timestamp_ms);
    self.frame_index += 1;
    Some(frame)
  }

  fn is_exhausted(&self) -> bool {
    self.once && self.frame_index > 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::Frame;

  #[test]
  fn still_image_repeats_until_once() {
    let mut input = ImageFileInput::from_image(RgbImage::new(32, 16)).with_input_size((8, 4));
    for index in 0..3 {
      let frame = input.next_frame().unwrap();
      assert_eq!(frame.index, index);
      assert_eq!((frame.width(), frame.height()), (8, 4));
    }
    assert!(!input.is_exhausted());

    let mut once = ImageFileInput::from_image(RgbImage::new(4, 4)).once(true);
    assert!(once.next_frame().is_some());
    assert!(once.next_frame().is_none());
    assert!(once.is_exhausted());
  }

  #[test]
  fn loads_image_from_url() {
    let dir = std::env::temp_dir().join(format!("overlens-image-input-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("still.png");
    RgbImage::from_pixel(10, 6, image::Rgb([1, 2, 3]))
      .save(&path)
      .unwrap();

    let url = Url::parse(&format!("image://{}?once", path.display())).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    let frame = input.next_frame().unwrap();
    assert_eq!(frame.image.get_pixel(0, 0), &image::Rgb([1, 2, 3]));
    assert!(input.is_exhausted());

    std::fs::remove_dir_all(&dir).ok();
  }
}
