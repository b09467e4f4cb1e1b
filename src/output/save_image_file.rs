// 该文件是 Overlens （叠影） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbaImage};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::Detection,
  output::{ImageSurface, Render},
  url_file_path, url_has_flag,
};

/// 每次渲染覆盖同一个文件，保存最新一帧
pub struct SaveImageFileOutput {
  path: PathBuf,
  overlay_only: bool,
  mirror: bool,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput::new(url_file_path(uri)).overlay_only(url_has_flag(uri, "overlay-only")))
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl AsRef<Path>) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
      overlay_only: false,
      mirror: false,
    }
  }

  /// 只保存透明叠加层，不合成摄像头画面
  pub fn overlay_only(mut self, overlay_only: bool) -> Self {
    self.overlay_only = overlay_only;
    self
  }

  pub fn with_mirror(mut self, mirror: bool) -> Self {
    self.mirror = mirror;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: RgbaImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
    }

    let is_png = self
      .path
      .extension()
      .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
    let result = if is_png {
      image.save(&self.path)
    } else {
      // JPEG 等格式不支持透明通道
      DynamicImage::ImageRgba8(image).to_rgb8().save(&self.path)
    };
    result.map_err(SaveImageFileError::ImageError)?;

    debug!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl<F: Frame> Render<F, ImageSurface> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(
    &self,
    frame: &F,
    surface: &ImageSurface,
    _detections: &[Detection],
  ) -> Result<(), Self::Error> {
    let image = if self.overlay_only {
      surface.canvas().clone()
    } else {
      surface.composite_over(frame.preview(), self.mirror)
    };
    self.save_image(image)
  }

  fn render_notice(&self, surface: &ImageSurface) -> Result<(), Self::Error> {
    self.save_image(surface.canvas().clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    frame::RgbFrame,
    output::surface::{DisplayRect, DisplaySurface},
  };
  use image::{Rgb, RgbImage, Rgba};

  fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("overlens-{}-{}", name, std::process::id()))
  }

  #[test]
  fn latest_frame_is_composited_and_saved() {
    let dir = temp_dir("save-image");
    let path = dir.join("nested").join("latest.png");
    let output = SaveImageFileOutput::new(&path);

    let mut surface = ImageSurface::new(8, 8);
    surface.fill_rect(DisplayRect::new(0.0, 0.0, 4.0, 8.0), Rgba([255, 0, 0, 255]));
    let frame = RgbFrame::new(RgbImage::from_pixel(4, 4, Rgb([0, 255, 0])), 0, 0);
    output.render_result(&frame, &surface, &[]).unwrap();

    let saved = image::open(&path).unwrap().to_rgba8();
    assert_eq!(saved.dimensions(), (8, 8));
    assert_eq!(saved.get_pixel(1, 1), &Rgba([255, 0, 0, 255]));
    let background = saved.get_pixel(6, 6);
    assert_eq!((background[0], background[2], background[3]), (0, 0, 255));
    assert!(background[1] > 250);

    std::fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn overlay_only_flag_keeps_transparency() {
    let dir = temp_dir("save-overlay");
    let url = Url::parse(&format!("image://{}/overlay.png?overlay-only", dir.display())).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();
    assert_eq!(output.path(), dir.join("overlay.png"));

    let surface = ImageSurface::new(4, 4);
    let frame = RgbFrame::new(RgbImage::new(4, 4), 0, 0);
    output.render_result(&frame, &surface, &[]).unwrap();
    let saved = image::open(output.path()).unwrap().to_rgba8();
    assert!(saved.pixels().all(|p| p[3] == 0));

    std::fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn notice_is_saved_without_a_frame() {
    let dir = temp_dir("save-notice");
    let output = SaveImageFileOutput::new(dir.join("latest.png"));

    let mut surface = ImageSurface::new(6, 4);
    surface.fill_rect(DisplayRect::new(0.0, 0.0, 6.0, 4.0), Rgba([0, 0, 0, 255]));
    Render::<RgbFrame, ImageSurface>::render_notice(&output, &surface).unwrap();

    let saved = image::open(output.path()).unwrap().to_rgba8();
    assert_eq!(saved.dimensions(), (6, 4));
    assert!(saved.pixels().all(|p| *p == Rgba([0, 0, 0, 255])));

    std::fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn composite_uses_the_full_resolution_capture() {
    let dir = temp_dir("save-preview");
    let output = SaveImageFileOutput::new(dir.join("latest.png"));

    let mut capture = RgbImage::new(8, 8);
    capture.put_pixel(5, 5, Rgb([255, 255, 255]));
    let frame = RgbFrame::resized(&capture, (2, 2), 0, 0);
    let surface = ImageSurface::new(8, 8);
    output.render_result(&frame, &surface, &[]).unwrap();

    let saved = image::open(output.path()).unwrap().to_rgb8();
    assert_eq!(saved.get_pixel(5, 5), &Rgb([255, 255, 255]));
    assert_eq!(saved.get_pixel(4, 4), &Rgb([0, 0, 0]));

    std::fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("folder:///tmp/out").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
