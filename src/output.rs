// 该文件是 Overlens （叠影） 项目的一部分。
// src/output.rs - 输出定义
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

use std::convert::Infallible;

use thiserror::Error;
use url::Url;

use crate::FromUrl;
#[cfg(any(feature = "save_image_file", feature = "directory_record"))]
use crate::FromUrlWithScheme;
use crate::frame::Frame;
use crate::model::Detection;

/// 叠加层绘制完成后，把结果交给下游（保存、推流等）
pub trait Render<F, D>: Sized {
  type Error;
  fn render_result(&self, frame: &F, surface: &D, detections: &[Detection])
  -> Result<(), Self::Error>;

  /// 模型就绪前的等待提示，没有对应的帧
  fn render_notice(&self, _surface: &D) -> Result<(), Self::Error> {
    Ok(())
  }
}

pub mod overlay;
pub mod surface;

mod image_surface;
pub use self::image_surface::{FontError, ImageSurface};

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 什么都不输出，叠加层只留在绘制表面上
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl NullOutput {
  pub const SCHEME: &'static str = "none";
}

impl<F, D> Render<F, D> for NullOutput {
  type Error = Infallible;

  fn render_result(&self, _: &F, _: &D, _: &[Detection]) -> Result<(), Self::Error> {
    Ok(())
  }
}

pub enum OutputWrapper {
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
  Null(NullOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      NullOutput::SCHEME => Ok(OutputWrapper::Null(NullOutput)),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl OutputWrapper {
  /// 合成摄像头画面时是否水平翻转
  pub fn with_mirror(self, mirror: bool) -> Self {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => {
        OutputWrapper::SaveImageFileOutput(output.with_mirror(mirror))
      }
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => {
        OutputWrapper::DirectoryRecordOutput(output.with_mirror(mirror))
      }
      other => other,
    }
  }
}

impl<F: Frame> Render<F, ImageSurface> for OutputWrapper {
  type Error = OutputError;

  fn render_result(
    &self,
    frame: &F,
    surface: &ImageSurface,
    detections: &[Detection],
  ) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output
        .render_result(frame, surface, detections)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(frame, surface, detections)
        .map_err(OutputError::from),
      OutputWrapper::Null(_) => Ok(()),
    }
  }

  fn render_notice(&self, surface: &ImageSurface) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => {
        Render::<F, ImageSurface>::render_notice(output, surface).map_err(OutputError::from)
      }
      // 目录记录只保存推理结果
      _ => Ok(()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn output_is_selected_by_scheme() {
    let url = Url::parse("none:").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::Null(_))
    ));

    let url = Url::parse("rtsp://localhost/live").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch(s)) if s == "rtsp"
    ));
  }

  #[cfg(feature = "save_image_file")]
  #[test]
  fn image_scheme_selects_file_output() {
    let url = Url::parse("image:///tmp/overlens/latest.png").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url).map(|o| o.with_mirror(false)),
      Ok(OutputWrapper::SaveImageFileOutput(_))
    ));
  }
}
