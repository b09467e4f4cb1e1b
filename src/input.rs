// 该文件是 Overlens （叠影） 项目的一部分。
// src/input.rs - 摄像头/图像输入
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

use std::path::PathBuf;

use thiserror::Error;

use crate::{FromUrl, frame::Frame, frame::RgbFrame};

/// 拉取式帧来源：每次调用给出下一帧，或者当前没有可用帧
pub trait FrameSource {
  type Frame: Frame;

  fn next_frame(&mut self) -> Option<Self::Frame>;

  /// 来源是否已经不会再产生帧
  fn is_exhausted(&self) -> bool {
    false
  }
}

#[cfg(feature = "read_image_file")]
mod image_directory;
#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::image_directory::{ImageDirectoryInput, ImageDirectoryInputError};
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "camera_v4l")]
mod v4l_input;
#[cfg(feature = "camera_v4l")]
pub use self::v4l_input::{V4lInput, V4lInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "read_image_file")]
  #[error("Image directory input error: {0}")]
  ImageDirectoryInputError(#[from] ImageDirectoryInputError),
  #[cfg(feature = "camera_v4l")]
  #[error("V4L input error: {0}")]
  V4lInputError(#[from] V4lInputError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ImageFile(ImageFileInput),
  #[cfg(feature = "read_image_file")]
  ImageDirectory(ImageDirectoryInput),
  #[cfg(feature = "camera_v4l")]
  V4l(V4lInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileInput::SCHEME {
        return Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?));
      }
      if url.scheme() == ImageDirectoryInput::SCHEME {
        return Ok(InputWrapper::ImageDirectory(
          ImageDirectoryInput::from_url(url)?,
        ));
      }
    }
    #[cfg(feature = "camera_v4l")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == V4lInput::SCHEME {
        return Ok(InputWrapper::V4l(V4lInput::from_url(url)?));
      }
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl InputWrapper {
  /// 设置送入模型的帧尺寸
  pub fn with_input_size(self, size: (u32, u32)) -> Self {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFile(input) => InputWrapper::ImageFile(input.with_input_size(size)),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageDirectory(input) => {
        InputWrapper::ImageDirectory(input.with_input_size(size))
      }
      #[cfg(feature = "camera_v4l")]
      InputWrapper::V4l(input) => InputWrapper::V4l(input.with_input_size(size)),
    }
  }

  /// 需要申请访问权限的摄像头设备。只看 URL，不打开设备。
  pub fn camera_device_of(url: &url::Url) -> Option<PathBuf> {
    #[cfg(feature = "camera_v4l")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == V4lInput::SCHEME {
        return Some(V4lInput::device_path_of(url));
      }
    }
    let _ = url;
    None
  }
}

impl FrameSource for InputWrapper {
  type Frame = RgbFrame;

  fn next_frame(&mut self) -> Option<Self::Frame> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFile(input) => input.next_frame(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageDirectory(input) => input.next_frame(),
      #[cfg(feature = "camera_v4l")]
      InputWrapper::V4l(input) => input.next_frame(),
    }
  }

  fn is_exhausted(&self) -> bool {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFile(input) => input.is_exhausted(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageDirectory(input) => input.is_exhausted(),
      #[cfg(feature = "camera_v4l")]
      InputWrapper::V4l(input) => input.is_exhausted(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = url::Url::parse("rtsp://camera.local/stream").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch(scheme)) if scheme == "rtsp"
    ));
  }

  #[test]
  fn only_cameras_need_a_device() {
    let url = url::Url::parse("image:///tmp/cat.png").unwrap();
    assert_eq!(InputWrapper::camera_device_of(&url), None);
  }
}
