// 该文件是 Overlens （叠影） 项目的一部分。
// src/input/v4l_input.rs - V4L2 摄像头输入
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
  pin::Pin,
  time::Instant,
};

use image::RgbImage;
use thiserror::Error;
use tracing::{error, info};
use url::Url;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame, input::FrameSource, url_file_path};

const DEFAULT_DEVICE: &str = "/dev/video0";
const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const CAPTURE_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum V4lInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Unsupported pixel format: {0}")]
  UnsupportedPixelFormat(String),
}

/// V4L2 摄像头输入：`v4l:///dev/video0`
///
/// v4l 的 Stream 需要引用 Device，Device 用 Pin<Box> 固定在堆上，
/// Stream 在 Drop 中先于 Device 释放。
pub struct V4lInput {
  device_path: PathBuf,
  device: Pin<Box<Device>>,
  stream: Option<Stream<'static>>,
  fourcc: FourCC,
  width: u32,
  height: u32,
  input_size: Option<(u32, u32)>,
  frame_index: u64,
  start_time: Instant,
}

impl FromUrlWithScheme for V4lInput {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lInput {
  type Error = V4lInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lInputError::SchemaMismatch);
    }

    Self::open(Self::device_path_of(url))
  }
}

impl V4lInput {
  /// URL 中的设备节点，缺省为 /dev/video0
  pub fn device_path_of(url: &Url) -> PathBuf {
    if url.path().is_empty() || url.path() == "/" {
      PathBuf::from(DEFAULT_DEVICE)
    } else {
      url_file_path(url)
    }
  }

  pub fn open(device_path: PathBuf) -> Result<Self, V4lInputError> {
    let device = Box::pin(Device::with_path(&device_path)?);

    // 优先 RGB24，设备不支持时退回 YUYV
    let mut format = device.format()?;
    format.width = CAPTURE_WIDTH;
    format.height = CAPTURE_HEIGHT;
    format.fourcc = FourCC::new(b"RGB3");
    let mut format = device.set_format(&format)?;
    if format.fourcc != FourCC::new(b"RGB3") {
      format.fourcc = FourCC::new(b"YUYV");
      format = device.set_format(&format)?;
    }
    let fourcc = format.fourcc;
    if fourcc != FourCC::new(b"RGB3") && fourcc != FourCC::new(b"YUYV") {
      return Err(V4lInputError::UnsupportedPixelFormat(fourcc.to_string()));
    }
    info!(
      "打开摄像头 {}: {}x{} {}",
      device_path.display(),
      format.width,
      format.height,
      fourcc
    );

    let mut input = Self {
      device_path,
      device,
      stream: None,
      fourcc,
      width: format.width,
      height: format.height,
      input_size: None,
      frame_index: 0,
      start_time: Instant::now(),
    };

    // SAFETY: device 被 Pin<Box> 固定，不会移动；stream 在 Drop 中先于 device 释放
    let device_ref: &Device = &input.device;
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, CAPTURE_BUFFERS)?
    };
    input.stream = Some(stream);
    Ok(input)
  }

  pub fn with_input_size(mut self, size: (u32, u32)) -> Self {
    self.input_size = Some(size);
    self
  }

  pub fn device_path(&self) -> &Path {
    &self.device_path
  }

  fn to_rgb(&self, buffer: &[u8]) -> Option<RgbImage> {
    let expected = (self.width * self.height) as usize;
    if self.fourcc == FourCC::new(b"RGB3") {
      if buffer.len() < expected * 3 {
        return None;
      }
      RgbImage::from_raw(self.width, self.height, buffer[..expected * 3].to_vec())
    } else {
      if buffer.len() < expected * 2 {
        return None;
      }
      RgbImage::from_raw(self.width, self.height, yuyv_to_rgb(&buffer[..expected * 2]))
    }
  }
}

/// 将 YUYV 格式转换为 RGB
fn yuyv_to_rgb(yuyv: &[u8]) -> Vec<u8> {
  let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);

  for chunk in yuyv.chunks_exact(4) {
    let y0 = chunk[0] as f32;
    let u = chunk[1] as f32 - 128.0;
    let y1 = chunk[2] as f32;
    let v = chunk[3] as f32 - 128.0;

    for y in [y0, y1] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  rgb
}

impl Drop for V4lInput {
  fn drop(&mut self) {
    // stream 必须在 device 之前释放
    self.stream.take();
  }
}

impl FrameSource for V4lInput {
  type Frame = RgbFrame;

  fn next_frame(&mut self) -> Option<Self::Frame> {
    let stream = self.stream.as_mut()?;
    let buffer = match stream.next() {
      Ok((buffer, _meta)) => buffer.to_vec(),
      Err(e) => {
        error!("无法捕获帧: {}", e);
        return None;
      }
    };

    let Some(image) = self.to_rgb(&buffer) else {
      error!("捕获的缓冲区大小不匹配: {}", buffer.len());
      return None;
    };

    let size = self.input_size.unwrap_or((self.width, self.height));
    let timestamp_ms = self.start_time.elapsed().as_millis() as u64;
    let frame = RgbFrame::resized(&image, size, self.frame_index, timestamp_ms);
    self.frame_index += 1;
    Some(frame)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yuyv_gray_maps_to_gray() {
    let rgb = yuyv_to_rgb(&[128, 128, 64, 128]);
    assert_eq!(rgb, vec![128, 128, 128, 64, 64, 64]);
  }

  #[test]
  fn device_defaults_to_first_camera() {
    let url = Url::parse("v4l:///").unwrap();
    assert_eq!(V4lInput::device_path_of(&url), PathBuf::from("/dev/video0"));
    let url = Url::parse("v4l:///dev/video2").unwrap();
    assert_eq!(V4lInput::device_path_of(&url), PathBuf::from("/dev/video2"));
  }
}
