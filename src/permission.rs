// 该文件是 Overlens （叠影） 项目的一部分。
// src/permission.rs - 摄像头访问权限
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
  fs::OpenOptions,
  io::ErrorKind,
  path::{Path, PathBuf},
  sync::OnceLock,
};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum PermissionError {
  #[error("摄像头设备不存在: {0}")]
  DeviceNotFound(PathBuf),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

pub trait PermissionGate {
  type Error;
  fn request_camera_access(&self) -> Result<bool, Self::Error>;
}

/// 无需权限的来源（图像文件等）
#[derive(Debug, Default, Clone, Copy)]
pub struct GrantedGate;

impl PermissionGate for GrantedGate {
  type Error = PermissionError;

  fn request_camera_access(&self) -> Result<bool, Self::Error> {
    Ok(true)
  }
}

/// 检查当前用户是否可以读写摄像头设备节点
#[derive(Debug, Clone)]
pub struct DeviceAccessGate {
  device: PathBuf,
}

impl DeviceAccessGate {
  pub fn new(device: impl AsRef<Path>) -> Self {
    Self {
      device: device.as_ref().to_path_buf(),
    }
  }
}

impl PermissionGate for DeviceAccessGate {
  type Error = PermissionError;

  fn request_camera_access(&self) -> Result<bool, Self::Error> {
    match OpenOptions::new().read(true).write(true).open(&self.device) {
      Ok(_) => Ok(true),
      Err(e) if e.kind() == ErrorKind::PermissionDenied => {
        warn!("无权访问摄像头设备: {}", self.device.display());
        Ok(false)
      }
      Err(e) if e.kind() == ErrorKind::NotFound => {
        Err(PermissionError::DeviceNotFound(self.device.clone()))
      }
      Err(e) => Err(PermissionError::IoError(e)),
    }
  }
}

/// 按输入来源选择权限检查：摄像头设备检查设备节点，其他来源直接通过
#[derive(Debug, Clone)]
pub enum SourceGate {
  Granted(GrantedGate),
  Device(DeviceAccessGate),
}

impl SourceGate {
  pub fn for_device(device: Option<&Path>) -> Self {
    match device {
      Some(path) => SourceGate::Device(DeviceAccessGate::new(path)),
      None => SourceGate::Granted(GrantedGate),
    }
  }
}

impl PermissionGate for SourceGate {
  type Error = PermissionError;

  fn request_camera_access(&self) -> Result<bool, Self::Error> {
    match self {
      SourceGate::Granted(gate) => gate.request_camera_access(),
      SourceGate::Device(gate) => gate.request_camera_access(),
    }
  }
}

/// 只询问一次，并记住结果
pub struct CameraPermission<G> {
  gate: G,
  granted: OnceLock<bool>,
}

impl<G: PermissionGate> CameraPermission<G> {
  pub fn new(gate: G) -> Self {
    Self {
      gate,
      granted: OnceLock::new(),
    }
  }

  pub fn request(&self) -> Result<bool, G::Error> {
    if let Some(granted) = self.granted.get() {
      return Ok(*granted);
    }
    let granted = self.gate.request_camera_access()?;
    info!("摄像头权限: {}", if granted { "已授权" } else { "被拒绝" });
    Ok(*self.granted.get_or_init(|| granted))
  }

  /// 尚未询问时为 None
  pub fn is_granted(&self) -> Option<bool> {
    self.granted.get().copied()
  }
}
