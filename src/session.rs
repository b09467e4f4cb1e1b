// 该文件是 Overlens （叠影） 项目的一部分。
// src/session.rs - 摄像头会话
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

use thiserror::Error;
use tracing::{error, info};

use crate::{
  model::{LoadHandle, ModelCell, ModelError, ModelState, load_in_background},
  permission::{CameraPermission, PermissionError, PermissionGate},
  task::StopSignal,
};

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("摄像头权限被拒绝")]
  PermissionDenied,
  #[error("权限检查失败: {0}")]
  Permission(#[from] PermissionError),
  #[error("模型错误: {0}")]
  Model(#[from] ModelError),
  #[error("没有正在进行的模型加载")]
  NotLoading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
  AwaitingPermission,
  PermissionDenied,
  LoadingModel,
  Running,
  Stopped,
}

/// 权限 → 模型加载 → 调度。权限未授予时什么都不会启动。
pub struct CameraSession<G, M> {
  permission: CameraPermission<G>,
  cell: ModelCell<M>,
  load: Option<LoadHandle>,
  stop: StopSignal,
}

impl<G, M> CameraSession<G, M>
where
  G: PermissionGate<Error = PermissionError>,
  M: Send + Sync + 'static,
{
  pub fn new(gate: G, cell: ModelCell<M>) -> Self {
    Self {
      permission: CameraPermission::new(gate),
      cell,
      load: None,
      stop: StopSignal::new(),
    }
  }

  /// 请求权限并开始后台加载模型
  pub fn open<E, L>(gate: G, cell: ModelCell<M>, loader: L) -> Result<Self, SessionError>
  where
    E: std::fmt::Display,
    L: FnOnce() -> Result<M, E> + Send + 'static,
  {
    let mut session = Self::new(gate, cell);
    session.start_loading(loader)?;
    Ok(session)
  }

  pub fn request_permission(&self) -> Result<(), SessionError> {
    match self.permission.request() {
      Ok(true) => Ok(()),
      Ok(false) => {
        error!("摄像头权限被拒绝，会话不会启动");
        Err(SessionError::PermissionDenied)
      }
      Err(e) => {
        error!("权限检查失败: {}", e);
        Err(SessionError::Permission(e))
      }
    }
  }

  /// 权限通过后才会开始加载；加载失败后可以再次调用
  pub fn start_loading<E, L>(&mut self, loader: L) -> Result<(), SessionError>
  where
    E: std::fmt::Display,
    L: FnOnce() -> Result<M, E> + Send + 'static,
  {
    self.request_permission()?;
    info!("开始加载模型");
    self.load = Some(load_in_background(&self.cell, loader)?);
    Ok(())
  }

  /// 等待后台加载结束
  pub fn wait_for_model(&mut self) -> Result<(), SessionError> {
    let handle = self.load.take().ok_or(SessionError::NotLoading)?;
    handle.wait()?;
    Ok(())
  }

  pub fn model_cell(&self) -> &ModelCell<M> {
    &self.cell
  }

  /// 与调度器共享的停止标志
  pub fn stop_signal(&self) -> StopSignal {
    self.stop.clone()
  }

  pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
    self.stop = stop;
    self
  }

  pub fn status(&self) -> SessionStatus {
    match self.permission.is_granted() {
      None => SessionStatus::AwaitingPermission,
      Some(false) => SessionStatus::PermissionDenied,
      Some(true) if self.stop.is_stopped() => SessionStatus::Stopped,
      Some(true) => match self.cell.state() {
        ModelState::Ready => SessionStatus::Running,
        ModelState::NotLoaded | ModelState::Loading => SessionStatus::LoadingModel,
      },
    }
  }
}
