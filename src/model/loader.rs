// 该文件是 Overlens （叠影） 项目的一部分。
// src/model/loader.rs - 模型后台加载与状态
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
  panic::{self, AssertUnwindSafe},
  sync::{Arc, PoisonError, RwLock},
  thread,
  time::Instant,
};

use thiserror::Error;
use tracing::{error, info};

/// 模型生命周期：NotLoaded → Loading → Ready。Ready 之后不会回退。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
  NotLoaded,
  Loading,
  Ready,
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型状态为 {0:?}，不能开始加载")]
  AlreadyStarted(ModelState),
  #[error("模型加载失败: {0}")]
  LoadFailed(String),
  #[error("加载线程异常退出")]
  LoaderPanicked,
  #[error("无法创建加载线程: {0}")]
  Spawn(std::io::Error),
}

enum Slot<M> {
  NotLoaded,
  Loading,
  Ready(Arc<M>),
}

/// 模型状态单元：只有加载方写入，调度器等读取方可以随时查看。
pub struct ModelCell<M> {
  slot: Arc<RwLock<Slot<M>>>,
}

impl<M> Clone for ModelCell<M> {
  fn clone(&self) -> Self {
    Self {
      slot: Arc::clone(&self.slot),
    }
  }
}

impl<M> Default for ModelCell<M> {
  fn default() -> Self {
    Self::new()
  }
}

impl<M> ModelCell<M> {
  pub fn new() -> Self {
    Self {
      slot: Arc::new(RwLock::new(Slot::NotLoaded)),
    }
  }

  /// 直接以已加载的模型构造
  pub fn ready(model: M) -> Self {
    Self {
      slot: Arc::new(RwLock::new(Slot::Ready(Arc::new(model)))),
    }
  }

  pub fn state(&self) -> ModelState {
    match &*self.slot.read().unwrap_or_else(PoisonError::into_inner) {
      Slot::NotLoaded => ModelState::NotLoaded,
      Slot::Loading => ModelState::Loading,
      Slot::Ready(_) => ModelState::Ready,
    }
  }

  pub fn is_ready(&self) -> bool {
    self.state() == ModelState::Ready
  }

  /// 已加载的模型，未就绪时为 None
  pub fn get(&self) -> Option<Arc<M>> {
    match &*self.slot.read().unwrap_or_else(PoisonError::into_inner) {
      Slot::Ready(model) => Some(Arc::clone(model)),
      _ => None,
    }
  }

  fn begin_loading(&self) -> Result<(), ModelError> {
    let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
    match &*slot {
      Slot::NotLoaded => {
        *slot = Slot::Loading;
        Ok(())
      }
      Slot::Loading => Err(ModelError::AlreadyStarted(ModelState::Loading)),
      Slot::Ready(_) => Err(ModelError::AlreadyStarted(ModelState::Ready)),
    }
  }

  fn publish(&self, model: M) {
    let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
    if matches!(&*slot, Slot::Loading) {
      *slot = Slot::Ready(Arc::new(model));
    }
  }

  fn revert(&self) {
    let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
    if matches!(&*slot, Slot::Loading) {
      *slot = Slot::NotLoaded;
    }
  }
}

/// 后台加载句柄
pub struct LoadHandle {
  join: thread::JoinHandle<Result<(), ModelError>>,
}

impl LoadHandle {
  pub fn is_finished(&self) -> bool {
    self.join.is_finished()
  }

  /// 等待加载结束
  pub fn wait(self) -> Result<(), ModelError> {
    self.join.join().map_err(|_| ModelError::LoaderPanicked)?
  }
}

/// 在后台线程中加载模型，完成后写入 `cell`。
/// 失败（包括加载函数 panic）时状态回到 NotLoaded，以便重试。
pub fn load_in_background<M, E, L>(cell: &ModelCell<M>, loader: L) -> Result<LoadHandle, ModelError>
where
  M: Send + Sync + 'static,
  E: std::fmt::Display,
  L: FnOnce() -> Result<M, E> + Send + 'static,
{
  cell.begin_loading()?;
  let target = cell.clone();

  let spawned = thread::Builder::new()
    .name("model-loader".to_string())
    .spawn(move || {
      info!("开始加载模型...");
      let now = Instant::now();
      match panic::catch_unwind(AssertUnwindSafe(loader)) {
        Ok(Ok(model)) => {
          target.publish(model);
          info!("模型加载完成，耗时: {:.2?}", now.elapsed());
          Ok(())
        }
        Ok(Err(e)) => {
          target.revert();
          error!("模型加载失败: {}", e);
          Err(ModelError::LoadFailed(e.to_string()))
        }
        Err(_) => {
          target.revert();
          error!("模型加载函数 panic");
          Err(ModelError::LoaderPanicked)
        }
      }
    });

  match spawned {
    Ok(join) => Ok(LoadHandle { join }),
    Err(e) => {
      cell.revert();
      Err(ModelError::Spawn(e))
    }
  }
}
