// 该文件是 Overlens （叠影） 项目的一部分。
// src/task.rs - 推理调度
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

//! 推理调度器。
//!
//! 调度线程拥有帧来源、叠加层和输出；推理在单独的工作线程中进行，
//! 结果通过通道送回调度线程处理。同一时刻最多只有一个推理在进行，
//! 上一个推理未完成时本次调度不拉取新帧。每一帧在推理完成（成功、失败或被丢弃）后
//! 释放且只释放一次。

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::{self, RecvTimeoutError, TryRecvError},
  },
  thread,
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  config::SchedulerConfig,
  frame::Frame,
  input::FrameSource,
  model::{Detection, ModelCell, PerceptionModel},
  output::{
    Render,
    overlay::OverlayRenderer,
    surface::DisplaySurface,
  },
};

/// 模型未就绪时显示的提示
pub const WAITING_NOTICE: &str = "正在初始化模型和摄像头...";

// 等待期间检查停止标志的间隔
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum SchedulerError {
  #[error("无法创建线程: {0}")]
  Spawn(std::io::Error),
  #[error("调度线程异常退出")]
  Panicked,
}

/// 可跨线程共享的停止标志
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn stop(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_stopped(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

/// 单次调度的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
  Stopped,
  ModelNotReady,
  /// 上一个推理尚未完成，本次不拉取
  InferenceBusy,
  NoFrame,
  /// 达到帧数上限，不再拉取
  LimitReached,
  Dispatched,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
  pub ticks: u64,
  pub dispatched: u64,
  pub rendered: u64,
  pub failed: u64,
  pub discarded: u64,
  pub skipped_not_ready: u64,
  pub skipped_busy: u64,
  pub no_frame: u64,
}

struct Job<M, F> {
  model: Arc<M>,
  frame: F,
}

struct Completion<F, E> {
  frame: F,
  result: Result<Vec<Detection>, E>,
  elapsed: Duration,
}

fn spawn_worker<M, F>(
  jobs: mpsc::Receiver<Job<M, F>>,
  done: mpsc::Sender<Completion<F, M::Error>>,
) -> Result<thread::JoinHandle<()>, SchedulerError>
where
  M: PerceptionModel<Frame = F>,
  F: Send + 'static,
{
  thread::Builder::new()
    .name("inference".to_string())
    .spawn(move || {
      for Job { model, frame } in jobs {
        let now = Instant::now();
        let result = model.infer(&frame);
        let completion = Completion {
          frame,
          result,
          elapsed: now.elapsed(),
        };
        // 调度器已经不在了，帧随 completion 一起释放
        if done.send(completion).is_err() {
          break;
        }
      }
      debug!("推理线程退出");
    })
    .map_err(SchedulerError::Spawn)
}

pub struct InferenceScheduler<S, M, D, O>
where
  S: FrameSource,
  M: PerceptionModel<Frame = S::Frame>,
{
  source: S,
  model: ModelCell<M>,
  renderer: OverlayRenderer<D>,
  output: O,
  config: SchedulerConfig,
  stop: StopSignal,
  jobs: mpsc::Sender<Job<M, S::Frame>>,
  completions: mpsc::Receiver<Completion<S::Frame, M::Error>>,
  _worker: thread::JoinHandle<()>,
  in_flight: bool,
  worker_lost: bool,
  notice_drawn: bool,
  frame_limit: Option<u64>,
  stats: SchedulerStats,
}

impl<S, M, D, O> InferenceScheduler<S, M, D, O>
where
  S: FrameSource,
  S::Frame: Send + 'static,
  M: PerceptionModel<Frame = S::Frame>,
  D: DisplaySurface,
  O: Render<S::Frame, D>,
  O::Error: std::fmt::Display,
{
  pub fn new(
    source: S,
    model: ModelCell<M>,
    renderer: OverlayRenderer<D>,
    output: O,
    config: SchedulerConfig,
  ) -> Result<Self, SchedulerError> {
    let (jobs, job_rx) = mpsc::channel();
    let (done_tx, completions) = mpsc::channel();
    let worker = spawn_worker::<M, S::Frame>(job_rx, done_tx)?;

    Ok(Self {
      source,
      model,
      renderer,
      output,
      config,
      stop: StopSignal::new(),
      jobs,
      completions,
      _worker: worker,
      in_flight: false,
      worker_lost: false,
      notice_drawn: false,
      frame_limit: None,
      stats: SchedulerStats::default(),
    })
  }

  /// 最多分发多少帧
  pub fn with_frame_limit(mut self, limit: Option<u64>) -> Self {
    self.frame_limit = limit;
    self
  }

  pub fn stop_signal(&self) -> StopSignal {
    self.stop.clone()
  }

  pub fn stop(&self) {
    self.stop.stop();
  }

  pub fn stats(&self) -> SchedulerStats {
    self.stats
  }

  pub fn is_in_flight(&self) -> bool {
    self.in_flight
  }

  pub fn renderer(&self) -> &OverlayRenderer<D> {
    &self.renderer
  }

  pub fn renderer_mut(&mut self) -> &mut OverlayRenderer<D> {
    &mut self.renderer
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  pub fn output(&self) -> &O {
    &self.output
  }

  pub fn model_cell(&self) -> &ModelCell<M> {
    &self.model
  }

  fn limit_reached(&self) -> bool {
    self
      .frame_limit
      .is_some_and(|limit| self.stats.dispatched >= limit)
  }

  /// 不会再有新的工作：来源耗尽或达到上限，并且没有推理在进行
  pub fn is_finished(&self) -> bool {
    !self.in_flight && (self.source.is_exhausted() || self.limit_reached())
  }

  /// 一次调度
  pub fn tick(&mut self) -> TickOutcome {
    self.stats.ticks += 1;
    self.service_completions();

    if self.stop.is_stopped() {
      return TickOutcome::Stopped;
    }

    let Some(model) = self.model.get() else {
      self.stats.skipped_not_ready += 1;
      if !self.notice_drawn {
        self.show_notice(WAITING_NOTICE);
      }
      return TickOutcome::ModelNotReady;
    };

    if self.in_flight {
      self.stats.skipped_busy += 1;
      return TickOutcome::InferenceBusy;
    }

    if self.limit_reached() {
      return TickOutcome::LimitReached;
    }

    let Some(frame) = self.source.next_frame() else {
      self.stats.no_frame += 1;
      return TickOutcome::NoFrame;
    };

    if self.worker_lost || self.jobs.send(Job { model, frame }).is_err() {
      // 工作线程已退出，帧随失败的任务一起释放
      error!("推理线程不可用，停止调度");
      self.stats.failed += 1;
      self.stop.stop();
      return TickOutcome::Stopped;
    }

    self.in_flight = true;
    self.stats.dispatched += 1;
    debug!("分发第 {} 帧", self.stats.dispatched);
    TickOutcome::Dispatched
  }

  /// 在表面上绘制提示并交给输出
  fn show_notice(&mut self, text: &str) {
    if !self.renderer.draw_notice(text) {
      return;
    }
    self.notice_drawn = true;
    if let Some(surface) = self.renderer.surface()
      && let Err(e) = Render::<S::Frame, D>::render_notice(&self.output, surface)
    {
      warn!("输出等待提示失败: {}", e);
    }
  }

  fn service_completions(&mut self) {
    loop {
      match self.completions.try_recv() {
        Ok(completion) => self.handle_completion(completion),
        Err(TryRecvError::Empty) => break,
        Err(TryRecvError::Disconnected) => {
          self.on_worker_lost();
          break;
        }
      }
    }
  }

  fn on_worker_lost(&mut self) {
    if self.worker_lost {
      return;
    }
    self.worker_lost = true;
    if self.in_flight {
      // 帧已在工作线程退出时释放
      self.in_flight = false;
      self.stats.failed += 1;
    }
    error!("推理线程异常退出");
  }

  fn handle_completion(&mut self, completion: Completion<S::Frame, M::Error>) {
    self.in_flight = false;
    let Completion {
      frame,
      result,
      elapsed,
    } = completion;

    if self.stop.is_stopped() {
      debug!("调度已停止，丢弃推理结果");
      self.stats.discarded += 1;
      return;
    }

    match result {
      Ok(detections) => {
        debug!("推理完成，耗时: {:.2?}，{} 个结果", elapsed, detections.len());
        let drawn = self.renderer.draw(
          &detections,
          frame.width(),
          frame.height(),
          self.config.mirror,
        );
        if drawn.is_some()
          && let Some(surface) = self.renderer.surface()
        {
          if let Err(e) = self.output.render_result(&frame, surface, &detections) {
            warn!("输出失败: {}", e);
          }
          self.stats.rendered += 1;
        }
      }
      Err(e) => {
        error!("推理失败: {}", e);
        self.stats.failed += 1;
      }
    }
  }

  fn wait_for_next_tick(&mut self, interval: Duration) {
    let deadline = Instant::now() + interval;
    loop {
      if self.stop.is_stopped() {
        return;
      }
      let now = Instant::now();
      if now >= deadline {
        return;
      }
      let timeout = (deadline - now).min(STOP_POLL_INTERVAL);
      match self.completions.recv_timeout(timeout) {
        Ok(completion) => self.handle_completion(completion),
        Err(RecvTimeoutError::Timeout) => {}
        Err(RecvTimeoutError::Disconnected) => {
          self.on_worker_lost();
          thread::sleep(timeout);
        }
      }
    }
  }

  /// 等待进行中的推理完成并处理其结果；超时返回 false
  pub fn settle(&mut self, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while self.in_flight {
      let now = Instant::now();
      if now >= deadline {
        return false;
      }
      match self.completions.recv_timeout(deadline - now) {
        Ok(completion) => self.handle_completion(completion),
        Err(RecvTimeoutError::Timeout) => return false,
        Err(RecvTimeoutError::Disconnected) => self.on_worker_lost(),
      }
    }
    true
  }

  /// 调度循环，直到停止或没有更多工作。两次调度之间至少间隔 1000 / fps 毫秒。
  pub fn run(&mut self) -> SchedulerStats {
    let interval = self.config.tick_interval();
    info!(
      "开始调度，目标帧率 {} FPS，间隔 {:.2?}",
      self.config.target_fps, interval
    );

    loop {
      if self.tick() == TickOutcome::Stopped {
        info!("收到停止信号，退出调度循环");
        break;
      }
      if self.is_finished() {
        info!("没有更多的帧，退出调度循环");
        break;
      }
      self.wait_for_next_tick(interval);
    }

    info!("调度结束: {:?}", self.stats);
    self.stats
  }

  /// 在单独的线程中运行调度循环
  pub fn start(self) -> Result<SchedulerHandle<Self>, SchedulerError>
  where
    Self: Send + 'static,
  {
    let stop = self.stop_signal();
    let join = thread::Builder::new()
      .name("scheduler".to_string())
      .spawn(move || {
        let mut scheduler = self;
        scheduler.run();
        scheduler
      })
      .map_err(SchedulerError::Spawn)?;
    Ok(SchedulerHandle { stop, join })
  }
}

/// 后台调度句柄
pub struct SchedulerHandle<T> {
  stop: StopSignal,
  join: thread::JoinHandle<T>,
}

impl<T> SchedulerHandle<T> {
  /// 停止调度；之后到达的推理结果不会被绘制
  pub fn stop(&self) {
    self.stop.stop();
  }

  pub fn stop_signal(&self) -> StopSignal {
    self.stop.clone()
  }

  pub fn is_finished(&self) -> bool {
    self.join.is_finished()
  }

  pub fn join(self) -> Result<T, SchedulerError> {
    self.join.join().map_err(|_| SchedulerError::Panicked)
  }
}
