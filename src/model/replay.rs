// 该文件是 Overlens （叠影） 项目的一部分。
// src/model/replay.rs - 回放模型
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

//! 按帧回放预先录制的模型输出。
//!
//! 录制文件为 JSON Lines，每行一帧：
//!
//! ```text
//! {"width":300,"height":300,"detections":[{"kind":"box","label":"cat","score":0.9,"bbox":{"x":10,"y":20,"width":30,"height":40}}]}
//! {"fail":"inference timeout"}
//! ```
//!
//! 坐标从录制时的帧尺寸换算到实际帧尺寸，再按 [`ModelConfig`] 做后处理。

use std::{
  marker::PhantomData,
  path::{Path, PathBuf},
  sync::atomic::{AtomicUsize, Ordering},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::ModelConfig,
  frame::Frame,
  model::{Detection, PerceptionModel, postprocess},
  url_file_path,
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {line} 行解析失败: {source}")]
  Parse {
    line: usize,
    source: serde_json::Error,
  },
  #[error("录制文件为空: {0}")]
  Empty(PathBuf),
  #[error("第 {line} 行的检测类型与模型类型 {expected:?} 不符")]
  KindMismatch {
    line: usize,
    expected: crate::config::ModelKind,
  },
  #[error("第 {0} 行的帧尺寸无效")]
  InvalidRecordSize(usize),
  #[error("输入帧尺寸无效: {0}x{1}")]
  InvalidFrame(u32, u32),
  #[error("录制的推理失败: {0}")]
  RecordedFailure(String),
}

/// 一帧录制结果
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReplayRecord {
  Frame {
    width: u32,
    height: u32,
    #[serde(default)]
    detections: Vec<Detection>,
  },
  Failure {
    fail: String,
  },
}

pub struct ReplayModelBuilder {
  path: PathBuf,
  config: ModelConfig,
}

impl FromUrlWithScheme for ReplayModelBuilder {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayModelBuilder {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayError::SchemeMismatch(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(Self::new(url_file_path(url)))
  }
}

impl ReplayModelBuilder {
  pub fn new(path: impl AsRef<Path>) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
      config: ModelConfig::object_detector(),
    }
  }

  pub fn config(mut self, config: ModelConfig) -> Self {
    self.config = config;
    self
  }

  pub fn build<F>(self) -> Result<ReplayModel<F>, ReplayError> {
    info!("加载回放文件: {}", self.path.display());
    let text = std::fs::read_to_string(&self.path)?;
    let records = parse_records(&text, &self.config)?;
    if records.is_empty() {
      return Err(ReplayError::Empty(self.path));
    }
    info!("回放文件共 {} 帧", records.len());
    Ok(ReplayModel::new(records, self.config))
  }
}

fn parse_records(text: &str, config: &ModelConfig) -> Result<Vec<ReplayRecord>, ReplayError> {
  let mut records = Vec::new();
  for (index, line) in text.lines().enumerate() {
    let line_no = index + 1;
    if line.trim().is_empty() {
      continue;
    }
    let record: ReplayRecord = serde_json::from_str(line).map_err(|source| ReplayError::Parse {
      line: line_no,
      source,
    })?;
    if let ReplayRecord::Frame {
      width,
      height,
      detections,
    } = &record
    {
      if *width == 0 || *height == 0 {
        return Err(ReplayError::InvalidRecordSize(line_no));
      }
      if detections.iter().any(|d| d.kind() != config.kind) {
        return Err(ReplayError::KindMismatch {
          line: line_no,
          expected: config.kind,
        });
      }
    }
    records.push(record);
  }
  Ok(records)
}

/// 回放模型：每次推理取下一帧录制结果，播完后从头循环
pub struct ReplayModel<F> {
  records: Vec<ReplayRecord>,
  cursor: AtomicUsize,
  config: ModelConfig,
  _phantom: PhantomData<fn(&F)>,
}

impl<F> ReplayModel<F> {
  pub fn new(records: Vec<ReplayRecord>, config: ModelConfig) -> Self {
    Self {
      records,
      cursor: AtomicUsize::new(0),
      config,
      _phantom: PhantomData,
    }
  }

  pub fn config(&self) -> &ModelConfig {
    &self.config
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

impl<F: Frame + 'static> PerceptionModel for ReplayModel<F> {
  type Frame = F;
  type Error = ReplayError;

  fn infer(&self, frame: &Self::Frame) -> Result<Vec<Detection>, Self::Error> {
    let (fw, fh) = (frame.width(), frame.height());
    if fw == 0 || fh == 0 {
      return Err(ReplayError::InvalidFrame(fw, fh));
    }
    if self.records.is_empty() {
      return Ok(Vec::new());
    }

    let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.records.len();
    debug!("回放第 {} 帧录制结果", index);
    match &self.records[index] {
      ReplayRecord::Failure { fail } => Err(ReplayError::RecordedFailure(fail.clone())),
      ReplayRecord::Frame {
        width,
        height,
        detections,
      } => {
        let sx = fw as f32 / *width as f32;
        let sy = fh as f32 / *height as f32;
        let scaled = detections.iter().map(|d| d.scaled(sx, sy)).collect();
        Ok(postprocess(scaled, &self.config))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::ModelKind,
    frame::RgbFrame,
    model::{BBox, Point},
  };
  use image::RgbImage;

  fn frame(w: u32, h: u32) -> RgbFrame {
    RgbFrame::new(RgbImage::new(w, h), 0, 0)
  }

  const RECORDING: &str = r#"
{"width":300,"height":300,"detections":[{"kind":"box","label":"cat","score":0.9,"bbox":{"x":10,"y":20,"width":30,"height":40}}]}
{"fail":"inference timeout"}

{"width":300,"height":300,"detections":[{"kind":"box","label":"cat","score":0.1,"bbox":{"x":0,"y":0,"width":1,"height":1}}]}
"#;

  fn model() -> ReplayModel<RgbFrame> {
    let config = ModelConfig::object_detector();
    ReplayModel::new(parse_records(RECORDING, &config).unwrap(), config)
  }

  #[test]
  fn records_play_back_in_order_and_loop() {
    let model = model();
    assert_eq!(model.len(), 3);

    let first = model.infer(&frame(150, 150)).unwrap();
    // 300 -> 150，坐标减半
    assert_eq!(
      first,
      vec![Detection::bbox("cat", 0.9, BBox::new(5.0, 10.0, 15.0, 20.0))]
    );
    assert!(matches!(
      model.infer(&frame(150, 150)),
      Err(ReplayError::RecordedFailure(reason)) if reason == "inference timeout"
    ));
    // 低于阈值的结果被过滤
    assert!(model.infer(&frame(150, 150)).unwrap().is_empty());
    assert_eq!(model.infer(&frame(300, 300)).unwrap().len(), 1);
  }

  #[test]
  fn zero_sized_frame_is_an_inference_error() {
    assert!(matches!(
      model().infer(&frame(0, 10)),
      Err(ReplayError::InvalidFrame(0, 10))
    ));
  }

  #[test]
  fn kind_mismatch_is_rejected_at_load() {
    let config = ModelConfig::hand_pose();
    assert!(matches!(
      parse_records(RECORDING, &config),
      Err(ReplayError::KindMismatch {
        line: 2,
        expected: ModelKind::Landmark
      })
    ));
  }

  #[test]
  fn landmark_recording_is_scaled() {
    let config = ModelConfig::hand_pose();
    let line = r#"{"width":100,"height":50,"detections":[{"kind":"landmarks","points":[{"x":10,"y":10},{"x":20,"y":30}],"topology":{"pairs":[[0,1]]},"score":0.95}]}"#;
    let model: ReplayModel<RgbFrame> =
      ReplayModel::new(parse_records(line, &config).unwrap(), config);
    let out = model.infer(&frame(200, 100)).unwrap();
    match &out[0] {
      Detection::Landmarks(l) => {
        assert_eq!(l.points(), &[Point::new(20.0, 20.0), Point::new(40.0, 60.0)]);
      }
      other => panic!("unexpected detection {:?}", other),
    }
  }

  #[test]
  fn builder_reads_file_from_url() {
    let dir = std::env::temp_dir().join(format!("overlens-replay-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("cat.jsonl");
    std::fs::write(&path, RECORDING).unwrap();

    let url = Url::parse(&format!("replay://{}", path.display())).unwrap();
    let model: ReplayModel<RgbFrame> = ReplayModelBuilder::from_url(&url).unwrap().build().unwrap();
    assert_eq!(model.len(), 3);

    std::fs::write(&path, "\n\n").unwrap();
    assert!(matches!(
      ReplayModelBuilder::new(&path).build::<RgbFrame>(),
      Err(ReplayError::Empty(_))
    ));

    std::fs::remove_dir_all(&dir).ok();
  }
}
