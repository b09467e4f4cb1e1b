// 该文件是 Overlens （叠影） 项目的一部分。
// src/model.rs - 模型与检测结果
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

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ModelKind;

/// 预训练感知模型。推理可能失败，失败只影响当前帧。
pub trait PerceptionModel: Send + Sync + 'static {
  type Frame;
  type Error: std::error::Error + Send + 'static;

  fn infer(&self, frame: &Self::Frame) -> Result<Vec<Detection>, Self::Error>;
}

#[derive(Error, Debug, PartialEq)]
pub enum DetectionError {
  #[error("骨架连接 ({0}, {1}) 超出关键点数量 {2}")]
  TopologyOutOfRange(usize, usize, usize),
}

/// 帧像素坐标下的边界框
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl BBox {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn area(&self) -> f32 {
    self.width.max(0.0) * self.height.max(0.0)
  }

  /// 计算两个边界框的 IoU
  pub fn iou(&self, other: &BBox) -> f32 {
    let x1 = self.x.max(other.x);
    let y1 = self.y.max(other.y);
    let x2 = (self.x + self.width).min(other.x + other.width);
    let y2 = (self.y + self.height).min(other.y + other.height);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = self.area() + other.area() - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }

  pub fn scaled(&self, sx: f32, sy: f32) -> Self {
    Self::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxDetection {
  pub label: String,
  pub score: f32,
  pub bbox: BBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
  pub x: f32,
  pub y: f32,
}

impl Point {
  pub fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }
}

/// 21 个手部关键点的连接关系：掌根到五指，每根手指四节
pub const HAND_SKELETON: [(usize, usize); 20] = [
  (0, 1),
  (1, 2),
  (2, 3),
  (3, 4),
  (0, 5),
  (5, 6),
  (6, 7),
  (7, 8),
  (0, 9),
  (9, 10),
  (10, 11),
  (11, 12),
  (0, 13),
  (13, 14),
  (14, 15),
  (15, 16),
  (0, 17),
  (17, 18),
  (18, 19),
  (19, 20),
];

pub const HAND_LANDMARKS: usize = 21;

/// 骨架拓扑
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
  Hand,
  Pairs(Vec<(usize, usize)>),
}

impl Topology {
  pub fn pairs(&self) -> &[(usize, usize)] {
    match self {
      Topology::Hand => &HAND_SKELETON,
      Topology::Pairs(pairs) => pairs,
    }
  }
}

#[derive(Deserialize)]
struct RawLandmarks {
  points: Vec<Point>,
  topology: Topology,
  #[serde(default = "full_score")]
  score: f32,
}

fn full_score() -> f32 {
  1.0
}

/// 一组关键点和它们的连接关系。构造时保证所有连接的下标都小于关键点数量。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLandmarks")]
pub struct LandmarkDetection {
  points: Vec<Point>,
  topology: Topology,
  score: f32,
}

impl TryFrom<RawLandmarks> for LandmarkDetection {
  type Error = DetectionError;

  fn try_from(raw: RawLandmarks) -> Result<Self, Self::Error> {
    LandmarkDetection::new(raw.points, raw.topology, raw.score)
  }
}

impl LandmarkDetection {
  pub fn new(points: Vec<Point>, topology: Topology, score: f32) -> Result<Self, DetectionError> {
    let n = points.len();
    if let Some(&(a, b)) = topology.pairs().iter().find(|(a, b)| *a >= n || *b >= n) {
      return Err(DetectionError::TopologyOutOfRange(a, b, n));
    }
    Ok(Self {
      points,
      topology,
      score,
    })
  }

  pub fn hand(points: Vec<Point>, score: f32) -> Result<Self, DetectionError> {
    Self::new(points, Topology::Hand, score)
  }

  pub fn points(&self) -> &[Point] {
    &self.points
  }

  pub fn topology(&self) -> &Topology {
    &self.topology
  }

  pub fn score(&self) -> f32 {
    self.score
  }

  /// 缩放坐标，拓扑不变
  pub fn scaled(&self, sx: f32, sy: f32) -> Self {
    Self {
      points: self
        .points
        .iter()
        .map(|p| Point::new(p.x * sx, p.y * sy))
        .collect(),
      topology: self.topology.clone(),
      score: self.score,
    }
  }
}

/// 模型的一个输出项，坐标均在源帧像素空间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Detection {
  Box(BoxDetection),
  Landmarks(LandmarkDetection),
}

impl Detection {
  pub fn bbox(label: impl Into<String>, score: f32, bbox: BBox) -> Self {
    Detection::Box(BoxDetection {
      label: label.into(),
      score,
      bbox,
    })
  }

  pub fn kind(&self) -> ModelKind {
    match self {
      Detection::Box(_) => ModelKind::BoundingBox,
      Detection::Landmarks(_) => ModelKind::Landmark,
    }
  }

  pub fn score(&self) -> f32 {
    match self {
      Detection::Box(b) => b.score,
      Detection::Landmarks(l) => l.score,
    }
  }

  pub fn scaled(&self, sx: f32, sy: f32) -> Self {
    match self {
      Detection::Box(b) => Detection::Box(BoxDetection {
        label: b.label.clone(),
        score: b.score,
        bbox: b.bbox.scaled(sx, sy),
      }),
      Detection::Landmarks(l) => Detection::Landmarks(l.scaled(sx, sy)),
    }
  }
}

mod loader;
mod postprocess;
pub use self::loader::{LoadHandle, ModelCell, ModelError, ModelState, load_in_background};
pub use self::postprocess::postprocess;

#[cfg(feature = "model_replay")]
mod replay;
#[cfg(feature = "model_replay")]
pub use self::replay::{ReplayError, ReplayModel, ReplayModelBuilder, ReplayRecord};
