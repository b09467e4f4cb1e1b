// 该文件是 Overlens （叠影） 项目的一部分。
// src/model/postprocess.rs - 检测结果后处理
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

use std::cmp::Ordering;

use tracing::debug;

use crate::{
  config::ModelConfig,
  model::{BoxDetection, Detection},
};

/// 按模型配置过滤检测结果：
/// 边界框做置信度过滤、同类 NMS、数量截断；关键点按检测置信度过滤。
pub fn postprocess(detections: Vec<Detection>, config: &ModelConfig) -> Vec<Detection> {
  let mut boxes = Vec::new();
  let mut landmarks = Vec::new();

  for detection in detections {
    match detection {
      Detection::Box(b) if b.score >= config.score_threshold => boxes.push(b),
      Detection::Landmarks(l) if l.score() >= config.detection_confidence => {
        landmarks.push(Detection::Landmarks(l))
      }
      _ => {}
    }
  }

  let mut boxes = nms(boxes, config.iou_threshold);
  boxes.truncate(config.max_boxes);
  debug!(
    "后处理保留 {} 个边界框, {} 组关键点",
    boxes.len(),
    landmarks.len()
  );

  boxes
    .into_iter()
    .map(Detection::Box)
    .chain(landmarks)
    .collect()
}

/// 非极大值抑制
fn nms(mut detections: Vec<BoxDetection>, iou_threshold: f32) -> Vec<BoxDetection> {
  // 按置信度降序排序
  detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

  let mut result: Vec<BoxDetection> = Vec::new();
  for det in detections {
    let suppressed = result
      .iter()
      .any(|kept| kept.label == det.label && kept.bbox.iou(&det.bbox) >= iou_threshold);
    if !suppressed {
      result.push(det);
    }
  }
  result
}
