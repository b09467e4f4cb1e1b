// 该文件是 Overlens （叠影） 项目的一部分。
// src/output/overlay.rs - 检测结果叠加层绘制
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

use image::Rgba;
use tracing::{debug, warn};

use crate::{
  model::{BBox, BoxDetection, Detection, LandmarkDetection, Point},
  output::surface::{
    Color, DisplayPoint, DisplayRect, DisplaySurface, FontStyle, StrokeStyle,
  },
};

// 标签绘制常量
const LABEL_HEIGHT: f32 = 24.0;
const LABEL_PADDING: f32 = 10.0;
const LABEL_TEXT_OFFSET_X: f32 = 5.0;
const LABEL_TEXT_OFFSET_Y: f32 = 5.0;

const NOTICE_FONT_SIZE: f32 = 18.0;

/// 帧坐标到显示坐标的变换，每次绘制时重新计算
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayTransform {
  pub scale_x: f32,
  pub scale_y: f32,
  pub display_width: f32,
  pub mirror: bool,
}

impl DisplayTransform {
  /// 任一尺寸为 0 时无法变换
  pub fn new(
    frame_width: u32,
    frame_height: u32,
    display_width: u32,
    display_height: u32,
    mirror: bool,
  ) -> Option<Self> {
    if frame_width == 0 || frame_height == 0 || display_width == 0 || display_height == 0 {
      return None;
    }
    Some(Self {
      scale_x: display_width as f32 / frame_width as f32,
      scale_y: display_height as f32 / frame_height as f32,
      display_width: display_width as f32,
      mirror,
    })
  }

  /// 只做水平镜像，y 不翻转
  pub fn map_box(&self, bbox: &BBox) -> DisplayRect {
    let width = bbox.width * self.scale_x;
    let height = bbox.height * self.scale_y;
    let x = if self.mirror {
      self.display_width - bbox.x * self.scale_x - width
    } else {
      bbox.x * self.scale_x
    };
    DisplayRect::new(x, bbox.y * self.scale_y, width, height)
  }

  pub fn map_point(&self, point: &Point) -> DisplayPoint {
    let x = if self.mirror {
      self.display_width - point.x * self.scale_x
    } else {
      point.x * self.scale_x
    };
    DisplayPoint::new(x, point.y * self.scale_y)
  }
}

/// 叠加层样式
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
  pub box_stroke: StrokeStyle,
  pub label_background: Color,
  pub label_text: Color,
  pub label_font: FontStyle,
  pub keypoint_color: Color,
  pub keypoint_radius: f32,
  pub skeleton_stroke: StrokeStyle,
  pub notice_background: Color,
  pub notice_text: Color,
}

impl Default for OverlayStyle {
  fn default() -> Self {
    Self {
      box_stroke: StrokeStyle {
        color: Rgba([255, 0, 0, 204]),
        line_width: 4.0,
      },
      label_background: Rgba([255, 0, 0, 153]),
      label_text: Rgba([255, 255, 255, 255]),
      label_font: FontStyle { size: 16.0 },
      keypoint_color: Rgba([255, 0, 0, 255]),
      keypoint_radius: 4.0,
      skeleton_stroke: StrokeStyle {
        color: Rgba([3, 209, 0, 255]),
        line_width: 2.0,
      },
      notice_background: Rgba([0, 0, 0, 255]),
      notice_text: Rgba([255, 255, 255, 255]),
    }
  }
}

/// 一次绘制的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawSummary {
  pub boxes: usize,
  pub keypoints: usize,
  pub segments: usize,
}

/// 叠加层渲染器，持有（可能尚未就绪的）绘制表面
pub struct OverlayRenderer<D> {
  surface: Option<D>,
  style: OverlayStyle,
}

impl<D> Default for OverlayRenderer<D> {
  fn default() -> Self {
    Self {
      surface: None,
      style: OverlayStyle::default(),
    }
  }
}

impl<D: DisplaySurface> OverlayRenderer<D> {
  pub fn new(surface: D) -> Self {
    Self {
      surface: Some(surface),
      style: OverlayStyle::default(),
    }
  }

  /// 还没有绘制表面（例如布局未完成）
  pub fn detached() -> Self {
    Self::default()
  }

  pub fn with_style(mut self, style: OverlayStyle) -> Self {
    self.style = style;
    self
  }

  pub fn attach_surface(&mut self, surface: D) {
    self.surface = Some(surface);
  }

  pub fn surface(&self) -> Option<&D> {
    self.surface.as_ref()
  }

  pub fn surface_mut(&mut self) -> Option<&mut D> {
    self.surface.as_mut()
  }

  pub fn style(&self) -> &OverlayStyle {
    &self.style
  }

  /// 清屏后绘制一帧的检测结果。表面未就绪或尺寸无效时不做任何事，返回 None。
  pub fn draw(
    &mut self,
    detections: &[Detection],
    frame_width: u32,
    frame_height: u32,
    mirror: bool,
  ) -> Option<DrawSummary> {
    let Some(surface) = self.surface.as_mut() else {
      warn!("绘制表面尚未就绪，跳过绘制");
      return None;
    };

    let Some(transform) = DisplayTransform::new(
      frame_width,
      frame_height,
      surface.width(),
      surface.height(),
      mirror,
    ) else {
      warn!(
        "尺寸无效，跳过绘制: 帧 {}x{}, 显示 {}x{}",
        frame_width,
        frame_height,
        surface.width(),
        surface.height()
      );
      return None;
    };

    surface.clear();

    let mut summary = DrawSummary::default();
    for detection in detections {
      match detection {
        Detection::Box(b) => {
          draw_box(surface, &self.style, &transform, b);
          summary.boxes += 1;
        }
        Detection::Landmarks(l) => {
          let (keypoints, segments) = draw_landmarks(surface, &self.style, &transform, l);
          summary.keypoints += keypoints;
          summary.segments += segments;
        }
      }
    }

    debug!(
      "绘制完成: {} 个边界框, {} 个关键点, {} 条连线",
      summary.boxes, summary.keypoints, summary.segments
    );
    Some(summary)
  }

  /// 等待状态：清屏并在中央显示提示
  pub fn draw_notice(&mut self, text: &str) -> bool {
    let Some(surface) = self.surface.as_mut() else {
      warn!("绘制表面尚未就绪，跳过提示: {}", text);
      return false;
    };

    let (w, h) = (surface.width() as f32, surface.height() as f32);
    surface.clear();
    surface.fill_rect(DisplayRect::new(0.0, 0.0, w, h), self.style.notice_background);

    let font = FontStyle {
      size: NOTICE_FONT_SIZE,
    };
    let text_width = surface.measure_text_width(text, &font);
    let x = ((w - text_width) / 2.0).max(0.0);
    let y = (h + NOTICE_FONT_SIZE) / 2.0;
    surface.fill_text(text, x, y, &font, self.style.notice_text);
    true
  }
}

fn draw_box<D: DisplaySurface>(
  surface: &mut D,
  style: &OverlayStyle,
  transform: &DisplayTransform,
  detection: &BoxDetection,
) {
  let rect = transform.map_box(&detection.bbox);
  surface.stroke_rect(rect, &style.box_stroke);

  // 标签背景紧贴在边框上方
  let text_width = surface.measure_text_width(&detection.label, &style.label_font);
  let background = DisplayRect::new(
    rect.x,
    rect.y - LABEL_HEIGHT,
    text_width + LABEL_PADDING,
    LABEL_HEIGHT,
  );
  surface.fill_rect(background, style.label_background);
  surface.fill_text(
    &detection.label,
    rect.x + LABEL_TEXT_OFFSET_X,
    rect.y - LABEL_TEXT_OFFSET_Y,
    &style.label_font,
    style.label_text,
  );
}

/// 先画骨架连线，再画关键点，返回 (关键点数, 连线数)
fn draw_landmarks<D: DisplaySurface>(
  surface: &mut D,
  style: &OverlayStyle,
  transform: &DisplayTransform,
  detection: &LandmarkDetection,
) -> (usize, usize) {
  let points: Vec<DisplayPoint> = detection
    .points()
    .iter()
    .map(|p| transform.map_point(p))
    .collect();

  let mut segments = 0;
  for &(a, b) in detection.topology().pairs() {
    if let (Some(from), Some(to)) = (points.get(a), points.get(b)) {
      surface.stroke_line(*from, *to, &style.skeleton_stroke);
      segments += 1;
    }
  }

  for point in &points {
    surface.fill_circle(*point, style.keypoint_radius, style.keypoint_color);
  }

  (points.len(), segments)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    model::{HAND_LANDMARKS, Topology},
    output::{
      image_surface::ImageSurface,
      surface::{DrawCommand, RecordingSurface},
    },
  };

  fn cat() -> Detection {
    Detection::bbox("cat", 0.9, BBox::new(10.0, 20.0, 30.0, 40.0))
  }

  #[test]
  fn mirrored_box_maps_to_display_space() {
    let mut renderer = OverlayRenderer::new(RecordingSurface::new(900, 900));
    let summary = renderer.draw(&[cat()], 300, 300, true).unwrap();
    assert_eq!(summary.boxes, 1);

    let commands = renderer.surface().unwrap().commands();
    assert_eq!(
      commands[0],
      DrawCommand::ClearRect(DisplayRect::new(0.0, 0.0, 900.0, 900.0))
    );
    assert_eq!(
      commands[1],
      DrawCommand::StrokeRect(
        DisplayRect::new(780.0, 60.0, 90.0, 120.0),
        OverlayStyle::default().box_stroke
      )
    );
    match &commands[2] {
      DrawCommand::FillRect(rect, _) => {
        assert_eq!((rect.x, rect.y, rect.height), (780.0, 36.0, 24.0));
      }
      other => panic!("unexpected command {:?}", other),
    }
    match &commands[3] {
      DrawCommand::FillText { text, x, y, .. } => {
        assert_eq!(text, "cat");
        assert_eq!((*x, *y), (785.0, 55.0));
      }
      other => panic!("unexpected command {:?}", other),
    }
  }

  #[test]
  fn box_at_origin_respects_mirror_flag() {
    let transform = DisplayTransform::new(100, 50, 400, 100, true).unwrap();
    let bbox = BBox::new(0.0, 0.0, 10.0, 10.0);
    assert_eq!(transform.map_box(&bbox).x, 400.0 - 40.0);

    let transform = DisplayTransform::new(100, 50, 400, 100, false).unwrap();
    let rect = transform.map_box(&bbox);
    assert_eq!((rect.x, rect.y, rect.width, rect.height), (0.0, 0.0, 40.0, 20.0));
  }

  #[test]
  fn scale_factors_apply_to_every_detection() {
    let transform = DisplayTransform::new(200, 100, 600, 400, false).unwrap();
    assert_eq!((transform.scale_x, transform.scale_y), (3.0, 4.0));
    assert_eq!(
      transform.map_point(&Point::new(10.0, 10.0)),
      DisplayPoint::new(30.0, 40.0)
    );
    let mirrored = DisplayTransform::new(200, 100, 600, 400, true).unwrap();
    assert_eq!(
      mirrored.map_point(&Point::new(10.0, 10.0)),
      DisplayPoint::new(570.0, 40.0)
    );
  }

  #[test]
  fn skeleton_draws_every_pair_and_point() {
    let points = (0..HAND_LANDMARKS)
      .map(|i| Point::new(i as f32, i as f32))
      .collect();
    let hand = LandmarkDetection::hand(points, 0.9).unwrap();
    let mut renderer = OverlayRenderer::new(RecordingSurface::new(100, 100));
    let summary = renderer
      .draw(&[Detection::Landmarks(hand)], 100, 100, false)
      .unwrap();
    assert_eq!(summary.keypoints, 21);
    assert_eq!(summary.segments, 20);

    let commands = renderer.surface().unwrap().current_pass();
    let lines = commands
      .iter()
      .filter(|c| matches!(c, DrawCommand::StrokeLine(..)))
      .count();
    let circles = commands
      .iter()
      .filter(|c| matches!(c, DrawCommand::FillCircle(..)))
      .count();
    assert_eq!((lines, circles), (20, 21));
    // 连线在关键点之前绘制
    assert!(matches!(commands[0], DrawCommand::StrokeLine(..)));
  }

  #[test]
  fn custom_topology_counts() {
    let points = vec![
      Point::new(0.0, 0.0),
      Point::new(1.0, 0.0),
      Point::new(1.0, 1.0),
    ];
    let tri = LandmarkDetection::new(points, Topology::Pairs(vec![(0, 1), (1, 2), (2, 0)]), 1.0)
      .unwrap();
    let mut renderer = OverlayRenderer::new(RecordingSurface::new(10, 10));
    let summary = renderer
      .draw(&[Detection::Landmarks(tri)], 10, 10, true)
      .unwrap();
    assert_eq!((summary.keypoints, summary.segments), (3, 3));
  }

  #[test]
  fn missing_surface_is_a_noop() {
    let mut renderer: OverlayRenderer<RecordingSurface> = OverlayRenderer::detached();
    assert!(renderer.draw(&[cat()], 300, 300, false).is_none());
    assert!(!renderer.draw_notice("waiting"));

    renderer.attach_surface(RecordingSurface::new(10, 10));
    assert!(renderer.draw(&[cat()], 0, 300, false).is_none());
    assert!(renderer.surface().unwrap().commands().is_empty());
  }

  #[test]
  fn each_pass_starts_with_a_clear() {
    let mut renderer = OverlayRenderer::new(RecordingSurface::new(50, 50));
    renderer.draw(&[cat(), cat()], 50, 50, false).unwrap();
    renderer.draw(&[], 50, 50, false).unwrap();
    let surface = renderer.surface().unwrap();
    assert!(surface.current_pass().is_empty());
    let clears = surface
      .commands()
      .iter()
      .filter(|c| matches!(c, DrawCommand::ClearRect(_)))
      .count();
    assert_eq!(clears, 2);
  }

  #[test]
  fn drawing_twice_is_pixel_identical() {
    let mut renderer = OverlayRenderer::new(ImageSurface::new(120, 90));
    let points = (0..HAND_LANDMARKS)
      .map(|i| Point::new(2.0 * i as f32, 1.5 * i as f32))
      .collect();
    let detections = vec![
      cat(),
      Detection::Landmarks(LandmarkDetection::hand(points, 0.9).unwrap()),
    ];

    renderer.draw(&detections, 60, 45, true).unwrap();
    let first = renderer.surface().unwrap().canvas().clone();
    renderer.draw(&detections, 60, 45, true).unwrap();
    assert_eq!(renderer.surface().unwrap().canvas(), &first);

    // 空结果清掉上一帧
    renderer.draw(&[], 60, 45, true).unwrap();
    assert!(
      renderer
        .surface()
        .unwrap()
        .canvas()
        .pixels()
        .all(|p| p[3] == 0)
    );
  }

  #[test]
  fn notice_is_drawn_centered() {
    let mut renderer = OverlayRenderer::new(RecordingSurface::new(200, 100));
    assert!(renderer.draw_notice("loading"));
    let commands = renderer.surface().unwrap().current_pass();
    match commands.last().unwrap() {
      DrawCommand::FillText { text, y, .. } => {
        assert_eq!(text, "loading");
        assert_eq!(*y, 59.0);
      }
      other => panic!("unexpected command {:?}", other),
    }
  }
}
