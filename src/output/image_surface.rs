// 该文件是 Overlens （叠影） 项目的一部分。
// src/output/image_surface.rs - 基于 RGBA 图像的绘制表面
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

use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgba, RgbaImage, RgbImage, imageops::FilterType};
use imageproc::{
  drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_text_mut, text_size,
  },
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::output::surface::{
  Color, DisplayPoint, DisplayRect, DisplaySurface, FontStyle, StrokeStyle, estimate_text_width,
};

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

#[derive(Error, Debug)]
pub enum FontError {
  #[error("无法读取字体文件: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 透明 RGBA 叠加层
pub struct ImageSurface {
  canvas: RgbaImage,
  font: Option<FontArc>,
}

impl ImageSurface {
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      canvas: RgbaImage::from_pixel(width, height, TRANSPARENT),
      font: None,
    }
  }

  /// 没有字体时文本不会绘制，宽度按字符估算
  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn load_font(path: impl AsRef<Path>) -> Result<FontArc, FontError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    info!("加载字体: {}", path.display());
    Ok(font)
  }

  pub fn canvas(&self) -> &RgbaImage {
    &self.canvas
  }

  /// 改变尺寸后内容被清空
  pub fn resize(&mut self, width: u32, height: u32) {
    self.canvas = RgbaImage::from_pixel(width, height, TRANSPARENT);
  }

  /// 把叠加层合成到摄像头画面上；画面缩放到显示尺寸，镜像时同样水平翻转
  pub fn composite_over(&self, frame: Option<&RgbImage>, mirror: bool) -> RgbaImage {
    let Some(frame) = frame else {
      return self.canvas.clone();
    };

    let (w, h) = self.canvas.dimensions();
    let preview = if frame.dimensions() == (w, h) {
      frame.clone()
    } else {
      image::imageops::resize(frame, w, h, FilterType::Triangle)
    };
    let preview = if mirror {
      image::imageops::flip_horizontal(&preview)
    } else {
      preview
    };

    let mut base = RgbaImage::from_fn(w, h, |x, y| {
      let p = preview.get_pixel(x, y);
      Rgba([p[0], p[1], p[2], 255])
    });
    image::imageops::overlay(&mut base, &self.canvas, 0, 0);
    base
  }

  fn clipped(&self, rect: DisplayRect) -> Option<(u32, u32, u32, u32)> {
    let (w, h) = (self.canvas.width() as f32, self.canvas.height() as f32);
    let x0 = rect.x.max(0.0).floor();
    let y0 = rect.y.max(0.0).floor();
    let x1 = (rect.x + rect.width).min(w).ceil();
    let y1 = (rect.y + rect.height).min(h).ceil();
    if x1 <= x0 || y1 <= y0 {
      return None;
    }
    Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
  }
}

fn to_rect(x: f32, y: f32, width: f32, height: f32) -> Option<Rect> {
  let (w, h) = (width.round(), height.round());
  if w < 1.0 || h < 1.0 {
    return None;
  }
  Some(Rect::at(x.round() as i32, y.round() as i32).of_size(w as u32, h as u32))
}

impl DisplaySurface for ImageSurface {
  fn width(&self) -> u32 {
    self.canvas.width()
  }

  fn height(&self) -> u32 {
    self.canvas.height()
  }

  fn clear_rect(&mut self, rect: DisplayRect) {
    let Some((x0, y0, x1, y1)) = self.clipped(rect) else {
      return;
    };
    for y in y0..y1 {
      for x in x0..x1 {
        self.canvas.put_pixel(x, y, TRANSPARENT);
      }
    }
  }

  fn stroke_rect(&mut self, rect: DisplayRect, style: &StrokeStyle) {
    // 线宽以边框路径为中心向内外扩展
    let line_width = style.line_width.round().max(1.0) as i32;
    let half = line_width / 2;
    for i in 0..line_width {
      let inset = (i - half) as f32;
      if let Some(r) = to_rect(
        rect.x + inset,
        rect.y + inset,
        rect.width - 2.0 * inset,
        rect.height - 2.0 * inset,
      ) {
        draw_hollow_rect_mut(&mut self.canvas, r, style.color);
      }
    }
  }

  fn fill_rect(&mut self, rect: DisplayRect, color: Color) {
    if let Some(r) = to_rect(rect.x, rect.y, rect.width, rect.height) {
      draw_filled_rect_mut(&mut self.canvas, r, color);
    }
  }

  fn fill_text(&mut self, text: &str, x: f32, y: f32, font: &FontStyle, color: Color) {
    let Some(face) = &self.font else {
      debug!("未加载字体，跳过文本: {}", text);
      return;
    };
    let scale = PxScale::from(font.size);
    let ascent = face.as_scaled(scale).ascent();
    let top = (y - ascent).round() as i32;
    draw_text_mut(&mut self.canvas, color, x.round() as i32, top, scale, face, text);
  }

  fn measure_text_width(&self, text: &str, font: &FontStyle) -> f32 {
    match &self.font {
      Some(face) => text_size(PxScale::from(font.size), face, text).0 as f32,
      None => estimate_text_width(text, font),
    }
  }

  fn fill_circle(&mut self, center: DisplayPoint, radius: f32, color: Color) {
    draw_filled_circle_mut(
      &mut self.canvas,
      (center.x.round() as i32, center.y.round() as i32),
      radius.round().max(1.0) as i32,
      color,
    );
  }

  fn stroke_line(&mut self, from: DisplayPoint, to: DisplayPoint, style: &StrokeStyle) {
    let (dx, dy) = (to.x - from.x, to.y - from.y);
    let length = (dx * dx + dy * dy).sqrt();
    let line_width = style.line_width.round().max(1.0) as i32;
    if length == 0.0 || line_width == 1 {
      draw_line_segment_mut(&mut self.canvas, (from.x, from.y), (to.x, to.y), style.color);
      return;
    }

    // 沿法线方向平移，画出有宽度的线
    let (nx, ny) = (-dy / length, dx / length);
    for i in 0..line_width {
      let offset = i as f32 - (line_width - 1) as f32 / 2.0;
      draw_line_segment_mut(
        &mut self.canvas,
        (from.x + nx * offset, from.y + ny * offset),
        (to.x + nx * offset, to.y + ny * offset),
        style.color,
      );
    }
  }
}
