// 该文件是 Overlens （叠影） 项目的一部分。
// src/output/surface.rs - 二维绘制表面
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

pub type Color = Rgba<u8>;

// 没有字体时按字符估算文本宽度
pub const ESTIMATED_CHAR_WIDTH_RATIO: f32 = 0.6;

/// 显示空间中的矩形
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRect {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl DisplayRect {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }
}

/// 显示空间中的点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayPoint {
  pub x: f32,
  pub y: f32,
}

impl DisplayPoint {
  pub fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
  pub color: Color,
  pub line_width: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontStyle {
  /// 像素字号
  pub size: f32,
}

/// 叠加层绘制表面。坐标原点在左上角，文本的 y 坐标为基线。
pub trait DisplaySurface {
  fn width(&self) -> u32;
  fn height(&self) -> u32;

  fn clear_rect(&mut self, rect: DisplayRect);
  fn stroke_rect(&mut self, rect: DisplayRect, style: &StrokeStyle);
  fn fill_rect(&mut self, rect: DisplayRect, color: Color);
  fn fill_text(&mut self, text: &str, x: f32, y: f32, font: &FontStyle, color: Color);
  fn measure_text_width(&self, text: &str, font: &FontStyle) -> f32;
  fn fill_circle(&mut self, center: DisplayPoint, radius: f32, color: Color);
  fn stroke_line(&mut self, from: DisplayPoint, to: DisplayPoint, style: &StrokeStyle);

  fn clear(&mut self) {
    let rect = DisplayRect::new(0.0, 0.0, self.width() as f32, self.height() as f32);
    self.clear_rect(rect);
  }
}

pub fn estimate_text_width(text: &str, font: &FontStyle) -> f32 {
  text.chars().count() as f32 * font.size * ESTIMATED_CHAR_WIDTH_RATIO
}

/// 绘制命令
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
  ClearRect(DisplayRect),
  StrokeRect(DisplayRect, StrokeStyle),
  FillRect(DisplayRect, Color),
  FillText {
    text: String,
    x: f32,
    y: f32,
    font: FontStyle,
    color: Color,
  },
  FillCircle(DisplayPoint, f32, Color),
  StrokeLine(DisplayPoint, DisplayPoint, StrokeStyle),
}

/// 只记录绘制命令的表面，用于无界面运行
#[derive(Debug, Clone)]
pub struct RecordingSurface {
  width: u32,
  height: u32,
  commands: Vec<DrawCommand>,
}

impl RecordingSurface {
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      width,
      height,
      commands: Vec::new(),
    }
  }

  pub fn resize(&mut self, width: u32, height: u32) {
    self.width = width;
    self.height = height;
  }

  pub fn commands(&self) -> &[DrawCommand] {
    &self.commands
  }

  /// 最后一次整屏清除之后的命令
  pub fn current_pass(&self) -> &[DrawCommand] {
    let full = DisplayRect::new(0.0, 0.0, self.width as f32, self.height as f32);
    let start = self
      .commands
      .iter()
      .rposition(|c| *c == DrawCommand::ClearRect(full))
      .map(|i| i + 1)
      .unwrap_or(0);
    &self.commands[start..]
  }

  pub fn take_commands(&mut self) -> Vec<DrawCommand> {
    std::mem::take(&mut self.commands)
  }
}

impl DisplaySurface for RecordingSurface {
  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn clear_rect(&mut self, rect: DisplayRect) {
    self.commands.push(DrawCommand::ClearRect(rect));
  }

  fn stroke_rect(&mut self, rect: DisplayRect, style: &StrokeStyle) {
    self.commands.push(DrawCommand::StrokeRect(rect, *style));
  }

  fn fill_rect(&mut self, rect: DisplayRect, color: Color) {
    self.commands.push(DrawCommand::FillRect(rect, color));
  }

  fn fill_text(&mut self, text: &str, x: f32, y: f32, font: &FontStyle, color: Color) {
    self.commands.push(DrawCommand::FillText {
      text: text.to_string(),
      x,
      y,
      font: *font,
      color,
    });
  }

  fn measure_text_width(&self, text: &str, font: &FontStyle) -> f32 {
    estimate_text_width(text, font)
  }

  fn fill_circle(&mut self, center: DisplayPoint, radius: f32, color: Color) {
    self
      .commands
      .push(DrawCommand::FillCircle(center, radius, color));
  }

  fn stroke_line(&mut self, from: DisplayPoint, to: DisplayPoint, style: &StrokeStyle) {
    self.commands.push(DrawCommand::StrokeLine(from, to, *style));
  }
}
