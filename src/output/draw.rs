// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 告警检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

#[cfg(feature = "outline_font")]
use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  detection::{BoundingBox, Detection},
  output::glyph,
};

// 绘制常量
pub const LABEL_FONT_SIZE: f32 = 30.0;
pub const LABEL_OFFSET: i32 = 30;
pub const BOX_STROKE_WIDTH: u32 = 3;
const BOX_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const LABEL_COLOR: [u8; 3] = [0, 255, 255]; // 青色

#[derive(Error, Debug)]
pub enum RenderError {
  #[error("Font unavailable: {path}: {reason}")]
  FontUnavailable { path: PathBuf, reason: String },
  #[error("Outline fonts are not enabled in this build: {0}")]
  OutlineFontDisabled(PathBuf),
  #[error("Render task aborted: {0}")]
  Aborted(String),
}

/// 标签字体，外部字体不可用时退回内嵌点阵字体
#[derive(Clone)]
pub enum LabelFont {
  #[cfg(feature = "outline_font")]
  Outline { font: FontArc, scale: PxScale },
  Bitmap { scale: u32 },
}

impl std::fmt::Debug for LabelFont {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      #[cfg(feature = "outline_font")]
      LabelFont::Outline { scale, .. } => f
        .debug_struct("Outline")
        .field("scale", &scale.y)
        .finish(),
      LabelFont::Bitmap { scale } => f.debug_struct("Bitmap").field("scale", scale).finish(),
    }
  }
}

impl Default for LabelFont {
  fn default() -> Self {
    Self::bitmap(LABEL_FONT_SIZE)
  }
}

impl LabelFont {
  pub fn bitmap(font_size: f32) -> Self {
    LabelFont::Bitmap {
      scale: glyph::scale_for_size(font_size),
    }
  }

  /// 从 TrueType/OpenType 文件加载字体
  pub fn from_path(path: &Path, font_size: f32) -> Result<Self, RenderError> {
    #[cfg(feature = "outline_font")]
    {
      let data = std::fs::read(path).map_err(|err| RenderError::FontUnavailable {
        path: path.to_path_buf(),
        reason: err.to_string(),
      })?;
      let font = FontArc::try_from_vec(data).map_err(|err| RenderError::FontUnavailable {
        path: path.to_path_buf(),
        reason: err.to_string(),
      })?;
      Ok(LabelFont::Outline {
        font,
        scale: PxScale::from(font_size),
      })
    }
    #[cfg(not(feature = "outline_font"))]
    {
      let _ = font_size;
      Err(RenderError::OutlineFontDisabled(path.to_path_buf()))
    }
  }

  /// 加载指定字体，失败时记录警告并使用点阵字体
  pub fn load_or_fallback(path: Option<&Path>, font_size: f32) -> Self {
    let Some(path) = path else {
      return Self::bitmap(font_size);
    };

    match Self::from_path(path, font_size) {
      Ok(font) => {
        debug!("已加载标签字体: {}", path.display());
        font
      }
      Err(err) => {
        warn!("{}，改用内嵌点阵字体", err);
        Self::bitmap(font_size)
      }
    }
  }

  fn draw_text(&self, image: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, text: &str) {
    match self {
      #[cfg(feature = "outline_font")]
      LabelFont::Outline { font, scale } => {
        imageproc::drawing::draw_text_mut(image, color, x, y, *scale, font, text)
      }
      LabelFont::Bitmap { scale } => glyph::draw_text(image, color, x, y, *scale, text),
    }
  }
}

/// 像素坐标下已补齐、排序并裁剪的边界框（闭区间）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
  pub x_min: i32,
  pub y_min: i32,
  pub x_max: i32,
  pub y_max: i32,
}

/// 缺失的坐标以图像边缘补齐：xMin/yMin 取 0，xMax/yMax 取图像宽高
pub fn edges_or_default(bbox: &BoundingBox, width: u32, height: u32) -> [f64; 4] {
  [
    bbox.x_min.unwrap_or(0.0),
    bbox.y_min.unwrap_or(0.0),
    bbox.x_max.unwrap_or(width as f64),
    bbox.y_max.unwrap_or(height as f64),
  ]
}

impl PixelBox {
  pub fn resolve(bbox: &BoundingBox, width: u32, height: u32) -> Option<Self> {
    if width == 0 || height == 0 {
      return None;
    }

    let [x0, y0, x1, y1] = edges_or_default(bbox, width, height).map(|v| v.round() as i32);
    let (w, h) = (width as i32 - 1, height as i32 - 1);

    Some(PixelBox {
      x_min: x0.min(x1).clamp(0, w),
      y_min: y0.min(y1).clamp(0, h),
      x_max: x0.max(x1).clamp(0, w),
      y_max: y0.max(y1).clamp(0, h),
    })
  }

  /// 标签左上角：框上方留出空间时放在上方 30 像素处，否则与框顶对齐
  pub fn label_origin(&self) -> (i32, i32) {
    let y = if self.y_min > LABEL_OFFSET {
      self.y_min - LABEL_OFFSET
    } else {
      self.y_min
    };
    (self.x_min, y)
  }
}

/// 在图像上绘制告警框与标签
#[derive(Debug, Clone)]
pub struct Annotator {
  font: LabelFont,
  box_color: Rgb<u8>,
  label_color: Rgb<u8>,
  stroke_width: u32,
}

impl Default for Annotator {
  fn default() -> Self {
    Self::new(LabelFont::default())
  }
}

impl Annotator {
  pub fn new(font: LabelFont) -> Self {
    Self {
      font,
      box_color: Rgb(BOX_COLOR),
      label_color: Rgb(LABEL_COLOR),
      stroke_width: BOX_STROKE_WIDTH,
    }
  }

  /// 按顺序绘制每个检测，后绘制的覆盖先绘制的
  pub fn annotate(&self, mut image: RgbImage, detections: &[Detection]) -> RgbImage {
    for detection in detections {
      self.draw_detection(&mut image, detection);
    }
    image
  }

  fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
    let Some(pixel_box) = PixelBox::resolve(&detection.bbox, image.width(), image.height()) else {
      return;
    };

    // 向内加粗边框
    for t in 0..self.stroke_width as i32 {
      let (x0, y0) = (pixel_box.x_min + t, pixel_box.y_min + t);
      let (x1, y1) = (pixel_box.x_max - t, pixel_box.y_max - t);
      if x0 > x1 || y0 > y1 {
        break;
      }
      let rect = Rect::at(x0, y0).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32);
      draw_hollow_rect_mut(image, rect, self.box_color);
    }

    let (label_x, label_y) = pixel_box.label_origin();
    self
      .font
      .draw_text(image, self.label_color, label_x, label_y, &detection.label());
  }
}
