// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 告警流水线配置
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

use std::path::PathBuf;

use crate::{
  detection::ALERT_SCORE_THRESHOLD,
  output::{
    draw::{Annotator, LABEL_FONT_SIZE, LabelFont},
    encode::{DEFAULT_JPEG_QUALITY, EncodeError, JpegEncoder},
  },
};

pub const ALERT_CHANNEL: &str = "alert_group";

#[derive(Debug, Clone)]
pub struct AlertConfig {
  /// 告警阈值（0 - 100）
  pub threshold: f64,
  /// 发布的频道名
  pub channel: String,
  pub jpeg_quality: u8,
  /// 标签字体文件，缺省或不可用时使用内嵌点阵字体
  pub font_path: Option<PathBuf>,
  pub font_size: f32,
}

impl Default for AlertConfig {
  fn default() -> Self {
    Self {
      threshold: ALERT_SCORE_THRESHOLD,
      channel: ALERT_CHANNEL.to_string(),
      jpeg_quality: DEFAULT_JPEG_QUALITY,
      font_path: None,
      font_size: LABEL_FONT_SIZE,
    }
  }
}

impl AlertConfig {
  pub fn with_threshold(mut self, threshold: f64) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
    self.channel = channel.into();
    self
  }

  pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
    self.jpeg_quality = quality;
    self
  }

  pub fn with_font(mut self, path: Option<PathBuf>, size: f32) -> Self {
    self.font_path = path;
    self.font_size = size;
    self
  }

  pub fn annotator(&self) -> Annotator {
    Annotator::new(LabelFont::load_or_fallback(
      self.font_path.as_deref(),
      self.font_size,
    ))
  }

  pub fn encoder(&self) -> Result<JpegEncoder, EncodeError> {
    JpegEncoder::with_quality(self.jpeg_quality)
  }
}
