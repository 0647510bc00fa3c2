// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/encode.rs - 告警图像 JPEG 编码
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

use base64::{Engine as _, engine::general_purpose};
use image::{RgbImage, codecs::jpeg::JpegEncoder as ImageJpegEncoder};
use thiserror::Error;

pub const JPEG_MEDIA_TYPE: &str = "image/jpeg";
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

#[derive(Error, Debug)]
pub enum EncodeError {
  #[error("Cannot encode an empty image")]
  EmptyImage,
  #[error("JPEG quality must be within 1..=100, got {0}")]
  InvalidQuality(u8),
  #[error("Image encoding error: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 编码后的图像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
  pub bytes: Vec<u8>,
  pub media_type: &'static str,
}

impl EncodedImage {
  /// 标准字母表、带填充的 base64 文本，可直接放入 JSON 消息
  pub fn to_base64(&self) -> String {
    general_purpose::STANDARD.encode(&self.bytes)
  }
}

/// 固定质量的 JPEG 编码器，相同输入得到相同输出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegEncoder {
  quality: u8,
}

impl Default for JpegEncoder {
  fn default() -> Self {
    Self {
      quality: DEFAULT_JPEG_QUALITY,
    }
  }
}

impl JpegEncoder {
  pub fn with_quality(quality: u8) -> Result<Self, EncodeError> {
    if !(1..=100).contains(&quality) {
      return Err(EncodeError::InvalidQuality(quality));
    }
    Ok(Self { quality })
  }

  pub fn encode(&self, image: &RgbImage) -> Result<EncodedImage, EncodeError> {
    if image.width() == 0 || image.height() == 0 {
      return Err(EncodeError::EmptyImage);
    }

    let mut bytes = Vec::new();
    ImageJpegEncoder::new_with_quality(&mut bytes, self.quality).encode_image(image)?;

    Ok(EncodedImage {
      bytes,
      media_type: JPEG_MEDIA_TYPE,
    })
  }
}
