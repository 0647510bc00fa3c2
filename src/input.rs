// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 告警图像输入与解码
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

use std::{io::Cursor, path::Path};

use image::{ImageFormat, ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("Image is empty")]
  Empty,
  #[error("Image decoding error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

/// 上传方允许的图像类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMime {
  Jpeg,
  Png,
  Gif,
}

impl ImageMime {
  pub fn from_content_type(content_type: &str) -> Option<Self> {
    match content_type.trim().to_ascii_lowercase().as_str() {
      "image/jpeg" => Some(ImageMime::Jpeg),
      "image/png" => Some(ImageMime::Png),
      "image/gif" => Some(ImageMime::Gif),
      _ => None,
    }
  }

  pub fn from_path(path: &Path) -> Option<Self> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
      "jpg" | "jpeg" => Some(ImageMime::Jpeg),
      "png" => Some(ImageMime::Png),
      "gif" => Some(ImageMime::Gif),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      ImageMime::Jpeg => "image/jpeg",
      ImageMime::Png => "image/png",
      ImageMime::Gif => "image/gif",
    }
  }

  fn format(&self) -> ImageFormat {
    match self {
      ImageMime::Jpeg => ImageFormat::Jpeg,
      ImageMime::Png => ImageFormat::Png,
      ImageMime::Gif => ImageFormat::Gif,
    }
  }
}

/// 随告警请求上传的原始图像，类型已由上传方校验
#[derive(Debug, Clone)]
pub struct ImageUpload {
  bytes: Vec<u8>,
  mime: Option<ImageMime>,
}

impl ImageUpload {
  /// 未声明类型，解码时按内容探测格式
  pub fn new(bytes: Vec<u8>) -> Self {
    Self { bytes, mime: None }
  }

  pub fn with_mime(bytes: Vec<u8>, mime: ImageMime) -> Self {
    Self {
      bytes,
      mime: Some(mime),
    }
  }

  pub fn mime(&self) -> Option<ImageMime> {
    self.mime
  }

  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  /// 解码为 RGB8 图像；带透明通道或调色板的输入在此统一转换
  ///
  /// 格式以内容探测为准，声明的类型只在探测不出时使用
  pub fn decode(&self) -> Result<RgbImage, DecodeError> {
    if self.bytes.is_empty() {
      return Err(DecodeError::Empty);
    }

    let mut reader = ImageReader::new(Cursor::new(self.bytes.as_slice())).with_guessed_format()?;
    let guessed = reader.format();
    if guessed.is_none()
      && let Some(mime) = self.mime
    {
      reader.set_format(mime.format());
    }
    let image = reader.decode()?;
    debug!(
      "图像解码完成: {}x{} (探测 {:?}, 声明 {:?})",
      image.width(),
      image.height(),
      guessed,
      self.mime
    );

    Ok(image.into_rgb8())
  }
}

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

/// 以 `image:///path/to/file.jpg` 形式读取本地图像文件，不做解码
pub struct ImageFileInput {
  upload: ImageUpload,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = Path::new(url.path());
    let bytes = std::fs::read(path)?;
    let upload = match ImageMime::from_path(path) {
      Some(mime) => ImageUpload::with_mime(bytes, mime),
      None => ImageUpload::new(bytes),
    };

    Ok(ImageFileInput { upload })
  }
}

impl ImageFileInput {
  pub fn into_upload(self) -> ImageUpload {
    self.upload
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{ImageBuffer, Rgba};

  fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image: ImageBuffer<Rgba<u8>, Vec<u8>> =
      ImageBuffer::from_pixel(width, height, Rgba([10, 20, 30, 128]));
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
  }

  #[test]
  fn test_mime_allow_list() {
    assert_eq!(
      ImageMime::from_content_type("image/JPEG"),
      Some(ImageMime::Jpeg)
    );
    assert_eq!(ImageMime::from_content_type("image/gif"), Some(ImageMime::Gif));
    assert_eq!(ImageMime::from_content_type("image/webp"), None);
    assert_eq!(ImageMime::from_content_type("text/plain"), None);
  }

  #[test]
  fn test_decode_rgba_png_into_rgb() {
    let upload = ImageUpload::with_mime(png_bytes(7, 5), ImageMime::Png);
    let image = upload.decode().unwrap();
    assert_eq!(image.dimensions(), (7, 5));
  }

  #[test]
  fn test_decode_sniffs_format() {
    let upload = ImageUpload::new(png_bytes(3, 3));
    assert!(upload.decode().is_ok());
  }

  #[test]
  fn test_decode_trusts_content_over_declared_mime() {
    let image = RgbImage::from_pixel(9, 4, image::Rgb([200, 10, 10]));
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Jpeg).unwrap();

    let upload = ImageUpload::with_mime(buf.into_inner(), ImageMime::Png);
    assert_eq!(upload.decode().unwrap().dimensions(), (9, 4));

    let upload = ImageUpload::with_mime(png_bytes(6, 2), ImageMime::Gif);
    assert_eq!(upload.decode().unwrap().dimensions(), (6, 2));
  }

  #[test]
  fn test_decode_garbage_fails() {
    let upload = ImageUpload::with_mime(b"not an image".to_vec(), ImageMime::Jpeg);
    assert!(matches!(
      upload.decode(),
      Err(DecodeError::ImageLoadError(_))
    ));
    assert!(matches!(
      ImageUpload::new(Vec::new()).decode(),
      Err(DecodeError::Empty)
    ));
  }

  #[test]
  fn test_file_input_scheme_mismatch() {
    let url = Url::parse("file:///tmp/a.jpg").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }
}
