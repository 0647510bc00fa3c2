// 该文件是 Shanan （山南西风） 项目的一部分。
// src/request.rs - 告警请求
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

use serde::Deserialize;
use thiserror::Error;

use crate::{
  detection::{Detection, DetectionSet},
  input::{ImageMime, ImageUpload},
};

#[derive(Error, Debug)]
pub enum ValidationError {
  #[error("Missing JSON data")]
  MissingBody,
  #[error("Malformed JSON data: {0}")]
  MalformedJson(#[from] serde_json::Error),
  #[error("Missing field: {0}")]
  MissingField(&'static str),
  #[error("Missing image")]
  MissingImage,
  #[error("Unsupported file type: {0}")]
  UnsupportedMediaType(String),
}

#[derive(Deserialize)]
struct AlertBody {
  message: Option<String>,
  detections: Option<Vec<Detection>>,
}

/// 一次告警调用的输入；图像仅在存在达标检测时才需要
#[derive(Debug, Clone)]
pub struct AlertRequest {
  pub message: String,
  pub detections: DetectionSet,
  pub image: Option<ImageUpload>,
}

impl AlertRequest {
  pub fn new(
    message: impl Into<String>,
    detections: DetectionSet,
    image: Option<ImageUpload>,
  ) -> Self {
    Self {
      message: message.into(),
      detections,
      image,
    }
  }

  /// 由上传层交来的 JSON 正文与图像组装请求
  pub fn from_parts(
    json_body: Option<&str>,
    image: Option<ImageUpload>,
  ) -> Result<Self, ValidationError> {
    let body = json_body
      .filter(|body| !body.trim().is_empty())
      .ok_or(ValidationError::MissingBody)?;
    let AlertBody {
      message,
      detections,
    } = serde_json::from_str(body)?;

    Ok(Self {
      message: message.ok_or(ValidationError::MissingField("message"))?,
      detections: detections.ok_or(ValidationError::MissingField("detections"))?,
      image,
    })
  }
}

/// 按上传方声明的 MIME 类型包装图像，仅接受 jpeg/png/gif
pub fn upload_from_parts(
  bytes: Vec<u8>,
  content_type: Option<&str>,
) -> Result<ImageUpload, ValidationError> {
  match content_type {
    None => Ok(ImageUpload::new(bytes)),
    Some(content_type) => ImageMime::from_content_type(content_type)
      .map(|mime| ImageUpload::with_mime(bytes, mime))
      .ok_or_else(|| ValidationError::UnsupportedMediaType(content_type.to_string())),
  }
}
