// 该文件是 Shanan （山南西风） 项目的一部分。
// src/error.rs - 告警流水线错误
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

use thiserror::Error;

use crate::{
  broadcast::PublishError,
  input::DecodeError,
  output::{EncodeError, RenderError},
  request::ValidationError,
};

#[derive(Error, Debug)]
pub enum AlertError {
  #[error("{0}")]
  Validation(#[from] ValidationError),
  #[error("{0}")]
  Decode(#[from] DecodeError),
  #[error("{0}")]
  Render(#[from] RenderError),
  #[error("{0}")]
  Encode(#[from] EncodeError),
  #[error("{0}")]
  Publish(#[from] PublishError),
}

impl AlertError {
  /// 请求方的问题返回 400，其余返回 500
  pub fn http_status(&self) -> u16 {
    match self {
      AlertError::Validation(_) | AlertError::Decode(_) => 400,
      AlertError::Render(_) | AlertError::Encode(_) | AlertError::Publish(_) => 500,
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      AlertError::Validation(_) => "validation",
      AlertError::Decode(_) => "decode",
      AlertError::Render(_) => "render",
      AlertError::Encode(_) => "encode",
      AlertError::Publish(_) => "publish",
    }
  }
}
