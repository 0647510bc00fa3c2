// 该文件是 Shanan （山南西风） 项目的一部分。
// src/pipeline.rs - 告警流水线
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

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::{
  broadcast::{AlertMessage, Broadcast, PublishReport},
  config::AlertConfig,
  detection::{Detection, filter},
  error::AlertError,
  input::ImageUpload,
  output::{Annotator, EncodedImage, JpegEncoder, RenderError},
  request::{AlertRequest, ValidationError},
};

pub const NO_QUALIFYING_MESSAGE: &str = "No detections with sufficient score for alert.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
  /// 没有达标检测，未解码、未发布
  NoQualifyingDetections,
  Published {
    message: String,
    qualifying: usize,
    report: PublishReport,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
  Success,
  Error,
}

/// 返回给调用方的统一结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertResponse {
  pub status: AlertStatus,
  pub message: String,
  #[serde(skip)]
  http_status: u16,
}

impl AlertResponse {
  pub fn success(message: impl Into<String>) -> Self {
    Self {
      status: AlertStatus::Success,
      message: message.into(),
      http_status: 200,
    }
  }

  pub fn failure(err: &AlertError) -> Self {
    Self {
      status: AlertStatus::Error,
      message: err.to_string(),
      http_status: err.http_status(),
    }
  }

  pub fn is_success(&self) -> bool {
    self.status == AlertStatus::Success
  }

  pub fn http_status(&self) -> u16 {
    self.http_status
  }
}

impl From<&Result<AlertOutcome, AlertError>> for AlertResponse {
  fn from(result: &Result<AlertOutcome, AlertError>) -> Self {
    match result {
      Ok(AlertOutcome::NoQualifyingDetections) => AlertResponse::success(NO_QUALIFYING_MESSAGE),
      Ok(AlertOutcome::Published { message, .. }) => AlertResponse::success(message.clone()),
      Err(err) => AlertResponse::failure(err),
    }
  }
}

/// 过滤 → 解码 → 标注 → 编码 → 广播；每次调用互不共享可变状态
pub struct AlertPipeline<B> {
  config: AlertConfig,
  annotator: Arc<Annotator>,
  encoder: JpegEncoder,
  broadcast: B,
}

impl<B: Broadcast> AlertPipeline<B> {
  pub fn new(config: AlertConfig, broadcast: B) -> Result<Self, AlertError> {
    let encoder = config.encoder()?;
    let annotator = config.annotator();
    Ok(Self::with_parts(config, annotator, encoder, broadcast))
  }

  pub fn with_parts(
    config: AlertConfig,
    annotator: Annotator,
    encoder: JpegEncoder,
    broadcast: B,
  ) -> Self {
    Self {
      config,
      annotator: Arc::new(annotator),
      encoder,
      broadcast,
    }
  }

  pub async fn process(&self, request: AlertRequest) -> Result<AlertOutcome, AlertError> {
    let AlertRequest {
      message,
      detections,
      image,
    } = request;

    let qualifying = filter(&detections, self.config.threshold);
    debug!(
      "达标检测 {}/{} (阈值 {})",
      qualifying.len(),
      detections.len(),
      self.config.threshold
    );
    if qualifying.is_empty() {
      return Ok(AlertOutcome::NoQualifyingDetections);
    }

    let image = image.ok_or(ValidationError::MissingImage)?;
    let count = qualifying.len();
    let encoded = self.render(image, qualifying).await?;
    info!(
      "告警图像编码完成: {} 字节 ({})",
      encoded.bytes.len(),
      encoded.media_type
    );

    let payload = AlertMessage::new(message.clone(), encoded.to_base64());
    let report = self.broadcast.publish(&self.config.channel, payload).await?;
    info!(
      "告警已发布到频道 {}: 送达 {}, 丢弃 {}",
      self.config.channel, report.delivered, report.dropped
    );

    Ok(AlertOutcome::Published {
      message,
      qualifying: count,
      report,
    })
  }

  /// 解码、标注与编码在阻塞线程池中完成
  async fn render(
    &self,
    image: ImageUpload,
    qualifying: Vec<Detection>,
  ) -> Result<EncodedImage, AlertError> {
    let annotator = Arc::clone(&self.annotator);
    let encoder = self.encoder;

    tokio::task::spawn_blocking(move || -> Result<EncodedImage, AlertError> {
      let canvas = image.decode()?;
      let annotated = annotator.annotate(canvas, &qualifying);
      Ok(encoder.encode(&annotated)?)
    })
    .await
    .map_err(|err| RenderError::Aborted(err.to_string()))?
  }

  /// 处理一次告警，任何错误都在此转换为统一结果
  pub async fn handle(&self, request: AlertRequest) -> AlertResponse {
    let result = self.process(request).await;
    if let Err(err) = &result {
      error!("告警处理失败 ({}): {}", err.kind(), err);
    }
    AlertResponse::from(&result)
  }

  pub async fn handle_parts(
    &self,
    json_body: Option<&str>,
    image: Option<ImageUpload>,
  ) -> AlertResponse {
    match AlertRequest::from_parts(json_body, image) {
      Ok(request) => self.handle(request).await,
      Err(err) => {
        let err = AlertError::from(err);
        error!("告警请求无效: {}", err);
        AlertResponse::failure(&err)
      }
    }
  }
}
