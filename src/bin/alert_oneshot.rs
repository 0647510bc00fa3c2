// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/alert_oneshot.rs - 单次告警测试程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use shanan_alert::{
  ALERT_SCORE_THRESHOLD, AlertConfig, AlertMessage, AlertPipeline, ChannelHub, FromUrl,
  config::ALERT_CHANNEL, input::ImageFileInput, output::draw::LABEL_FONT_SIZE,
  output::encode::DEFAULT_JPEG_QUALITY,
};

/// 单次告警参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像，例如 image:///data/frame.jpg
  #[arg(long, value_name = "SOURCE")]
  pub image: Url,
  /// 告警 JSON 正文: {"message": ..., "detections": [...]}
  #[arg(long, value_name = "FILE")]
  pub body: PathBuf,
  /// 收到的告警图像保存路径，目录则按时间命名
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<PathBuf>,
  /// 告警阈值 (0 - 100)
  #[arg(long, default_value_t = ALERT_SCORE_THRESHOLD, value_name = "THRESHOLD")]
  pub threshold: f64,
  /// 频道名
  #[arg(long, default_value = ALERT_CHANNEL, value_name = "CHANNEL")]
  pub channel: String,
  /// 标签字体文件（TrueType/OpenType）
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  #[arg(long, default_value_t = LABEL_FONT_SIZE, value_name = "PX")]
  pub font_size: f32,
  /// JPEG 质量 (1 - 100)
  #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, value_name = "QUALITY")]
  pub quality: u8,
}

fn save_delivery(output: &Path, message: &AlertMessage) -> Result<PathBuf> {
  let bytes = general_purpose::STANDARD
    .decode(&message.image)
    .context("告警图像不是合法的 base64")?;

  let path = if output.is_dir() {
    output.join(format!("alert-{}.jpg", Utc::now().format("%Y%m%d-%H%M%S%.3f")))
  } else {
    output.to_path_buf()
  };
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }

  std::fs::write(&path, bytes).with_context(|| format!("无法保存图片: {}", path.display()))?;
  Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入图像: {}", args.image);
  info!("告警正文: {}", args.body.display());
  info!("告警阈值: {}", args.threshold);

  let upload = ImageFileInput::from_url(&args.image)?.into_upload();
  let body = std::fs::read_to_string(&args.body)
    .with_context(|| format!("无法读取告警正文: {}", args.body.display()))?;

  let config = AlertConfig::default()
    .with_threshold(args.threshold)
    .with_channel(args.channel)
    .with_jpeg_quality(args.quality)
    .with_font(args.font, args.font_size);

  let hub = ChannelHub::default();
  let mut subscription = hub.subscribe(&config.channel)?;
  let pipeline = AlertPipeline::new(config, hub.clone())?;

  let now = std::time::Instant::now();
  let response = pipeline.handle_parts(Some(&body), Some(upload)).await;
  info!("告警处理完成，耗时: {:.2?}", now.elapsed());
  println!("{}", serde_json::to_string_pretty(&response)?);

  match subscription.try_recv() {
    Some(delivery) => {
      info!("订阅者收到告警: {}", delivery.message);
      if let Some(output) = &args.output {
        let path = save_delivery(output, &delivery)?;
        info!("告警图像已保存: {}", path.display());
      }
    }
    None => warn!("订阅者没有收到告警"),
  }

  if !response.is_success() {
    bail!("告警失败 ({}): {}", response.http_status(), response.message);
  }

  Ok(())
}
