// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/alert_burst.rs - 并发告警压测程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use shanan_alert::{
  AlertConfig, AlertPipeline, AlertRequest, ChannelHub, DeliveryPolicy, FromUrl, HubConfig,
  input::ImageFileInput,
};

/// 并发告警压测参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像，例如 image:///data/frame.jpg
  #[arg(long, value_name = "SOURCE")]
  pub image: Url,
  /// 告警 JSON 正文: {"message": ..., "detections": [...]}
  #[arg(long, value_name = "FILE")]
  pub body: PathBuf,
  /// 并发告警数
  #[arg(long, default_value = "100", value_name = "COUNT")]
  pub alerts: usize,
  /// 本地订阅者数
  #[arg(long, default_value = "4", value_name = "COUNT")]
  pub subscribers: usize,
  /// 每个订阅者的队列长度
  #[arg(long, default_value = "16", value_name = "COUNT")]
  pub capacity: usize,
  /// 单个订阅者投递超时（毫秒），缺省时队列满即丢弃
  #[arg(long, value_name = "MS")]
  pub timeout_ms: Option<u64>,
  /// 订阅者处理每条消息的模拟耗时（毫秒）
  #[arg(long, default_value = "0", value_name = "MS")]
  pub consume_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入图像: {}", args.image);
  info!("并发告警数: {}, 订阅者数: {}", args.alerts, args.subscribers);

  let upload = ImageFileInput::from_url(&args.image)?.into_upload();
  let body = std::fs::read_to_string(&args.body)
    .with_context(|| format!("无法读取告警正文: {}", args.body.display()))?;
  let template = AlertRequest::from_parts(Some(&body), Some(upload))?;

  let policy = match args.timeout_ms {
    Some(ms) => DeliveryPolicy::Timeout(Duration::from_millis(ms)),
    None => DeliveryPolicy::DropOnFull,
  };
  let hub = ChannelHub::new(
    HubConfig::default()
      .with_capacity(args.capacity)
      .with_policy(policy),
  );
  let config = AlertConfig::default();

  let consume = Duration::from_millis(args.consume_ms);
  let mut readers = Vec::with_capacity(args.subscribers);
  for i in 0..args.subscribers {
    let mut subscription = hub.subscribe(&config.channel)?;
    readers.push(tokio::spawn(async move {
      let mut received = 0usize;
      while subscription.recv().await.is_some() {
        received += 1;
        if !consume.is_zero() {
          tokio::time::sleep(consume).await;
        }
      }
      (i, received)
    }));
  }

  let pipeline = Arc::new(AlertPipeline::new(config, hub.clone())?);

  info!("开始发送告警...");
  let started = std::time::Instant::now();
  let tasks: Vec<_> = (0..args.alerts)
    .map(|i| {
      let pipeline = Arc::clone(&pipeline);
      let mut request = template.clone();
      request.message = format!("{} #{}", request.message, i);
      tokio::spawn(async move {
        let now = std::time::Instant::now();
        let response = pipeline.handle(request).await;
        (response, now.elapsed())
      })
    })
    .collect();

  let mut times = Vec::with_capacity(args.alerts);
  let mut failures = 0usize;
  for task in tasks {
    let (response, elapsed) = task.await?;
    if !response.is_success() {
      failures += 1;
    }
    times.push(elapsed);
  }
  let total = started.elapsed();

  hub.shutdown();
  for reader in readers {
    let (i, received) = reader.await?;
    info!("订阅者 {} 收到 {} 条告警", i, received);
  }

  if !times.is_empty() {
    warn!(
      "平均处理时间: {:.2?}, 总耗时: {:.2?}, 失败: {}",
      times.iter().sum::<Duration>() / times.len() as u32,
      total,
      failures
    );
  }

  Ok(())
}
