// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/broadcast_concurrency.rs - 频道并发发布测试
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

use std::{collections::HashSet, io::Cursor, sync::Arc, time::Duration};

use image::{ImageFormat, Rgb, RgbImage};
use shanan_alert::{
  AlertConfig, AlertMessage, AlertPipeline, AlertRequest, BoundingBox, Broadcast, ChannelHub,
  DeliveryPolicy, Detection, HubConfig, ImageUpload,
};

const CHANNEL: &str = "alert_group";
const PUBLISHES: usize = 64;
const SUBSCRIBERS: usize = 8;

fn payload(index: usize) -> AlertMessage {
  // 图像字段较大且与编号绑定，用于检查消息是否完整
  AlertMessage::new(format!("alert-{index}"), format!("{index}:").repeat(512))
}

fn assert_intact(message: &AlertMessage) -> usize {
  let index: usize = message
    .message
    .strip_prefix("alert-")
    .and_then(|id| id.parse().ok())
    .unwrap();
  assert_eq!(message.kind, "alert_message");
  assert_eq!(message.image, format!("{index}:").repeat(512));
  index
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishes_reach_every_subscriber_once() {
  let hub = ChannelHub::new(HubConfig::default().with_capacity(PUBLISHES));
  let subscriptions: Vec<_> = (0..SUBSCRIBERS)
    .map(|_| hub.subscribe(CHANNEL).unwrap())
    .collect();

  let publishers: Vec<_> = (0..PUBLISHES)
    .map(|index| {
      let hub = hub.clone();
      tokio::spawn(async move { hub.publish(CHANNEL, payload(index)).await })
    })
    .collect();
  for publisher in publishers {
    let report = publisher.await.unwrap().unwrap();
    assert_eq!(report.delivered, SUBSCRIBERS);
    assert_eq!(report.dropped, 0);
  }

  for mut subscription in subscriptions {
    let mut seen = HashSet::new();
    while let Some(message) = subscription.try_recv() {
      assert!(seen.insert(assert_intact(&message)), "duplicate delivery");
    }
    assert_eq!(seen, (0..PUBLISHES).collect::<HashSet<_>>());
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_membership_changes_during_publishing() {
  // 队列足够容纳全部消息，稳定订阅者不应丢失任何一条
  let hub = ChannelHub::new(
    HubConfig::default()
      .with_capacity(PUBLISHES)
      .with_policy(DeliveryPolicy::Timeout(Duration::from_millis(5))),
  );
  let mut steady = hub.subscribe(CHANNEL).unwrap();

  let churn = {
    let hub = hub.clone();
    tokio::spawn(async move {
      for _ in 0..200 {
        let subscription = hub.subscribe(CHANNEL).unwrap();
        tokio::task::yield_now().await;
        drop(subscription);
      }
    })
  };

  let reader = tokio::spawn(async move {
    let mut seen = HashSet::new();
    while seen.len() < PUBLISHES {
      match tokio::time::timeout(Duration::from_secs(5), steady.recv()).await {
        Ok(Some(message)) => {
          seen.insert(assert_intact(&message));
        }
        _ => break,
      }
    }
    seen
  });

  for index in 0..PUBLISHES {
    let report = hub.publish(CHANNEL, payload(index)).await.unwrap();
    assert!(report.delivered >= 1, "publish {index}: {report:?}");
    assert_eq!(report.dropped, 0);
  }
  churn.await.unwrap();

  let seen = reader.await.unwrap();
  assert_eq!(seen, (0..PUBLISHES).collect::<HashSet<_>>());
  assert_eq!(hub.subscriber_count(CHANNEL), 1);
}

fn source_png() -> Vec<u8> {
  let image = RgbImage::from_pixel(64, 48, Rgb([90, 90, 90]));
  let mut buf = Cursor::new(Vec::new());
  image.write_to(&mut buf, ImageFormat::Png).unwrap();
  buf.into_inner()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pipeline_invocations() {
  const ALERTS: usize = 12;

  let hub = ChannelHub::new(HubConfig::default().with_capacity(ALERTS));
  let mut subscribers: Vec<_> = (0..3).map(|_| hub.subscribe(CHANNEL).unwrap()).collect();
  let pipeline = Arc::new(AlertPipeline::new(AlertConfig::default(), hub.clone()).unwrap());
  let png = source_png();

  let tasks: Vec<_> = (0..ALERTS)
    .map(|index| {
      let pipeline = Arc::clone(&pipeline);
      let upload = ImageUpload::new(png.clone());
      tokio::spawn(async move {
        let detection = Detection::new("person", 90.0, BoundingBox::new(4.0, 4.0, 40.0, 40.0));
        pipeline
          .handle(AlertRequest::new(format!("alert-{index}"), vec![detection], Some(upload)))
          .await
      })
    })
    .collect();
  for task in tasks {
    assert!(task.await.unwrap().is_success());
  }

  for subscriber in subscribers.iter_mut() {
    let mut seen = HashSet::new();
    while let Some(message) = subscriber.try_recv() {
      assert!(seen.insert(message.message.clone()));
    }
    assert_eq!(seen.len(), ALERTS);
  }
}
