// 该文件是 Shanan （山南西风） 项目的一部分。
// src/broadcast.rs - 告警频道广播
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

use std::{
  collections::HashMap,
  fmt,
  sync::{Arc, Weak},
  time::Duration,
};

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::{
  self,
  error::{SendTimeoutError, TrySendError},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const ALERT_MESSAGE_TYPE: &str = "alert_message";
pub const MAX_CHANNEL_NAME_LEN: usize = 256;
const DEFAULT_SUBSCRIBER_CAPACITY: usize = 16;

/// 推送给订阅者的告警消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertMessage {
  #[serde(rename = "type")]
  pub kind: String,
  pub message: String,
  /// base64 编码的 JPEG
  pub image: String,
}

impl AlertMessage {
  pub fn new(message: impl Into<String>, image: impl Into<String>) -> Self {
    Self {
      kind: ALERT_MESSAGE_TYPE.to_string(),
      message: message.into(),
      image: image.into(),
    }
  }

  pub fn to_json(&self) -> serde_json::Value {
    serde_json::json!({
      "type": self.kind,
      "message": self.message,
      "image": self.image,
    })
  }
}

/// 同一次发布的所有订阅者共享同一份消息
pub type Delivery = Arc<AlertMessage>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
  #[error("Channel hub is closed")]
  Closed,
  #[error("Invalid channel name: {0}")]
  InvalidChannel(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
  pub delivered: usize,
  /// 队列已满或超时而未送达
  pub dropped: usize,
  /// 接收端已关闭而被移除
  pub pruned: usize,
}

#[async_trait]
pub trait Broadcast: Send + Sync {
  async fn publish(
    &self,
    channel: &str,
    message: AlertMessage,
  ) -> Result<PublishReport, PublishError>;
}

#[async_trait]
impl<B: Broadcast + ?Sized> Broadcast for Arc<B> {
  async fn publish(
    &self,
    channel: &str,
    message: AlertMessage,
  ) -> Result<PublishReport, PublishError> {
    (**self).publish(channel, message).await
  }
}

/// 单个订阅者的投递策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
  /// 非阻塞投递，订阅者队列已满时丢弃
  DropOnFull,
  /// 每个订阅者最多等待给定时长，所有投递并发进行
  Timeout(Duration),
}

#[derive(Debug, Clone)]
pub struct HubConfig {
  pub capacity: usize,
  pub policy: DeliveryPolicy,
}

impl Default for HubConfig {
  fn default() -> Self {
    Self {
      capacity: DEFAULT_SUBSCRIBER_CAPACITY,
      policy: DeliveryPolicy::DropOnFull,
    }
  }
}

impl HubConfig {
  pub fn with_capacity(mut self, capacity: usize) -> Self {
    self.capacity = capacity;
    self
  }

  pub fn with_policy(mut self, policy: DeliveryPolicy) -> Self {
    self.policy = policy;
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
  fn new() -> Self {
    SubscriberId(Uuid::new_v4())
  }
}

impl fmt::Display for SubscriberId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

fn validate_channel(channel: &str) -> Result<(), PublishError> {
  if channel.is_empty() {
    return Err(PublishError::InvalidChannel("empty".to_string()));
  }
  if channel.len() > MAX_CHANNEL_NAME_LEN {
    return Err(PublishError::InvalidChannel(format!(
      "longer than {} bytes",
      MAX_CHANNEL_NAME_LEN
    )));
  }
  if channel.chars().any(char::is_control) {
    return Err(PublishError::InvalidChannel(
      "contains control characters".to_string(),
    ));
  }
  Ok(())
}

type Senders = HashMap<SubscriberId, mpsc::Sender<Delivery>>;

#[derive(Default)]
struct HubState {
  closed: bool,
  channels: HashMap<String, Senders>,
}

struct HubInner {
  config: HubConfig,
  state: RwLock<HubState>,
}

impl HubInner {
  fn remove(&self, channel: &str, id: SubscriberId) -> bool {
    let mut state = self.state.write();
    let Some(senders) = state.channels.get_mut(channel) else {
      return false;
    };
    let removed = senders.remove(&id).is_some();
    if senders.is_empty() {
      state.channels.remove(channel);
    }
    removed
  }

  fn snapshot(
    &self,
    channel: &str,
  ) -> Result<Vec<(SubscriberId, mpsc::Sender<Delivery>)>, PublishError> {
    let state = self.state.read();
    if state.closed {
      return Err(PublishError::Closed);
    }
    Ok(
      state
        .channels
        .get(channel)
        .map(|senders| senders.iter().map(|(id, tx)| (*id, tx.clone())).collect())
        .unwrap_or_default(),
    )
  }
}

/// 进程内的命名频道集合；发布只送达调用时已连接的订阅者，不排队、不重放
#[derive(Clone)]
pub struct ChannelHub {
  inner: Arc<HubInner>,
}

impl Default for ChannelHub {
  fn default() -> Self {
    Self::new(HubConfig::default())
  }
}

impl ChannelHub {
  pub fn new(config: HubConfig) -> Self {
    Self {
      inner: Arc::new(HubInner {
        config,
        state: RwLock::new(HubState::default()),
      }),
    }
  }

  pub fn subscribe(&self, channel: &str) -> Result<Subscription, PublishError> {
    validate_channel(channel)?;

    let (tx, rx) = mpsc::channel(self.inner.config.capacity.max(1));
    let id = SubscriberId::new();
    {
      let mut state = self.inner.state.write();
      if state.closed {
        return Err(PublishError::Closed);
      }
      state
        .channels
        .entry(channel.to_string())
        .or_default()
        .insert(id, tx);
    }
    debug!("订阅者 {} 加入频道 {}", id, channel);

    Ok(Subscription {
      id,
      channel: channel.to_string(),
      receiver: rx,
      hub: Arc::downgrade(&self.inner),
    })
  }

  pub fn unsubscribe(&self, channel: &str, id: SubscriberId) -> bool {
    let removed = self.inner.remove(channel, id);
    if removed {
      debug!("订阅者 {} 离开频道 {}", id, channel);
    }
    removed
  }

  pub fn subscriber_count(&self, channel: &str) -> usize {
    self
      .inner
      .state
      .read()
      .channels
      .get(channel)
      .map(|senders| senders.len())
      .unwrap_or(0)
  }

  /// 关闭后拒绝新的订阅与发布，现有订阅者的接收端随即结束
  pub fn shutdown(&self) {
    let mut state = self.inner.state.write();
    state.closed = true;
    state.channels.clear();
    info!("频道中心已关闭");
  }

  pub fn is_closed(&self) -> bool {
    self.inner.state.read().closed
  }

  fn prune(&self, channel: &str, dead: &[SubscriberId]) -> usize {
    dead
      .iter()
      .filter(|id| self.inner.remove(channel, **id))
      .count()
  }
}

#[async_trait]
impl Broadcast for ChannelHub {
  async fn publish(
    &self,
    channel: &str,
    message: AlertMessage,
  ) -> Result<PublishReport, PublishError> {
    validate_channel(channel)?;
    let targets = self.inner.snapshot(channel)?;
    if targets.is_empty() {
      debug!("频道 {} 当前没有订阅者", channel);
      return Ok(PublishReport::default());
    }

    let delivery: Delivery = Arc::new(message);
    let mut report = PublishReport::default();
    let mut dead = Vec::new();

    match self.inner.config.policy {
      DeliveryPolicy::DropOnFull => {
        for (id, tx) in &targets {
          match tx.try_send(delivery.clone()) {
            Ok(()) => report.delivered += 1,
            Err(TrySendError::Full(_)) => {
              warn!("订阅者 {} 队列已满，丢弃告警", id);
              report.dropped += 1;
            }
            Err(TrySendError::Closed(_)) => dead.push(*id),
          }
        }
      }
      DeliveryPolicy::Timeout(limit) => {
        let sends = targets.iter().map(|(id, tx)| {
          let delivery = delivery.clone();
          async move { (*id, tx.send_timeout(delivery, limit).await) }
        });
        for (id, result) in join_all(sends).await {
          match result {
            Ok(()) => report.delivered += 1,
            Err(SendTimeoutError::Timeout(_)) => {
              warn!("订阅者 {} 投递超时 ({:?})，丢弃告警", id, limit);
              report.dropped += 1;
            }
            Err(SendTimeoutError::Closed(_)) => dead.push(id),
          }
        }
      }
    }

    report.pruned = self.prune(channel, &dead);
    debug!("频道 {} 发布完成: {:?}", channel, report);
    Ok(report)
  }
}

/// 频道订阅句柄，析构时自动退订
pub struct Subscription {
  id: SubscriberId,
  channel: String,
  receiver: mpsc::Receiver<Delivery>,
  hub: Weak<HubInner>,
}

impl Subscription {
  pub fn id(&self) -> SubscriberId {
    self.id
  }

  pub fn channel(&self) -> &str {
    &self.channel
  }

  pub async fn recv(&mut self) -> Option<Delivery> {
    self.receiver.recv().await
  }

  pub fn try_recv(&mut self) -> Option<Delivery> {
    self.receiver.try_recv().ok()
  }

  /// 停止接收；该订阅者会在下一次发布时被移除
  pub fn close(&mut self) {
    self.receiver.close();
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(hub) = self.hub.upgrade() {
      hub.remove(&self.channel, self.id);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const CHANNEL: &str = "alert_group";

  #[tokio::test]
  async fn test_publish_without_subscribers_succeeds() {
    let hub = ChannelHub::default();
    let report = hub
      .publish(CHANNEL, AlertMessage::new("hello", "AAAA"))
      .await
      .unwrap();
    assert_eq!(report, PublishReport::default());
  }

  #[tokio::test]
  async fn test_every_subscriber_gets_the_same_message() {
    let hub = ChannelHub::default();
    let mut a = hub.subscribe(CHANNEL).unwrap();
    let mut b = hub.subscribe(CHANNEL).unwrap();
    let mut other = hub.subscribe("other").unwrap();

    let report = hub
      .publish(CHANNEL, AlertMessage::new("intrusion", "QUJD"))
      .await
      .unwrap();
    assert_eq!(report.delivered, 2);

    let got_a = a.recv().await.unwrap();
    let got_b = b.recv().await.unwrap();
    assert!(Arc::ptr_eq(&got_a, &got_b));
    assert_eq!(got_a.kind, "alert_message");
    assert_eq!(got_a.message, "intrusion");
    assert!(other.try_recv().is_none());
  }

  #[tokio::test]
  async fn test_full_queue_drops_instead_of_blocking() {
    let hub = ChannelHub::new(HubConfig::default().with_capacity(1));
    let mut slow = hub.subscribe(CHANNEL).unwrap();

    let first = hub.publish(CHANNEL, AlertMessage::new("1", "")).await.unwrap();
    let second = hub.publish(CHANNEL, AlertMessage::new("2", "")).await.unwrap();
    assert_eq!(first.delivered, 1);
    assert_eq!(second.dropped, 1);
    assert_eq!(slow.recv().await.unwrap().message, "1");
    assert!(slow.try_recv().is_none());
  }

  #[tokio::test]
  async fn test_timeout_policy_bounds_slow_subscriber() {
    let hub = ChannelHub::new(
      HubConfig::default()
        .with_capacity(1)
        .with_policy(DeliveryPolicy::Timeout(Duration::from_millis(20))),
    );
    let _slow = hub.subscribe(CHANNEL).unwrap();
    let mut fast = hub.subscribe(CHANNEL).unwrap();

    hub.publish(CHANNEL, AlertMessage::new("1", "")).await.unwrap();
    fast.recv().await.unwrap();

    let report = hub.publish(CHANNEL, AlertMessage::new("2", "")).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(report.dropped, 1);
    assert_eq!(fast.recv().await.unwrap().message, "2");
  }

  #[tokio::test]
  async fn test_drop_and_close_remove_subscribers() {
    let hub = ChannelHub::default();
    let dropped = hub.subscribe(CHANNEL).unwrap();
    let mut closed = hub.subscribe(CHANNEL).unwrap();
    assert_eq!(hub.subscriber_count(CHANNEL), 2);

    drop(dropped);
    assert_eq!(hub.subscriber_count(CHANNEL), 1);

    closed.close();
    let report = hub.publish(CHANNEL, AlertMessage::new("x", "")).await.unwrap();
    assert_eq!(report.pruned, 1);
    assert_eq!(hub.subscriber_count(CHANNEL), 0);
  }

  #[tokio::test]
  async fn test_explicit_unsubscribe() {
    let hub = ChannelHub::default();
    let mut gone = hub.subscribe(CHANNEL).unwrap();
    let mut kept = hub.subscribe(CHANNEL).unwrap();
    assert_eq!(gone.channel(), CHANNEL);
    assert_ne!(gone.id(), kept.id());

    assert!(hub.unsubscribe(gone.channel(), gone.id()));
    assert!(!hub.unsubscribe(CHANNEL, gone.id()));
    assert!(!hub.unsubscribe("other", kept.id()));
    assert_eq!(hub.subscriber_count(CHANNEL), 1);

    let report = hub
      .publish(CHANNEL, AlertMessage::new("after", "AAAA"))
      .await
      .unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(kept.try_recv().unwrap().message, "after");
    // 发送端已移除，接收端随之结束
    assert!(gone.recv().await.is_none());

    drop(gone);
    assert_eq!(hub.subscriber_count(CHANNEL), 1);
  }

  #[tokio::test]
  async fn test_shutdown_and_invalid_names() {
    let hub = ChannelHub::default();
    assert!(matches!(
      hub.subscribe(""),
      Err(PublishError::InvalidChannel(_))
    ));
    assert!(matches!(
      hub.publish("bad\nname", AlertMessage::new("x", "")).await,
      Err(PublishError::InvalidChannel(_))
    ));

    let mut sub = hub.subscribe(CHANNEL).unwrap();
    hub.shutdown();
    assert!(hub.is_closed());
    assert!(sub.recv().await.is_none());
    assert_eq!(
      hub.publish(CHANNEL, AlertMessage::new("x", "")).await,
      Err(PublishError::Closed)
    );
    assert!(matches!(hub.subscribe(CHANNEL), Err(PublishError::Closed)));
  }

  #[test]
  fn test_wire_format() {
    let json = AlertMessage::new("fire", "aGk=").to_json();
    assert_eq!(
      json,
      serde_json::json!({"type": "alert_message", "message": "fire", "image": "aGk="})
    );
    let parsed: AlertMessage = serde_json::from_value(json).unwrap();
    assert_eq!(parsed.kind, ALERT_MESSAGE_TYPE);
  }
}
