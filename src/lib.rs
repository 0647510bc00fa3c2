// 该文件是 Shanan （山南西风） 项目的一部分。
// src/lib.rs - 告警库主文件
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

pub mod broadcast;
pub mod config;
pub mod detection;
pub mod error;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod request;

pub use self::broadcast::{
  AlertMessage, Broadcast, ChannelHub, Delivery, DeliveryPolicy, HubConfig, PublishError,
  PublishReport, SubscriberId, Subscription,
};
pub use self::config::AlertConfig;
pub use self::detection::{ALERT_SCORE_THRESHOLD, BoundingBox, Detection, DetectionSet, filter};
pub use self::error::AlertError;
pub use self::input::ImageUpload;
pub use self::pipeline::{AlertOutcome, AlertPipeline, AlertResponse, AlertStatus};
pub use self::request::AlertRequest;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}
