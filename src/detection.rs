// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detection.rs - 检测结果与告警阈值过滤
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

use serde::{Deserialize, Serialize};

/// 告警阈值：得分（0 - 100）不低于该值的检测才会触发告警
pub const ALERT_SCORE_THRESHOLD: f64 = 75.0;

const UNKNOWN_KIND: &str = "Unknown";

fn unknown_kind() -> String {
  UNKNOWN_KIND.to_string()
}

/// 像素坐标下的边界框，任一字段缺失时由绘制阶段以图像边缘补齐
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub x_min: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub y_min: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub x_max: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub y_max: Option<f64>,
}

impl BoundingBox {
  pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
    Self {
      x_min: Some(x_min),
      y_min: Some(y_min),
      x_max: Some(x_max),
      y_max: Some(y_max),
    }
  }
}

/// 单个检测结果，线上格式为扁平的 `{type, score, xMin, yMin, xMax, yMax}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  #[serde(rename = "type", default = "unknown_kind")]
  pub kind: String,
  #[serde(default)]
  pub score: f64,
  #[serde(flatten)]
  pub bbox: BoundingBox,
}

impl Detection {
  pub fn new(kind: impl Into<String>, score: f64, bbox: BoundingBox) -> Self {
    Self {
      kind: kind.into(),
      score,
      bbox,
    }
  }

  /// 标签文本，例如 `person (80)`
  pub fn label(&self) -> String {
    format!("{} ({})", self.kind, self.score)
  }

  pub fn qualifies(&self, threshold: f64) -> bool {
    self.score >= threshold
  }
}

/// 按渲染顺序排列的检测集合
pub type DetectionSet = Vec<Detection>;

/// 保留得分不低于 `threshold` 的检测，顺序不变
pub fn filter(detections: &[Detection], threshold: f64) -> DetectionSet {
  detections
    .iter()
    .filter(|det| det.qualifies(threshold))
    .cloned()
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn det(kind: &str, score: f64) -> Detection {
    Detection::new(kind, score, BoundingBox::new(0.0, 0.0, 10.0, 10.0))
  }

  #[test]
  fn test_filter_keeps_order_and_boundary() {
    let input = vec![
      det("person", 80.0),
      det("car", 40.0),
      det("dog", 75.0),
      det("cat", 74.999),
    ];
    let kept = filter(&input, ALERT_SCORE_THRESHOLD);
    let kinds: Vec<&str> = kept.iter().map(|d| d.kind.as_str()).collect();
    assert_eq!(kinds, vec!["person", "dog"]);
  }

  #[test]
  fn test_filter_empty() {
    assert!(filter(&[], ALERT_SCORE_THRESHOLD).is_empty());
  }

  #[test]
  fn test_nan_score_never_qualifies() {
    assert!(filter(&[det("ghost", f64::NAN)], 0.0).is_empty());
  }

  #[test]
  fn test_deserialize_flat_wire_format() {
    let json = r#"{"type":"person","score":80,"xMin":10,"yMin":10,"xMax":50,"yMax":90}"#;
    let parsed: Detection = serde_json::from_str(json).unwrap();
    assert_eq!(parsed.kind, "person");
    assert_eq!(parsed.score, 80.0);
    assert_eq!(parsed.bbox, BoundingBox::new(10.0, 10.0, 50.0, 90.0));
  }

  #[test]
  fn test_deserialize_defaults() {
    let parsed: Detection = serde_json::from_str(r#"{"xMin": 4}"#).unwrap();
    assert_eq!(parsed.kind, "Unknown");
    assert_eq!(parsed.score, 0.0);
    assert_eq!(parsed.bbox.x_min, Some(4.0));
    assert_eq!(parsed.bbox.x_max, None);
  }

  #[test]
  fn test_label_format() {
    assert_eq!(det("person", 80.0).label(), "person (80)");
    assert_eq!(det("person", 80.5).label(), "person (80.5)");
  }
}
