// 该文件是 AclYolo 项目的一部分。
// src/decode.rs - 原始输出解码为候选框
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

use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, error};

use crate::{
  model::Candidate,
  nms::BoundingBox,
  tensor::{TensorError, decode_f32_le},
};

pub const DEFAULT_CONF_THRESHOLD: f32 = 0.25;
pub const BOX_ATTRS: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
  #[error("输出字节长度 {0} 不是 4 的整数倍")]
  Misaligned(usize),
  #[error("输出元素数 {floats} 不是属性数 {num_attrs} 的整数倍")]
  AttributeMismatch { floats: usize, num_attrs: usize },
}

/// 推理引擎返回的一块输出，按小端 float32 解释
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawOutput {
  data: Box<[u8]>,
}

impl From<Vec<u8>> for RawOutput {
  fn from(data: Vec<u8>) -> Self {
    Self {
      data: data.into_boxed_slice(),
    }
  }
}

impl AsRef<[u8]> for RawOutput {
  fn as_ref(&self) -> &[u8] {
    &self.data
  }
}

impl RawOutput {
  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn to_f32(&self) -> Result<Vec<f32>, FormatError> {
    decode_f32_le(&self.data).map_err(|err| match err {
      TensorError::Misaligned(len) => FormatError::Misaligned(len),
      TensorError::LengthMismatch { .. } => FormatError::Misaligned(self.data.len()),
    })
  }
}

/// 输出张量中预测与属性的排列方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputLayout {
  /// `[num_attrs, num_preds]`：预测 `i` 的属性 `a` 位于 `i + num_preds * a`
  #[default]
  AttributeMajor,
  /// `[num_preds, num_attrs]`：预测 `i` 的属性 `a` 位于 `i * num_attrs + a`
  AttributeMinor,
}

impl FromStr for OutputLayout {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "attribute-major" | "major" => Ok(OutputLayout::AttributeMajor),
      "attribute-minor" | "minor" => Ok(OutputLayout::AttributeMinor),
      other => Err(format!("未知的输出布局: {}", other)),
    }
  }
}

pub fn decode(
  buffer: &RawOutput,
  num_classes: usize,
  conf_threshold: f32,
) -> Result<Vec<Candidate>, FormatError> {
  decode_with_layout(
    buffer,
    num_classes,
    conf_threshold,
    OutputLayout::AttributeMajor,
  )
}

/// 解码原始输出为候选框，输出顺序与预测下标一致
///
/// 每个预测取最大类别得分（严格大于才替换，相同得分时先出现的类别胜出），
/// 得分低于 `conf_threshold` 或没有任何正得分的预测被丢弃。
pub fn decode_with_layout(
  buffer: &RawOutput,
  num_classes: usize,
  conf_threshold: f32,
  layout: OutputLayout,
) -> Result<Vec<Candidate>, FormatError> {
  let preds = buffer.to_f32()?;
  let num_attrs = BOX_ATTRS + num_classes;

  if preds.len() % num_attrs != 0 {
    error!(
      "输出大小不匹配 - 元素数: {}, 属性数: {}",
      preds.len(),
      num_attrs
    );
    return Err(FormatError::AttributeMismatch {
      floats: preds.len(),
      num_attrs,
    });
  }

  let num_preds = preds.len() / num_attrs;
  debug!(
    "解码输出: {} 个预测, {} 个属性, 布局 {:?}",
    num_preds, num_attrs, layout
  );

  let value = |i: usize, a: usize| match layout {
    OutputLayout::AttributeMajor => preds[i + num_preds * a],
    OutputLayout::AttributeMinor => preds[i * num_attrs + a],
  };

  let mut candidates = Vec::new();
  for i in 0..num_preds {
    let mut max_prob = 0f32;
    let mut class_id = None;
    for c in 0..num_classes {
      let prob = value(i, BOX_ATTRS + c);
      if prob > max_prob {
        max_prob = prob;
        class_id = Some(c as u32);
      }
    }

    let class_id = match class_id {
      Some(id) if max_prob >= conf_threshold => id,
      _ => continue,
    };

    let bbox = BoundingBox::from_center(value(i, 0), value(i, 1), value(i, 2), value(i, 3));
    candidates.push(Candidate::new(bbox, class_id, max_prob));
  }

  debug!("置信度过滤后剩余 {} 个候选框", candidates.len());
  Ok(candidates)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tensor::encode_f32_le;

  const COCO: usize = 80;

  /// 按属性优先排列构造输出
  fn attribute_major(preds: &[Vec<f32>]) -> RawOutput {
    let num_attrs = preds[0].len();
    let mut flat = vec![0f32; preds.len() * num_attrs];
    for (i, pred) in preds.iter().enumerate() {
      for (a, v) in pred.iter().enumerate() {
        flat[i + preds.len() * a] = *v;
      }
    }
    RawOutput::from(encode_f32_le(&flat))
  }

  fn prediction(bbox: [f32; 4], scores: &[(usize, f32)], num_classes: usize) -> Vec<f32> {
    let mut pred = vec![0f32; BOX_ATTRS + num_classes];
    pred[..4].copy_from_slice(&bbox);
    for &(c, s) in scores {
      pred[BOX_ATTRS + c] = s;
    }
    pred
  }

  #[test]
  fn single_prediction_decodes_to_expected_box() {
    let buffer = attribute_major(&[prediction([320.0, 320.0, 100.0, 50.0], &[(3, 0.9)], COCO)]);
    let candidates = decode(&buffer, COCO, DEFAULT_CONF_THRESHOLD).unwrap();

    assert_eq!(candidates.len(), 1);
    let c = &candidates[0];
    assert_eq!(c.bbox().as_array(), [270.0, 295.0, 370.0, 345.0]);
    assert_eq!(c.class_id(), 3);
    assert_eq!(c.confidence(), 0.9);
  }

  #[test]
  fn threshold_is_inclusive() {
    let buffer = attribute_major(&[
      prediction([10.0, 10.0, 4.0, 4.0], &[(0, 0.25)], 2),
      prediction([20.0, 20.0, 4.0, 4.0], &[(1, 0.2499)], 2),
    ]);
    let candidates = decode(&buffer, 2, 0.25).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].confidence(), 0.25);
  }

  #[test]
  fn ties_keep_first_class() {
    let buffer = attribute_major(&[prediction(
      [5.0, 5.0, 2.0, 2.0],
      &[(1, 0.6), (2, 0.6), (3, 0.5)],
      4,
    )]);
    let candidates = decode(&buffer, 4, 0.25).unwrap();
    assert_eq!(candidates[0].class_id(), 1);
  }

  #[test]
  fn predictions_without_positive_score_are_dropped() {
    let buffer = attribute_major(&[
      prediction([5.0, 5.0, 2.0, 2.0], &[(0, -1.0), (1, 0.0)], 2),
      prediction([5.0, 5.0, 2.0, 2.0], &[], 2),
    ]);
    assert!(decode(&buffer, 2, 0.0).unwrap().is_empty());
    assert!(decode(&buffer, 2, -1.0).unwrap().is_empty());
  }

  #[test]
  fn output_follows_prediction_order() {
    let buffer = attribute_major(&[
      prediction([10.0, 10.0, 2.0, 2.0], &[(0, 0.3)], 2),
      prediction([20.0, 20.0, 2.0, 2.0], &[(1, 0.1)], 2),
      prediction([30.0, 30.0, 2.0, 2.0], &[(1, 0.9)], 2),
    ]);
    let candidates = decode(&buffer, 2, 0.25).unwrap();
    let centers: Vec<f32> = candidates.iter().map(|c| c.bbox().x1 + 1.0).collect();
    assert_eq!(centers, vec![10.0, 30.0]);
  }

  #[test]
  fn degenerate_extents_are_kept() {
    let buffer = attribute_major(&[prediction([10.0, 10.0, -4.0, 0.0], &[(0, 0.8)], 1)]);
    let candidates = decode(&buffer, 1, 0.25).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].bbox().as_array(), [12.0, 10.0, 8.0, 10.0]);
    assert_eq!(candidates[0].bbox().area(), 0.0);
  }

  #[test]
  fn layouts_read_different_strides() {
    // 两个预测，一个类别：属性优先为 [cx0 cx1 cy0 cy1 w0 w1 h0 h1 s0 s1]
    let floats = [
      10.0f32, 50.0, 10.0, 50.0, 4.0, 8.0, 4.0, 8.0, 0.9, 0.4,
    ];
    let buffer = RawOutput::from(encode_f32_le(&floats));

    let major = decode_with_layout(&buffer, 1, 0.25, OutputLayout::AttributeMajor).unwrap();
    assert_eq!(major.len(), 2);
    assert_eq!(major[0].bbox().as_array(), [8.0, 8.0, 12.0, 12.0]);
    assert_eq!(major[1].bbox().as_array(), [46.0, 46.0, 54.0, 54.0]);

    // 按预测优先解释：[10 50 10 50 4] 与 [8 4 8 0.9 0.4]
    let minor = decode_with_layout(&buffer, 1, 0.25, OutputLayout::AttributeMinor).unwrap();
    assert_eq!(minor.len(), 2);
    assert_eq!(minor[0].confidence(), 4.0);
    assert_eq!(minor[0].bbox().as_array(), [5.0, 25.0, 15.0, 75.0]);
    assert_eq!(minor[1].confidence(), 0.4);
    assert_eq!((minor[1].bbox().x1, minor[1].bbox().x2), (4.0, 12.0));
  }

  #[test]
  fn misaligned_buffer_is_format_error() {
    let buffer = RawOutput::from(vec![0u8; 4 * 84 + 2]);
    assert_eq!(
      decode(&buffer, COCO, 0.25),
      Err(FormatError::Misaligned(4 * 84 + 2))
    );
  }

  #[test]
  fn partial_prediction_is_format_error() {
    let buffer = RawOutput::from(encode_f32_le(&[0.0; 85]));
    assert_eq!(
      decode(&buffer, COCO, 0.25),
      Err(FormatError::AttributeMismatch {
        floats: 85,
        num_attrs: 84
      })
    );
  }

  #[test]
  fn empty_buffer_has_no_candidates() {
    assert!(decode(&RawOutput::default(), COCO, 0.25).unwrap().is_empty());
  }

  #[test]
  fn layout_parses_from_str() {
    assert_eq!(
      "attribute-major".parse::<OutputLayout>(),
      Ok(OutputLayout::AttributeMajor)
    );
    assert_eq!("minor".parse::<OutputLayout>(), Ok(OutputLayout::AttributeMinor));
    assert!("diagonal".parse::<OutputLayout>().is_err());
  }
}
