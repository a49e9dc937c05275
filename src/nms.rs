// 该文件是 AclYolo 项目的一部分。
// src/nms.rs - 边界框几何与非极大值抑制
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

use tracing::debug;

use crate::model::{Candidate, Detection};

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// 边界框 `[x1, y1, x2, y2]`
///
/// 退化的模型输出可能产生 `x1 > x2` 或 `y1 > y2`，几何计算时负的宽高按 0 处理。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl BoundingBox {
  pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  /// 由中心点和宽高构造
  pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
    Self {
      x1: cx - w / 2.0,
      y1: cy - h / 2.0,
      x2: cx + w / 2.0,
      y2: cy + h / 2.0,
    }
  }

  pub fn width(&self) -> f32 {
    (self.x2 - self.x1).max(0.0)
  }

  pub fn height(&self) -> f32 {
    (self.y2 - self.y1).max(0.0)
  }

  pub fn area(&self) -> f32 {
    self.width() * self.height()
  }

  pub fn intersection(&self, other: &Self) -> f32 {
    let inter_w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
    let inter_h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
    inter_w * inter_h
  }

  /// 交并比，取值 `[0, 1]`；并集面积为 0 时返回 0
  pub fn iou(&self, other: &Self) -> f32 {
    let intersection = self.intersection(other);
    let union = self.area() + other.area() - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }

  pub fn as_array(&self) -> [f32; 4] {
    [self.x1, self.y1, self.x2, self.y2]
  }
}

/// 类别无关的贪心 NMS
///
/// 按置信度降序处理，置信度相同时先解码的候选框优先；与已保留框 IoU `>= iou_threshold`
/// 的候选框被抑制，不区分类别。输出顺序即保留顺序。
pub fn suppress(candidates: &[Candidate], iou_threshold: f32) -> Vec<Detection> {
  let n = candidates.len();
  if n == 0 {
    return Vec::new();
  }

  // sort_by 是稳定排序，相同置信度保持插入顺序
  let mut order: Vec<usize> = (0..n).collect();
  order.sort_by(|&a, &b| {
    candidates[b]
      .confidence()
      .total_cmp(&candidates[a].confidence())
  });

  let mut suppressed = vec![false; n];
  let mut keep = Vec::new();

  for (pos, &best_idx) in order.iter().enumerate() {
    if suppressed[best_idx] {
      continue;
    }

    let best = &candidates[best_idx];
    keep.push(*best);

    for &idx in &order[pos + 1..] {
      if suppressed[idx] {
        continue;
      }
      if best.bbox().iou(candidates[idx].bbox()) >= iou_threshold {
        suppressed[idx] = true;
      }
    }
  }

  debug!("NMS: {} 个候选框 → {} 个检测结果", n, keep.len());
  keep
}

#[cfg(test)]
mod tests {
  use super::*;

  fn candidate(bbox: [f32; 4], class_id: u32, confidence: f32) -> Candidate {
    Candidate::new(
      BoundingBox::new(bbox[0], bbox[1], bbox[2], bbox[3]),
      class_id,
      confidence,
    )
  }

  #[test]
  fn iou_of_box_with_itself_is_one() {
    let b = BoundingBox::new(10.0, 20.0, 50.0, 80.0);
    assert_eq!(b.iou(&b), 1.0);
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
    assert_eq!(a.iou(&b), 0.0);

    // 只共享一条边
    let c = BoundingBox::new(10.0, 0.0, 20.0, 10.0);
    assert_eq!(a.iou(&c), 0.0);
  }

  #[test]
  fn iou_is_symmetric() {
    let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BoundingBox::new(5.0, 3.0, 17.0, 11.0);
    assert_eq!(a.iou(&b), b.iou(&a));
    assert!(a.iou(&b) > 0.0 && a.iou(&b) < 1.0);
  }

  #[test]
  fn degenerate_boxes_have_zero_area() {
    let inverted = BoundingBox::new(10.0, 10.0, 0.0, 0.0);
    assert_eq!(inverted.area(), 0.0);
    assert_eq!(inverted.iou(&inverted), 0.0);

    let normal = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    assert_eq!(inverted.iou(&normal), 0.0);

    let flat = BoundingBox::from_center(5.0, 5.0, 4.0, 0.0);
    assert_eq!(flat.area(), 0.0);
    assert_eq!(flat.iou(&normal), 0.0);
  }

  #[test]
  fn empty_input_gives_empty_output() {
    assert!(suppress(&[], 0.45).is_empty());
  }

  #[test]
  fn identical_boxes_keep_highest_confidence() {
    let candidates = [
      candidate([0.0, 0.0, 10.0, 10.0], 1, 0.8),
      candidate([0.0, 0.0, 10.0, 10.0], 1, 0.9),
    ];
    let result = suppress(&candidates, 0.45);
    assert_eq!(result, vec![candidates[1]]);
  }

  #[test]
  fn disjoint_boxes_all_survive() {
    let candidates = [
      candidate([0.0, 0.0, 10.0, 10.0], 0, 0.5),
      candidate([100.0, 100.0, 110.0, 110.0], 0, 0.7),
    ];
    for threshold in [1e-6, 0.1, 0.45, 1.0] {
      let result = suppress(&candidates, threshold);
      assert_eq!(result, vec![candidates[1], candidates[0]]);
    }
  }

  #[test]
  fn suppression_ignores_class() {
    let candidates = [
      candidate([0.0, 0.0, 10.0, 10.0], 2, 0.6),
      candidate([1.0, 0.0, 11.0, 10.0], 7, 0.95),
    ];
    let result = suppress(&candidates, 0.45);
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].class_id(), 7);
  }

  #[test]
  fn iou_equal_to_threshold_is_suppressed() {
    // 交集 2，并集 4
    let candidates = [
      candidate([0.0, 0.0, 3.0, 1.0], 0, 0.9),
      candidate([1.0, 0.0, 4.0, 1.0], 0, 0.8),
    ];
    assert_eq!(candidates[0].bbox().iou(candidates[1].bbox()), 0.5);
    assert_eq!(suppress(&candidates, 0.5).len(), 1);
    assert_eq!(suppress(&candidates, 0.51).len(), 2);
  }

  #[test]
  fn ties_prefer_earlier_candidate() {
    let candidates = [
      candidate([0.0, 0.0, 10.0, 10.0], 3, 0.7),
      candidate([0.0, 0.0, 10.0, 10.0], 4, 0.7),
      candidate([50.0, 50.0, 60.0, 60.0], 5, 0.7),
    ];
    let result = suppress(&candidates, 0.45);
    assert_eq!(result, vec![candidates[0], candidates[2]]);
  }

  #[test]
  fn output_is_descending_confidence() {
    let candidates = [
      candidate([0.0, 0.0, 10.0, 10.0], 0, 0.3),
      candidate([20.0, 0.0, 30.0, 10.0], 0, 0.9),
      candidate([40.0, 0.0, 50.0, 10.0], 0, 0.6),
    ];
    let confidences: Vec<f32> = suppress(&candidates, 0.45)
      .iter()
      .map(|d| d.confidence())
      .collect();
    assert_eq!(confidences, vec![0.9, 0.6, 0.3]);
  }

  #[test]
  fn suppression_is_idempotent_and_reducing() {
    let mut candidates = Vec::new();
    for i in 0..40u32 {
      let offset = (i % 7) as f32 * 6.0;
      let size = 10.0 + (i % 5) as f32 * 3.0;
      let confidence = 0.3 + ((i * 37) % 61) as f32 / 100.0;
      candidates.push(candidate(
        [offset, offset / 2.0, offset + size, offset / 2.0 + size],
        i % 3,
        confidence,
      ));
    }
    // 退化框
    candidates.push(candidate([5.0, 5.0, 1.0, 1.0], 0, 0.99));

    for threshold in [0.1, 0.3, 0.45, 0.7, 1.0] {
      let once = suppress(&candidates, threshold);
      assert!(once.len() <= candidates.len());
      let twice = suppress(&once, threshold);
      assert_eq!(once, twice);
    }
  }
}
