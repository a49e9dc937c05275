// 该文件是 AclYolo 项目的一部分。
// src/model.rs - 检测结果类型与类别标签
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

use std::path::PathBuf;

use crate::nms::BoundingBox;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 解码器产出的候选框，构造后不可变
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  bbox: BoundingBox,
  class_id: u32,
  confidence: f32,
}

/// NMS 之后保留下来的候选框
pub type Detection = Candidate;

impl Candidate {
  pub fn new(bbox: BoundingBox, class_id: u32, confidence: f32) -> Self {
    Self {
      bbox,
      class_id,
      confidence,
    }
  }

  /// 坐标位于张量像素空间 `[0, W] x [0, H]`
  pub fn bbox(&self) -> &BoundingBox {
    &self.bbox
  }

  pub fn class_id(&self) -> u32 {
    self.class_id
  }

  pub fn confidence(&self) -> f32 {
    self.confidence
  }

  pub fn label(&self) -> &'static str {
    coco_label(self.class_id)
  }
}

/// 单张图像的检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct DetectResult {
  pub source: PathBuf,
  /// 张量尺寸 `(W, H)`，即检测框坐标所在的空间
  pub tensor_size: (u32, u32),
  pub items: Box<[Detection]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

pub fn coco_label(class_id: u32) -> &'static str {
  COCO_CLASSES
    .get(class_id as usize)
    .copied()
    .unwrap_or("unknown")
}

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];
