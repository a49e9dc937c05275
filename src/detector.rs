// 该文件是 AclYolo 项目的一部分。
// src/detector.rs - YOLO 目标检测流水线
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

use thiserror::Error;
use tracing::{Level, debug, enabled, info};

use crate::{
  decode::{DEFAULT_CONF_THRESHOLD, FormatError, OutputLayout, RawOutput, decode_with_layout},
  engine::{EngineError, EngineSession, InferenceEngine},
  model::{DetectResult, Detection, Model},
  nms::{DEFAULT_IOU_THRESHOLD, suppress},
  preprocess::{ImageLoadError, PreprocessOptions, load_tensor_file, to_tensor},
  tensor::Tensor,
};

const COCO_CLASS_NUM: usize = 80;
const PREVIEW_VALUES: usize = 10;

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] ImageLoadError),
  #[error("输出格式错误: {0}")]
  FormatError(#[from] FormatError),
  #[error("推理引擎错误: {0}")]
  EngineError(#[from] EngineError),
  #[error("模型没有第 {index} 个输出, 共 {count} 个")]
  MissingOutput { index: usize, count: usize },
}

/// 检测参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
  pub preprocess: PreprocessOptions,
  pub num_classes: usize,
  pub conf_threshold: f32,
  pub iou_threshold: f32,
  pub layout: OutputLayout,
  /// 参与解码的输出下标
  pub output_index: usize,
  /// 输入为已序列化的小端 float32 张量文件，而非图像
  pub tensor_input: bool,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      preprocess: PreprocessOptions::default(),
      num_classes: COCO_CLASS_NUM,
      conf_threshold: DEFAULT_CONF_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      layout: OutputLayout::default(),
      output_index: 0,
      tensor_input: false,
    }
  }
}

/// 预处理 → 推理 → 解码 → NMS
pub struct Detector<E: InferenceEngine> {
  session: EngineSession<E>,
  config: DetectorConfig,
}

impl<E: InferenceEngine> Detector<E> {
  pub fn new(session: EngineSession<E>, config: DetectorConfig) -> Self {
    Self { session, config }
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn session(&self) -> &EngineSession<E> {
    &self.session
  }

  pub fn detect_tensor(&mut self, tensor: &Tensor) -> Result<Vec<Detection>, DetectorError> {
    let outputs = self.session.infer(tensor)?;
    self.postprocess(&outputs)
  }

  /// 后处理模型输出，坐标保持在张量像素空间
  pub fn postprocess(&self, outputs: &[RawOutput]) -> Result<Vec<Detection>, DetectorError> {
    if enabled!(Level::DEBUG) {
      for (i, output) in outputs.iter().enumerate() {
        if let Ok(values) = output.to_f32() {
          debug!(
            "输出[{}]: {} 字节, {} 个 float, 前若干值: {:?}",
            i,
            output.len(),
            values.len(),
            &values[..values.len().min(PREVIEW_VALUES)]
          );
        }
      }
    }

    let output = outputs
      .get(self.config.output_index)
      .ok_or(DetectorError::MissingOutput {
        index: self.config.output_index,
        count: outputs.len(),
      })?;

    let candidates = decode_with_layout(
      output,
      self.config.num_classes,
      self.config.conf_threshold,
      self.config.layout,
    )?;
    let detections = suppress(&candidates, self.config.iou_threshold);

    debug!(
      "候选框 {} 个, NMS 后 {} 个",
      candidates.len(),
      detections.len()
    );
    Ok(detections)
  }

  pub fn close(self) {
    self.session.close();
  }
}

impl<E: InferenceEngine> Model for Detector<E> {
  type Input = PathBuf;
  type Output = DetectResult;
  type Error = DetectorError;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let tensor = if self.config.tensor_input {
      load_tensor_file(input, &self.config.preprocess)?
    } else {
      to_tensor(input, &self.config.preprocess)?
    };
    let items = self.detect_tensor(&tensor)?;
    info!("{:?}: 检测到 {} 个物体", input, items.len());

    Ok(DetectResult {
      source: input.clone(),
      tensor_size: (self.config.preprocess.width, self.config.preprocess.height),
      items: items.into_boxed_slice(),
    })
  }
}
