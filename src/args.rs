// 该文件是 AclYolo 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use acl_yolo::{
  decode::{DEFAULT_CONF_THRESHOLD, OutputLayout},
  detector::DetectorConfig,
  nms::DEFAULT_IOU_THRESHOLD,
  preprocess::{DEFAULT_INPUT_H, DEFAULT_INPUT_W, PreprocessOptions},
};
use clap::Parser;
use url::Url;

/// AclYolo 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理引擎地址
  /// 支持格式:
  /// - 昇腾 ACL: acl:///model/yolo11n.om?device=0&config=./acl.json
  /// - 回放录制输出: replay:///data/output0.bin
  #[arg(long, value_name = "ENGINE")]
  pub engine: Url,

  /// 输入图像文件，可指定多个
  #[arg(long, value_name = "IMAGE", num_args = 1.., required = true)]
  pub input: Vec<PathBuf>,

  /// 输出地址（可选）
  /// 支持格式:
  /// - JSON Lines 报告: json:///out/report.jsonl
  /// - 标注图像: image:///out/annotated.png（逐个保存为 annotated-0001-<源文件名>.png）
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  /// 模型类别数量
  #[arg(long, default_value_t = 80, value_name = "COUNT")]
  pub num_classes: usize,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONF_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_IOU_THRESHOLD, value_name = "THRESHOLD")]
  pub iou_threshold: f32,

  /// 模型输入宽度
  #[arg(long, default_value_t = DEFAULT_INPUT_W, value_name = "PIXELS")]
  pub width: u32,

  /// 模型输入高度
  #[arg(long, default_value_t = DEFAULT_INPUT_H, value_name = "PIXELS")]
  pub height: u32,

  /// 输出布局: attribute-major 或 attribute-minor
  #[arg(long, default_value = "attribute-major", value_name = "LAYOUT")]
  pub layout: OutputLayout,

  /// 参与解码的模型输出下标
  #[arg(long, default_value_t = 0, value_name = "INDEX")]
  pub output_index: usize,

  /// 不做 /255 归一化
  #[arg(long)]
  pub no_normalize: bool,

  /// 保留解码端通道顺序（不转换为 RGB）
  #[arg(long)]
  pub keep_channel_order: bool,

  /// 输入为已序列化的 [1, 3, H, W] 小端 float32 张量文件（如 input_640.bin），跳过预处理
  #[arg(long)]
  pub tensor_input: bool,
}

impl Args {
  pub fn detector_config(&self) -> DetectorConfig {
    DetectorConfig {
      preprocess: PreprocessOptions {
        width: self.width,
        height: self.height,
        normalize: !self.no_normalize,
        swap_channels: !self.keep_channel_order,
      },
      num_classes: self.num_classes,
      conf_threshold: self.confidence,
      iou_threshold: self.iou_threshold,
      layout: self.layout,
      output_index: self.output_index,
      tensor_input: self.tensor_input,
    }
  }
}
