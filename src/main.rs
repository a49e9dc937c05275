// 该文件是 AclYolo 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use acl_yolo::{
  FromUrl,
  detector::Detector,
  engine::{EngineConfig, EngineSession, EngineWrapper},
  output::{NullOutput, OutputWrapper},
  task::{SequentialTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("推理引擎: {}", args.engine);
  info!("输入图像: {:?}", args.input);
  info!("置信度阈值: {}", args.confidence);
  info!("NMS 阈值: {}", args.iou_threshold);

  let config = EngineConfig::from_url(&args.engine)?;
  let engine = EngineWrapper::from_url(&args.engine)?;
  let session = EngineSession::open(engine, &config)?;
  let detector = Detector::new(session, args.detector_config());

  let summary = match &args.output {
    Some(url) => {
      info!("输出地址: {}", url);
      let output = OutputWrapper::from_url(url)?;
      SequentialTask::default().run_task(args.input.clone(), detector, output)?
    }
    None => SequentialTask::default().run_task(args.input.clone(), detector, NullOutput)?,
  };

  info!("处理完成!");
  info!("总图像数: {}", summary.inputs);
  info!("总检测数: {}", summary.detections);

  Ok(())
}
