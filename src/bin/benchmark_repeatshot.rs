// 该文件是 AclYolo 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复推理同一张图像以测量耗时
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use acl_yolo::{
  FromUrl,
  detector::{Detector, DetectorConfig},
  engine::{EngineConfig, EngineSession, EngineWrapper},
  output::NullOutput,
  task::{RepeatShotTask, Task},
};
use tracing::info;

/// AclYolo 推理耗时测试
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理引擎地址
  #[arg(long, value_name = "ENGINE")]
  pub engine: Url,
  /// 输入图像
  #[arg(long, value_name = "IMAGE")]
  pub input: PathBuf,
  /// 重复次数
  #[arg(long, default_value_t = 1000, value_name = "COUNT")]
  pub repeat: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("推理引擎: {}", args.engine);
  info!("输入图像: {:?}", args.input);
  info!("重复次数: {}", args.repeat);

  let config = EngineConfig::from_url(&args.engine)?;
  let engine = EngineWrapper::from_url(&args.engine)?;
  let session = EngineSession::open(engine, &config)?;
  let detector = Detector::new(session, DetectorConfig::default());

  let summary =
    RepeatShotTask::with_repeat(args.repeat).run_task(vec![args.input], detector, NullOutput)?;
  info!("完成 {} 次推理", summary.times.len());

  Ok(())
}
