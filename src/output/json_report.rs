// 该文件是 AclYolo 项目的一部分。
// src/output/json_report.rs - JSON Lines 检测报告
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
  fs::{File, OpenOptions},
  io::Write,
  path::{Path, PathBuf},
};

use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectResult, Detection},
  output::Render,
};

#[derive(Error, Debug)]
pub enum JsonReportError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 每张图像一行 JSON
pub struct JsonReportOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for JsonReportOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonReportOutput {
  type Error = JsonReportError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonReportError::SchemeMismatch(format!(
        "期望输出方式 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }
    Self::create(url.path())
  }
}

impl JsonReportOutput {
  /// 创建（或清空）报告文件
  pub fn create(path: impl AsRef<Path>) -> Result<Self, JsonReportError> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    File::create(&path)?;
    info!("检测报告写入: {:?}", path);
    Ok(Self { path })
  }
}

pub fn detection_json(detection: &Detection) -> Value {
  json!({
    "class_id": detection.class_id(),
    "label": detection.label(),
    "confidence": detection.confidence(),
    "bbox": detection.bbox().as_array(),
  })
}

pub fn result_json(result: &DetectResult) -> Value {
  json!({
    "source": result.source.to_string_lossy(),
    "tensor_width": result.tensor_size.0,
    "tensor_height": result.tensor_size.1,
    "detections": result.items.iter().map(detection_json).collect::<Vec<_>>(),
  })
}

impl Render for JsonReportOutput {
  type Error = JsonReportError;

  fn render_result(&self, result: &DetectResult) -> Result<(), Self::Error> {
    let line = serde_json::to_string(&result_json(result))?;
    let mut file = OpenOptions::new().append(true).open(&self.path)?;
    writeln!(file, "{}", line)?;
    Ok(())
  }
}
