// 该文件是 AclYolo 项目的一部分。
// src/engine/replay.rs - 回放预先录制的模型输出
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
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  decode::RawOutput,
  engine::{EngineError, InferenceEngine},
};

#[derive(Error, Debug)]
pub enum ReplayEngineError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("没有指定任何输出文件")]
  NoOutputs,
}

enum ReplaySource {
  File(PathBuf),
  Buffer(RawOutput),
}

/// 不依赖 NPU 的引擎实现：每次推理都返回同一组录制好的输出
pub struct ReplayEngine {
  sources: Vec<ReplaySource>,
  initialized: bool,
  released: bool,
  last_input_len: Option<usize>,
}

impl FromUrlWithScheme for ReplayEngine {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayEngine {
  type Error = ReplayEngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayEngineError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let mut files = Vec::new();
    if !url.path().is_empty() && url.path() != "/" {
      files.push(PathBuf::from(url.path()));
    }
    files.extend(
      url
        .query_pairs()
        .filter(|(k, _)| k == "output")
        .map(|(_, v)| PathBuf::from(v.as_ref())),
    );

    if files.is_empty() {
      return Err(ReplayEngineError::NoOutputs);
    }

    Ok(Self::from_files(files))
  }
}

impl ReplayEngine {
  pub fn from_files(files: Vec<PathBuf>) -> Self {
    Self::with_sources(files.into_iter().map(ReplaySource::File).collect())
  }

  pub fn from_buffers(buffers: Vec<RawOutput>) -> Self {
    Self::with_sources(buffers.into_iter().map(ReplaySource::Buffer).collect())
  }

  fn with_sources(sources: Vec<ReplaySource>) -> Self {
    ReplayEngine {
      sources,
      initialized: false,
      released: false,
      last_input_len: None,
    }
  }

  /// 最近一次推理的输入字节数
  pub fn last_input_len(&self) -> Option<usize> {
    self.last_input_len
  }

  fn ensure_ready(&self) -> Result<(), EngineError> {
    if self.released {
      return Err(EngineError::Released);
    }
    if !self.initialized {
      return Err(EngineError::NotInitialized);
    }
    Ok(())
  }
}

impl InferenceEngine for ReplayEngine {
  fn initialize(
    &mut self,
    device_id: i32,
    config_path: &str,
    model_path: &str,
  ) -> Result<(), EngineError> {
    if self.released {
      return Err(EngineError::Released);
    }
    debug!(
      "回放引擎忽略设备 {}, 配置 {}, 模型 {}",
      device_id, config_path, model_path
    );
    info!("回放引擎就绪: {} 个输出", self.sources.len());
    self.initialized = true;
    Ok(())
  }

  fn run(&mut self, tensor_bytes: &[u8]) -> Result<(), EngineError> {
    self.ensure_ready()?;
    if tensor_bytes.is_empty() {
      return Err(EngineError::EmptyInput);
    }
    self.last_input_len = Some(tensor_bytes.len());
    Ok(())
  }

  fn fetch_outputs(&mut self) -> Result<Vec<RawOutput>, EngineError> {
    self.ensure_ready()?;
    if self.last_input_len.is_none() {
      return Err(EngineError::NoOutput);
    }

    self
      .sources
      .iter()
      .map(|source| match source {
        ReplaySource::File(path) => {
          debug!("读取录制输出: {:?}", path);
          Ok(RawOutput::from(std::fs::read(path)?))
        }
        ReplaySource::Buffer(buffer) => Ok(buffer.clone()),
      })
      .collect()
  }

  fn release(&mut self) {
    self.released = true;
    self.initialized = false;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_collects_output_files() {
    let url = Url::parse("replay:///data/out0.bin?output=/data/out1.bin&device=1").unwrap();
    let engine = ReplayEngine::from_url(&url).unwrap();
    let files: Vec<_> = engine
      .sources
      .iter()
      .map(|s| match s {
        ReplaySource::File(p) => p.clone(),
        ReplaySource::Buffer(_) => unreachable!(),
      })
      .collect();
    assert_eq!(
      files,
      vec![PathBuf::from("/data/out0.bin"), PathBuf::from("/data/out1.bin")]
    );
  }

  #[test]
  fn url_without_outputs_is_rejected() {
    let url = Url::parse("replay:///").unwrap();
    assert!(matches!(
      ReplayEngine::from_url(&url),
      Err(ReplayEngineError::NoOutputs)
    ));
  }

  #[test]
  fn lifecycle_is_enforced() {
    let mut engine = ReplayEngine::from_buffers(vec![RawOutput::from(vec![1, 2, 3, 4])]);
    assert!(matches!(
      engine.run(&[0; 4]),
      Err(EngineError::NotInitialized)
    ));

    engine.initialize(0, "acl.json", "model.om").unwrap();
    assert!(matches!(engine.fetch_outputs(), Err(EngineError::NoOutput)));

    engine.run(&[0; 12]).unwrap();
    assert_eq!(engine.last_input_len(), Some(12));
    assert_eq!(
      engine.fetch_outputs().unwrap(),
      vec![RawOutput::from(vec![1, 2, 3, 4])]
    );

    engine.release();
    assert!(matches!(engine.run(&[0; 4]), Err(EngineError::Released)));
  }

  #[test]
  fn missing_file_surfaces_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = ReplayEngine::from_files(vec![dir.path().join("absent.bin")]);
    engine.initialize(0, "", "").unwrap();
    engine.run(&[0; 4]).unwrap();
    assert!(matches!(
      engine.fetch_outputs(),
      Err(EngineError::IoError(_))
    ));
  }
}
