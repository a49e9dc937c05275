// 该文件是 AclYolo 项目的一部分。
// src/engine.rs - 推理引擎边界
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

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, decode::RawOutput, tensor::Tensor};

const DEFAULT_ACL_CONFIG: &str = "./acl.json";

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("推理引擎初始化失败 ({stage}), 返回码 {code}")]
  Init { stage: &'static str, code: i32 },
  #[error("推理失败 ({stage}), 返回码 {code}")]
  Inference { stage: &'static str, code: i32 },
  #[error("推理引擎未初始化")]
  NotInitialized,
  #[error("推理引擎已释放")]
  Released,
  #[error("输入张量为空")]
  EmptyInput,
  #[error("尚未执行推理，没有可获取的输出")]
  NoOutput,
  #[error("路径包含非法字符: {0}")]
  InvalidPath(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("引擎地址错误: {0}")]
  UrlError(String),
}

/// 外部推理引擎：初始化一次，多次推理，最后释放一次
pub trait InferenceEngine {
  fn initialize(
    &mut self,
    device_id: i32,
    config_path: &str,
    model_path: &str,
  ) -> Result<(), EngineError>;

  /// 每次调用只接受一个输入张量
  fn run(&mut self, tensor_bytes: &[u8]) -> Result<(), EngineError>;

  /// 每个模型输出张量对应一块缓冲区，顺序由引擎决定
  fn fetch_outputs(&mut self) -> Result<Vec<RawOutput>, EngineError>;

  fn release(&mut self);
}

/// 引擎初始化参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
  pub device_id: i32,
  pub config_path: String,
  pub model_path: String,
}

impl FromUrl for EngineConfig {
  type Error = EngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let mut device_id = 0;
    let mut config_path = DEFAULT_ACL_CONFIG.to_string();
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "device" => {
          device_id = v
            .parse()
            .map_err(|_| EngineError::UrlError(format!("设备编号无效: {}", v)))?;
        }
        "config" => config_path = v.into_owned(),
        _ => {}
      }
    }

    Ok(EngineConfig {
      device_id,
      config_path,
      model_path: url.path().to_string(),
    })
  }
}

/// 引擎会话，持有期间引擎处于已初始化状态
///
/// 无论初始化失败、推理出错还是正常结束，`release` 都只会被调用一次。
pub struct EngineSession<E: InferenceEngine> {
  engine: E,
  released: bool,
}

impl<E: InferenceEngine> EngineSession<E> {
  pub fn open(engine: E, config: &EngineConfig) -> Result<Self, EngineError> {
    let mut session = EngineSession {
      engine,
      released: false,
    };

    info!(
      "初始化推理引擎: 设备 {}, 配置 {}, 模型 {}",
      config.device_id, config.config_path, config.model_path
    );
    session
      .engine
      .initialize(config.device_id, &config.config_path, &config.model_path)
      .inspect_err(|e| error!("推理引擎初始化失败: {}", e))?;
    info!("推理引擎初始化完成");

    Ok(session)
  }

  pub fn infer(&mut self, tensor: &Tensor) -> Result<Vec<RawOutput>, EngineError> {
    if self.released {
      return Err(EngineError::Released);
    }
    if tensor.is_empty() {
      return Err(EngineError::EmptyInput);
    }

    debug!("执行模型推理: 输入 {:?}", tensor.shape());
    self.engine.run(&tensor.to_le_bytes())?;

    debug!("获取模型输出");
    let outputs = self.engine.fetch_outputs()?;
    for (i, output) in outputs.iter().enumerate() {
      debug!("输出[{}] 大小 {} 字节", i, output.len());
    }
    Ok(outputs)
  }

  pub fn engine(&self) -> &E {
    &self.engine
  }

  pub fn close(mut self) {
    self.release();
  }

  fn release(&mut self) {
    if !self.released {
      self.released = true;
      info!("释放推理引擎");
      self.engine.release();
    }
  }
}

impl<E: InferenceEngine> Drop for EngineSession<E> {
  fn drop(&mut self) {
    self.release();
  }
}

mod replay;
pub use self::replay::{ReplayEngine, ReplayEngineError};

#[cfg(feature = "acl")]
mod acl;
#[cfg(feature = "acl")]
pub use self::acl::AclEngine;

pub enum EngineWrapper {
  Replay(ReplayEngine),
  #[cfg(feature = "acl")]
  Acl(AclEngine),
}

impl FromUrl for EngineWrapper {
  type Error = EngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ReplayEngine::SCHEME => Ok(EngineWrapper::Replay(
        ReplayEngine::from_url(url).map_err(|e| EngineError::UrlError(e.to_string()))?,
      )),
      #[cfg(feature = "acl")]
      AclEngine::SCHEME => Ok(EngineWrapper::Acl(AclEngine::new()?)),
      other => Err(EngineError::UrlError(format!("不支持的引擎方案: {}", other))),
    }
  }
}

impl InferenceEngine for EngineWrapper {
  fn initialize(
    &mut self,
    device_id: i32,
    config_path: &str,
    model_path: &str,
  ) -> Result<(), EngineError> {
    match self {
      EngineWrapper::Replay(engine) => engine.initialize(device_id, config_path, model_path),
      #[cfg(feature = "acl")]
      EngineWrapper::Acl(engine) => engine.initialize(device_id, config_path, model_path),
    }
  }

  fn run(&mut self, tensor_bytes: &[u8]) -> Result<(), EngineError> {
    match self {
      EngineWrapper::Replay(engine) => engine.run(tensor_bytes),
      #[cfg(feature = "acl")]
      EngineWrapper::Acl(engine) => engine.run(tensor_bytes),
    }
  }

  fn fetch_outputs(&mut self) -> Result<Vec<RawOutput>, EngineError> {
    match self {
      EngineWrapper::Replay(engine) => engine.fetch_outputs(),
      #[cfg(feature = "acl")]
      EngineWrapper::Acl(engine) => engine.fetch_outputs(),
    }
  }

  fn release(&mut self) {
    match self {
      EngineWrapper::Replay(engine) => engine.release(),
      #[cfg(feature = "acl")]
      EngineWrapper::Acl(engine) => engine.release(),
    }
  }
}
