// 该文件是 AclYolo 项目的一部分。
// src/engine/acl.rs - 昇腾 ACL 原生推理封装
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
  ffi::{CString, c_char, c_int, c_void},
  ptr,
};

use tracing::{debug, error, info};

use crate::{
  FromUrlWithScheme,
  decode::RawOutput,
  engine::{EngineError, InferenceEngine},
};

#[repr(C)]
struct AclOutputData {
  data: *mut c_void,
  size: usize,
}

#[link(name = "aclwrapper")]
unsafe extern "C" {
  fn Acl_Create() -> *mut c_void;
  fn Acl_Destroy(obj: *mut c_void);
  fn Acl_InitResource(obj: *mut c_void, device_id: c_int, acl_config_path: *const c_char) -> c_int;
  fn Acl_InitModel(obj: *mut c_void, model_path: *const c_char) -> c_int;
  fn Acl_ProcessMemory(obj: *mut c_void, input_data: *const c_void, size: usize) -> c_int;
  fn Acl_DestroyResource(obj: *mut c_void);
  fn Acl_GetOutput(obj: *mut c_void, outputs: *mut *mut AclOutputData, count: *mut c_int) -> c_int;
  fn Acl_FreeOutput(outputs: *mut AclOutputData, count: c_int);
}

/// `libaclwrapper.so` 句柄
pub struct AclEngine {
  handle: *mut c_void,
}

impl FromUrlWithScheme for AclEngine {
  const SCHEME: &'static str = "acl";
}

impl crate::FromUrl for AclEngine {
  type Error = EngineError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(EngineError::UrlError(format!(
        "期望方案 '{}', 实际方案 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }
    Self::new()
  }
}

/// 复制到自有内存后归还原生缓冲区，只要指针非空就会调用 `free`
///
/// # Safety
/// `outputs` 为空，或指向 `count` 个有效的 `AclOutputData`。
unsafe fn take_outputs(
  outputs: *mut AclOutputData,
  count: c_int,
  free: impl FnOnce(*mut AclOutputData, c_int),
) -> Vec<RawOutput> {
  if outputs.is_null() {
    return Vec::new();
  }

  let result = (0..count.max(0) as usize)
    .map(|i| {
      let item = unsafe { &*outputs.add(i) };
      if item.data.is_null() || item.size == 0 {
        return RawOutput::default();
      }
      let bytes = unsafe { std::slice::from_raw_parts(item.data as *const u8, item.size) };
      RawOutput::from(bytes.to_vec())
    })
    .collect();
  free(outputs, count);
  result
}

fn c_string(s: &str) -> Result<CString, EngineError> {
  CString::new(s).map_err(|_| EngineError::InvalidPath(s.to_string()))
}

impl AclEngine {
  pub fn new() -> Result<Self, EngineError> {
    let handle = unsafe { Acl_Create() };
    if handle.is_null() {
      error!("Acl_Create 返回空句柄");
      return Err(EngineError::Init {
        stage: "Acl_Create",
        code: -1,
      });
    }
    debug!("创建 ACL 句柄");
    Ok(AclEngine { handle })
  }

  fn ensure_alive(&self) -> Result<(), EngineError> {
    if self.handle.is_null() {
      return Err(EngineError::Released);
    }
    Ok(())
  }
}

impl InferenceEngine for AclEngine {
  fn initialize(
    &mut self,
    device_id: i32,
    config_path: &str,
    model_path: &str,
  ) -> Result<(), EngineError> {
    self.ensure_alive()?;
    let config = c_string(config_path)?;
    let model = c_string(model_path)?;

    let ret = unsafe { Acl_InitResource(self.handle, device_id, config.as_ptr()) };
    if ret != 0 {
      return Err(EngineError::Init {
        stage: "Acl_InitResource",
        code: ret,
      });
    }

    let ret = unsafe { Acl_InitModel(self.handle, model.as_ptr()) };
    if ret != 0 {
      return Err(EngineError::Init {
        stage: "Acl_InitModel",
        code: ret,
      });
    }

    info!("ACL 模型加载完成: {}", model_path);
    Ok(())
  }

  fn run(&mut self, tensor_bytes: &[u8]) -> Result<(), EngineError> {
    self.ensure_alive()?;
    if tensor_bytes.is_empty() {
      return Err(EngineError::EmptyInput);
    }

    let ret = unsafe {
      Acl_ProcessMemory(
        self.handle,
        tensor_bytes.as_ptr() as *const c_void,
        tensor_bytes.len(),
      )
    };
    if ret != 0 {
      return Err(EngineError::Inference {
        stage: "Acl_ProcessMemory",
        code: ret,
      });
    }
    Ok(())
  }

  fn fetch_outputs(&mut self) -> Result<Vec<RawOutput>, EngineError> {
    self.ensure_alive()?;

    let mut outputs: *mut AclOutputData = ptr::null_mut();
    let mut count: c_int = 0;
    let ret = unsafe { Acl_GetOutput(self.handle, &mut outputs, &mut count) };
    if ret != 0 {
      return Err(EngineError::Inference {
        stage: "Acl_GetOutput",
        code: ret,
      });
    }
    let result = unsafe { take_outputs(outputs, count, |data, n| Acl_FreeOutput(data, n)) };
    Ok(result)
  }

  fn release(&mut self) {
    if self.handle.is_null() {
      return;
    }
    unsafe {
      Acl_DestroyResource(self.handle);
      Acl_Destroy(self.handle);
    }
    self.handle = ptr::null_mut();
    debug!("ACL 句柄已销毁");
  }
}

impl Drop for AclEngine {
  fn drop(&mut self) {
    self.release();
  }
}
