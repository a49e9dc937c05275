// 该文件是 AclYolo 项目的一部分。
// src/output.rs - 检测结果输出
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
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::DetectResult};

pub trait Render: Sized {
  type Error;
  fn render_result(&self, result: &DetectResult) -> Result<(), Self::Error>;
}

mod json_report;
pub use self::json_report::{JsonReportError, JsonReportOutput};

#[cfg(feature = "save_image_file")]
pub mod draw;

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("JSON 报告输出错误: {0}")]
  JsonReportError(#[from] JsonReportError),
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  JsonReport(JsonReportOutput),
  #[cfg(feature = "save_image_file")]
  SaveImageFile(SaveImageFileOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      JsonReportOutput::SCHEME => Ok(OutputWrapper::JsonReport(JsonReportOutput::from_url(url)?)),
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => Ok(OutputWrapper::SaveImageFile(
        SaveImageFileOutput::from_url(url)?,
      )),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, result: &DetectResult) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::JsonReport(output) => output
        .render_result(result)
        .map_err(OutputError::from),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFile(output) => output
        .render_result(result)
        .map_err(OutputError::from),
    }
  }
}

/// 不输出任何内容
pub struct NullOutput;

impl Render for NullOutput {
  type Error = std::convert::Infallible;

  fn render_result(&self, _result: &DetectResult) -> Result<(), Self::Error> {
    Ok(())
  }
}
