// 该文件是 AclYolo 项目的一部分。
// src/output/save_image_file.rs - 保存标注后的图像文件
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
  cell::Cell,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::DetectResult,
  output::{Render, draw::Draw},
  preprocess::{DecodedImage, ImageLoadError},
};

/// 检测框位于张量空间，因此绘制在拉伸到张量尺寸的源图像上
///
/// 每个结果单独保存为 `<名称>-<序号>-<源文件名>.<扩展名>`，位于地址路径所在目录。
pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
  frame_counter: Cell<u32>,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("源图像加载错误: {0}")]
  SourceError(#[from] ImageLoadError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(Self::new(uri.path()))
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl AsRef<Path>) -> Self {
    SaveImageFileOutput {
      path: path.as_ref().to_path_buf(),
      draw: Draw::default(),
      frame_counter: Cell::new(0),
    }
  }

  fn frame_id(&self) -> u32 {
    let id = self.frame_counter.get() + 1;
    self.frame_counter.set(id);
    id
  }

  fn frame_path(&self, source: &Path) -> PathBuf {
    let stem = self
      .path
      .file_stem()
      .map(|s| s.to_string_lossy())
      .unwrap_or_else(|| "annotated".into());
    let extension = self
      .path
      .extension()
      .map(|s| s.to_string_lossy())
      .unwrap_or_else(|| "png".into());
    let source_stem = source
      .file_stem()
      .map(|s| s.to_string_lossy())
      .unwrap_or_default();

    let filename = format!(
      "{}-{:04}-{}.{}",
      stem,
      self.frame_id(),
      source_stem,
      extension
    );
    match self.path.parent() {
      Some(parent) => parent.join(filename),
      None => PathBuf::from(filename),
    }
  }

  fn save_image(&self, image: image::RgbImage, path: &Path) -> Result<(), SaveImageFileError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
    }

    image.save(path).map_err(SaveImageFileError::ImageError)?;

    warn!("保存图像到文件: {:?}", path);

    Ok(())
  }
}

impl Render for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, result: &DetectResult) -> Result<(), Self::Error> {
    let (width, height) = result.tensor_size;
    let mut image = DecodedImage::open(&result.source)?.stretch(width, height);
    self.draw.draw_detections(&mut image, &result.items);
    self.save_image(image, &self.frame_path(&result.source))
  }
}
