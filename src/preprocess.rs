// 该文件是 AclYolo 项目的一部分。
// src/preprocess.rs - 图像预处理：拉伸缩放、归一化、HWC → CHW
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

use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::tensor::{RGB_CHANNELS, Tensor, TensorError};

pub const DEFAULT_INPUT_W: u32 = 640;
pub const DEFAULT_INPUT_H: u32 = 640;

#[derive(Error, Debug)]
pub enum ImageLoadError {
  #[error("无法读取图像文件 {path:?}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("无法解码图像文件 {path:?}: {source}")]
  Decode {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
  #[error("张量文件 {path:?} 无效: {source}")]
  RawTensor {
    path: PathBuf,
    #[source]
    source: TensorError,
  },
  #[error("目标尺寸无效: {width}x{height}")]
  InvalidTargetSize { width: u32, height: u32 },
}

/// 预处理参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessOptions {
  pub width: u32,
  pub height: u32,
  /// 为 true 时每个通道值除以 255.0
  pub normalize: bool,
  /// 为 true 时输出 R,G,B 通道顺序，否则保留解码端的 B,G,R 顺序
  pub swap_channels: bool,
}

impl Default for PreprocessOptions {
  fn default() -> Self {
    Self {
      width: DEFAULT_INPUT_W,
      height: DEFAULT_INPUT_H,
      normalize: true,
      swap_channels: true,
    }
  }
}

impl PreprocessOptions {
  pub fn with_size(width: u32, height: u32) -> Self {
    Self {
      width,
      height,
      ..Self::default()
    }
  }

  fn validate(&self) -> Result<(), ImageLoadError> {
    if self.width == 0 || self.height == 0 {
      return Err(ImageLoadError::InvalidTargetSize {
        width: self.width,
        height: self.height,
      });
    }
    Ok(())
  }
}

/// 已解码的图像句柄，离开作用域时释放
pub struct DecodedImage {
  path: PathBuf,
  image: RgbImage,
}

impl DecodedImage {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageLoadError> {
    let path = path.as_ref().to_path_buf();
    debug!("加载图像文件: {:?}", path);

    let reader = ImageReader::open(&path)
      .and_then(|reader| reader.with_guessed_format())
      .map_err(|source| ImageLoadError::Io {
        path: path.clone(),
        source,
      })?;
    let image = reader.decode().map_err(|source| ImageLoadError::Decode {
      path: path.clone(),
      source,
    })?;

    Ok(Self {
      path,
      image: image.into_rgb8(),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn dimensions(&self) -> (u32, u32) {
    self.image.dimensions()
  }

  /// 拉伸到目标尺寸，不保持宽高比
  pub fn stretch(&self, width: u32, height: u32) -> RgbImage {
    if self.image.dimensions() == (width, height) {
      return self.image.clone();
    }
    image::imageops::resize(&self.image, width, height, FilterType::Triangle)
  }
}

impl Drop for DecodedImage {
  fn drop(&mut self) {
    debug!("释放图像句柄: {:?}", self.path);
  }
}

/// 在 usize 上计算，避免大尺寸下 u32 溢出
fn pixel_offset(width: u32, x: u32, y: u32) -> usize {
  y as usize * width as usize + x as usize
}

/// 将拉伸后的图像写入单张 `[3, H, W]` 平面
pub fn write_planes(image: &RgbImage, out: &mut [f32], options: &PreprocessOptions) {
  let (width, height) = image.dimensions();
  let plane = pixel_offset(width, 0, height);
  debug_assert_eq!(out.len(), RGB_CHANNELS * plane);

  for (x, y, pixel) in image.enumerate_pixels() {
    let offset = pixel_offset(width, x, y);
    let [r, g, b] = pixel.0;
    let ordered = if options.swap_channels {
      [r, g, b]
    } else {
      [b, g, r]
    };

    for (c, value) in ordered.into_iter().enumerate() {
      let value = value as f32;
      out[c * plane + offset] = if options.normalize {
        value / 255.0
      } else {
        value
      };
    }
  }
}

/// 单张图像 → `[1, 3, H, W]` 张量
pub fn to_tensor(
  image_path: impl AsRef<Path>,
  options: &PreprocessOptions,
) -> Result<Tensor, ImageLoadError> {
  options.validate()?;
  let handle = DecodedImage::open(image_path)?;
  let (src_w, src_h) = handle.dimensions();

  let mut tensor = Tensor::zeros(
    1,
    RGB_CHANNELS,
    options.height as usize,
    options.width as usize,
  );
  let resized = handle.stretch(options.width, options.height);
  write_planes(&resized, tensor.image_mut(0), options);

  info!(
    "预处理完成: {:?} {}x{} → {:?}",
    handle.path(),
    src_w,
    src_h,
    tensor.shape()
  );
  Ok(tensor)
}

/// 多张图像 → `[N, 3, H, W]` 张量
///
/// 任意一张加载失败时整体失败，已获取的句柄在错误返回前全部释放。
pub fn to_batch_tensor<P: AsRef<Path>>(
  image_paths: &[P],
  options: &PreprocessOptions,
) -> Result<Tensor, ImageLoadError> {
  options.validate()?;
  let handles = open_all(image_paths, |path| DecodedImage::open(path))?;

  let mut tensor = Tensor::zeros(
    handles.len(),
    RGB_CHANNELS,
    options.height as usize,
    options.width as usize,
  );
  for (n, handle) in handles.iter().enumerate() {
    let resized = handle.stretch(options.width, options.height);
    write_planes(&resized, tensor.image_mut(n), options);
  }

  info!("批量预处理完成: {:?}", tensor.shape());
  Ok(tensor)
}

/// 依次获取全部句柄；任意一个失败时，已获取的句柄在返回错误前全部释放
fn open_all<P, H, E: std::fmt::Display>(
  paths: &[P],
  mut open: impl FnMut(&P) -> Result<H, E>,
) -> Result<Vec<H>, E> {
  let mut handles = Vec::with_capacity(paths.len());
  for (index, path) in paths.iter().enumerate() {
    match open(path) {
      Ok(handle) => handles.push(handle),
      Err(e) => {
        warn!(
          "批量预处理第 {} 张图像失败, 释放已加载的 {} 个句柄: {}",
          index,
          handles.len(),
          e
        );
        drop(handles);
        return Err(e);
      }
    }
  }
  Ok(handles)
}

/// 读取已序列化的 `[1, 3, H, W]` 小端 float32 张量文件，跳过图像预处理
pub fn load_tensor_file(
  path: impl AsRef<Path>,
  options: &PreprocessOptions,
) -> Result<Tensor, ImageLoadError> {
  options.validate()?;
  let path = path.as_ref();
  let bytes = std::fs::read(path).map_err(|source| ImageLoadError::Io {
    path: path.to_path_buf(),
    source,
  })?;

  let shape = [
    1,
    RGB_CHANNELS,
    options.height as usize,
    options.width as usize,
  ];
  let tensor = Tensor::from_le_bytes(shape, &bytes).map_err(|source| ImageLoadError::RawTensor {
    path: path.to_path_buf(),
    source,
  })?;

  info!("读取张量文件: {:?} → {:?}", path, tensor.shape());
  Ok(tensor)
}
