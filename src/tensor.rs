// 该文件是 AclYolo 项目的一部分。
// src/tensor.rs - 平面 NCHW float32 张量
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

pub const RGB_CHANNELS: usize = 3;

const F32_SIZE: usize = std::mem::size_of::<f32>();

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("字节长度 {0} 不是 4 的整数倍")]
  Misaligned(usize),
}

/// 平面通道优先布局的 float32 张量，形状为 `[batch, channel, height, width]`。
///
/// 每个通道平面内按行优先排列，下标为 `y * width + x`。
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
  shape: [usize; 4],
  data: Box<[f32]>,
}

impl Tensor {
  pub fn zeros(batch: usize, channels: usize, height: usize, width: usize) -> Self {
    let size = batch * channels * height * width;
    Self {
      shape: [batch, channels, height, width],
      data: vec![0f32; size].into_boxed_slice(),
    }
  }

  pub fn from_vec(shape: [usize; 4], data: Vec<f32>) -> Result<Self, TensorError> {
    let expected = shape.iter().product::<usize>();
    if data.len() != expected {
      return Err(TensorError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      shape,
      data: data.into_boxed_slice(),
    })
  }

  pub fn shape(&self) -> [usize; 4] {
    self.shape
  }

  pub fn batch(&self) -> usize {
    self.shape[0]
  }

  pub fn channels(&self) -> usize {
    self.shape[1]
  }

  pub fn height(&self) -> usize {
    self.shape[2]
  }

  pub fn width(&self) -> usize {
    self.shape[3]
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  /// 单张图像 `[C, H, W]` 切片
  pub fn image(&self, n: usize) -> &[f32] {
    let stride = self.channels() * self.height() * self.width();
    &self.data[n * stride..(n + 1) * stride]
  }

  /// 单个通道平面 `[H, W]`
  pub fn plane(&self, n: usize, c: usize) -> &[f32] {
    let plane = self.height() * self.width();
    let offset = (n * self.channels() + c) * plane;
    &self.data[offset..offset + plane]
  }

  pub fn get(&self, n: usize, c: usize, y: usize, x: usize) -> f32 {
    self.plane(n, c)[y * self.width() + x]
  }

  pub(crate) fn image_mut(&mut self, n: usize) -> &mut [f32] {
    let stride = self.channels() * self.height() * self.width();
    &mut self.data[n * stride..(n + 1) * stride]
  }

  /// 按小端 IEEE-754 float32 打包，与推理引擎输入格式一致
  pub fn to_le_bytes(&self) -> Vec<u8> {
    encode_f32_le(&self.data)
  }

  pub fn from_le_bytes(shape: [usize; 4], bytes: &[u8]) -> Result<Self, TensorError> {
    Self::from_vec(shape, decode_f32_le(bytes)?)
  }
}

pub fn encode_f32_le(values: &[f32]) -> Vec<u8> {
  let mut bytes = Vec::with_capacity(values.len() * F32_SIZE);
  for value in values {
    bytes.extend_from_slice(&value.to_le_bytes());
  }
  bytes
}

/// 无论主机字节序，始终按小端解释
pub fn decode_f32_le(bytes: &[u8]) -> Result<Vec<f32>, TensorError> {
  if bytes.len() % F32_SIZE != 0 {
    return Err(TensorError::Misaligned(bytes.len()));
  }

  Ok(
    bytes
      .chunks_exact(F32_SIZE)
      .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn le_bytes_round_trip_is_bit_identical() {
    let values = [
      0.0f32,
      -0.0,
      1.0,
      -1.5,
      f32::MIN_POSITIVE,
      f32::MAX,
      f32::MIN,
      1.0e-42,
      std::f32::consts::PI,
    ];
    let bytes = encode_f32_le(&values);
    assert_eq!(bytes.len(), values.len() * 4);

    let decoded = decode_f32_le(&bytes).unwrap();
    for (a, b) in values.iter().zip(decoded.iter()) {
      assert_eq!(a.to_bits(), b.to_bits());
    }
  }

  #[test]
  fn encoding_is_little_endian() {
    let bytes = encode_f32_le(&[1.0]);
    assert_eq!(bytes, vec![0x00, 0x00, 0x80, 0x3f]);
  }

  #[test]
  fn misaligned_bytes_are_rejected() {
    assert_eq!(decode_f32_le(&[0u8; 7]), Err(TensorError::Misaligned(7)));
  }

  #[test]
  fn planar_indexing() {
    let data: Vec<f32> = (0..2 * 3 * 2 * 2).map(|v| v as f32).collect();
    let tensor = Tensor::from_vec([2, 3, 2, 2], data).unwrap();

    assert_eq!(tensor.plane(0, 1), &[4.0, 5.0, 6.0, 7.0]);
    assert_eq!(tensor.get(1, 2, 1, 0), 22.0);
    assert_eq!(tensor.image(1).len(), 12);
    assert_eq!(tensor.image(1)[0], 12.0);
  }

  #[test]
  fn shape_must_match_length() {
    let err = Tensor::from_vec([1, 3, 2, 2], vec![0.0; 11]).unwrap_err();
    assert_eq!(
      err,
      TensorError::LengthMismatch {
        expected: 12,
        actual: 11
      }
    );
  }

  #[test]
  fn tensor_bytes_round_trip() {
    let tensor = Tensor::from_vec([1, 1, 1, 3], vec![0.25, 0.5, 0.75]).unwrap();
    let back = Tensor::from_le_bytes(tensor.shape(), &tensor.to_le_bytes()).unwrap();
    assert_eq!(tensor, back);
  }
}
