// 该文件是 AclYolo 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::model::Detection;

const BOX_THICKNESS: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色

pub struct Draw {
  thickness: i32,
  color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      thickness: BOX_THICKNESS,
      color: BOX_COLOR,
    }
  }
}

impl Draw {
  pub fn with_color(mut self, color: [u8; 3]) -> Self {
    self.color = color;
    self
  }

  // bbox 为张量像素坐标，图像须与张量同尺寸
  fn draw_bbox(&self, image: &mut RgbImage, bbox: [f32; 4]) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox[3].ceil() as i32).clamp(0, h - 1);

    for t in 0..self.thickness {
      let width = x_max - x_min - 2 * t;
      let height = y_max - y_min - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32 + 1, height as u32 + 1);
      draw_hollow_rect_mut(image, rect, Rgb(self.color));
    }
  }

  pub fn draw_detections(&self, image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
      self.draw_bbox(image, detection.bbox().as_array());
    }
  }
}
