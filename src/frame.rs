// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/frame.rs - 模型输入帧（Letterbox + NCHW）
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

use image::RgbImage;
use ndarray::Array4;

const RGB_CHANNELS: usize = 3;
const PAD_VALUE: f32 = 114.0 / 255.0;

/// 原图与模型输入之间的等比缩放与填充关系
///
/// `pad_x`、`pad_y` 为整数像素偏移，填充为奇数时多出的一列（行）在右侧（下侧）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  pub src_width: u32,
  pub src_height: u32,
  pub size: u32,
}

impl Letterbox {
  /// 原图尺寸为零时返回 `None`
  pub fn new(src_width: u32, src_height: u32, size: u32) -> Option<Self> {
    if src_width == 0 || src_height == 0 || size == 0 {
      return None;
    }
    let scale = (size as f32 / src_width as f32).min(size as f32 / src_height as f32);
    let (resized_w, resized_h) = resized_dims(src_width, src_height, scale, size);
    Some(Self {
      scale,
      pad_x: ((size - resized_w) / 2) as f32,
      pad_y: ((size - resized_h) / 2) as f32,
      src_width,
      src_height,
      size,
    })
  }

  pub fn resized_dims(&self) -> (u32, u32) {
    resized_dims(self.src_width, self.src_height, self.scale, self.size)
  }

  /// 将模型坐标下的 (cx, cy, w, h) 映射回原图的 [x_min, y_min, x_max, y_max]，并裁剪到原图范围
  pub fn to_source_box(&self, cxcywh: [f32; 4]) -> [f32; 4] {
    let [cx, cy, w, h] = cxcywh;
    let unmap_x = |x: f32| ((x - self.pad_x) / self.scale).clamp(0.0, self.src_width as f32);
    let unmap_y = |y: f32| ((y - self.pad_y) / self.scale).clamp(0.0, self.src_height as f32);
    [
      unmap_x(cx - w / 2.0),
      unmap_y(cy - h / 2.0),
      unmap_x(cx + w / 2.0),
      unmap_y(cy + h / 2.0),
    ]
  }
}

fn resized_dims(src_width: u32, src_height: u32, scale: f32, size: u32) -> (u32, u32) {
  let w = ((src_width as f32 * scale).round() as u32).clamp(1, size);
  let h = ((src_height as f32 * scale).round() as u32).clamp(1, size);
  (w, h)
}

/// 归一化到 [0, 1] 的 NCHW 输入张量
#[derive(Debug, Clone)]
pub struct RgbNchwFrame {
  data: Array4<f32>,
  letterbox: Letterbox,
}

impl RgbNchwFrame {
  pub fn from_rgb_image(image: &RgbImage, size: u32) -> Option<Self> {
    let letterbox = Letterbox::new(image.width(), image.height(), size)?;
    let (resized_w, resized_h) = letterbox.resized_dims();
    let resized = image::imageops::resize(
      image,
      resized_w,
      resized_h,
      image::imageops::FilterType::Triangle,
    );

    let side = size as usize;
    let mut data = Array4::from_elem((1, RGB_CHANNELS, side, side), PAD_VALUE);
    let offset_x = letterbox.pad_x as usize;
    let offset_y = letterbox.pad_y as usize;

    for (x, y, pixel) in resized.enumerate_pixels() {
      let (w, h) = (offset_x + x as usize, offset_y + y as usize);
      for c in 0..RGB_CHANNELS {
        data[[0, c, h, w]] = f32::from(pixel[c]) / 255.0;
      }
    }

    Some(Self { data, letterbox })
  }

  pub fn tensor(&self) -> &Array4<f32> {
    &self.data
  }

  pub fn letterbox(&self) -> &Letterbox {
    &self.letterbox
  }
}
