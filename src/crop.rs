// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/crop.rs - 检测区域裁剪
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

/// 从原图中裁剪出的子图像，持有独立的像素数据
#[derive(Debug, Clone, PartialEq)]
pub struct Crop {
  /// 裁剪到图像范围后的 [x_min, y_min, x_max, y_max]，右下角不包含
  pub bbox: [u32; 4],
  pub image: RgbImage,
}

impl Crop {
  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

/// 将边界框限制在 `[0, width] × [0, height]` 内，面积为零时返回 `None`
pub fn clamp_box(bbox: [i32; 4], width: u32, height: u32) -> Option<[u32; 4]> {
  let clamp = |v: i32, max: u32| v.clamp(0, max.min(i32::MAX as u32) as i32) as u32;
  let x1 = clamp(bbox[0], width);
  let y1 = clamp(bbox[1], height);
  let x2 = clamp(bbox[2], width);
  let y2 = clamp(bbox[3], height);
  if x2 <= x1 || y2 <= y1 {
    return None;
  }
  Some([x1, y1, x2, y2])
}

/// 按边界框裁剪图像，不修改原图；裁剪区域为空时返回 `None`
pub fn crop(image: &RgbImage, bbox: [i32; 4]) -> Option<Crop> {
  let [x1, y1, x2, y2] = clamp_box(bbox, image.width(), image.height())?;
  let sub = image::imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image();
  Some(Crop {
    bbox: [x1, y1, x2, y2],
    image: sub,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 0]))
  }

  #[test]
  fn crop_inside_bounds() {
    let image = gradient(100, 80);
    let crop = crop(&image, [10, 10, 50, 50]).unwrap();
    assert_eq!(crop.bbox, [10, 10, 50, 50]);
    assert_eq!((crop.width(), crop.height()), (40, 40));
    assert_eq!(crop.image.get_pixel(0, 0), &Rgb([10, 10, 0]));
    assert_eq!(crop.image.get_pixel(39, 39), &Rgb([49, 49, 0]));
  }

  #[test]
  fn crop_clamps_to_image() {
    let image = gradient(100, 80);
    let crop = crop(&image, [-5, 60, 130, 200]).unwrap();
    assert_eq!(crop.bbox, [0, 60, 100, 80]);
    assert_eq!((crop.width(), crop.height()), (100, 20));
  }

  #[test]
  fn empty_after_clamping() {
    let image = gradient(100, 80);
    assert!(crop(&image, [120, 10, 150, 50]).is_none());
    assert!(crop(&image, [10, 10, 10, 50]).is_none());
    assert!(crop(&image, [-20, -20, -1, -1]).is_none());
  }

  #[test]
  fn source_is_untouched() {
    let image = gradient(20, 20);
    let before = image.clone();
    let mut crop = crop(&image, [0, 0, 10, 10]).unwrap();
    crop.image.put_pixel(0, 0, Rgb([255, 255, 255]));
    assert_eq!(image, before);
  }
}
