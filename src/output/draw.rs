// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/output/draw.rs - 字段区域可视化
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::record::{Field, OutputRecord};

const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const BOX_THICKNESS: u32 = 2;

pub struct Draw {
  color: [u8; 3],
  thickness: u32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      color: BOX_COLOR,
      thickness: BOX_THICKNESS,
    }
  }
}

impl Draw {
  pub fn with_color(mut self, color: [u8; 3]) -> Self {
    self.color = color;
    self
  }

  // bbox 为原图像素坐标 [x_min, y_min, x_max, y_max]，右下角不包含
  fn draw_bbox(&self, image: &mut RgbImage, bbox: &[u32; 4]) {
    let [x_min, y_min, x_max, y_max] = *bbox;
    for t in 0..self.thickness {
      let width = (x_max - x_min).saturating_sub(2 * t);
      let height = (y_max - y_min).saturating_sub(2 * t);
      if width == 0 || height == 0 {
        break;
      }
      let rect = Rect::at((x_min + t) as i32, (y_min + t) as i32).of_size(width, height);
      draw_hollow_rect_mut(image, rect, Rgb(self.color));
    }
  }

  /// 在图像上绘制记录中所有已找到字段的区域
  pub fn draw_record(&self, image: &mut RgbImage, record: &OutputRecord) {
    for (_, field) in record.labeled_fields() {
      if let Field::Found { crop, .. } = field {
        self.draw_bbox(image, &crop.bbox);
      }
    }
  }
}

/// 检测记录文本：每行 `label, score, x_min, y_min, x_max, y_max`
pub fn record_lines(record: &OutputRecord) -> Vec<String> {
  record
    .labeled_fields()
    .into_iter()
    .filter_map(|(label, field)| match field {
      Field::Found { score, crop } => Some(format!(
        "{}, {:.4}, {}, {}, {}, {}",
        label, score, crop.bbox[0], crop.bbox[1], crop.bbox[2], crop.bbox[3]
      )),
      Field::NotFound => None,
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{crop::Crop, record::OutletRecord};

  fn outlet(bbox: [u32; 4]) -> OutputRecord {
    OutputRecord::Outlet(OutletRecord {
      outlet_id: Field::Found {
        score: 0.875,
        crop: Crop {
          bbox,
          image: RgbImage::new(bbox[2] - bbox[0], bbox[3] - bbox[1]),
        },
      },
    })
  }

  #[test]
  fn draws_box_edges_only() {
    let mut image = RgbImage::new(40, 40);
    Draw::default().draw_record(&mut image, &outlet([10, 10, 30, 30]));
    assert_eq!(image.get_pixel(10, 10), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(11, 20), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(29, 29), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(20, 20), &Rgb([0, 0, 0]));
  }

  #[test]
  fn record_lines_skip_absent_fields() {
    let lines = record_lines(&outlet([1, 2, 3, 4]));
    assert_eq!(lines, vec!["outlet_id, 0.8750, 1, 2, 3, 4".to_string()]);
    let empty = OutputRecord::Outlet(OutletRecord::default());
    assert!(record_lines(&empty).is_empty());
  }
}
