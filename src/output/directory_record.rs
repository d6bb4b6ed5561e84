// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{BatchItem, ImageFileLoader, ImageLoadError, ImageLoader},
  output::{
    Render,
    draw::{Draw, record_lines},
  },
  record::{BatchResult, ItemResult},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无效的颜色: {0}（格式为 RRGGBB）")]
  InvalidColor(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] ImageLoadError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 将每张图像的字段区域标注图和检测记录写入按日期划分的目录
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
  counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  /// `folder:///path/dir?always&color=ff0000`
  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");
    let mut output = DirectoryRecordOutput::new(uri.path(), always);
    if let Some((_, color)) = uri.query_pairs().find(|(k, _)| k == "color") {
      output.draw = Draw::default().with_color(parse_color(&color)?);
    }
    Ok(output)
  }
}

fn parse_color(hex: &str) -> Result<[u8; 3], DirectoryRecordOutputError> {
  let invalid = || DirectoryRecordOutputError::InvalidColor(hex.to_string());
  let hex = hex.trim_start_matches('#');
  if hex.len() != 6 || !hex.is_ascii() {
    return Err(invalid());
  }
  let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
  Ok([channel(0)?, channel(2)?, channel(4)?])
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, always: bool) -> Self {
    Self {
      directory: directory.into(),
      draw: Draw::default(),
      counter: AtomicU16::new(0),
      always,
    }
  }

  fn record_id(&self) -> u16 {
    self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn record_path(&self, source: &Path) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    let stem = source
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "image".to_string());
    Ok(directory.join(format!(
      "{}-{:04X}-{}.png",
      now.format("%H-%M-%S"),
      self.record_id(),
      stem
    )))
  }
}

impl Render<[BatchItem], BatchResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, input: &[BatchItem], result: &BatchResult) -> Result<(), Self::Error> {
    for (item, result) in input.iter().zip(result) {
      let ItemResult::Record(record) = result else {
        debug!("跳过失败项: {}", item.path.display());
        continue;
      };

      let lines = record_lines(record);
      if lines.is_empty() && !self.always {
        continue;
      }

      let mut image = match ImageFileLoader.load(&item.path) {
        Ok(image) => image,
        Err(e) => {
          warn!("无法重新读取图像 {}: {}", item.path.display(), e);
          continue;
        }
      };
      self.draw.draw_record(&mut image, record);

      let path = self.record_path(&item.path)?;
      image.save(&path)?;
      std::fs::write(path.with_extension("txt"), lines.join("\n"))?;
      debug!("记录已保存: {}", path.display());
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    crop::Crop,
    record::{Field, OutletRecord, OutputRecord},
  };
  use image::{Rgb, RgbImage};

  fn files_with_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        found.extend(files_with_extension(&path, ext));
      } else if path.extension().is_some_and(|e| e == ext) {
        found.push(path);
      }
    }
    found
  }

  #[test]
  fn writes_annotated_image_and_record() {
    let input_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();
    let source = input_dir.path().join("A.png");
    RgbImage::from_pixel(60, 60, Rgb([255, 255, 255])).save(&source).unwrap();

    let found = OutputRecord::Outlet(OutletRecord {
      outlet_id: Field::Found {
        score: 0.9,
        crop: Crop {
          bbox: [10, 10, 50, 50],
          image: RgbImage::new(40, 40),
        },
      },
    });
    let empty = OutputRecord::Outlet(OutletRecord::default());
    let items = vec![
      BatchItem::new("outlet_copy", &source),
      BatchItem::new("outlet_copy", &source),
    ];
    let results = vec![ItemResult::Record(found), ItemResult::Record(empty)];

    let output = DirectoryRecordOutput::new(output_dir.path(), false);
    output.render_result(&items, &results).unwrap();

    let pngs = files_with_extension(output_dir.path(), "png");
    let txts = files_with_extension(output_dir.path(), "txt");
    assert_eq!(pngs.len(), 1);
    assert_eq!(txts.len(), 1);
    let text = std::fs::read_to_string(&txts[0]).unwrap();
    assert!(text.starts_with("outlet_id, 0.9000, 10, 10, 50, 50"));
  }

  #[test]
  fn color_from_url_is_used_for_boxes() {
    let input_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();
    let source = input_dir.path().join("A.png");
    RgbImage::from_pixel(60, 60, Rgb([255, 255, 255])).save(&source).unwrap();

    let url = url::Url::parse(&format!(
      "folder://{}?color=ff0000",
      output_dir.path().display()
    ))
    .unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    let record = OutputRecord::Outlet(OutletRecord {
      outlet_id: Field::Found {
        score: 0.9,
        crop: Crop {
          bbox: [10, 10, 50, 50],
          image: RgbImage::new(40, 40),
        },
      },
    });
    output
      .render_result(&[BatchItem::new("outlet_copy", &source)], &vec![ItemResult::Record(record)])
      .unwrap();

    let pngs = files_with_extension(output_dir.path(), "png");
    assert_eq!(pngs.len(), 1);
    let annotated = image::open(&pngs[0]).unwrap().to_rgb8();
    assert_eq!(annotated.get_pixel(10, 10), &Rgb([255, 0, 0]));
    assert_eq!(annotated.get_pixel(30, 30), &Rgb([255, 255, 255]));
  }

  #[test]
  fn invalid_color_is_rejected() {
    let url = url::Url::parse("folder:///tmp/records?color=red").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::InvalidColor(_))
    ));
    assert_eq!(parse_color("#00ff7f").unwrap(), [0, 255, 127]);
  }

  #[test]
  fn scheme_is_checked() {
    let url = url::Url::parse("json:///tmp/out").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::SchemeMismatch)
    ));
  }
}
