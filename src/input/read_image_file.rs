// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/input/read_image_file.rs - 图像文件加载
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::debug;

use super::ImageLoader;

#[derive(Error, Debug)]
pub enum ImageLoadError {
  #[error("图像文件不存在: {0}")]
  NotFound(PathBuf),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  DecodeError(#[from] image::ImageError),
}

/// 从文件系统读取图像并转换为 RGB8
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileLoader;

impl ImageLoader for ImageFileLoader {
  fn load(&self, path: &Path) -> Result<RgbImage, ImageLoadError> {
    if !path.is_file() {
      return Err(ImageLoadError::NotFound(path.to_path_buf()));
    }

    // 按内容识别格式，扩展名与实际格式不符时也能解码
    let image = ImageReader::open(path)?
      .with_guessed_format()?
      .decode()?
      .to_rgb8();

    debug!(
      "读取图像 {}: {}x{}",
      path.display(),
      image.width(),
      image.height()
    );
    Ok(image)
  }
}
