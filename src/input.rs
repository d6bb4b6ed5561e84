// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/input.rs - 批处理输入定义
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

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::RgbImage;
use thiserror::Error;

mod manifest;
mod read_image_file;

pub use self::manifest::{ManifestError, parse_item, parse_manifest, read_manifest};
pub use self::read_image_file::{ImageFileLoader, ImageLoadError};

/// 文档类型，决定输出记录的结构
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentType {
  OutletCopy,
  PartnerCopy,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("未知的图像类型: {0}")]
pub struct DocumentTypeError(pub String);

impl DocumentType {
  pub fn as_str(&self) -> &'static str {
    match self {
      DocumentType::OutletCopy => "outlet_copy",
      DocumentType::PartnerCopy => "partner_copy",
    }
  }
}

impl fmt::Display for DocumentType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DocumentType {
  type Err = DocumentTypeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "outlet_copy" => Ok(DocumentType::OutletCopy),
      "partner_copy" => Ok(DocumentType::PartnerCopy),
      other => Err(DocumentTypeError(other.to_string())),
    }
  }
}

/// 批处理中的一项：未经校验的类型标签与图像路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
  pub tag: String,
  pub path: PathBuf,
}

impl BatchItem {
  pub fn new(tag: impl Into<String>, path: impl Into<PathBuf>) -> Self {
    Self {
      tag: tag.into(),
      path: path.into(),
    }
  }
}

/// 校验后的图像引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
  document: DocumentType,
  path: PathBuf,
}

impl ImageRef {
  pub fn new(document: DocumentType, path: impl Into<PathBuf>) -> Self {
    Self {
      document,
      path: path.into(),
    }
  }

  pub fn document(&self) -> DocumentType {
    self.document
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl TryFrom<&BatchItem> for ImageRef {
  type Error = DocumentTypeError;

  fn try_from(item: &BatchItem) -> Result<Self, Self::Error> {
    Ok(ImageRef::new(item.tag.parse()?, item.path.clone()))
  }
}

/// 图像加载器
pub trait ImageLoader: Send + Sync {
  fn load(&self, path: &Path) -> Result<RgbImage, ImageLoadError>;
}

impl<L: ImageLoader + ?Sized> ImageLoader for &L {
  fn load(&self, path: &Path) -> Result<RgbImage, ImageLoadError> {
    (**self).load(path)
  }
}
