// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/model.rs - 检测模型
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

use std::sync::Arc;

use image::RgbImage;
use once_cell::sync::OnceCell;
use thiserror::Error;

/// 默认置信度阈值
pub const DEFAULT_CONFIDENCE: f32 = 0.5;
/// 默认 NMS 重叠阈值
pub const DEFAULT_OVERLAP: f32 = 0.45;

/// 单个检测结果，坐标为原图像素坐标
#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub label: String,
  pub score: f32,
  pub bbox: [i32; 4], // [x_min, y_min, x_max, y_max]
}

impl DetectItem {
  pub fn new(label: impl Into<String>, score: f32, bbox: [i32; 4]) -> Self {
    Self {
      label: label.into(),
      score,
      bbox,
    }
  }
}

/// 一张图像的检测结果，保持检测器的原始输出顺序
#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    DetectResult {
      items: items.into_boxed_slice(),
    }
  }
}

/// 检测阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
  /// 低于该分数的检测结果被丢弃
  pub confidence: f32,
  /// 同类别候选框之间的 NMS IoU 阈值
  pub overlap: f32,
}

impl Default for Thresholds {
  fn default() -> Self {
    Self {
      confidence: DEFAULT_CONFIDENCE,
      overlap: DEFAULT_OVERLAP,
    }
  }
}

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("图像无法用于推理: {0}")]
  InvalidImage(String),
  #[error("推理失败: {0}")]
  Inference(String),
}

/// 目标检测器
///
/// 实现者不得修改输入图像；返回的结果已经按 `thresholds` 完成置信度过滤和 NMS。
/// 同一个检测器会被多个工作线程共享，因此要求 `Send + Sync`。
pub trait Detector: Send + Sync {
  fn detect(&self, image: &RgbImage, thresholds: Thresholds) -> Result<DetectResult, DetectError>;
}

impl<D: Detector + ?Sized> Detector for Arc<D> {
  fn detect(&self, image: &RgbImage, thresholds: Thresholds) -> Result<DetectResult, DetectError> {
    (**self).detect(image, thresholds)
  }
}

impl<D: Detector + ?Sized> Detector for &D {
  fn detect(&self, image: &RgbImage, thresholds: Thresholds) -> Result<DetectResult, DetectError> {
    (**self).detect(image, thresholds)
  }
}

/// 进程级的模型单元：首次使用时加载，之后只读共享
pub struct ModelCell<M> {
  cell: OnceCell<Arc<M>>,
}

impl<M> ModelCell<M> {
  pub const fn new() -> Self {
    Self {
      cell: OnceCell::new(),
    }
  }

  pub fn get(&self) -> Option<Arc<M>> {
    self.cell.get().cloned()
  }

  pub fn get_or_try_init<E>(&self, load: impl FnOnce() -> Result<M, E>) -> Result<Arc<M>, E> {
    self
      .cell
      .get_or_try_init(|| load().map(Arc::new))
      .cloned()
  }
}

impl<M> Default for ModelCell<M> {
  fn default() -> Self {
    Self::new()
  }
}

pub mod labels;
pub mod postprocess;

#[cfg(feature = "model_onnx")]
mod yolo;
#[cfg(feature = "model_onnx")]
pub use self::yolo::{ModelBuildError, YoloBuilder, YoloDetector};

pub use self::labels::{Labels, LabelsError};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_thresholds() {
    let thresholds = Thresholds::default();
    assert_eq!(thresholds.confidence, 0.5);
    assert_eq!(thresholds.overlap, 0.45);
  }

  #[test]
  fn model_cell_loads_once() {
    let cell: ModelCell<u32> = ModelCell::new();
    let mut loads = 0;
    let first = cell
      .get_or_try_init(|| {
        loads += 1;
        Ok::<_, ()>(7)
      })
      .unwrap();
    let second = cell
      .get_or_try_init(|| {
        loads += 1;
        Ok::<_, ()>(8)
      })
      .unwrap();
    assert_eq!(loads, 1);
    assert_eq!(*second, 7);
    assert!(Arc::ptr_eq(&first, &second));
  }

  #[test]
  fn model_cell_retries_after_failure() {
    let cell: ModelCell<u32> = ModelCell::new();
    assert!(cell.get_or_try_init(|| Err::<u32, _>("boom")).is_err());
    assert!(cell.get().is_none());
    let value = cell.get_or_try_init(|| Ok::<_, &str>(3)).unwrap();
    assert_eq!(*value, 3);
  }
}
