// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/task.rs - 批处理流水线与任务
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

use std::time::{Duration, Instant};

use image::RgbImage;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  crop::crop,
  input::{BatchItem, DocumentTypeError, ImageFileLoader, ImageLoadError, ImageLoader, ImageRef},
  model::{DetectError, Detector, Thresholds},
  output::Render,
  record::{BatchResult, CropMap, ErrorKind, ErrorRecord, Field, ItemResult, OutputRecord, map_record},
  reduce::{ClassMap, DuplicatePolicy, reduce},
};

/// 流水线配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
  pub thresholds: Thresholds,
  pub policy: DuplicatePolicy,
  /// 并行工作线程数，0 表示使用 rayon 全局线程池
  pub workers: usize,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      thresholds: Thresholds::default(),
      policy: DuplicatePolicy::LastWins,
      workers: 0,
    }
  }
}

/// 单项处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
  Pending,
  Detecting,
  Reducing,
  Cropping,
  Mapped,
  Failed,
}

#[derive(Error, Debug)]
pub enum ItemError {
  #[error("{0}")]
  UnknownDocumentType(#[from] DocumentTypeError),
  #[error("图像加载失败: {0}")]
  ResourceLoad(#[from] ImageLoadError),
  #[error("检测失败: {0}")]
  DetectionFailure(#[from] DetectError),
}

impl ItemError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      ItemError::UnknownDocumentType(_) => ErrorKind::UnknownDocumentType,
      ItemError::ResourceLoad(_) => ErrorKind::ResourceLoad,
      ItemError::DetectionFailure(DetectError::InvalidImage(_)) => ErrorKind::ResourceLoad,
      ItemError::DetectionFailure(DetectError::Inference(_)) => ErrorKind::DetectionFailure,
    }
  }
}

impl From<&ItemError> for ErrorRecord {
  fn from(error: &ItemError) -> Self {
    ErrorRecord {
      kind: error.kind(),
      message: error.to_string(),
    }
  }
}

/// 为每个选中的检测结果裁剪子图像，裁剪区域为空的类别记为未找到
pub fn crop_classes(image: &RgbImage, classes: &ClassMap) -> CropMap {
  classes
    .iter()
    .map(|(label, item)| {
      let field = match crop(image, item.bbox) {
        Some(crop) => Field::Found {
          score: item.score,
          crop,
        },
        None => {
          debug!("类别 {} 的检测框 {:?} 裁剪后为空", label, item.bbox);
          Field::NotFound
        }
      };
      (label.clone(), field)
    })
    .collect()
}

/// 检测结果到结构化记录的批处理流水线
pub struct Pipeline<D, L = ImageFileLoader> {
  detector: D,
  loader: L,
  config: PipelineConfig,
  // workers > 0 时的专用线程池，重复处理批次时复用
  pool: Option<rayon::ThreadPool>,
}

impl<D: Detector> Pipeline<D, ImageFileLoader> {
  pub fn new(detector: D, config: PipelineConfig) -> Self {
    Self::with_loader(detector, ImageFileLoader, config)
  }
}

impl<D: Detector, L: ImageLoader> Pipeline<D, L> {
  pub fn with_loader(detector: D, loader: L, config: PipelineConfig) -> Self {
    let pool = (config.workers > 0)
      .then(|| {
        rayon::ThreadPoolBuilder::new()
          .num_threads(config.workers)
          .build()
      })
      .and_then(|built| match built {
        Ok(pool) => Some(pool),
        Err(e) => {
          warn!("无法创建 {} 线程的线程池，改用全局线程池: {}", config.workers, e);
          None
        }
      });

    Self {
      detector,
      loader,
      config,
      pool,
    }
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  /// 处理一批图像，结果顺序与输入顺序一致，单项失败不影响其他项
  pub fn process_batch(&self, items: &[BatchItem]) -> BatchResult {
    info!("开始处理批次，共 {} 项", items.len());
    let now = Instant::now();

    let run = || -> BatchResult {
      items
        .par_iter()
        .enumerate()
        .map(|(index, item)| self.process_slot(index, item))
        .collect()
    };

    let results = match &self.pool {
      Some(pool) => pool.install(run),
      None => run(),
    };

    let failed = results.iter().filter(|r| r.is_error()).count();
    info!(
      "批次处理完成，耗时: {:.2?}，成功 {} 项，失败 {} 项",
      now.elapsed(),
      results.len() - failed,
      failed
    );
    results
  }

  fn process_slot(&self, index: usize, item: &BatchItem) -> ItemResult {
    match self.process_item(index, item) {
      Ok(record) => ItemResult::Record(record),
      Err(e) => {
        warn!(
          "第 {} 项 ({}, {}) 处理失败: {}",
          index,
          item.tag,
          item.path.display(),
          e
        );
        debug!("第 {} 项状态: {:?}", index, ItemState::Failed);
        ItemResult::Error(ErrorRecord::from(&e))
      }
    }
  }

  /// 处理单张图像：加载 → 检测 → 归并 → 裁剪 → 组装
  pub fn process_item(&self, index: usize, item: &BatchItem) -> Result<OutputRecord, ItemError> {
    debug!("第 {} 项状态: {:?}", index, ItemState::Pending);
    let image_ref = ImageRef::try_from(item)?;
    let image = self.loader.load(image_ref.path())?;

    debug!("第 {} 项状态: {:?}", index, ItemState::Detecting);
    let detections = self.detector.detect(&image, self.config.thresholds)?;
    debug!("第 {} 项检测到 {} 个目标", index, detections.len());

    debug!("第 {} 项状态: {:?}", index, ItemState::Reducing);
    let classes = reduce(&detections, self.config.policy);

    debug!("第 {} 项状态: {:?}", index, ItemState::Cropping);
    let crops = crop_classes(&image, &classes);

    let record = map_record(image_ref.document(), crops);
    debug!("第 {} 项状态: {:?}", index, ItemState::Mapped);
    Ok(record)
  }
}

pub trait Task<I, P, O>: Sized {
  type Error;
  fn run_task(self, input: I, pipeline: P, output: O) -> Result<(), Self::Error>;
}

/// 处理一次批次并输出结果
pub struct OneShotTask;

impl<D, L, O, RE> Task<Vec<BatchItem>, &Pipeline<D, L>, O> for OneShotTask
where
  D: Detector,
  L: ImageLoader,
  RE: std::error::Error + Send + Sync + 'static,
  O: Render<[BatchItem], BatchResult, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: Vec<BatchItem>,
    pipeline: &Pipeline<D, L>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let results = pipeline.process_batch(&input);
    output.render_result(&input, &results)?;
    info!("任务完成");
    Ok(())
  }
}

/// 重复处理同一批次，统计平均耗时
pub struct RepeatShotTask {
  repeat: usize,
  warmup: usize,
}

impl RepeatShotTask {
  pub fn new(repeat: usize, warmup: usize) -> Self {
    Self { repeat, warmup }
  }
}

impl<D, L, O, RE> Task<Vec<BatchItem>, &Pipeline<D, L>, O> for RepeatShotTask
where
  D: Detector,
  L: ImageLoader,
  RE: std::error::Error + Send + Sync + 'static,
  O: Render<[BatchItem], BatchResult, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: Vec<BatchItem>,
    pipeline: &Pipeline<D, L>,
    output: O,
  ) -> Result<(), Self::Error> {
    if self.repeat <= self.warmup {
      anyhow::bail!("重复次数 {} 必须大于预热次数 {}", self.repeat, self.warmup);
    }

    info!("开始任务，重复 {} 次...", self.repeat);
    let mut times = Vec::with_capacity(self.repeat);
    let mut last = None;
    for i in 0..self.repeat {
      let now = Instant::now();
      let results = pipeline.process_batch(&input);
      let elapsed = now.elapsed();
      info!("({})批次完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
      last = Some(results);
    }

    let measured = &times[self.warmup..];
    warn!(
      "平均批次耗时: {:.2?}",
      measured.iter().sum::<Duration>() / measured.len() as u32
    );

    if let Some(results) = last {
      output.render_result(&input, &results)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DetectItem, DetectResult};
  use image::Rgb;
  use std::path::Path;

  struct FixedDetector(Vec<DetectItem>);

  impl Detector for FixedDetector {
    fn detect(&self, _: &RgbImage, _: Thresholds) -> Result<DetectResult, DetectError> {
      Ok(DetectResult::from(self.0.clone()))
    }
  }

  struct BlankLoader;

  impl ImageLoader for BlankLoader {
    fn load(&self, path: &Path) -> Result<RgbImage, ImageLoadError> {
      if path.to_string_lossy().contains("missing") {
        return Err(ImageLoadError::NotFound(path.to_path_buf()));
      }
      Ok(RgbImage::from_pixel(100, 100, Rgb([200, 200, 200])))
    }
  }

  fn pipeline(items: Vec<DetectItem>) -> Pipeline<FixedDetector, BlankLoader> {
    Pipeline::with_loader(FixedDetector(items), BlankLoader, PipelineConfig::default())
  }

  #[test]
  fn crop_classes_marks_empty_crops_absent() {
    let image = RgbImage::new(50, 50);
    let mut classes = ClassMap::new();
    classes.insert("name".into(), DetectItem::new("name", 0.8, [10, 10, 20, 30]));
    classes.insert("age".into(), DetectItem::new("age", 0.8, [60, 60, 70, 70]));
    let crops = crop_classes(&image, &classes);
    assert_eq!(crops["name"].crop().map(|c| c.bbox), Some([10, 10, 20, 30]));
    assert_eq!(crops["age"], Field::NotFound);
  }

  #[test]
  fn unknown_tag_fails_single_item() {
    let pipeline = pipeline(vec![]);
    let results = pipeline.process_batch(&[
      BatchItem::new("outlet_copy", "a.jpg"),
      BatchItem::new("cover_copy", "b.jpg"),
    ]);
    assert_eq!(results.len(), 2);
    assert!(!results[0].is_error());
    assert_eq!(
      results[1].error().map(|e| e.kind),
      Some(ErrorKind::UnknownDocumentType)
    );
  }

  #[test]
  fn missing_image_is_resource_error() {
    let pipeline = pipeline(vec![]);
    let error = pipeline
      .process_item(0, &BatchItem::new("outlet_copy", "missing.jpg"))
      .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ResourceLoad);
  }

  #[test]
  fn fixed_worker_count() {
    let pipeline = Pipeline::with_loader(
      FixedDetector(vec![DetectItem::new("outlet_id", 0.9, [0, 0, 10, 10])]),
      BlankLoader,
      PipelineConfig {
        workers: 2,
        ..PipelineConfig::default()
      },
    );
    assert_eq!(
      pipeline.pool.as_ref().map(|pool| pool.current_num_threads()),
      Some(2)
    );

    let items: Vec<BatchItem> = (0..8)
      .map(|i| BatchItem::new("outlet_copy", format!("{}.jpg", i)))
      .collect();
    for _ in 0..2 {
      let results = pipeline.process_batch(&items);
      assert_eq!(results.len(), 8);
      assert!(results.iter().all(|r| !r.is_error()));
    }
  }

  #[test]
  fn default_workers_use_global_pool() {
    assert!(pipeline(vec![]).pool.is_none());
  }
}
