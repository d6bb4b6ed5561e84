// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/model/yolo.rs - ONNX YOLO 检测器
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

use std::sync::{Arc, Mutex};
use std::time::Instant;

use image::RgbImage;
use ort::{session::Session, value::TensorRef};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNchwFrame,
  model::{
    DetectError, DetectResult, Detector, Labels, LabelsError, ModelCell, Thresholds, postprocess,
  },
};

const YOLO_INPUT_SIZE: u32 = 640;
const YOLO_MAX_DET: usize = 300;
const YOLO_NAMES_METADATA_KEY: &str = "names";

static SHARED_MODEL: ModelCell<YoloDetector> = ModelCell::new();

#[derive(Error, Debug)]
pub enum ModelBuildError {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型文件不存在: {0}")]
  ModelNotFound(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(String),
  #[error("标签错误: {0}")]
  LabelsError(#[from] LabelsError),
  #[error("模型缺少类别标签，请通过 labels 参数指定标签文件")]
  MissingLabels,
}

impl ModelBuildError {
  fn ort(e: impl std::fmt::Display) -> Self {
    ModelBuildError::OrtError(e.to_string())
  }
}

/// YOLO 检测器
///
/// `Session::run` 需要独占访问，推理调用通过互斥锁串行化；
/// 图像加载、预处理和后处理仍可在多个工作线程上并行执行。
pub struct YoloDetector {
  session: Mutex<Session>,
  labels: Labels,
  input_size: u32,
  max_det: usize,
}

#[derive(Debug, Clone)]
pub struct YoloBuilder {
  model_path: String,
  labels_path: Option<String>,
  input_size: u32,
  max_det: usize,
}

impl FromUrlWithScheme for YoloBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for YoloBuilder {
  type Error = ModelBuildError;

  /// `onnx:///path/model.onnx?input_size=640&max_det=300&labels=/path/labels.txt`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelBuildError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = YoloBuilder::new(url.path());
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "input_size" => {
          builder.input_size = value.parse().map_err(|_| {
            ModelBuildError::ModelPathError(format!("无效的 input_size: {}", value))
          })?;
        }
        "max_det" => {
          builder.max_det = value
            .parse()
            .map_err(|_| ModelBuildError::ModelPathError(format!("无效的 max_det: {}", value)))?;
        }
        "labels" => builder.labels_path = Some(value.into_owned()),
        other => warn!("忽略未知的模型参数: {}", other),
      }
    }
    Ok(builder)
  }
}

impl YoloBuilder {
  pub fn new(model_path: impl Into<String>) -> Self {
    Self {
      model_path: model_path.into(),
      labels_path: None,
      input_size: YOLO_INPUT_SIZE,
      max_det: YOLO_MAX_DET,
    }
  }

  pub fn labels_path(mut self, path: impl Into<String>) -> Self {
    self.labels_path = Some(path.into());
    self
  }

  pub fn input_size(mut self, size: u32) -> Self {
    self.input_size = size;
    self
  }

  pub fn max_det(mut self, max_det: usize) -> Self {
    self.max_det = max_det;
    self
  }

  pub fn build(self) -> Result<YoloDetector, ModelBuildError> {
    if !std::path::Path::new(&self.model_path).is_file() {
      return Err(ModelBuildError::ModelNotFound(self.model_path));
    }

    info!("加载模型文件: {}", self.model_path);
    let now = Instant::now();
    let session = Session::builder()
      .map_err(ModelBuildError::ort)?
      .commit_from_file(&self.model_path)
      .map_err(ModelBuildError::ort)?;

    let labels = match &self.labels_path {
      Some(path) => Labels::from_file(path)?,
      None => {
        let metadata = session.metadata().map_err(ModelBuildError::ort)?;
        let names = metadata
          .custom(YOLO_NAMES_METADATA_KEY)
          .map_err(ModelBuildError::ort)?
          .ok_or(ModelBuildError::MissingLabels)?;
        Labels::from_names_metadata(&names)?
      }
    };

    info!(
      "模型加载完成，耗时: {:.2?}，类别数量: {}",
      now.elapsed(),
      labels.len()
    );
    debug!("模型输入尺寸: {}, 最大检测数: {}", self.input_size, self.max_det);

    Ok(YoloDetector {
      session: Mutex::new(session),
      labels,
      input_size: self.input_size,
      max_det: self.max_det,
    })
  }

  /// 进程内只加载一次模型，后续调用返回同一个实例
  pub fn build_shared(self) -> Result<Arc<YoloDetector>, ModelBuildError> {
    if let Some(model) = SHARED_MODEL.get() {
      debug!("复用已加载的模型，忽略 {}", self.model_path);
      return Ok(model);
    }
    SHARED_MODEL.get_or_try_init(|| self.build())
  }
}

impl YoloDetector {
  pub fn labels(&self) -> &Labels {
    &self.labels
  }
}

impl Detector for YoloDetector {
  fn detect(&self, image: &RgbImage, thresholds: Thresholds) -> Result<DetectResult, DetectError> {
    let frame = RgbNchwFrame::from_rgb_image(image, self.input_size).ok_or_else(|| {
      DetectError::InvalidImage(format!("图像尺寸无效: {}x{}", image.width(), image.height()))
    })?;

    let now = Instant::now();
    let mut session = self
      .session
      .lock()
      .map_err(|e| DetectError::Inference(format!("模型会话锁已损坏: {}", e)))?;

    let input = TensorRef::from_array_view(frame.tensor().view())
      .map_err(|e| DetectError::Inference(e.to_string()))?;
    let outputs = session
      .run(ort::inputs![input])
      .map_err(|e| DetectError::Inference(e.to_string()))?;
    let (shape, data) = outputs[0]
      .try_extract_tensor::<f32>()
      .map_err(|e| DetectError::Inference(format!("无法读取输出张量: {}", e)))?;
    debug!("推理完成，耗时: {:.2?}，输出形状: {:?}", now.elapsed(), shape);

    postprocess::postprocess(
      shape.as_ref(),
      data,
      frame.letterbox(),
      &self.labels,
      thresholds,
      self.max_det,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_from_url() {
    let url = Url::parse("onnx:///models/cdr_book.onnx?input_size=1024&max_det=50&labels=/m/l.txt")
      .unwrap();
    let builder = YoloBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, "/models/cdr_book.onnx");
    assert_eq!(builder.input_size, 1024);
    assert_eq!(builder.max_det, 50);
    assert_eq!(builder.labels_path.as_deref(), Some("/m/l.txt"));
  }

  #[test]
  fn builder_rejects_other_scheme() {
    let url = Url::parse("image:///models/cdr_book.onnx").unwrap();
    assert!(matches!(
      YoloBuilder::from_url(&url),
      Err(ModelBuildError::ModelPathError(_))
    ));
  }

  #[test]
  fn missing_model_file() {
    let result = YoloBuilder::new("/definitely/not/here.onnx").build();
    assert!(matches!(result, Err(ModelBuildError::ModelNotFound(_))));
  }
}
