// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/model/postprocess.rs - YOLO 输出解码与非极大值抑制
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

use tracing::debug;

use crate::{
  frame::Letterbox,
  model::{DetectError, DetectItem, DetectResult, Labels, Thresholds},
};

/// 候选框，坐标已映射回原图
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
  pub class_id: usize,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
}

/// 解码 YOLOv8 输出 `[1, 4 + num_classes, num_anchors]`
pub fn decode_predictions(
  dims: &[i64],
  data: &[f32],
  letterbox: &Letterbox,
  confidence: f32,
) -> Result<Vec<Candidate>, DetectError> {
  let unexpected_shape = || DetectError::Inference(format!("输出张量形状不符合预期: {:?}", dims));
  if dims.len() != 3 || dims[0] != 1 || dims[1] <= 4 {
    return Err(unexpected_shape());
  }

  let num_features = usize::try_from(dims[1]).map_err(|_| unexpected_shape())?;
  let num_anchors = usize::try_from(dims[2]).map_err(|_| unexpected_shape())?;
  let num_classes = num_features - 4;
  let expected = num_features
    .checked_mul(num_anchors)
    .ok_or_else(unexpected_shape)?;
  if data.len() != expected {
    return Err(DetectError::Inference(format!(
      "输出数据长度 {} 与形状 {:?} 不一致",
      data.len(),
      dims
    )));
  }

  let mut candidates = Vec::new();
  for anchor in 0..num_anchors {
    let feature = |idx: usize| data[idx * num_anchors + anchor];

    let (class_id, score) = (0..num_classes)
      .map(|c| (c, feature(4 + c)))
      .fold((0usize, f32::MIN), |best, cur| {
        if cur.1 > best.1 { cur } else { best }
      });

    // 与置信度阈值相等的候选框同样丢弃
    if score <= confidence {
      continue;
    }

    let bbox = letterbox.to_source_box([feature(0), feature(1), feature(2), feature(3)]);
    candidates.push(Candidate {
      class_id,
      score,
      bbox,
    });
  }

  debug!("置信度过滤后剩余 {} 个候选框", candidates.len());
  Ok(candidates)
}

/// 计算两个边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 按类别进行非极大值抑制，结果按置信度降序排列
pub fn nms(mut candidates: Vec<Candidate>, overlap: f32, max_det: usize) -> Vec<Candidate> {
  candidates.sort_by(|a, b| {
    b.score
      .partial_cmp(&a.score)
      .unwrap_or(std::cmp::Ordering::Equal)
  });

  let mut keep: Vec<Candidate> = Vec::with_capacity(candidates.len());
  for candidate in candidates {
    if keep.len() >= max_det {
      break;
    }
    let suppressed = keep
      .iter()
      .any(|k| k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > overlap);
    if !suppressed {
      keep.push(candidate);
    }
  }

  debug!("NMS 后保留 {} 个检测框", keep.len());
  keep
}

/// 完整后处理：解码、NMS、转换为整数像素坐标的检测结果
pub fn postprocess(
  dims: &[i64],
  data: &[f32],
  letterbox: &Letterbox,
  labels: &Labels,
  thresholds: Thresholds,
  max_det: usize,
) -> Result<DetectResult, DetectError> {
  let candidates = decode_predictions(dims, data, letterbox, thresholds.confidence)?;
  let items: Vec<DetectItem> = nms(candidates, thresholds.overlap, max_det)
    .into_iter()
    .map(|c| DetectItem {
      label: labels.name(c.class_id),
      score: c.score,
      // 与 int() 一致，向零截断
      bbox: c.bbox.map(|v| v as i32),
    })
    .collect();
  Ok(DetectResult::from(items))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn candidate(class_id: usize, score: f32, bbox: [f32; 4]) -> Candidate {
    Candidate {
      class_id,
      score,
      bbox,
    }
  }

  /// 按 [features, anchors] 布局构造输出
  fn layout(anchors: &[[f32; 6]]) -> Vec<f32> {
    let mut data = vec![0.0; 6 * anchors.len()];
    for (a, values) in anchors.iter().enumerate() {
      for (f, v) in values.iter().enumerate() {
        data[f * anchors.len() + a] = *v;
      }
    }
    data
  }

  #[test]
  fn iou_of_identical_and_disjoint_boxes() {
    let a = [0.0, 0.0, 10.0, 10.0];
    assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
    let half = iou(&a, &[5.0, 0.0, 15.0, 10.0]);
    assert!((half - 1.0 / 3.0).abs() < 1e-6);
  }

  #[test]
  fn nms_is_class_aware_and_sorted() {
    let kept = nms(
      vec![
        candidate(0, 0.6, [0.0, 0.0, 10.0, 10.0]),
        candidate(0, 0.9, [1.0, 1.0, 11.0, 11.0]),
        candidate(1, 0.7, [0.0, 0.0, 10.0, 10.0]),
        candidate(0, 0.8, [50.0, 50.0, 60.0, 60.0]),
      ],
      0.45,
      300,
    );
    let scores: Vec<f32> = kept.iter().map(|c| c.score).collect();
    assert_eq!(scores, vec![0.9, 0.8, 0.7]);
  }

  #[test]
  fn nms_respects_max_det() {
    let kept = nms(
      vec![
        candidate(0, 0.9, [0.0, 0.0, 1.0, 1.0]),
        candidate(1, 0.8, [0.0, 0.0, 1.0, 1.0]),
        candidate(2, 0.7, [0.0, 0.0, 1.0, 1.0]),
      ],
      0.45,
      2,
    );
    assert_eq!(kept.len(), 2);
  }

  #[test]
  fn decode_filters_by_confidence() {
    let letterbox = Letterbox::new(640, 640, 640).unwrap();
    let data = layout(&[
      [100.0, 100.0, 20.0, 40.0, 0.9, 0.1],
      [300.0, 300.0, 10.0, 10.0, 0.2, 0.3],
      [200.0, 200.0, 10.0, 10.0, 0.1, 0.55],
    ]);
    let candidates = decode_predictions(&[1, 6, 3], &data, &letterbox, 0.5).unwrap();
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].class_id, 0);
    assert_eq!(candidates[0].bbox, [90.0, 80.0, 110.0, 120.0]);
    assert_eq!(candidates[1].class_id, 1);
  }

  #[test]
  fn decode_rejects_bad_shapes() {
    let letterbox = Letterbox::new(640, 640, 640).unwrap();
    assert!(decode_predictions(&[1, 4, 2], &[0.0; 8], &letterbox, 0.5).is_err());
    assert!(decode_predictions(&[1, 6, 2], &[0.0; 5], &letterbox, 0.5).is_err());
  }

  #[test]
  fn decode_rejects_negative_and_oversized_dims() {
    let letterbox = Letterbox::new(640, 640, 640).unwrap();
    assert!(matches!(
      decode_predictions(&[1, 6, -1], &[0.0; 6], &letterbox, 0.5),
      Err(DetectError::Inference(_))
    ));
    assert!(matches!(
      decode_predictions(&[1, i64::MAX, i64::MAX], &[0.0; 6], &letterbox, 0.5),
      Err(DetectError::Inference(_))
    ));
  }

  #[test]
  fn score_equal_to_threshold_is_dropped() {
    let letterbox = Letterbox::new(640, 640, 640).unwrap();
    let data = layout(&[
      [100.0, 100.0, 20.0, 20.0, 0.5, 0.0],
      [300.0, 300.0, 20.0, 20.0, 0.0, 0.75],
    ]);
    let candidates = decode_predictions(&[1, 6, 2], &data, &letterbox, 0.5).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].class_id, 1);
  }

  #[test]
  fn postprocess_truncates_to_pixels() {
    let letterbox = Letterbox::new(640, 640, 640).unwrap();
    let data = layout(&[[10.7, 10.7, 5.0, 5.0, 0.0, 0.95]]);
    let labels = Labels::new(["outlet_id", "name_1"]);
    let result =
      postprocess(&[1, 6, 1], &data, &letterbox, &labels, Thresholds::default(), 300).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.items[0].label, "name_1");
    assert_eq!(result.items[0].bbox, [8, 8, 13, 13]);
  }
}
