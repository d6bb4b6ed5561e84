// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/record.rs - 输出记录与字段映射
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

use std::collections::HashMap;
use std::fmt;

use crate::{
  crop::Crop,
  input::{DocumentType, DocumentTypeError},
};

/// 门店联中门店编号的类别名称
pub const OUTLET_ID_LABEL: &str = "outlet_id";

/// 合作方字段名称，顺序即输出顺序
pub const PARTNER_FIELD_NAMES: [&str; 7] = [
  "name",
  "partner_code",
  "age",
  "date",
  "sign",
  "cheek_mark",
  "phn_number",
];

/// 单个字段：找到的裁剪区域，或明确的“未找到”
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Field {
  Found { score: f32, crop: Crop },
  #[default]
  NotFound,
}

impl Field {
  pub fn is_found(&self) -> bool {
    matches!(self, Field::Found { .. })
  }

  pub fn crop(&self) -> Option<&Crop> {
    match self {
      Field::Found { crop, .. } => Some(crop),
      Field::NotFound => None,
    }
  }

  pub fn score(&self) -> Option<f32> {
    match self {
      Field::Found { score, .. } => Some(*score),
      Field::NotFound => None,
    }
  }
}

/// 类别名称到字段的映射，只包含检测到的类别
pub type CropMap = HashMap<String, Field>;

fn take(crops: &mut CropMap, label: &str) -> Field {
  crops.remove(label).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutletRecord {
  pub outlet_id: Field,
}

/// 合作方在模型标签中的位置
///
/// 第一位合作方的标签带 `_1` 后缀，第二位合作方的标签不带后缀。
/// 这是模型标签表的既有约定，不能统一改名。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartnerSlot {
  First,
  Second,
}

impl PartnerSlot {
  pub fn suffix(&self) -> &'static str {
    match self {
      PartnerSlot::First => "_1",
      PartnerSlot::Second => "",
    }
  }

  pub fn label(&self, field: &str) -> String {
    format!("{}{}", field, self.suffix())
  }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PartnerFields {
  pub name: Field,
  pub partner_code: Field,
  pub age: Field,
  pub date: Field,
  pub sign: Field,
  pub cheek_mark: Field,
  pub phn_number: Field,
}

impl PartnerFields {
  fn from_crops(slot: PartnerSlot, crops: &mut CropMap) -> Self {
    let mut field = |name: &str| take(crops, &slot.label(name));
    Self {
      name: field("name"),
      partner_code: field("partner_code"),
      age: field("age"),
      date: field("date"),
      sign: field("sign"),
      cheek_mark: field("cheek_mark"),
      phn_number: field("phn_number"),
    }
  }

  /// 按 [`PARTNER_FIELD_NAMES`] 顺序列出全部字段
  pub fn fields(&self) -> [(&'static str, &Field); 7] {
    [
      ("name", &self.name),
      ("partner_code", &self.partner_code),
      ("age", &self.age),
      ("date", &self.date),
      ("sign", &self.sign),
      ("cheek_mark", &self.cheek_mark),
      ("phn_number", &self.phn_number),
    ]
  }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PartnerRecord {
  pub partner_1: PartnerFields,
  pub partner_2: PartnerFields,
}

impl PartnerRecord {
  pub fn partners(&self) -> [(PartnerSlot, &PartnerFields); 2] {
    [
      (PartnerSlot::First, &self.partner_1),
      (PartnerSlot::Second, &self.partner_2),
    ]
  }
}

/// 单张图像的结构化输出，变体由文档类型决定
#[derive(Debug, Clone, PartialEq)]
pub enum OutputRecord {
  Outlet(OutletRecord),
  Partner(PartnerRecord),
}

impl OutputRecord {
  pub fn document(&self) -> DocumentType {
    match self {
      OutputRecord::Outlet(_) => DocumentType::OutletCopy,
      OutputRecord::Partner(_) => DocumentType::PartnerCopy,
    }
  }

  /// 所有字段及其在模型标签表中的类别名称
  pub fn labeled_fields(&self) -> Vec<(String, &Field)> {
    match self {
      OutputRecord::Outlet(record) => vec![(OUTLET_ID_LABEL.to_string(), &record.outlet_id)],
      OutputRecord::Partner(record) => record
        .partners()
        .into_iter()
        .flat_map(|(slot, fields)| {
          fields
            .fields()
            .into_iter()
            .map(move |(name, field)| (slot.label(name), field))
        })
        .collect(),
    }
  }
}

/// 根据文档类型组装输出记录，缺失的类别填充为 [`Field::NotFound`]
pub fn map_record(document: DocumentType, mut crops: CropMap) -> OutputRecord {
  match document {
    DocumentType::OutletCopy => OutputRecord::Outlet(OutletRecord {
      outlet_id: take(&mut crops, OUTLET_ID_LABEL),
    }),
    DocumentType::PartnerCopy => OutputRecord::Partner(PartnerRecord {
      partner_1: PartnerFields::from_crops(PartnerSlot::First, &mut crops),
      partner_2: PartnerFields::from_crops(PartnerSlot::Second, &mut crops),
    }),
  }
}

/// 以字符串类型标签组装记录，未知标签返回错误
pub fn map_tagged(tag: &str, crops: CropMap) -> Result<OutputRecord, DocumentTypeError> {
  Ok(map_record(tag.parse()?, crops))
}

/// 单项失败的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  ResourceLoad,
  UnknownDocumentType,
  DetectionFailure,
}

impl ErrorKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ErrorKind::ResourceLoad => "ResourceLoadError",
      ErrorKind::UnknownDocumentType => "UnknownDocumentTypeError",
      ErrorKind::DetectionFailure => "DetectionFailure",
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
  pub kind: ErrorKind,
  pub message: String,
}

/// 批处理结果中的一项
#[derive(Debug, Clone, PartialEq)]
pub enum ItemResult {
  Record(OutputRecord),
  Error(ErrorRecord),
}

impl ItemResult {
  pub fn is_error(&self) -> bool {
    matches!(self, ItemResult::Error(_))
  }

  pub fn record(&self) -> Option<&OutputRecord> {
    match self {
      ItemResult::Record(record) => Some(record),
      ItemResult::Error(_) => None,
    }
  }

  pub fn error(&self) -> Option<&ErrorRecord> {
    match self {
      ItemResult::Error(error) => Some(error),
      ItemResult::Record(_) => None,
    }
  }
}

pub type BatchResult = Vec<ItemResult>;

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  fn found(x: u32) -> Field {
    Field::Found {
      score: 0.9,
      crop: Crop {
        bbox: [x, 0, x + 1, 1],
        image: RgbImage::new(1, 1),
      },
    }
  }

  #[test]
  fn outlet_record_with_and_without_detection() {
    let mut crops = CropMap::new();
    crops.insert("outlet_id".to_string(), found(3));
    let OutputRecord::Outlet(record) = map_record(DocumentType::OutletCopy, crops) else {
      panic!("expected outlet record");
    };
    assert_eq!(record.outlet_id, found(3));

    let OutputRecord::Outlet(record) = map_record(DocumentType::OutletCopy, CropMap::new()) else {
      panic!("expected outlet record");
    };
    assert_eq!(record.outlet_id, Field::NotFound);
  }

  #[test]
  fn partner_labels_are_asymmetric() {
    let mut crops = CropMap::new();
    crops.insert("name_1".to_string(), found(1));
    crops.insert("name".to_string(), found(2));
    crops.insert("phn_number".to_string(), found(7));
    crops.insert("outlet_id".to_string(), found(9));

    let OutputRecord::Partner(record) = map_record(DocumentType::PartnerCopy, crops) else {
      panic!("expected partner record");
    };
    assert_eq!(record.partner_1.name, found(1));
    assert_eq!(record.partner_2.name, found(2));
    assert_eq!(record.partner_2.phn_number, found(7));
    assert_eq!(record.partner_1.phn_number, Field::NotFound);
  }

  #[test]
  fn partner_record_has_all_fields() {
    let record = map_record(DocumentType::PartnerCopy, CropMap::new());
    let labels: Vec<String> = record.labeled_fields().into_iter().map(|(l, _)| l).collect();
    assert_eq!(labels.len(), 14);
    assert_eq!(labels[0], "name_1");
    assert_eq!(labels[6], "phn_number_1");
    assert_eq!(labels[7], "name");
    assert_eq!(labels[13], "phn_number");
    assert!(record.labeled_fields().iter().all(|(_, f)| !f.is_found()));
  }

  #[test]
  fn unknown_tag_is_rejected() {
    assert_eq!(
      map_tagged("cover_copy", CropMap::new()),
      Err(DocumentTypeError("cover_copy".to_string()))
    );
    assert_eq!(
      map_tagged("outlet_copy", CropMap::new()).unwrap().document(),
      DocumentType::OutletCopy
    );
  }
}
