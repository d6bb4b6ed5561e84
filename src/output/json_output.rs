// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/output/json_output.rs - JSON 结果输出
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

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use base64::{Engine, engine::general_purpose::STANDARD};
use image::ImageFormat;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::BatchItem,
  output::Render,
  record::{
    BatchResult, ErrorRecord, Field, ItemResult, OUTLET_ID_LABEL, OutputRecord, PartnerSlot,
  },
};

#[derive(Error, Debug)]
pub enum JsonOutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("图像编码错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 将批处理结果写为 JSON，路径为空时写到标准输出
#[derive(Debug, Clone)]
pub struct JsonOutput {
  path: Option<PathBuf>,
  embed_crops: bool,
}

impl FromUrlWithScheme for JsonOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonOutput {
  type Error = JsonOutputError;

  /// `json:///path/result.json?embed`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonOutputError::SchemeMismatch(format!(
        "期望输出方式 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(JsonOutput {
      path: Some(PathBuf::from(url.path())),
      embed_crops: url.query_pairs().any(|(k, _)| k == "embed"),
    })
  }
}

impl JsonOutput {
  pub fn stdout(embed_crops: bool) -> Self {
    Self {
      path: None,
      embed_crops,
    }
  }

  pub fn file(path: impl Into<PathBuf>, embed_crops: bool) -> Self {
    Self {
      path: Some(path.into()),
      embed_crops,
    }
  }

  fn write(&self, text: &str) -> Result<(), JsonOutputError> {
    match &self.path {
      Some(path) => {
        if let Some(parent) = Path::new(path).parent()
          && !parent.as_os_str().is_empty()
        {
          std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        info!("结果已写入: {}", path.display());
      }
      None => {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.write_all(b"\n")?;
      }
    }
    Ok(())
  }
}

impl Render<[BatchItem], BatchResult> for JsonOutput {
  type Error = JsonOutputError;

  fn render_result(&self, input: &[BatchItem], result: &BatchResult) -> Result<(), Self::Error> {
    let value = batch_to_json(input, result, self.embed_crops)?;
    self.write(&serde_json::to_string_pretty(&value)?)
  }
}

/// 批处理结果的 JSON 表示，与输入逐项对齐
pub fn batch_to_json(
  input: &[BatchItem],
  result: &BatchResult,
  embed_crops: bool,
) -> Result<Value, JsonOutputError> {
  let entries = input
    .iter()
    .zip(result)
    .map(|(item, result)| {
      let mut entry = match result {
        ItemResult::Record(record) => record_to_json(record, embed_crops)?,
        ItemResult::Error(error) => error_to_json(error),
      };
      if let Value::Object(map) = &mut entry {
        map.insert(
          "image".to_string(),
          Value::String(item.path.display().to_string()),
        );
      }
      Ok(entry)
    })
    .collect::<Result<Vec<Value>, JsonOutputError>>()?;
  Ok(Value::Array(entries))
}

fn record_to_json(record: &OutputRecord, embed_crops: bool) -> Result<Value, JsonOutputError> {
  let data = match record {
    OutputRecord::Outlet(outlet) => {
      let mut data = Map::new();
      data.insert(
        OUTLET_ID_LABEL.to_string(),
        field_to_json(&outlet.outlet_id, embed_crops)?,
      );
      data
    }
    OutputRecord::Partner(partner) => {
      let mut data = Map::new();
      for (slot, fields) in partner.partners() {
        let mut object = Map::new();
        for (name, field) in fields.fields() {
          object.insert(slot.label(name), field_to_json(field, embed_crops)?);
        }
        let key = match slot {
          PartnerSlot::First => "partner_1",
          PartnerSlot::Second => "partner_2",
        };
        data.insert(key.to_string(), Value::Object(object));
      }
      data
    }
  };

  Ok(json!({
    "type": record.document().as_str(),
    "data": Value::Object(data),
  }))
}

fn error_to_json(error: &ErrorRecord) -> Value {
  json!({
    "type": "error",
    "kind": error.kind.as_str(),
    "message": error.message,
  })
}

/// 未找到的字段输出为 `null`，但键始终存在
fn field_to_json(field: &Field, embed_crops: bool) -> Result<Value, JsonOutputError> {
  let Field::Found { score, crop } = field else {
    return Ok(Value::Null);
  };

  let mut value = json!({
    "box": crop.bbox,
    "score": score,
    "width": crop.width(),
    "height": crop.height(),
  });
  if embed_crops {
    let mut png = Vec::new();
    crop.image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    value["png_base64"] = Value::String(STANDARD.encode(&png));
  }
  Ok(value)
}
