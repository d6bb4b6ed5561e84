// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/input/manifest.rs - 批处理清单解析
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

use std::path::Path;

use serde_json::Value;
use thiserror::Error;

use super::BatchItem;

#[derive(Error, Debug)]
pub enum ManifestError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("清单必须是 JSON 数组")]
  NotAnArray,
  #[error("第 {0} 项必须是只包含一个键的对象，值为图像路径")]
  InvalidEntry(usize),
  #[error("无效的输入项 '{0}'，格式应为 TYPE=PATH")]
  InvalidItem(String),
}

/// 解析 `TYPE=PATH` 形式的命令行输入项
pub fn parse_item(s: &str) -> Result<BatchItem, ManifestError> {
  match s.split_once('=') {
    Some((tag, path)) if !tag.is_empty() && !path.is_empty() => Ok(BatchItem::new(tag, path)),
    _ => Err(ManifestError::InvalidItem(s.to_string())),
  }
}

/// 解析清单：`[{"outlet_copy": "a.jpg"}, {"partner_copy": "b.jpg"}]`
///
/// 类型标签在这里不做校验，未知标签由流水线按单项错误处理。
pub fn parse_manifest(text: &str) -> Result<Vec<BatchItem>, ManifestError> {
  let value: Value = serde_json::from_str(text)?;
  let entries = value.as_array().ok_or(ManifestError::NotAnArray)?;

  entries
    .iter()
    .enumerate()
    .map(|(index, entry)| {
      let object = entry
        .as_object()
        .filter(|o| o.len() == 1)
        .ok_or(ManifestError::InvalidEntry(index))?;
      let (tag, path) = object.iter().next().ok_or(ManifestError::InvalidEntry(index))?;
      let path = path.as_str().ok_or(ManifestError::InvalidEntry(index))?;
      Ok(BatchItem::new(tag.as_str(), path))
    })
    .collect()
}

pub fn read_manifest(path: impl AsRef<Path>) -> Result<Vec<BatchItem>, ManifestError> {
  let text = std::fs::read_to_string(path)?;
  parse_manifest(&text)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_manifest_keeps_order_and_unknown_tags() {
    let items = parse_manifest(
      r#"[{"partner_copy": "b.jpg"}, {"outlet_copy": "a.jpg"}, {"cover": "c.jpg"}]"#,
    )
    .unwrap();
    assert_eq!(
      items,
      vec![
        BatchItem::new("partner_copy", "b.jpg"),
        BatchItem::new("outlet_copy", "a.jpg"),
        BatchItem::new("cover", "c.jpg"),
      ]
    );
  }

  #[test]
  fn reject_invalid_entries() {
    assert!(matches!(
      parse_manifest(r#"{"outlet_copy": "a.jpg"}"#),
      Err(ManifestError::NotAnArray)
    ));
    assert!(matches!(
      parse_manifest(r#"[{"outlet_copy": "a.jpg", "partner_copy": "b.jpg"}]"#),
      Err(ManifestError::InvalidEntry(0))
    ));
    assert!(matches!(
      parse_manifest(r#"[{"outlet_copy": "a.jpg"}, {"outlet_copy": 3}]"#),
      Err(ManifestError::InvalidEntry(1))
    ));
  }

  #[test]
  fn parse_command_line_item() {
    assert_eq!(
      parse_item("outlet_copy=/data/a=1.jpg").unwrap(),
      BatchItem::new("outlet_copy", "/data/a=1.jpg")
    );
    assert!(parse_item("outlet_copy").is_err());
    assert!(parse_item("=a.jpg").is_err());
  }
}
