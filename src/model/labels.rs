// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/model/labels.rs - 类别标签表
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

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LabelsError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签元数据格式错误: {0}")]
  Malformed(String),
  #[error("标签表为空")]
  Empty,
}

/// 类别编号到类别名称的映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
  names: Vec<String>,
}

impl Labels {
  pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
    Self {
      names: names.into_iter().map(Into::into).collect(),
    }
  }

  /// 从文本文件读取标签，每行一个，行号即类别编号
  ///
  /// 文件末尾的空行被忽略，中间的空行占位为 `class_<id>`。
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelsError> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let mut lines: Vec<&str> = text.lines().map(str::trim).collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
      lines.pop();
    }
    let names: Vec<String> = lines
      .into_iter()
      .enumerate()
      .map(|(id, line)| {
        if line.is_empty() {
          placeholder(id)
        } else {
          line.to_string()
        }
      })
      .collect();
    if names.is_empty() {
      return Err(LabelsError::Empty);
    }
    debug!("从 {} 读取 {} 个标签", path.as_ref().display(), names.len());
    Ok(Self { names })
  }

  /// 解析 ultralytics 导出模型中的 `names` 元数据，
  /// 形如 `{0: 'outlet_id', 1: 'name_1'}`
  pub fn from_names_metadata(raw: &str) -> Result<Self, LabelsError> {
    let malformed = || LabelsError::Malformed(raw.to_string());

    let body = raw
      .trim()
      .strip_prefix('{')
      .and_then(|s| s.strip_suffix('}'))
      .ok_or_else(malformed)?;

    let mut entries: Vec<(usize, String)> = Vec::new();
    let mut rest = body.trim();
    while !rest.is_empty() {
      let (key, value) = rest.split_once(':').ok_or_else(malformed)?;
      let id: usize = key.trim().parse().map_err(|_| malformed())?;

      let value = value.trim_start();
      let quote = value
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(malformed)?;
      let inner = &value[quote.len_utf8()..];
      let end = inner.find(quote).ok_or_else(malformed)?;
      entries.push((id, inner[..end].to_string()));

      rest = inner[end + quote.len_utf8()..].trim_start();
      rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
    }

    let count = match entries.iter().map(|(id, _)| *id).max() {
      Some(max_id) => max_id + 1,
      None => return Err(LabelsError::Empty),
    };
    let mut names: Vec<String> = (0..count).map(placeholder).collect();
    for (id, name) in entries {
      names[id] = name;
    }
    Ok(Self { names })
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// 类别编号对应的名称，未知编号返回 `class_<id>`
  pub fn name(&self, class_id: usize) -> String {
    self
      .names
      .get(class_id)
      .cloned()
      .unwrap_or_else(|| placeholder(class_id))
  }

  pub fn id_of(&self, name: &str) -> Option<usize> {
    self.names.iter().position(|n| n == name)
  }
}

fn placeholder(class_id: usize) -> String {
  format!("class_{}", class_id)
}
