// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/reduce.rs - 同类别检测结果归并
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
use std::str::FromStr;

use thiserror::Error;

use crate::model::{DetectItem, DetectResult};

/// 同一类别出现多个检测结果时的取舍策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
  /// 按检测器输出顺序，最后一个覆盖之前的结果
  #[default]
  LastWins,
  /// 保留分数最高的结果，分数相同时保留先出现的
  BestScore,
}

#[derive(Error, Debug)]
#[error("未知的归并策略: {0}（可选 last-wins, best-score）")]
pub struct UnknownPolicy(String);

impl FromStr for DuplicatePolicy {
  type Err = UnknownPolicy;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "last-wins" | "last_wins" => Ok(DuplicatePolicy::LastWins),
      "best-score" | "best_score" => Ok(DuplicatePolicy::BestScore),
      other => Err(UnknownPolicy(other.to_string())),
    }
  }
}

/// 类别名称到选中检测结果的映射
pub type ClassMap = HashMap<String, DetectItem>;

/// 将检测结果归并为每个类别至多一个
pub fn reduce(result: &DetectResult, policy: DuplicatePolicy) -> ClassMap {
  let mut map = ClassMap::with_capacity(result.len());
  for item in result.iter() {
    match policy {
      DuplicatePolicy::LastWins => {
        map.insert(item.label.clone(), item.clone());
      }
      DuplicatePolicy::BestScore => {
        let replace = map
          .get(&item.label)
          .map(|kept| item.score > kept.score)
          .unwrap_or(true);
        if replace {
          map.insert(item.label.clone(), item.clone());
        }
      }
    }
  }
  map
}
