// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use booklet_extract::{
  input::{BatchItem, parse_item},
  model::{DEFAULT_CONFIDENCE, DEFAULT_OVERLAP},
  reduce::DuplicatePolicy,
};

/// 册页字段提取
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测模型，例如 onnx:///path/model.onnx?input_size=640&labels=/path/labels.txt
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 单个输入项，格式为 TYPE=PATH，可重复
  /// TYPE 为 outlet_copy 或 partner_copy
  #[arg(long = "item", value_name = "TYPE=PATH", value_parser = parse_item_arg)]
  pub items: Vec<BatchItem>,

  /// JSON 清单文件: [{"outlet_copy": "a.jpg"}, ...]，清单项排在 --item 之前
  #[arg(long, value_name = "FILE")]
  pub manifest: Option<PathBuf>,

  /// 输出位置，可重复
  /// - json:///path/result.json?embed
  /// - folder:///path/dir?always&color=ff0000
  /// 未指定时以 JSON 写到标准输出
  #[arg(long, value_name = "OUTPUT")]
  pub output: Vec<Url>,

  /// 标准输出的 JSON 中嵌入裁剪图像（base64 PNG）
  #[arg(long)]
  pub embed_crops: bool,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_OVERLAP, value_name = "THRESHOLD")]
  pub overlap: f32,

  /// 同一类别多个检测结果的取舍: last-wins 或 best-score
  #[arg(long, default_value = "last-wins", value_name = "POLICY")]
  pub policy: DuplicatePolicy,

  /// 并行工作线程数，0 表示按 CPU 数量
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub workers: usize,

  /// 通过任务调度器提交批次并轮询结果
  #[arg(long)]
  pub dispatch: bool,
}

fn parse_item_arg(s: &str) -> Result<BatchItem, String> {
  parse_item(s).map_err(|e| e.to_string())
}
