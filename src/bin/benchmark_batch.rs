// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/bin/benchmark_batch.rs - 批处理耗时测试
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use booklet_extract::{
  FromUrl,
  input::read_manifest,
  model::YoloBuilder,
  output::OutputWrapper,
  task::{Pipeline, PipelineConfig, RepeatShotTask, Task},
};
use tracing::info;

/// 重复处理同一批次并统计平均耗时
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测模型
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// JSON 清单文件
  #[arg(long, value_name = "FILE")]
  pub manifest: PathBuf,
  /// 最后一次结果的输出位置
  #[arg(long, value_name = "OUTPUT")]
  pub output: Vec<Url>,
  /// 重复次数
  #[arg(long, default_value = "20", value_name = "COUNT")]
  pub repeat: usize,
  /// 预热次数，不计入平均耗时
  #[arg(long, default_value = "2", value_name = "COUNT")]
  pub warmup: usize,
  /// 并行工作线程数，0 表示按 CPU 数量
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub workers: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("清单文件: {}", args.manifest.display());

  let items = read_manifest(&args.manifest)?;
  let outputs = args
    .output
    .iter()
    .map(OutputWrapper::from_url)
    .collect::<Result<Vec<_>, _>>()?;
  let detector = YoloBuilder::from_url(&args.model)?.build_shared()?;
  let pipeline = Pipeline::new(
    detector,
    PipelineConfig {
      workers: args.workers,
      ..PipelineConfig::default()
    },
  );

  RepeatShotTask::new(args.repeat, args.warmup).run_task(items, &pipeline, outputs)?;

  Ok(())
}
