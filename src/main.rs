// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use booklet_extract::{
  FromUrl,
  dispatch::{Dispatcher, TaskState, ThreadDispatcher},
  input::{BatchItem, read_manifest},
  model::{Thresholds, YoloBuilder},
  output::{JsonOutput, OutputWrapper, Render},
  task::{OneShotTask, Pipeline, PipelineConfig, Task},
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型: {}", args.model);
  info!("置信度阈值: {}", args.confidence);
  info!("NMS 阈值: {}", args.overlap);
  info!("归并策略: {:?}", args.policy);

  let mut items: Vec<BatchItem> = match &args.manifest {
    Some(path) => read_manifest(path)
      .with_context(|| format!("无法读取清单文件 {}", path.display()))?,
    None => Vec::new(),
  };
  items.extend(args.items.iter().cloned());
  if items.is_empty() {
    anyhow::bail!("没有输入项，请使用 --item 或 --manifest 指定");
  }
  info!("输入项数量: {}", items.len());

  let outputs: Vec<OutputWrapper> = if args.output.is_empty() {
    vec![OutputWrapper::Json(JsonOutput::stdout(args.embed_crops))]
  } else {
    args
      .output
      .iter()
      .map(|url| {
        info!("输出: {}", url);
        OutputWrapper::from_url(url).with_context(|| format!("无法创建输出 {}", url))
      })
      .collect::<Result<_>>()?
  };

  // 模型无法加载时整个批次失败，此时尚未处理任何输入项
  let detector = YoloBuilder::from_url(&args.model)?
    .build_shared()
    .context("模型加载失败")?;

  let config = PipelineConfig {
    thresholds: Thresholds {
      confidence: args.confidence,
      overlap: args.overlap,
    },
    policy: args.policy,
    workers: args.workers,
  };
  let pipeline = Pipeline::new(detector, config);

  if !args.dispatch {
    return OneShotTask.run_task(items, &pipeline, outputs);
  }

  let pipeline = Arc::new(pipeline);
  let dispatcher = ThreadDispatcher::new(1);
  let batch = Arc::new(items);
  let task_id = {
    let pipeline = pipeline.clone();
    let batch = batch.clone();
    dispatcher.submit(move || Ok(Arc::new(pipeline.process_batch(&batch))))?
  };
  info!("批次已提交，任务: {}", task_id);

  match dispatcher.wait(&task_id, POLL_INTERVAL)? {
    TaskState::Succeeded(results) => {
      outputs.render_result(&batch, &results)?;
      info!("任务 {} 完成", task_id);
      Ok(())
    }
    TaskState::Failed(message) => anyhow::bail!("任务 {} 失败: {}", task_id, message),
    state => anyhow::bail!("任务 {} 状态异常: {:?}", task_id, state),
  }
}
