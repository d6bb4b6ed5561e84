// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/dispatch.rs - 进程内任务调度
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
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// 任务标识，可按字符串比较
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(String);

impl TaskId {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for TaskId {
  fn from(id: &str) -> Self {
    TaskId(id.to_string())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskState<T> {
  Pending,
  Running,
  Succeeded(T),
  Failed(String),
}

impl<T> TaskState<T> {
  pub fn is_finished(&self) -> bool {
    matches!(self, TaskState::Succeeded(_) | TaskState::Failed(_))
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DispatchError {
  #[error("未知任务: {0}")]
  UnknownTask(TaskId),
  #[error("调度器已关闭")]
  Closed,
  #[error("任务状态锁已损坏")]
  StatePoisoned,
}

type Job<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send + 'static>;

pub trait Dispatcher<T> {
  /// 提交任务，立即返回任务标识
  fn submit<F>(&self, job: F) -> Result<TaskId, DispatchError>
  where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static;
  /// 查询任务状态，完成的任务返回结果的副本
  fn query(&self, id: &TaskId) -> Result<TaskState<T>, DispatchError>;
  /// 查询任务状态，任务已完成时取走结果并移除记录
  fn take(&self, id: &TaskId) -> Result<TaskState<T>, DispatchError>;

  /// 轮询直到任务完成并取走结果
  fn wait(&self, id: &TaskId, interval: Duration) -> Result<TaskState<T>, DispatchError> {
    loop {
      let state = self.take(id)?;
      if state.is_finished() {
        return Ok(state);
      }
      std::thread::sleep(interval);
    }
  }
}

type StateTable<T> = Arc<Mutex<HashMap<TaskId, TaskState<T>>>>;

/// 基于固定工作线程的调度器，任务失败或崩溃只影响该任务自身
pub struct ThreadDispatcher<T> {
  sender: Option<Sender<(TaskId, Job<T>)>>,
  states: StateTable<T>,
  workers: Vec<JoinHandle<()>>,
  counter: AtomicU64,
}

impl<T: Clone + Send + 'static> ThreadDispatcher<T> {
  pub fn new(workers: usize) -> Self {
    let (sender, receiver) = channel::<(TaskId, Job<T>)>();
    let receiver = Arc::new(Mutex::new(receiver));
    let states: StateTable<T> = Arc::new(Mutex::new(HashMap::new()));

    let workers = (0..workers.max(1))
      .map(|worker| {
        let receiver = receiver.clone();
        let states = states.clone();
        std::thread::spawn(move || {
          loop {
            let next = match receiver.lock() {
              Ok(receiver) => receiver.recv(),
              Err(_) => break,
            };
            let Ok((id, job)) = next else {
              break;
            };
            run_job(worker, &states, id, job);
          }
          debug!("工作线程 {} 退出", worker);
        })
      })
      .collect();

    Self {
      sender: Some(sender),
      states,
      workers,
      counter: AtomicU64::new(0),
    }
  }

  fn next_id(&self) -> TaskId {
    let seq = self.counter.fetch_add(1, Ordering::Relaxed);
    TaskId(format!("{}-{:06}", Utc::now().format("%Y%m%d%H%M%S"), seq))
  }
}

fn set_state<T>(states: &StateTable<T>, id: &TaskId, state: TaskState<T>) {
  match states.lock() {
    Ok(mut states) => {
      states.insert(id.clone(), state);
    }
    Err(_) => error!("任务 {} 状态无法更新", id),
  }
}

fn run_job<T>(worker: usize, states: &StateTable<T>, id: TaskId, job: Job<T>) {
  set_state(states, &id, TaskState::Running);
  debug!("工作线程 {} 开始任务 {}", worker, id);

  let state = match catch_unwind(AssertUnwindSafe(job)) {
    Ok(Ok(value)) => TaskState::Succeeded(value),
    Ok(Err(e)) => {
      warn!("任务 {} 失败: {:#}", id, e);
      TaskState::Failed(format!("{:#}", e))
    }
    Err(panic) => {
      let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "任务崩溃".to_string());
      error!("任务 {} 崩溃: {}", id, message);
      TaskState::Failed(message)
    }
  };
  set_state(states, &id, state);
  info!("任务 {} 结束", id);
}

impl<T: Clone + Send + 'static> Dispatcher<T> for ThreadDispatcher<T> {
  fn submit<F>(&self, job: F) -> Result<TaskId, DispatchError>
  where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
  {
    let sender = self.sender.as_ref().ok_or(DispatchError::Closed)?;
    let id = self.next_id();
    self
      .states
      .lock()
      .map_err(|_| DispatchError::StatePoisoned)?
      .insert(id.clone(), TaskState::Pending);
    sender
      .send((id.clone(), Box::new(job)))
      .map_err(|_| DispatchError::Closed)?;
    debug!("任务 {} 已提交", id);
    Ok(id)
  }

  fn query(&self, id: &TaskId) -> Result<TaskState<T>, DispatchError> {
    self
      .states
      .lock()
      .map_err(|_| DispatchError::StatePoisoned)?
      .get(id)
      .cloned()
      .ok_or_else(|| DispatchError::UnknownTask(id.clone()))
  }

  fn take(&self, id: &TaskId) -> Result<TaskState<T>, DispatchError> {
    let mut states = self
      .states
      .lock()
      .map_err(|_| DispatchError::StatePoisoned)?;
    let finished = states
      .get(id)
      .map(TaskState::is_finished)
      .ok_or_else(|| DispatchError::UnknownTask(id.clone()))?;
    let state = if finished {
      states.remove(id)
    } else {
      states.get(id).cloned()
    };
    state.ok_or_else(|| DispatchError::UnknownTask(id.clone()))
  }
}

impl<T> Drop for ThreadDispatcher<T> {
  fn drop(&mut self) {
    // 关闭通道后工作线程处理完剩余任务即退出
    self.sender.take();
    for worker in self.workers.drain(..) {
      if worker.join().is_err() {
        error!("工作线程异常退出");
      }
    }
  }
}
