// 该文件是 Booklet Extract （册页提取） 项目的一部分。
// src/output.rs - 输出定义
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::BatchItem, record::BatchResult};

pub trait Render<Input: ?Sized, Output: ?Sized>: Sized {
  type Error;
  fn render_result(&self, input: &Input, result: &Output) -> Result<(), Self::Error>;
}

impl<Input: ?Sized, Output: ?Sized, R: Render<Input, Output>> Render<Input, Output> for Vec<R> {
  type Error = R::Error;

  fn render_result(&self, input: &Input, result: &Output) -> Result<(), Self::Error> {
    for render in self {
      render.render_result(input, result)?;
    }
    Ok(())
  }
}

mod json_output;
pub use self::json_output::{JsonOutput, JsonOutputError, batch_to_json};

#[cfg(feature = "directory_record")]
pub mod draw;

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("JSON 输出错误: {0}")]
  JsonOutputError(#[from] JsonOutputError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("输入与结果数量不一致: {0} != {1}")]
  LengthMismatch(usize, usize),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  Json(JsonOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecord(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      JsonOutput::SCHEME => Ok(OutputWrapper::Json(JsonOutput::from_url(url)?)),
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => Ok(OutputWrapper::DirectoryRecord(
        DirectoryRecordOutput::from_url(url)?,
      )),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render<[BatchItem], BatchResult> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, input: &[BatchItem], result: &BatchResult) -> Result<(), Self::Error> {
    if input.len() != result.len() {
      return Err(OutputError::LengthMismatch(input.len(), result.len()));
    }
    match self {
      OutputWrapper::Json(output) => output
        .render_result(input, result)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => output
        .render_result(input, result)
        .map_err(OutputError::from),
    }
  }
}
