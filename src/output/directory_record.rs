// 该文件是 Hairscope （发镜） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  output::Render,
  record::{AnalysisRecord, sanitize_user_id},
  url_file_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("序列化错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按 `<目录>/<用户>/<类型>/<年>/<月>/<日>/<时-分-秒>-<序号>.json` 落盘
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record_counter: AtomicU16,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(url_file_path(uri)),
      record_counter: AtomicU16::new(0),
    })
  }
}

impl DirectoryRecordOutput {
  fn record_id(&self) -> u16 {
    self.record_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  /// 新建记录文件；同名文件已存在时顺延序号，不覆盖旧记录
  fn create_record_file(
    &self,
    user_id: &str,
    kind: &str,
  ) -> Result<(PathBuf, File), std::io::Error> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(sanitize_user_id(user_id))
      .join(kind)
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    let stem = now.format("%H-%M-%S").to_string();
    for _ in 0..=u16::MAX {
      let path = directory.join(format!("{}-{:04X}.json", stem, self.record_id()));
      match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => return Ok((path, file)),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
          debug!("记录文件已存在，顺延序号: {}", path.display());
        }
        Err(e) => return Err(e),
      }
    }

    Err(std::io::Error::new(
      ErrorKind::AlreadyExists,
      format!("{} 下 {} 的记录序号已用尽", directory.display(), stem),
    ))
  }
}

impl<R: AnalysisRecord> Render<R> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, record: &R) -> Result<(), Self::Error> {
    let data = serde_json::to_vec_pretty(record)?;
    let (path, mut file) = self.create_record_file(record.user_id(), R::KIND)?;
    file.write_all(&data)?;
    info!("记录已写入: {}", path.display());
    Ok(())
  }
}
