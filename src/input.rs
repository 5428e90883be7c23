// 该文件是 Hairscope （发镜） 项目的一部分。
// src/input.rs - 图像输入
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

use std::sync::Arc;

use image::RgbImage;
use thiserror::Error;

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

/// 已取回的图像字节，附带一个不透明的来源标识
///
/// 分析核心只对这段字节解码，不会自行访问网络或文件系统。
#[derive(Debug, Clone)]
pub struct ImageBuffer {
  source: String,
  data: Arc<[u8]>,
}

impl ImageBuffer {
  pub fn new(source: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
    Self {
      source: source.into(),
      data: data.into(),
    }
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  pub fn bytes(&self) -> &[u8] {
    &self.data
  }

  /// 解码为三通道 RGB 图像（透明通道被丢弃）
  pub fn decode_rgb(&self) -> Result<RgbImage, image::ImageError> {
    Ok(image::load_from_memory(&self.data)?.to_rgb8())
  }
}

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择输入来源，并取回图像字节
pub fn load_image(url: &url::Url) -> Result<ImageBuffer, InputError> {
  #[cfg(feature = "read_image_file")]
  {
    use crate::{FromUrl, FromUrlWithScheme};

    if url.scheme() == ImageFileInput::SCHEME {
      return Ok(ImageFileInput::from_url(url)?.into_buffer());
    }
  }
  Err(InputError::SchemeMismatch(url.scheme().to_string()))
}

/// 批量任务队列里的一项输入，由工作线程自行取回
pub trait FetchImage {
  fn describe(&self) -> String;
  fn fetch(self) -> Result<ImageBuffer, InputError>;
}

impl FetchImage for ImageBuffer {
  fn describe(&self) -> String {
    self.source.clone()
  }

  fn fetch(self) -> Result<ImageBuffer, InputError> {
    Ok(self)
  }
}

impl FetchImage for url::Url {
  fn describe(&self) -> String {
    self.to_string()
  }

  fn fetch(self) -> Result<ImageBuffer, InputError> {
    load_image(&self)
  }
}

/// 命令行里的输入来源：完整 URL 原样使用，其余按本地路径处理
pub fn source_url(source: &str) -> Result<url::Url, String> {
  if let Ok(url) = url::Url::parse(source)
    && url.scheme().len() > 1
  {
    return Ok(url);
  }

  let path = std::path::absolute(source).map_err(|e| format!("无效路径 {source}: {e}"))?;
  let file_url = url::Url::from_file_path(&path).map_err(|_| format!("无效路径: {source}"))?;
  // file 是特殊方案，不能直接 set_scheme 成 image
  url::Url::parse(&format!("image://{}", file_url.path()))
    .map_err(|e| format!("无法转换为 image URL {source}: {e}"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plain_path_becomes_image_url() {
    let url = source_url("/tmp/scalp photo.png").unwrap();
    assert_eq!(url.scheme(), "image");
    assert_eq!(crate::url_file_path(&url), "/tmp/scalp photo.png");
  }

  #[test]
  fn explicit_url_is_kept() {
    let url = source_url("image:///data/a.jpg").unwrap();
    assert_eq!(url.as_str(), "image:///data/a.jpg");
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = url::Url::parse("ftp://host/a.jpg").unwrap();
    assert!(matches!(load_image(&url), Err(InputError::SchemeMismatch(s)) if s == "ftp"));
  }
}
