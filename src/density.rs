// 该文件是 Hairscope （发镜） 项目的一部分。
// src/density.rs - 头发密度度量
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

//! 把一张彩色图像换算成头发覆盖率（0–100）。
//!
//! 假设头发比头皮暗：灰度值不超过固定阈值的像素记为头发。
//! 阈值没有做光照校准，偏暗的照片会被高估。

use image::{GrayImage, Luma, RgbImage};
use imageproc::contrast::{ThresholdType, threshold};
use thiserror::Error;

/// 头发像素的灰度上限（含）
pub const HAIR_LUMA_CUTOFF: u8 = 50;

const HAIR: u8 = 255;

#[derive(Error, Debug)]
pub enum DensityError {
  #[error("图像解码失败: {0}")]
  Decode(#[from] image::ImageError),
  #[error("图像为空")]
  EmptyImage,
  #[error("密度计算线程异常退出")]
  WorkerPanicked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DensityMetric {
  cutoff: u8,
}

impl Default for DensityMetric {
  fn default() -> Self {
    Self {
      cutoff: HAIR_LUMA_CUTOFF,
    }
  }
}

impl DensityMetric {
  /// 解码字节并计算密度
  pub fn measure(&self, bytes: &[u8]) -> Result<f64, DensityError> {
    let image = image::load_from_memory(bytes)?.to_rgb8();
    self.measure_rgb(&image)
  }

  pub fn measure_rgb(&self, image: &RgbImage) -> Result<f64, DensityError> {
    let total = u64::from(image.width()) * u64::from(image.height());
    if total == 0 {
      return Err(DensityError::EmptyImage);
    }

    let mask = threshold(&luminance(image), self.cutoff, ThresholdType::BinaryInverted);
    let hair = mask.pixels().filter(|Luma([v])| *v == HAIR).count() as u64;

    Ok(100.0 * hair as f64 / total as f64)
  }
}

/// BT.601 定点灰度转换，舍入方式与常见视觉库一致
fn luminance(image: &RgbImage) -> GrayImage {
  GrayImage::from_fn(image.width(), image.height(), |x, y| {
    let [r, g, b] = image.get_pixel(x, y).0;
    let y = (4899 * u32::from(r) + 9617 * u32::from(g) + 1868 * u32::from(b) + 8192) >> 14;
    Luma([y as u8])
  })
}
